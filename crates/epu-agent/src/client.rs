use epu_domain::Heartbeat;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("heartbeat delivery failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Delivers a heartbeat to the configured ingestion endpoint. A thin wrapper
/// so `main.rs`'s loop stays a pure schedule-and-log shape.
pub struct HeartbeatClient {
    http: reqwest::Client,
    destination: String,
}

impl HeartbeatClient {
    pub fn new(destination: impl Into<String>) -> Self {
        HeartbeatClient { http: reqwest::Client::new(), destination: destination.into() }
    }

    pub async fn send(&self, heartbeat: &Heartbeat) -> Result<(), ClientError> {
        self.http.post(&self.destination).json(heartbeat).send().await?.error_for_status()?;
        Ok(())
    }
}
