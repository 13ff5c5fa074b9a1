mod client;
mod heartbeat;
mod supervisor;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use epu_domain::NodeId;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use client::HeartbeatClient;
use heartbeat::build_heartbeat;
use supervisor::FailureDetector;

/// In-VM "Operational Unit" agent: periodically samples a process
/// supervisor and heartbeats the result to the controlling EPU Management
/// endpoint.
#[derive(Debug, Parser)]
#[command(name = "epu-agent")]
struct Args {
    /// Node id to report in every heartbeat. Injected by the Controller at
    /// launch time, usually via cloud-init/contextualization.
    #[arg(long, env = "EPU_NODE_ID")]
    node_id: String,

    /// Heartbeat ingestion endpoint.
    #[arg(long, env = "EPU_HEARTBEAT_DEST", default_value = "http://127.0.0.1:8080/heartbeat")]
    heartbeat_dest: String,

    /// Seconds between heartbeats.
    #[arg(long, env = "EPU_HEARTBEAT_PERIOD_SECONDS", default_value_t = 5.0)]
    period_seconds: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();
    let node_id = NodeId::new(args.node_id)?;
    let client = HeartbeatClient::new(args.heartbeat_dest);
    let mut detector = FailureDetector::new();
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(args.period_seconds));

    info!(node_id = %node_id, period_seconds = args.period_seconds, "starting heartbeat loop");
    loop {
        ticker.tick().await;
        // No process-supervisor backend is wired up by default; an agent
        // running alongside supervisord would pass `Some(&real_supervisor)`.
        let hb = build_heartbeat(&node_id, &mut detector, None).await;
        if let Err(e) = client.send(&hb).await {
            error!(node_id = %node_id, error = %e, "heartbeat delivery failed");
        }
    }
}
