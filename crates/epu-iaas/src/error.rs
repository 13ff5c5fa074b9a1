use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("credentials rejected by driver for site {site}")]
    InvalidCreds { site: String },

    #[error("create_node failed: {0}")]
    ProvisionFailed(String),

    #[error("destroy_node failed: {0}")]
    TeardownFailed(String),

    #[error("no driver configured for site {0}")]
    DriverNotConfigured(String),

    #[error("driver call timed out")]
    Timeout,

    #[error("internal driver error: {0}")]
    Internal(String),
}

impl DriverError {
    pub fn code(&self) -> &'static str {
        match self {
            DriverError::InvalidCreds { .. } => "INVALID_CREDS",
            DriverError::ProvisionFailed(_) => "PROVISION_FAILED",
            DriverError::TeardownFailed(_) => "TEARDOWN_FAILED",
            DriverError::DriverNotConfigured(_) => "DRIVER_NOT_CONFIGURED",
            DriverError::Timeout => "TIMEOUT",
            DriverError::Internal(_) => "INTERNAL",
        }
    }

    /// Driver errors that should promote affected nodes to `Failed`
    /// (terminal) rather than being retried on the next `query` tick.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DriverError::InvalidCreds { .. } | DriverError::ProvisionFailed(_))
    }
}
