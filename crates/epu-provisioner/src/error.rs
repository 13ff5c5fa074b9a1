use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionerError {
    #[error(transparent)]
    Domain(#[from] epu_domain::DomainError),

    #[error(transparent)]
    Store(#[from] epu_store::StoreError),

    #[error(transparent)]
    Driver(#[from] epu_iaas::DriverError),

    #[error("deployable type lookup failed for {deployable_type:?}: {reason}")]
    DeployableTypeLookupError { deployable_type: String, reason: String },

    #[error("context broker transient failure: {0}")]
    BrokerError(String),

    #[error("context {context_id} not found at broker")]
    ContextNotFoundError { context_id: String },

    #[error("launch {0} not found")]
    LaunchNotFound(String),

    #[error("node {0} not found")]
    NodeNotFound(String),

    #[error("invalid cluster document: {0}")]
    InvalidDocument(String),
}

impl ProvisionerError {
    pub fn code(&self) -> &'static str {
        match self {
            ProvisionerError::Domain(e) => e.code(),
            ProvisionerError::Store(e) => e.code(),
            ProvisionerError::Driver(e) => e.code(),
            ProvisionerError::DeployableTypeLookupError { .. } => "DEPLOYABLE_TYPE_LOOKUP_ERROR",
            ProvisionerError::BrokerError(_) => "BROKER_ERROR",
            ProvisionerError::ContextNotFoundError { .. } => "CONTEXT_NOT_FOUND",
            ProvisionerError::LaunchNotFound(_) => "NOT_FOUND",
            ProvisionerError::NodeNotFound(_) => "NOT_FOUND",
            ProvisionerError::InvalidDocument(_) => "INVALID_DOCUMENT",
        }
    }

    /// Terminal errors promote the affected launch/nodes to `Failed` and
    /// notify subscribers exactly once. Transient errors (`BrokerError`,
    /// most driver timeouts) are absorbed and retried on the next tick.
    pub fn is_terminal(&self) -> bool {
        match self {
            ProvisionerError::BrokerError(_) => false,
            ProvisionerError::Driver(e) => e.is_terminal(),
            _ => true,
        }
    }
}
