use thiserror::Error;

/// Validation errors raised while constructing domain records. Every
/// variant exposes a stable `code()` so callers dispatch on structure, not
/// on parsing `Display` output.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid node id: {0:?}")]
    InvalidNodeId(String),

    #[error("invalid launch id: {0:?}")]
    InvalidLaunchId(String),

    #[error("invalid domain id: {0:?}")]
    InvalidDomainId(String),

    #[error("invalid definition id: {0:?}")]
    InvalidDefinitionId(String),

    #[error("launch {launch_id} references node {node_id} not in its node_ids set")]
    NodeNotInLaunch { launch_id: String, node_id: String },

    #[error("ctx_name {ctx_name:?} in request has no matching <workspace> in the cluster document")]
    CtxNameNotInDocument { ctx_name: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl DomainError {
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::InvalidNodeId(_) => "INVALID_NODE_ID",
            DomainError::InvalidLaunchId(_) => "INVALID_LAUNCH_ID",
            DomainError::InvalidDomainId(_) => "INVALID_DOMAIN_ID",
            DomainError::InvalidDefinitionId(_) => "INVALID_DEFINITION_ID",
            DomainError::NodeNotInLaunch { .. } => "NODE_NOT_IN_LAUNCH",
            DomainError::CtxNameNotInDocument { .. } => "CTX_NAME_NOT_IN_DOCUMENT",
            DomainError::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}
