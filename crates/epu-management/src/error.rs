use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagementError {
    #[error(transparent)]
    Domain(#[from] epu_domain::DomainError),

    #[error(transparent)]
    Store(#[from] epu_store::StoreError),

    #[error(transparent)]
    Controller(#[from] epu_controller::ControllerError),

    #[error("domain {0} not found")]
    DomainNotFound(String),

    #[error("domain definition {0} not found")]
    DefinitionNotFound(String),

    #[error("domain {domain_id} already exists")]
    DomainAlreadyExists { domain_id: String },

    #[error("caller {caller:?} is not permitted to act on domain owned by {domain_owner:?}")]
    NotPermitted { caller: String, domain_owner: String },

    #[error("no default user is configured")]
    NoDefaultUser,
}

impl ManagementError {
    pub fn code(&self) -> &'static str {
        match self {
            ManagementError::Domain(e) => e.code(),
            ManagementError::Store(e) => e.code(),
            ManagementError::Controller(e) => e.code(),
            ManagementError::DomainNotFound(_) => "NOT_FOUND",
            ManagementError::DefinitionNotFound(_) => "NOT_FOUND",
            ManagementError::DomainAlreadyExists { .. } => "DOMAIN_ALREADY_EXISTS",
            ManagementError::NotPermitted { .. } => "NOT_PERMITTED",
            ManagementError::NoDefaultUser => "NO_DEFAULT_USER",
        }
    }
}
