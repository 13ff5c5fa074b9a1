use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Domain(#[from] epu_domain::DomainError),

    #[error(transparent)]
    Provisioner(#[from] epu_provisioner::ProvisionerError),

    #[error("no decision engine registered under name {0:?}")]
    UnknownEngine(String),

    #[error("engine rejected configuration: {0}")]
    InvalidEngineConfig(String),

    #[error("a decide or reconfigure call is already in flight")]
    Busy,
}

impl ControllerError {
    pub fn code(&self) -> &'static str {
        match self {
            ControllerError::Domain(e) => e.code(),
            ControllerError::Provisioner(e) => e.code(),
            ControllerError::UnknownEngine(_) => "UNKNOWN_ENGINE",
            ControllerError::InvalidEngineConfig(_) => "INVALID_ENGINE_CONFIG",
            ControllerError::Busy => "BUSY",
        }
    }
}
