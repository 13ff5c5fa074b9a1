use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {kind} {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("write conflict, held by {holder}")]
    WriteConflict { holder: String },

    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "NOT_FOUND",
            StoreError::Serialization(_) => "SERIALIZATION_ERROR",
            StoreError::WriteConflict { .. } => "WRITE_CONFLICT",
            StoreError::Internal(_) => "INTERNAL",
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound { kind, id: id.into() }
    }
}
