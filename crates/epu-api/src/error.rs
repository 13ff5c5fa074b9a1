use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(code: &'static str, msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::BAD_REQUEST, code, message: msg.into() }
    }

    pub fn not_found(code: &'static str, msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::NOT_FOUND, code, message: msg.into() }
    }

    pub fn internal(code: &'static str, msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::INTERNAL_SERVER_ERROR, code, message: msg.into() }
    }

    /// Map a structured error `code()` string to an HTTP status, following
    /// the teacher's `From<ReconcileError>`/`From<StoreError>` shape but
    /// keyed off the code rather than the enum variant, since every
    /// downstream crate already settled on one.
    fn status_for(code: &str) -> StatusCode {
        match code {
            "NOT_FOUND" | "CONTEXT_NOT_FOUND" => StatusCode::NOT_FOUND,
            "DOMAIN_ALREADY_EXISTS" | "WRITE_CONFLICT" => StatusCode::CONFLICT,
            "NOT_PERMITTED" => StatusCode::FORBIDDEN,
            "UNKNOWN_ENGINE" | "INVALID_ENGINE_CONFIG" | "INVALID_DOCUMENT" | "NO_DEFAULT_USER" => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "code": self.code, "message": self.message }));
        (self.status, body).into_response()
    }
}

impl From<epu_management::ManagementError> for ApiError {
    fn from(e: epu_management::ManagementError) -> Self {
        ApiError { status: ApiError::status_for(e.code()), code: e.code(), message: e.to_string() }
    }
}

impl From<epu_provisioner::ProvisionerError> for ApiError {
    fn from(e: epu_provisioner::ProvisionerError) -> Self {
        ApiError { status: ApiError::status_for(e.code()), code: e.code(), message: e.to_string() }
    }
}

impl From<epu_store::StoreError> for ApiError {
    fn from(e: epu_store::StoreError) -> Self {
        ApiError { status: ApiError::status_for(e.code()), code: e.code(), message: e.to_string() }
    }
}
