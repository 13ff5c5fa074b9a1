use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine as _;

use crate::state::AppState;

/// Requires a valid `Authorization` header: `Bearer <token>`, or HTTP Basic
/// with the token as the password (for clients that only support Basic).
/// Returns 401 for missing, malformed, or incorrect tokens. Applied to every
/// route except `/healthz`.
pub async fn require_bearer_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let provided = header.and_then(|h| {
        if let Some(token) = h.strip_prefix("Bearer ") {
            Some(token.to_string())
        } else if let Some(encoded) = h.strip_prefix("Basic ") {
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .and_then(|creds| creds.split_once(':').map(|(_, pass)| pass.to_string()))
        } else {
            None
        }
    });

    match provided {
        Some(token) if token == *state.auth_token => next.run(request).await,
        _ => (StatusCode::UNAUTHORIZED, "Unauthorized\n").into_response(),
    }
}
