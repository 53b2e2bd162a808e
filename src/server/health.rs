//! Liveness endpoint.

use axum::http::StatusCode;

/// `GET /health`: 200 while the server accepts connections.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
