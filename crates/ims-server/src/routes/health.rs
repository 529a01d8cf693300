//! Liveness probe.

use axum::http::StatusCode;
use axum::response::IntoResponse;

/// GET /health
///
/// Signals that the process is responsive. Backing stores are not consulted.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
