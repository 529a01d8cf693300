//! Axum router construction for the two surfaces.
//!
//! Both routers share one [`ImageHandler`] as state and the same middleware
//! stack: request IDs, a per-request timeout, and HTTP tracing.

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handler::ImageHandler;
use crate::middleware::request_id::request_id_middleware;
use crate::rpc::{self, SERVICE_PATH};
use crate::routes;

/// Room for the JSON envelope around a base64 payload.
const ENVELOPE_OVERHEAD: u64 = 64 * 1024;

/// Largest RPC body that can carry an image of `max_image_bytes`.
fn rpc_body_limit(max_image_bytes: u64) -> usize {
    let encoded = max_image_bytes.div_ceil(3) * 4;
    usize::try_from(encoded + ENVELOPE_OVERHEAD).unwrap_or(usize::MAX)
}

/// Build the RPC router serving the `ImageService` methods.
pub fn build_rpc_router(handler: ImageHandler, request_timeout: Duration) -> Router {
    let body_limit = rpc_body_limit(handler.max_image_bytes());

    Router::new()
        .route(
            &format!("{SERVICE_PATH}/CreateImage"),
            post(rpc::create_image),
        )
        .route(&format!("{SERVICE_PATH}/GetImage"), post(rpc::get_image))
        .route(
            &format!("{SERVICE_PATH}/DeleteImage"),
            post(rpc::delete_image),
        )
        .route(
            &format!("{SERVICE_PATH}/ListImages"),
            post(rpc::list_images),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

/// Build the read-only HTTP router serving image bytes and the liveness probe.
pub fn build_http_router(handler: ImageHandler, request_timeout: Duration) -> Router {
    Router::new()
        .route("/images/{id}", get(routes::images::get_image))
        .route("/health", get(routes::health::health_check))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}
