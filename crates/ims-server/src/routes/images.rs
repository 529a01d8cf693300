//! Image byte serving.

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::IntoResponse;

use crate::error::AppError;
use crate::handler::ImageHandler;

/// Stored content never changes, so clients may cache it indefinitely.
const CACHE_FOREVER: &str = "public, max-age=31536000, immutable";

/// GET /images/{id}
pub async fn get_image(
    State(handler): State<ImageHandler>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (record, data) = handler.fetch_content(id).await?;

    let content_type = HeaderValue::from_str(&record.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static(CACHE_FOREVER)),
        ],
        data,
    ))
}
