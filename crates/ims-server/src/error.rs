//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`ims_core::Error`] so that route handlers on
//! either surface can return `Result<T, AppError>` directly. The body carries a
//! stable `code` and a message that never includes storage details.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::middleware::request_id::RequestId;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: ims_core::Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: ims_core::Error) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Closure for `map_err` that tags errors with the current request ID.
    pub fn tagged(request_id: &RequestId) -> impl Fn(ims_core::Error) -> AppError + '_ {
        move |e| AppError::new(e).with_request_id(request_id.0.clone())
    }

    pub fn inner(&self) -> &ims_core::Error {
        &self.inner
    }
}

impl From<ims_core::Error> for AppError {
    fn from(e: ims_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                request_id = self.request_id.as_deref().unwrap_or("-"),
                "Server error in request handler"
            );
        } else {
            tracing::debug!(status = %status, error = %self.inner, "Client error");
        }

        let body = json!({
            "code": self.inner.code(),
            "message": self.inner.public_message(),
            "request_id": self.request_id,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn not_found_produces_404() {
        let err = AppError::new(ims_core::Error::not_found("image", "abc"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn store_failure_hides_details() {
        let err = AppError::new(ims_core::Error::content(
            "Permission denied: /srv/images/ab/abcd",
        ))
        .with_request_id("req-123".into());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = body_json(response).await;
        assert_eq!(body["code"], "unavailable");
        assert_eq!(body["request_id"], "req-123");
        assert!(!body["message"].as_str().unwrap().contains("/srv/images"));
    }

    #[test]
    fn with_request_id() {
        let err = AppError::new(ims_core::Error::Internal("oops".into()))
            .with_request_id("req-123".into());
        assert_eq!(err.request_id.as_deref(), Some("req-123"));
    }

    #[test]
    fn tagged_closure() {
        let rid = RequestId("req-9".into());
        let err = AppError::tagged(&rid)(ims_core::Error::Validation("bad".into()));
        assert_eq!(err.request_id.as_deref(), Some("req-9"));
        assert!(matches!(err.inner(), ims_core::Error::Validation(_)));
    }
}
