//! RPC surface: `ImageService` methods as JSON over HTTP.
//!
//! Each method is a `POST` to `/imagestore.v1.ImageService/{Method}` with a
//! JSON request body and a JSON response body. Image bytes travel as standard
//! base64. Failures use the shared [`AppError`] body with a stable `code`.

use axum::body::Bytes;
use axum::extract::State;
use axum::{Extension, Json};
use ims_core::{Error, PageRequest};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::handler::{Image, ImageHandler};
use crate::middleware::request_id::RequestId;

/// Path prefix shared by every method.
pub const SERVICE_PATH: &str = "/imagestore.v1.ImageService";

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateImageRequest {
    pub content_type: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetImageRequest {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteImageRequest {
    pub id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListImagesRequest {
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub page_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageResponse {
    pub image: Image,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DeleteImageResponse {}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListImagesResponse {
    pub images: Vec<Image>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Decode a JSON body. Anything malformed is the caller's fault.
fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    serde_json::from_slice(body).map_err(|e| Error::Validation(format!("invalid request body: {e}")))
}

/// POST /imagestore.v1.ImageService/CreateImage
pub async fn create_image(
    State(handler): State<ImageHandler>,
    Extension(rid): Extension<RequestId>,
    body: Bytes,
) -> Result<Json<ImageResponse>, AppError> {
    let req: CreateImageRequest = decode(&body).map_err(AppError::tagged(&rid))?;
    let image = handler
        .create_image(req.content_type, Bytes::from(req.data))
        .await
        .map_err(AppError::tagged(&rid))?;
    Ok(Json(ImageResponse { image }))
}

/// POST /imagestore.v1.ImageService/GetImage
pub async fn get_image(
    State(handler): State<ImageHandler>,
    Extension(rid): Extension<RequestId>,
    body: Bytes,
) -> Result<Json<ImageResponse>, AppError> {
    let req: GetImageRequest = decode(&body).map_err(AppError::tagged(&rid))?;
    let image = handler
        .get_image(req.id)
        .await
        .map_err(AppError::tagged(&rid))?;
    Ok(Json(ImageResponse { image }))
}

/// POST /imagestore.v1.ImageService/DeleteImage
pub async fn delete_image(
    State(handler): State<ImageHandler>,
    Extension(rid): Extension<RequestId>,
    body: Bytes,
) -> Result<Json<DeleteImageResponse>, AppError> {
    let req: DeleteImageRequest = decode(&body).map_err(AppError::tagged(&rid))?;
    handler
        .delete_image(req.id)
        .await
        .map_err(AppError::tagged(&rid))?;
    Ok(Json(DeleteImageResponse {}))
}

/// POST /imagestore.v1.ImageService/ListImages
///
/// An empty body lists the first page with the default size.
pub async fn list_images(
    State(handler): State<ImageHandler>,
    Extension(rid): Extension<RequestId>,
    body: Bytes,
) -> Result<Json<ListImagesResponse>, AppError> {
    let req: ListImagesRequest = if body.is_empty() {
        ListImagesRequest::default()
    } else {
        decode(&body).map_err(AppError::tagged(&rid))?
    };
    let list = handler
        .list_images(PageRequest {
            page_size: req.page_size,
            page_token: req.page_token,
        })
        .await
        .map_err(AppError::tagged(&rid))?;
    Ok(Json(ListImagesResponse {
        images: list.images,
        next_page_token: list.next_page_token,
    }))
}

/// Serde adapter for `Vec<u8>` as standard base64 text.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}
