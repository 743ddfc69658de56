//! Request extractors whose rejections render as `ApiError` JSON bodies
//! instead of axum's plain-text defaults.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{FromRequest, FromRequestParts};
use tracing::debug;

use crate::error::ApiError;

/// JSON request body. Missing content type, malformed JSON and wrongly
/// typed fields are all 400.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// Path parameters. A non-numeric id is 400.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct Path<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected request body: {}", rejection.body_text());
        ApiError::BadRequest("Request body must be a JSON object with the expected fields")
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        debug!("Rejected path: {}", rejection.body_text());
        ApiError::BadRequest("Invalid identifier in path")
    }
}
