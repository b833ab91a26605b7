//! API error taxonomy
//!
//! Handlers return [`ApiError`]; anything unexpected travels as
//! `anyhow::Error` and surfaces as a 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum ApiError {
    /// Field-level validation failures
    Validation(Vec<String>),

    /// Malformed or incomplete request
    BadRequest(String),

    /// Memory id is not a valid identifier
    InvalidId,

    /// No memory with that id
    NotFound,

    /// Uploaded file exceeds the configured limit
    PayloadTooLarge,

    /// Uploaded file's MIME type is not whitelisted
    UnsupportedMedia(String),

    /// Storage, media host or other internal failure
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::BadRequest(_)
            | ApiError::InvalidId
            | ApiError::UnsupportedMedia(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Validation(details) => write!(f, "Validation failed: {}", details.join("; ")),
            ApiError::BadRequest(message) => f.write_str(message),
            ApiError::InvalidId => f.write_str("Invalid memory ID"),
            ApiError::NotFound => f.write_str("Memory not found"),
            ApiError::PayloadTooLarge => f.write_str("File size exceeds limit"),
            ApiError::UnsupportedMedia(mime) => write!(
                f,
                "Unsupported file type: {mime}. Allowed: images (jpg, png, webp), videos (mp4, webm), audio (mp3, wav, m4a)"
            ),
            ApiError::Internal(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Validation(details) => {
                json!({ "error": "Validation failed", "details": details })
            }
            ApiError::Internal(err) => {
                tracing::error!(error = ?err, "request failed");
                json!({ "error": err.to_string(), "status": status.as_u16() })
            }
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
