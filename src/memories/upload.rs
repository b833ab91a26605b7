//! Multipart form handling for memory create/update requests.

use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use bytes::Bytes;

use super::model::MediaKind;
use crate::error::ApiError;
use crate::storage::media::MediaUpload;

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "video/mp4",
    "video/webm",
    "audio/mpeg",
    "audio/wav",
    "audio/mp4",
];

/// Text fields and optional `media` file of a memory form.
#[derive(Debug, Default)]
pub struct MemoryForm {
    pub title: Option<String>,
    pub message: Option<String>,
    pub date: Option<String>,
    pub created_by: Option<String>,
    pub remove_media: bool,
    pub file: Option<MediaUpload>,
}

impl MemoryForm {
    pub async fn from_multipart(mut multipart: Multipart, max_bytes: usize) -> Result<Self, ApiError> {
        let mut form = MemoryForm::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "media" => {
                    let file_name = field.file_name().unwrap_or("upload").to_string();
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let bytes = field.bytes().await.map_err(multipart_error)?;
                    // Browsers submit an empty part when no file was chosen.
                    if bytes.is_empty() {
                        continue;
                    }
                    form.file = Some(check_upload(file_name, content_type, bytes, max_bytes)?);
                }
                "title" | "message" | "date" | "createdBy" | "removeMedia" => {
                    let text = field.text().await.map_err(multipart_error)?;
                    let text = non_empty(text);
                    match name.as_str() {
                        "title" => form.title = text,
                        "message" => form.message = text,
                        "date" => form.date = text,
                        "createdBy" => form.created_by = text,
                        _ => form.remove_media = text.as_deref() == Some("true"),
                    }
                }
                other => tracing::debug!(field = other, "ignoring unknown form field"),
            }
        }

        Ok(form)
    }

    /// Names of the fields a new memory needs but this form lacks.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.title.is_none() {
            missing.push("title");
        }
        if self.message.is_none() {
            missing.push("message");
        }
        if self.date.is_none() {
            missing.push("date");
        }
        if self.created_by.is_none() {
            missing.push("createdBy");
        }
        missing
    }
}

/// Enforce the MIME whitelist and size limit on an uploaded file.
pub fn check_upload(
    file_name: String,
    content_type: String,
    bytes: Bytes,
    max_bytes: usize,
) -> Result<MediaUpload, ApiError> {
    if !ALLOWED_MIME_TYPES.contains(&content_type.as_str()) {
        return Err(ApiError::UnsupportedMedia(content_type));
    }
    if bytes.len() > max_bytes {
        return Err(ApiError::PayloadTooLarge);
    }
    let kind = MediaKind::from_mime(&content_type)
        .ok_or_else(|| ApiError::UnsupportedMedia(content_type.clone()))?;

    Ok(MediaUpload {
        file_name,
        content_type,
        kind,
        bytes,
    })
}

fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(err.body_text())
    }
}
