//! Media host backends
//!
//! Attachments live outside the database. [`CloudinaryHost`] pushes them to
//! Cloudinary with signed API calls; [`LocalMediaHost`] keeps them on disk
//! and the server exposes them under `/media`.
use anyhow::{Context, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use reqwest::{multipart, Client};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::CloudinaryConfig;
use crate::memories::{Media, MediaKind};

/// A validated file from an upload form.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: String,
    pub content_type: String,
    pub kind: MediaKind,
    pub bytes: Bytes,
}

impl MediaUpload {
    /// File name without extension, reduced to URL-safe characters.
    pub fn stem(&self) -> String {
        let stem = Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("upload");
        let cleaned: String = stem
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        if cleaned.is_empty() {
            "upload".to_string()
        } else {
            cleaned
        }
    }

    pub fn extension(&self) -> &str {
        Path::new(&self.file_name)
            .extension()
            .and_then(|s| s.to_str())
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| extension_for(&self.content_type))
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "audio/mpeg" => "mp3",
        "audio/wav" => "wav",
        "audio/mp4" => "m4a",
        _ => "bin",
    }
}

pub trait MediaHost: Send + Sync {
    fn upload<'a>(&'a self, upload: &'a MediaUpload) -> BoxFuture<'a, Result<Media>>;

    fn destroy<'a>(&'a self, media: &'a Media) -> BoxFuture<'a, Result<()>>;
}

/// Cloudinary client
pub struct CloudinaryHost {
    config: CloudinaryConfig,
    client: Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

impl CloudinaryHost {
    pub fn new(config: CloudinaryConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            config,
            client,
            api_base: "https://api.cloudinary.com/v1_1".to_string(),
        })
    }

    fn endpoint(&self, resource_type: &str, action: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.api_base, self.config.cloud_name, resource_type, action
        )
    }

    async fn upload_inner(&self, upload: &MediaUpload) -> Result<Media> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let public_id = format!(
            "memories/{}-{}",
            chrono::Utc::now().timestamp_millis(),
            upload.stem()
        );
        let signature = sign_params(
            &[
                ("folder", self.config.folder.as_str()),
                ("public_id", public_id.as_str()),
                ("timestamp", timestamp.as_str()),
            ],
            &self.config.api_secret,
        );

        let file = multipart::Part::bytes(upload.bytes.to_vec())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.content_type)?;
        let form = multipart::Form::new()
            .part("file", file)
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", self.config.folder.clone())
            .text("public_id", public_id)
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self
            .client
            .post(self.endpoint("auto", "upload"))
            .multipart(form)
            .send()
            .await
            .context("Cloudinary upload request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Cloudinary upload failed: {} - {}", status, body);
        }

        let body: UploadResponse = response.json().await?;
        tracing::info!(public_id = %body.public_id, kind = %upload.kind, "uploaded media to Cloudinary");

        Ok(Media {
            kind: upload.kind,
            url: body.secure_url,
            public_id: body.public_id,
        })
    }

    async fn destroy_inner(&self, media: &Media) -> Result<()> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[
                ("public_id", media.public_id.as_str()),
                ("timestamp", timestamp.as_str()),
            ],
            &self.config.api_secret,
        );

        let form = [
            ("public_id", media.public_id.clone()),
            ("timestamp", timestamp),
            ("api_key", self.config.api_key.clone()),
            ("signature", signature),
            ("signature_algorithm", "sha256".to_string()),
        ];

        let response = self
            .client
            .post(self.endpoint(resource_type(media.kind), "destroy"))
            .form(&form)
            .send()
            .await
            .context("Cloudinary destroy request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Cloudinary deletion failed: {} - {}", status, body);
        }

        let body: DestroyResponse = response.json().await?;
        if body.result != "ok" && body.result != "not found" {
            anyhow::bail!("Cloudinary deletion failed: {}", body.result);
        }
        tracing::info!(public_id = %media.public_id, result = %body.result, "destroyed Cloudinary media");

        Ok(())
    }
}

impl MediaHost for CloudinaryHost {
    fn upload<'a>(&'a self, upload: &'a MediaUpload) -> BoxFuture<'a, Result<Media>> {
        Box::pin(self.upload_inner(upload))
    }

    fn destroy<'a>(&'a self, media: &'a Media) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.destroy_inner(media))
    }
}

/// Cloudinary files audio under the `video` resource type.
fn resource_type(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "image",
        MediaKind::Video | MediaKind::Audio => "video",
    }
}

/// Cloudinary request signature: params sorted by key, joined as a query
/// string, secret appended, SHA-256 hex.
pub fn sign_params(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Stores attachments as files under one directory.
pub struct LocalMediaHost {
    root: PathBuf,
    base_url: String,
}

impl LocalMediaHost {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, public_id: &str) -> Result<PathBuf> {
        if public_id.is_empty()
            || public_id.contains(['/', '\\'])
            || public_id.starts_with('.')
        {
            anyhow::bail!("invalid media id: {public_id}");
        }
        Ok(self.root.join(public_id))
    }

    async fn upload_inner(&self, upload: &MediaUpload) -> Result<Media> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create {}", self.root.display()))?;

        let public_id = format!(
            "{}-{}-{}.{}",
            chrono::Utc::now().timestamp_millis(),
            &uuid::Uuid::new_v4().simple().to_string()[..8],
            upload.stem(),
            upload.extension()
        );
        let path = self.path_for(&public_id)?;
        tokio::fs::write(&path, &upload.bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(%public_id, kind = %upload.kind, bytes = upload.bytes.len(), "stored media locally");

        Ok(Media {
            kind: upload.kind,
            url: format!("{}/{}", self.base_url.trim_end_matches('/'), public_id),
            public_id,
        })
    }

    async fn destroy_inner(&self, media: &Media) -> Result<()> {
        let path = self.path_for(&media.public_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(public_id = %media.public_id, "media file already gone");
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
        }
    }
}

impl MediaHost for LocalMediaHost {
    fn upload<'a>(&'a self, upload: &'a MediaUpload) -> BoxFuture<'a, Result<Media>> {
        Box::pin(self.upload_inner(upload))
    }

    fn destroy<'a>(&'a self, media: &'a Media) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.destroy_inner(media))
    }
}
