pub mod db;
pub mod media;

use anyhow::Result;
use std::sync::Arc;

pub use db::Database;
pub use media::{CloudinaryHost, LocalMediaHost, MediaHost, MediaUpload};

use crate::config::{MediaConfig, StorageConfig};

/// URL prefix under which the local media host's files are served.
pub const LOCAL_MEDIA_ROUTE: &str = "/media";

/// Open the memory database, creating the schema on first use.
pub fn open_database(config: &StorageConfig) -> Result<Arc<Database>> {
    let db = Database::open(&config.database_path())?;
    db.initialize()?;
    Ok(Arc::new(db))
}

/// Cloudinary when credentials are configured, local disk otherwise.
pub fn media_host(media: &MediaConfig, storage: &StorageConfig) -> Result<Arc<dyn MediaHost>> {
    match &media.cloudinary {
        Some(cloudinary) => {
            tracing::info!(cloud = %cloudinary.cloud_name, "using Cloudinary media host");
            Ok(Arc::new(CloudinaryHost::new(cloudinary.clone())?))
        }
        None => {
            let dir = storage.media_dir();
            tracing::info!(dir = %dir.display(), "using local media host");
            Ok(Arc::new(LocalMediaHost::new(dir, LOCAL_MEDIA_ROUTE)))
        }
    }
}
