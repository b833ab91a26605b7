//! Server configuration.
//!
//! Layers, lowest to highest precedence: built-in defaults, an optional TOML
//! file, then environment variables (a `.env` file is honoured).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub media: MediaConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Origin allowed by CORS
    pub frontend_url: String,

    /// Serve the built frontend and fall back to `index.html`
    pub production: bool,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            frontend_url: "http://localhost:5173".to_string(),
            production: false,
            static_dir: PathBuf::from("../frontend/dist"),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Holds `memories.db` and, for the local media host, `media/`
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("memories.db")
    }

    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub max_upload_bytes: usize,

    /// Remote media host; files stay on local disk when unset
    pub cloudinary: Option<CloudinaryConfig>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 20 * 1024 * 1024,
            cloudinary: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    #[serde(default = "default_folder")]
    pub folder: String,
}

const REDACTED: &str = "********";

fn default_folder() -> String {
    "romantic-timeline/memories".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info,memory_lane=debug`
    pub filter: String,

    /// Also write daily-rolled log files here
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            directory: None,
        }
    }
}

impl Config {
    /// Defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Copy safe to print: credentials are masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if let Some(cloudinary) = config.media.cloudinary.as_mut() {
            cloudinary.api_secret = REDACTED.to_string();
        }
        config
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Override fields from variables returned by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("PORT is not a valid port: {port}"))?;
        }
        if let Some(url) = lookup("FRONTEND_URL") {
            self.server.frontend_url = url;
        }
        if let Some(env) = lookup("APP_ENV").or_else(|| lookup("NODE_ENV")) {
            self.server.production = env.eq_ignore_ascii_case("production");
        }
        if let Some(dir) = lookup("STATIC_DIR") {
            self.server.static_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(filter) = lookup("LOG_FILTER").or_else(|| lookup("RUST_LOG")) {
            self.logging.filter = filter;
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.logging.directory = Some(PathBuf::from(dir));
        }

        if let (Some(cloud_name), Some(api_key), Some(api_secret)) = (
            lookup("CLOUDINARY_CLOUD_NAME"),
            lookup("CLOUDINARY_API_KEY"),
            lookup("CLOUDINARY_API_SECRET"),
        ) {
            self.media.cloudinary = Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
                folder: lookup("CLOUDINARY_FOLDER").unwrap_or_else(default_folder),
            });
        }

        Ok(())
    }
}
