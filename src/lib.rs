//! # Memory Lane
//!
//! Backend for a shared memory journal with an attached video-call feature.
//!
//! - **Memories**: CRUD over journal entries with optional image, video or
//!   audio attachments kept on a media host (Cloudinary or local disk)
//! - **Signaling relay**: a WebSocket broker that tracks who is online and
//!   forwards WebRTC offers, answers and ICE candidates between two clients
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use memory_lane::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     memory_lane::server::start(config).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod memories;
pub mod relay;
pub mod server;
pub mod storage;
pub mod telemetry;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use relay::{ClientEvent, ConnectionId, PeerEntry, RelayHandle, ServerEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
