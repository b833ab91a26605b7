//! Signaling relay for peer-to-peer calls: tracks who is online and forwards
//! offers, answers and candidates between two connections by connection id.

pub mod hub;
pub mod protocol;
pub mod registry;

pub use hub::{spawn, Relay, RelayHandle};
pub use protocol::{ClientEvent, ServerEvent};
pub use registry::{ConnectionId, ConnectionRegistry, PeerEntry};
