//! Connection registry: which transport connection announced which client id.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transport-assigned identifier, unique per live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Allocate a fresh identifier for a newly accepted connection.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One registry row as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerEntry {
    pub connection_id: ConnectionId,
    pub client_id: String,
}

/// Mapping of live connections to the client id they identified with.
///
/// Client ids are not deduplicated: two connections may carry the same one.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: HashMap<ConnectionId, String>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the client id for `connection_id`.
    pub fn register(&mut self, connection_id: ConnectionId, client_id: impl Into<String>) {
        self.entries.insert(connection_id, client_id.into());
    }

    /// Remove the entry, returning the client id it held. Absent ids are a no-op.
    pub fn unregister(&mut self, connection_id: &ConnectionId) -> Option<String> {
        self.entries.remove(connection_id)
    }

    pub fn client_id(&self, connection_id: &ConnectionId) -> Option<&str> {
        self.entries.get(connection_id).map(String::as_str)
    }

    /// Snapshot of every entry except the caller's.
    pub fn list_others(&self, excluding: &ConnectionId) -> Vec<PeerEntry> {
        self.entries
            .iter()
            .filter(|(connection_id, _)| *connection_id != excluding)
            .map(to_entry)
            .collect()
    }

    pub fn list_all(&self) -> Vec<PeerEntry> {
        self.entries.iter().map(to_entry).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn to_entry((connection_id, client_id): (&ConnectionId, &String)) -> PeerEntry {
    PeerEntry {
        connection_id: connection_id.clone(),
        client_id: client_id.clone(),
    }
}
