//! Signaling wire events.
//!
//! Every frame is a JSON text message `{"event": "<name>", "data": <payload>}`.
//! Negotiation payloads stay as raw [`Value`]s: the relay forwards them
//! without looking inside.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::registry::{ConnectionId, PeerEntry};

/// Client → server events.
///
/// Decoding only looks at what the relay routes on: a missing negotiation
/// payload is forwarded as absent and unused `data` is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    try_from = "RawClientEvent"
)]
pub enum ClientEvent {
    Identify(String),
    NegotiationOffer { to: ConnectionId, offer: Value },
    NegotiationAnswer { to: ConnectionId, answer: Value },
    NegotiationCandidate { to: ConnectionId, candidate: Value },
    CallEnded,
    ListPeers,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identify(_) => "identify",
            Self::NegotiationOffer { .. } => "negotiation-offer",
            Self::NegotiationAnswer { .. } => "negotiation-answer",
            Self::NegotiationCandidate { .. } => "negotiation-candidate",
            Self::CallEnded => "call-ended",
            Self::ListPeers => "list-peers",
        }
    }
}

/// Server → client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// First frame on every socket: tells the client its own connection id.
    #[serde(rename_all = "camelCase")]
    Connected { connection_id: ConnectionId },
    ExistingPeers(Vec<PeerEntry>),
    PeerOnline(PeerEntry),
    NegotiationOffer {
        from: ConnectionId,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        offer: Value,
    },
    NegotiationAnswer {
        from: ConnectionId,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        answer: Value,
    },
    NegotiationCandidate {
        from: ConnectionId,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        candidate: Value,
    },
    /// `from` is left out when the sender never identified.
    #[serde(rename_all = "camelCase")]
    CallEnded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        from_connection_id: ConnectionId,
    },
    PeersList(Vec<PeerEntry>),
    PeerOffline(ConnectionId),
}

#[derive(Deserialize)]
struct RawClientEvent {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct Addressed {
    to: ConnectionId,
    #[serde(default)]
    offer: Value,
    #[serde(default)]
    answer: Value,
    #[serde(default)]
    candidate: Value,
}

impl TryFrom<RawClientEvent> for ClientEvent {
    type Error = serde_json::Error;

    fn try_from(raw: RawClientEvent) -> Result<Self, Self::Error> {
        let addressed = |data| serde_json::from_value::<Addressed>(data);
        Ok(match raw.event.as_str() {
            "identify" => Self::Identify(serde_json::from_value(raw.data)?),
            "negotiation-offer" => {
                let a = addressed(raw.data)?;
                Self::NegotiationOffer { to: a.to, offer: a.offer }
            }
            "negotiation-answer" => {
                let a = addressed(raw.data)?;
                Self::NegotiationAnswer { to: a.to, answer: a.answer }
            }
            "negotiation-candidate" => {
                let a = addressed(raw.data)?;
                Self::NegotiationCandidate {
                    to: a.to,
                    candidate: a.candidate,
                }
            }
            "call-ended" => Self::CallEnded,
            "list-peers" => Self::ListPeers,
            other => {
                return Err(serde::de::Error::custom(format!(
                    "unknown event `{other}`"
                )))
            }
        })
    }
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::ExistingPeers(_) => "existing-peers",
            Self::PeerOnline(_) => "peer-online",
            Self::NegotiationOffer { .. } => "negotiation-offer",
            Self::NegotiationAnswer { .. } => "negotiation-answer",
            Self::NegotiationCandidate { .. } => "negotiation-candidate",
            Self::CallEnded { .. } => "call-ended",
            Self::PeersList(_) => "peers-list",
            Self::PeerOffline(_) => "peer-offline",
        }
    }
}
