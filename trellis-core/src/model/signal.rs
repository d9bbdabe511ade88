use crate::model::peer::PeerId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

/// One unit of connection-setup metadata exchanged through the relay.
/// Lives only in the relay; the intended recipient consumes it at most once
/// and deletes it after processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub from: PeerId,
    pub to: PeerId,
    pub kind: SignalKind,
    pub payload: String,
    pub timestamp: u64,
}

impl SignalRecord {
    pub fn new(from: PeerId, to: PeerId, kind: SignalKind, payload: String) -> Self {
        Self {
            from,
            to,
            kind,
            payload,
            timestamp: crate::model::now_millis(),
        }
    }
}
