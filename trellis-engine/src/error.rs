use thiserror::Error;

/// Failure taxonomy of the engine. Nothing here is process-fatal: every
/// variant degrades to a dropped operation, a retry, or a user-visible
/// event. A capacity refusal is normal control flow, not an error; it
/// surfaces as `EngineEvent::RoomFull`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Transient I/O against the relay. The operation is aborted; the
    /// caller may retry the join.
    #[error("relay error: {0}")]
    Relay(String),

    /// Invalid negotiation transition, e.g. an answer with no outstanding
    /// offer. Dropped locally; negotiation continues.
    #[error("negotiation error: {0}")]
    Negotiation(String),

    /// Transport-level connection failure. Drives the reconnect supervisor.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Undecodable channel payload. The message is dropped; the channel
    /// stays open.
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

impl EngineError {
    /// Stable tag carried on `EngineEvent::Error`.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Relay(_) => "relay",
            EngineError::Negotiation(_) => "negotiation",
            EngineError::Transport(_) => "transport",
            EngineError::MalformedMessage(_) => "malformed-message",
        }
    }
}

impl From<webrtc::Error> for EngineError {
    fn from(e: webrtc::Error) -> Self {
        EngineError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
