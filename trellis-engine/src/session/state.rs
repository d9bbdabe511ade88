use trellis_core::PeerId;

/// Signaling lifecycle of one peer session.
///
/// `Idle → Offering → (Stable | Answering) → Connected`, with
/// `Disconnected` feeding the reconnect supervisor and `Failed`/`Closed`
/// terminal. Transport connectivity drives the last three independently of
/// the offer/answer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    Offering,
    Answering,
    Stable,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl NegotiationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NegotiationState::Failed | NegotiationState::Closed)
    }

    /// True while an offer/answer exchange is in flight; link drops during
    /// this window do not trigger the reconnect supervisor.
    pub fn is_negotiating(&self) -> bool {
        matches!(self, NegotiationState::Offering | NegotiationState::Answering)
    }
}

/// Which side of a pair starts negotiation. Fixed at session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    /// The participant with the greater id initiates, so exactly one side
    /// of any pair starts without coordination.
    pub fn of(local: &PeerId, remote: &PeerId) -> Role {
        if local > remote {
            Role::Initiator
        } else {
            Role::Responder
        }
    }
}

/// The polite side concedes during glare. Deliberately the complement of
/// the initiator tie-break, so for any pair exactly one side is polite.
pub fn is_polite(local: &PeerId, remote: &PeerId) -> bool {
    local < remote
}
