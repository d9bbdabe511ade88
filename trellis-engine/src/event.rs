use trellis_core::{ChatMessage, MemberRecord, PeerId, RoomId};

use crate::session::NegotiationState;

/// Events surfaced to the host shell.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    RoomJoined {
        room_id: RoomId,
    },
    RoomLeft {
        room_id: RoomId,
    },
    /// The join was refused before any relay write happened.
    RoomFull {
        room_id: RoomId,
        capacity: usize,
    },
    UserJoined {
        member: MemberRecord,
    },
    UserLeft {
        peer_id: PeerId,
    },
    PeerConnected {
        peer_id: PeerId,
    },
    PeerStateChange {
        peer_id: PeerId,
        state: NegotiationState,
    },
    ChatMessage {
        message: ChatMessage,
        is_self: bool,
    },
    Error {
        kind: &'static str,
        detail: String,
    },
}
