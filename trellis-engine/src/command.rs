use tokio::sync::oneshot;
use trellis_core::{Identity, MemberRecord, RoomId};

/// Commands accepted from the host shell.
#[derive(Debug)]
pub enum EngineCommand {
    /// Join a room. If the engine is already a member of a room, that room
    /// is left first; no message is sent under the old membership afterwards.
    JoinRoom { room_id: RoomId, identity: Identity },

    /// Leave the current room. Idempotent; a no-op when not in a room.
    LeaveRoom,

    /// Broadcast a chat message over every open channel.
    SendMessage { text: String },

    /// Snapshot of the engine's authoritative in-memory state.
    GetStatus { reply: oneshot::Sender<EngineStatus> },
}

/// Answer to [`EngineCommand::GetStatus`].
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub room_id: Option<RoomId>,
    pub identity: Option<Identity>,
    /// Current member set as observed through the relay, local participant
    /// included.
    pub members: Vec<MemberRecord>,
    /// True while the engine holds an active room membership.
    pub connected: bool,
}
