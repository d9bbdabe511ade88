use crate::model::peer::PeerId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mesh cost is O(n²), so rooms stay small.
pub const MAX_MEMBERS: usize = 8;

/// Room identifier, derived externally (e.g. from a resource URL).
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RoomId(pub String);

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Presence record stored under the room's member list in the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRecord {
    pub id: PeerId,
    pub nickname: String,
    pub email: Option<String>,
    pub joined_at: u64,
}
