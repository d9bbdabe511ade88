mod identity;
mod message;
mod peer;
mod room;
mod signal;
mod time;

pub use identity::Identity;
pub use message::ChatMessage;
pub use peer::PeerId;
pub use room::{MAX_MEMBERS, MemberRecord, RoomId};
pub use signal::{SignalKind, SignalRecord};
pub use time::now_millis;
