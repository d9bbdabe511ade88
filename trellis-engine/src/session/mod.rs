mod session;
mod state;

pub use session::{PeerSession, SessionCommand, SessionEvent, SessionEventKind};
pub use state::{NegotiationState, Role, is_polite};
