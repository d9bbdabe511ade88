//! Peer-mesh negotiation and lifecycle engine.
//!
//! Participants visiting the same logical resource join a room through a
//! shared low-trust relay, negotiate a full mesh of WebRTC data channels
//! among themselves, and exchange ordered, deduplicated chat messages over
//! that mesh. The engine is a set of tokio actors: one [`mesh::Engine`]
//! owning the room and the peer map, and one [`session::PeerSession`] per
//! remote peer owning that peer's negotiation state and signal queue.

mod command;
mod config;
mod error;
mod event;

pub mod mesh;
pub mod relay;
pub mod session;
pub mod transport;

pub use command::{EngineCommand, EngineStatus};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use event::EngineEvent;
pub use mesh::{Engine, EngineHandle};
