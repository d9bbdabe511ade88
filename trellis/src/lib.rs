pub use trellis_core::{ChatMessage, Identity, PeerId, RoomId};

pub mod model {
    pub use trellis_core::model::*;
}

pub mod engine {
    pub use trellis_engine::*;
}
