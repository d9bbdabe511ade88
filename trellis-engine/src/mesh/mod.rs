mod engine;
mod handle;

pub use engine::Engine;
pub use handle::EngineHandle;
