mod memory;
mod store;

pub use memory::InMemoryRelay;
pub use store::{RelayEvent, RelayStore};
