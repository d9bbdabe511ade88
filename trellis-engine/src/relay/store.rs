use async_trait::async_trait;
use tokio::sync::mpsc;
use trellis_core::{MemberRecord, PeerId, RoomId, SignalRecord};

use crate::error::Result;

/// Change notification from the relay's member list or signal list.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    MemberAdded(MemberRecord),
    MemberRemoved(PeerId),
    SignalAdded { key: String, signal: SignalRecord },
}

/// The shared, low-trust store used to exchange connection-setup metadata.
///
/// Implementations are hierarchical key-value stores: a member list and an
/// append-only signal list per room, with change notifications for both.
/// Signals are consumed at most once by their intended recipient, which
/// deletes them after processing via [`RelayStore::remove_signal`].
#[async_trait]
pub trait RelayStore: Send + Sync {
    /// Point read of the current member count under the room path.
    async fn member_count(&self, room: &RoomId) -> Result<usize>;

    /// Write the local participant's presence record. The relay is expected
    /// to retract the record on its own if the local process disconnects
    /// without calling [`RelayStore::remove_presence`].
    async fn register_presence(&self, room: &RoomId, member: MemberRecord) -> Result<()>;

    async fn remove_presence(&self, room: &RoomId, peer_id: &PeerId) -> Result<()>;

    /// Append a signal under a generated key; returns the key.
    async fn publish_signal(&self, room: &RoomId, signal: SignalRecord) -> Result<String>;

    /// Delete a consumed signal.
    async fn remove_signal(&self, room: &RoomId, key: &str) -> Result<()>;

    /// Start observing the room. Existing members and pending signals are
    /// replayed as `MemberAdded`/`SignalAdded` before live events, so a
    /// late subscriber sees the same sequence as an early one.
    async fn subscribe(&self, room: &RoomId) -> Result<mpsc::UnboundedReceiver<RelayEvent>>;
}
