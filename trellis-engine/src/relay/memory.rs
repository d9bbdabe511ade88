use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use trellis_core::{MemberRecord, PeerId, RoomId, SignalRecord};

use crate::error::Result;
use crate::relay::store::{RelayEvent, RelayStore};

#[derive(Default)]
struct RoomSlot {
    members: Vec<MemberRecord>,
    signals: Vec<(String, SignalRecord)>,
    next_key: u64,
    watchers: Vec<mpsc::UnboundedSender<RelayEvent>>,
}

impl RoomSlot {
    fn notify(&mut self, event: RelayEvent) {
        self.watchers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Process-local [`RelayStore`]. All participants sharing one
/// `InMemoryRelay` instance see each other; used by the demo shell and the
/// test suite. A hosted relay would implement the same trait against its
/// wire protocol.
#[derive(Default)]
pub struct InMemoryRelay {
    rooms: DashMap<RoomId, RoomSlot>,
}

impl InMemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the relay-side "remove-on-disconnect" cleanup: drop the
    /// peer's presence from every room as if its process vanished.
    pub fn disconnect(&self, peer_id: &PeerId) {
        for mut slot in self.rooms.iter_mut() {
            let before = slot.members.len();
            slot.members.retain(|m| &m.id != peer_id);
            if slot.members.len() != before {
                debug!(peer = %peer_id, "relay: presence retracted on disconnect");
                slot.notify(RelayEvent::MemberRemoved(peer_id.clone()));
            }
        }
    }

    /// Test hook: how many undeleted signals a room currently holds.
    pub fn pending_signals(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map_or(0, |slot| slot.signals.len())
    }
}

#[async_trait]
impl RelayStore for InMemoryRelay {
    async fn member_count(&self, room: &RoomId) -> Result<usize> {
        Ok(self.rooms.get(room).map_or(0, |slot| slot.members.len()))
    }

    async fn register_presence(&self, room: &RoomId, member: MemberRecord) -> Result<()> {
        let mut slot = self.rooms.entry(room.clone()).or_default();
        slot.members.retain(|m| m.id != member.id);
        slot.members.push(member.clone());
        slot.notify(RelayEvent::MemberAdded(member));
        Ok(())
    }

    async fn remove_presence(&self, room: &RoomId, peer_id: &PeerId) -> Result<()> {
        let Some(mut slot) = self.rooms.get_mut(room) else {
            return Ok(());
        };
        let before = slot.members.len();
        slot.members.retain(|m| &m.id != peer_id);
        if slot.members.len() != before {
            slot.notify(RelayEvent::MemberRemoved(peer_id.clone()));
        }
        Ok(())
    }

    async fn publish_signal(&self, room: &RoomId, signal: SignalRecord) -> Result<String> {
        let mut slot = self.rooms.entry(room.clone()).or_default();
        let key = format!("sig-{:08}", slot.next_key);
        slot.next_key += 1;
        slot.signals.push((key.clone(), signal.clone()));
        slot.notify(RelayEvent::SignalAdded {
            key: key.clone(),
            signal,
        });
        Ok(key)
    }

    async fn remove_signal(&self, room: &RoomId, key: &str) -> Result<()> {
        if let Some(mut slot) = self.rooms.get_mut(room) {
            slot.signals.retain(|(k, _)| k != key);
        }
        Ok(())
    }

    async fn subscribe(&self, room: &RoomId) -> Result<mpsc::UnboundedReceiver<RelayEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slot = self.rooms.entry(room.clone()).or_default();
        for member in &slot.members {
            let _ = tx.send(RelayEvent::MemberAdded(member.clone()));
        }
        for (key, signal) in &slot.signals {
            let _ = tx.send(RelayEvent::SignalAdded {
                key: key.clone(),
                signal: signal.clone(),
            });
        }
        slot.watchers.push(tx);
        Ok(rx)
    }
}
