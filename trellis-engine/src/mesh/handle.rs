use tokio::sync::{mpsc, oneshot};
use trellis_core::{Identity, RoomId};

use crate::command::{EngineCommand, EngineStatus};

/// Cheap, cloneable command side of a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub(crate) fn new(cmd_tx: mpsc::Sender<EngineCommand>) -> Self {
        Self { cmd_tx }
    }

    pub async fn join_room(&self, room_id: RoomId, identity: Identity) {
        let _ = self
            .cmd_tx
            .send(EngineCommand::JoinRoom { room_id, identity })
            .await;
    }

    pub async fn leave_room(&self) {
        let _ = self.cmd_tx.send(EngineCommand::LeaveRoom).await;
    }

    pub async fn send_message(&self, text: impl Into<String>) {
        let _ = self
            .cmd_tx
            .send(EngineCommand::SendMessage { text: text.into() })
            .await;
    }

    /// Live snapshot of the engine's state; `None` if the engine is gone.
    pub async fn status(&self) -> Option<EngineStatus> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(EngineCommand::GetStatus { reply })
            .await
            .ok()?;
        rx.await.ok()
    }
}
