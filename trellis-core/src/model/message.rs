use crate::model::identity::Identity;
use crate::model::peer::PeerId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat message as it travels over the data channels. Immutable once
/// created; `id` is the deduplication key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub from: PeerId,
    pub nickname: String,
    pub text: String,
    pub timestamp: u64,
}

impl ChatMessage {
    pub fn new(sender: &Identity, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: sender.id.clone(),
            nickname: sender.nickname.clone(),
            text: text.into(),
            timestamp: crate::model::now_millis(),
        }
    }
}
