use crate::model::peer::PeerId;
use serde::{Deserialize, Serialize};

/// Who the local participant is. Created once and persisted externally;
/// the engine treats it as immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: PeerId,
    pub nickname: String,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<PeerId>, nickname: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nickname: nickname.into(),
            email: None,
        }
    }
}
