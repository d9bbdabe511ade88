use std::time::{SystemTime, UNIX_EPOCH};

/// Unix time in milliseconds. Used for record timestamps only, never for
/// ordering decisions.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
