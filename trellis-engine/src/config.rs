use std::time::Duration;

use trellis_core::MAX_MEMBERS;

/// Tunables for the engine. `Default` carries the values the protocol was
/// designed around; tests shrink the delays.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Room capacity. Joins beyond this fail with `RoomFull`.
    pub max_members: usize,
    /// Reconnect attempts per peer before the session is marked `Failed`.
    pub max_retries: u32,
    /// First reconnect delay; doubles on every consecutive failure.
    pub base_delay: Duration,
    /// Ceiling for the backoff schedule.
    pub max_delay: Duration,
    /// STUN/TURN urls handed to the transport.
    pub ice_servers: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_members: MAX_MEMBERS,
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            ice_servers: vec!["stun:stun.l.google.com:19302".to_owned()],
        }
    }
}

impl EngineConfig {
    /// Delay before the `retry_count`-th reconnect attempt:
    /// `min(base * 2^retry_count, max)`.
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}
