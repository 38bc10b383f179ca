use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lock coordinator settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Timeout used when a caller does not give one.
    pub default_timeout_ms: u64,
    /// Capacity of the broadcast channel carrying lock events.
    pub notification_capacity: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 60_000,
            notification_capacity: 1024,
        }
    }
}

impl LockConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}
