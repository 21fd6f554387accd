//! Synchronization core configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_DEBOUNCE_MS: u64 = 1000;
const DEFAULT_NOTICE_CAPACITY: usize = 256;
const DEFAULT_STORE_EVENT_CAPACITY: usize = 256;

/// Tunables for a board session (`[sync]` section of the host config).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Idle window for the coalescing scheduler: rapid successive edits to
    /// the same task within this window persist as a single call.
    pub debounce_ms: u64,
    /// Buffer size of the user-facing notice channel.
    pub notice_capacity: usize,
    /// Buffer size of the snapshot store's invalidation channel.
    pub store_event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            notice_capacity: DEFAULT_NOTICE_CAPACITY,
            store_event_capacity: DEFAULT_STORE_EVENT_CAPACITY,
        }
    }
}

impl SyncConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.debounce_ms, 1000);
        assert_eq!(cfg.debounce_window(), Duration::from_millis(1000));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: SyncConfig = serde_json::from_str(r#"{"debounce_ms": 250}"#).unwrap();
        assert_eq!(cfg.debounce_ms, 250);
        assert_eq!(cfg.notice_capacity, 256);
    }
}
