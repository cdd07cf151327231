use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of spiders open at once
    pub max_open_spiders: usize,

    /// Delay before re-checking an idle spider after a close veto, in
    /// milliseconds
    pub idle_poll_delay_ms: u64,

    /// Delay before re-checking a paused engine, in milliseconds
    pub pause_poll_delay_ms: u64,

    /// Interval between slot heartbeat wake-ups, in milliseconds. The
    /// heartbeat recovers pull loops whose backpressure cleared without a
    /// completion event.
    pub heartbeat_interval_ms: u64,

    /// Whether to periodically log crawl statistics
    pub log_stats: bool,

    /// Interval between statistics log lines, in seconds
    pub stats_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_open_spiders: 1,
            idle_poll_delay_ms: 5000,
            pause_poll_delay_ms: 5000,
            heartbeat_interval_ms: 5000,
            log_stats: false,
            stats_interval_secs: 60,
        }
    }
}

impl EngineConfig {
    pub fn idle_poll_delay(&self) -> Duration {
        Duration::from_millis(self.idle_poll_delay_ms)
    }

    pub fn pause_poll_delay(&self) -> Duration {
        Duration::from_millis(self.pause_poll_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_open_spiders, 1);
        assert_eq!(config.idle_poll_delay(), Duration::from_secs(5));
        assert!(!config.log_stats);
    }
}
