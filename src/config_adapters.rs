//! Adapters that turn loose [`Settings`](crate::settings::Settings)
//! key-value pairs into the typed configuration structs of the component
//! crates.

use std::sync::Arc;

use trawler_core::error::{Error, Result};
use trawler_downloader::DownloaderConfig;
use trawler_engine::EngineConfig;
use trawler_scheduler::{FifoScheduler, PriorityScheduler, Scheduler, SchedulerFactory};

use crate::settings::Settings;

/// Build an engine configuration from settings, falling back to defaults
/// for missing keys
pub fn engine_config_from_settings(settings: &Settings) -> EngineConfig {
    let defaults = EngineConfig::default();
    EngineConfig {
        max_open_spiders: settings.get_or("max_open_spiders", defaults.max_open_spiders),
        idle_poll_delay_ms: settings.get_or("idle_poll_delay_ms", defaults.idle_poll_delay_ms),
        pause_poll_delay_ms: settings.get_or("pause_poll_delay_ms", defaults.pause_poll_delay_ms),
        heartbeat_interval_ms: settings
            .get_or("heartbeat_interval_ms", defaults.heartbeat_interval_ms),
        log_stats: settings.get_or("log_stats", defaults.log_stats),
        stats_interval_secs: settings.get_or("stats_interval_secs", defaults.stats_interval_secs),
    }
}

/// Build a downloader configuration from settings
pub fn downloader_config_from_settings(settings: &Settings) -> DownloaderConfig {
    let defaults = DownloaderConfig::default();
    DownloaderConfig {
        concurrent_requests: settings.get_or("concurrent_requests", defaults.concurrent_requests),
        user_agent: settings.get_or("user_agent", defaults.user_agent),
        timeout: settings.get_or("request_timeout", defaults.timeout),
    }
}

/// Build a scheduler factory from the "scheduler" setting ("fifo" or
/// "priority")
pub fn scheduler_factory_from_settings(settings: &Settings) -> Result<SchedulerFactory> {
    let kind: String = settings.get_or("scheduler", "fifo".to_string());
    match kind.as_str() {
        "fifo" => Ok(Arc::new(|| Arc::new(FifoScheduler::new()) as Arc<dyn Scheduler>)),
        "priority" => Ok(Arc::new(|| {
            Arc::new(PriorityScheduler::new()) as Arc<dyn Scheduler>
        })),
        other => Err(Error::other(format!("unknown scheduler type: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_from_settings() {
        let settings = Settings::from_toml(
            r#"
            max_open_spiders = 3
            log_stats = true
        "#,
        )
        .unwrap();

        let config = engine_config_from_settings(&settings);
        assert_eq!(config.max_open_spiders, 3);
        assert!(config.log_stats);
        assert_eq!(
            config.idle_poll_delay_ms,
            EngineConfig::default().idle_poll_delay_ms
        );
    }

    #[test]
    fn test_downloader_config_from_settings() {
        let settings = Settings::from_toml(
            r#"
            concurrent_requests = 4
            user_agent = "trawler-test/1.0"
        "#,
        )
        .unwrap();

        let config = downloader_config_from_settings(&settings);
        assert_eq!(config.concurrent_requests, 4);
        assert_eq!(config.user_agent, "trawler-test/1.0");
        assert_eq!(config.timeout, DownloaderConfig::default().timeout);
    }

    #[test]
    fn test_unknown_scheduler_rejected() {
        let settings = Settings::from_toml(r#"scheduler = "random""#).unwrap();
        assert!(scheduler_factory_from_settings(&settings).is_err());
    }
}
