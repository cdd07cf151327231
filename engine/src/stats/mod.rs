use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Crawl statistics for one spider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlStats {
    /// Number of requests admitted by the scheduler
    pub request_scheduled_count: usize,

    /// Number of responses received
    pub response_count: usize,

    /// Number of items scraped
    pub item_count: usize,

    /// Number of failed requests
    pub error_count: usize,

    /// When the spider was opened
    #[serde(skip)]
    pub start_time: Option<Instant>,

    /// When the spider was closed
    #[serde(skip)]
    pub end_time: Option<Instant>,

    /// Reason the spider was closed
    pub finish_reason: Option<String>,
}

impl CrawlStats {
    /// Stats for a spider opened now
    pub fn started() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Self::default()
        }
    }

    /// Elapsed crawl time, up to now for a still-open spider
    pub fn duration(&self) -> Option<std::time::Duration> {
        let start = self.start_time?;
        Some(self.end_time.unwrap_or_else(Instant::now) - start)
    }

    /// Responses per second over the crawl so far
    pub fn requests_per_second(&self) -> f64 {
        match self.duration() {
            Some(d) if d.as_secs_f64() > 0.0 => self.response_count as f64 / d.as_secs_f64(),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_stats() {
        let stats = CrawlStats::started();
        assert!(stats.start_time.is_some());
        assert_eq!(stats.response_count, 0);
        assert!(stats.finish_reason.is_none());
    }

    #[test]
    fn test_rate_without_start() {
        let stats = CrawlStats::default();
        assert_eq!(stats.requests_per_second(), 0.0);
    }
}
