use std::sync::Arc;

use log::info;

use trawler_core::error::{Error, Result};
use trawler_core::spider::Spider;
use trawler_downloader::{Downloader, DownloaderConfig, HttpDownloader};
use trawler_engine::{CrawlStats, EngineConfig, ExecutionEngine};
use trawler_scheduler::{FifoScheduler, Scheduler, SchedulerFactory};
use trawler_scraper::{LogPipeline, Scraper, SpiderScraper};

use crate::config_adapters::{
    downloader_config_from_settings, engine_config_from_settings, scheduler_factory_from_settings,
};
use crate::settings::Settings;

/// One-shot crawl runner.
///
/// Wires an engine around a spider, runs it until the spider finishes, and
/// returns the crawl statistics. The spider is opened with idle close
/// enabled, so an exhausted crawl shuts the engine down on its own.
pub struct Crawler {
    engine_config: EngineConfig,
    downloader: Arc<dyn Downloader>,
    scraper: Arc<dyn Scraper>,
    scheduler_factory: SchedulerFactory,
}

impl Crawler {
    /// Create a crawler with default configuration
    pub fn new() -> Result<Self> {
        Self::with_configs(EngineConfig::default(), DownloaderConfig::default())
    }

    /// Create a crawler with explicit engine and downloader configuration
    pub fn with_configs(
        engine_config: EngineConfig,
        downloader_config: DownloaderConfig,
    ) -> Result<Self> {
        Ok(Self {
            engine_config,
            downloader: Arc::new(HttpDownloader::new(downloader_config)?),
            scraper: Arc::new(SpiderScraper::new(Arc::new(LogPipeline::info()))),
            scheduler_factory: Arc::new(|| Arc::new(FifoScheduler::new()) as Arc<dyn Scheduler>),
        })
    }

    /// Create a crawler configured from a settings object
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut crawler = Self::with_configs(
            engine_config_from_settings(settings),
            downloader_config_from_settings(settings),
        )?;
        crawler.scheduler_factory = scheduler_factory_from_settings(settings)?;
        Ok(crawler)
    }

    /// Replace the downloader
    pub fn with_downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = downloader;
        self
    }

    /// Replace the scraper
    pub fn with_scraper(mut self, scraper: Arc<dyn Scraper>) -> Self {
        self.scraper = scraper;
        self
    }

    /// Replace the scheduler factory
    pub fn with_scheduler_factory(mut self, factory: SchedulerFactory) -> Self {
        self.scheduler_factory = factory;
        self
    }

    /// Run a spider to completion and return its crawl statistics
    pub async fn run(&self, spider: Arc<dyn Spider>) -> Result<CrawlStats> {
        let engine = Arc::new(ExecutionEngine::new(
            self.downloader.clone(),
            self.scraper.clone(),
            self.scheduler_factory.clone(),
            self.engine_config.clone(),
        ));

        // Stop the engine once the spider has fully closed
        let weak = Arc::downgrade(&engine);
        engine.set_spider_finished(Box::new(move |name, reason| {
            info!("Spider {} finished ({})", name, reason);
            if let Some(engine) = weak.upgrade() {
                tokio::spawn(async move {
                    let _ = engine.stop().await;
                });
            }
        }));

        let run = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.start().await })
        };

        engine.open_spider(spider.clone(), true).await?;
        run.await
            .map_err(|e| Error::other(format!("engine task failed: {}", e)))??;

        engine.stats(spider.name()).await.ok_or_else(|| {
            Error::other(format!(
                "no statistics recorded for spider {}",
                spider.name()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trawler_core::spider::BasicSpider;
    use trawler_downloader::MockDownloader;

    fn fast_config() -> EngineConfig {
        EngineConfig {
            heartbeat_interval_ms: 20,
            idle_poll_delay_ms: 20,
            pause_poll_delay_ms: 20,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_run_crawls_to_completion() {
        let downloader = Arc::new(MockDownloader::new());
        let crawler = Crawler::with_configs(fast_config(), DownloaderConfig::default())
            .unwrap()
            .with_downloader(downloader.clone());

        let spider = Arc::new(BasicSpider::new(
            "runner",
            vec![
                "https://example.com/a".to_string(),
                "https://example.com/b".to_string(),
            ],
        ));

        let stats = crawler.run(spider).await.unwrap();

        assert_eq!(stats.response_count, 2);
        assert_eq!(stats.finish_reason.as_deref(), Some("finished"));
        assert_eq!(downloader.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_from_settings() {
        let settings = Settings::from_toml(
            r#"
            scheduler = "priority"
            concurrent_requests = 2
        "#,
        )
        .unwrap();

        assert!(Crawler::from_settings(&settings).is_ok());
    }
}
