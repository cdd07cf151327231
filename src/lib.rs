//! # Trawler
//!
//! Trawler is a cooperative web crawler built around a pull-based
//! execution engine. Each open spider gets a slot with its own scheduler
//! and pull loop; a shared downloader and scraper apply backpressure, and
//! idle spiders close themselves unless a listener vetoes it.
//!
//! ## Components
//!
//! - **Core**: requests, responses, spiders, errors, and the signal bus.
//! - **Scheduler**: pluggable pending-request queues with deduplication.
//! - **Downloader**: HTTP fetching with a concurrency budget.
//! - **Scraper**: spider-callback execution and item pipelines.
//! - **Engine**: the execution engine tying the above together.
//!
//! ## Example
//!
//! ```rust,no_run
//! use trawler::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     env_logger::init();
//!
//!     let spider = Arc::new(BasicSpider::new(
//!         "example",
//!         vec!["https://example.com".to_string()],
//!     ));
//!
//!     let crawler = Crawler::new()?;
//!     let stats = crawler.run(spider).await?;
//!
//!     println!("Crawl finished: {} responses, {} items", stats.response_count, stats.item_count);
//!     Ok(())
//! }
//! ```

pub use trawler_core as core;
pub use trawler_downloader as downloader;
pub use trawler_engine as engine;
pub use trawler_scheduler as scheduler;
pub use trawler_scraper as scraper;

pub mod config_adapters;
pub mod crawler;
pub mod settings;

pub use crawler::Crawler;

/// Prelude module that re-exports commonly used types
pub mod prelude {
    pub use trawler_core::error::{Error, Result};
    pub use trawler_core::request::{Method, Request};
    pub use trawler_core::response::Response;
    pub use trawler_core::signal::{Signal, SignalArgs, SignalManager};
    pub use trawler_core::spider::{BasicSpider, ParseOutput, Spider, StartRequests};
    pub use trawler_downloader::{
        DownloadOutcome, Downloader, DownloaderConfig, HttpDownloader, MockDownloader,
    };
    pub use trawler_engine::{CrawlStats, EngineConfig, EngineState, ExecutionEngine};
    pub use trawler_scheduler::{FifoScheduler, PriorityScheduler, Scheduler, SchedulerFactory};
    pub use trawler_scraper::{
        DummyPipeline, LogPipeline, Pipeline, ScrapeInput, ScrapeOutput, Scraper, SpiderScraper,
    };

    pub use crate::crawler::Crawler;
    pub use crate::settings::{Settings, SettingsError, SettingsFormat};
}
