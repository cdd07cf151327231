use log::{debug, info, log, Level};
use serde_json::Value;

use trawler_core::async_trait;
use trawler_core::error::Result;
use trawler_core::spider::Spider;

/// Contract for item pipelines: items extracted by spider callbacks pass
/// through here before they count as processed.
#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    /// Called when a spider is opened
    async fn open_spider(&self, spider: &dyn Spider) -> Result<()> {
        debug!("Pipeline opened for spider {}", spider.name());
        Ok(())
    }

    /// Called when a spider is closed
    async fn close_spider(&self, spider: &dyn Spider) -> Result<()> {
        debug!("Pipeline closed for spider {}", spider.name());
        Ok(())
    }

    /// Process one item, returning the (possibly transformed) item
    async fn process_item(&self, item: Value, spider: &dyn Spider) -> Result<Value>;
}

/// Pipeline that logs each item at a configurable level
pub struct LogPipeline {
    level: Level,
}

impl LogPipeline {
    /// Log items at info level
    pub fn info() -> Self {
        Self { level: Level::Info }
    }

    /// Log items at debug level
    pub fn debug() -> Self {
        Self {
            level: Level::Debug,
        }
    }
}

#[async_trait]
impl Pipeline for LogPipeline {
    async fn open_spider(&self, spider: &dyn Spider) -> Result<()> {
        info!("Log pipeline opened for spider {}", spider.name());
        Ok(())
    }

    async fn process_item(&self, item: Value, spider: &dyn Spider) -> Result<Value> {
        log!(self.level, "Scraped from {}: {}", spider.name(), item);
        Ok(item)
    }
}

/// Pipeline that passes items through untouched
pub struct DummyPipeline;

impl DummyPipeline {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DummyPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pipeline for DummyPipeline {
    async fn process_item(&self, item: Value, _spider: &dyn Spider) -> Result<Value> {
        Ok(item)
    }
}
