use std::sync::Arc;

use trawler_core::async_trait;
use trawler_core::error::Result;
use trawler_core::request::Request;
use trawler_core::spider::Spider;

/// Contract for per-spider request schedulers.
///
/// A request accepted by `enqueue_request` must eventually be returned by
/// `next_request` exactly once, unless the scheduler is closed first. An
/// implementation that fails inside `enqueue_request` or `next_request` is a
/// programming error in that implementation; the engine does not catch it.
#[async_trait]
pub trait Scheduler: Send + Sync + 'static {
    /// Called when the owning spider is opened
    async fn open(&self, spider: &dyn Spider) -> Result<()>;

    /// Called when the owning spider is closed, with the close reason
    async fn close(&self, reason: &str) -> Result<()>;

    /// Add a request. Returns `true` if the request was newly admitted,
    /// `false` if it was rejected as a duplicate.
    async fn enqueue_request(&self, request: Request) -> Result<bool>;

    /// Get the next request according to this scheduler's ordering policy
    async fn next_request(&self) -> Option<Request>;

    /// Whether any accepted requests are still pending
    async fn has_pending_requests(&self) -> bool;

    /// Number of pending requests
    async fn len(&self) -> usize;

    /// Whether the scheduler is empty
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Factory used by the engine to create a fresh scheduler per opened spider
pub type SchedulerFactory = Arc<dyn Fn() -> Arc<dyn Scheduler> + Send + Sync>;
