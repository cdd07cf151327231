use std::collections::VecDeque;

use dashmap::DashSet;
use log::debug;
use tokio::sync::Mutex;

use trawler_core::async_trait;
use trawler_core::error::Result;
use trawler_core::request::Request;
use trawler_core::spider::Spider;

use crate::scheduler_trait::Scheduler;

/// A scheduler that dequeues requests in the order they were accepted,
/// deduplicating by fingerprint.
pub struct FifoScheduler {
    /// Queue of pending requests
    queue: Mutex<VecDeque<Request>>,

    /// Fingerprints of requests seen so far
    seen: DashSet<String>,
}

impl FifoScheduler {
    /// Create a new FIFO scheduler
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            seen: DashSet::new(),
        }
    }
}

impl Default for FifoScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scheduler for FifoScheduler {
    async fn open(&self, spider: &dyn Spider) -> Result<()> {
        debug!("FIFO scheduler opened for spider {}", spider.name());
        Ok(())
    }

    async fn close(&self, reason: &str) -> Result<()> {
        let mut queue = self.queue.lock().await;
        debug!(
            "FIFO scheduler closed ({}) with {} pending requests",
            reason,
            queue.len()
        );
        queue.clear();
        self.seen.clear();
        Ok(())
    }

    async fn enqueue_request(&self, request: Request) -> Result<bool> {
        let fingerprint = request.fingerprint();

        if !request.dont_filter && !self.seen.insert(fingerprint.clone()) {
            debug!("Dropped duplicate request {}", request.url);
            return Ok(false);
        }

        let mut queue = self.queue.lock().await;
        queue.push_back(request);
        Ok(true)
    }

    async fn next_request(&self) -> Option<Request> {
        let mut queue = self.queue.lock().await;
        queue.pop_front()
    }

    async fn has_pending_requests(&self) -> bool {
        !self.queue.lock().await.is_empty()
    }

    async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }
}
