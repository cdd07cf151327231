use dashmap::DashSet;
use log::debug;
use priority_queue::PriorityQueue;
use tokio::sync::Mutex;

use trawler_core::async_trait;
use trawler_core::error::Result;
use trawler_core::request::Request;
use trawler_core::spider::Spider;

use crate::scheduler_trait::Scheduler;

/// A scheduler that dequeues the highest-priority pending request first,
/// deduplicating by fingerprint. Ties are broken arbitrarily.
pub struct PriorityScheduler {
    /// Queue of pending requests, ordered by request priority
    queue: Mutex<PriorityQueue<Request, i32>>,

    /// Fingerprints of requests seen so far
    seen: DashSet<String>,
}

impl PriorityScheduler {
    /// Create a new priority scheduler
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(PriorityQueue::new()),
            seen: DashSet::new(),
        }
    }
}

impl Default for PriorityScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scheduler for PriorityScheduler {
    async fn open(&self, spider: &dyn Spider) -> Result<()> {
        debug!("Priority scheduler opened for spider {}", spider.name());
        Ok(())
    }

    async fn close(&self, reason: &str) -> Result<()> {
        let mut queue = self.queue.lock().await;
        debug!(
            "Priority scheduler closed ({}) with {} pending requests",
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

        let priority = request.priority;
        let mut queue = self.queue.lock().await;
        queue.push(request, priority);
        Ok(true)
    }

    async fn next_request(&self) -> Option<Request> {
        let mut queue = self.queue.lock().await;
        queue.pop().map(|(request, _)| request)
    }

    async fn has_pending_requests(&self) -> bool {
        !self.queue.lock().await.is_empty()
    }

    async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }
}
