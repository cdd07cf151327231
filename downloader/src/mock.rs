use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use trawler_core::async_trait;
use trawler_core::error::{Error, Result};
use trawler_core::request::Request;
use trawler_core::response::Response;
use trawler_core::spider::Spider;

use crate::{DownloadOutcome, Downloader};

/// Canned outcome for a URL
#[derive(Debug, Clone)]
enum Canned {
    Success(u16, Vec<u8>),
    Redirect(String),
    Failure(String),
}

/// A mock downloader for testing the engine without network I/O.
///
/// Resolves every request immediately (or after a configured latency) to a
/// canned outcome, tracks the dispatch order, and exposes a toggleable
/// backout flag so tests can simulate a saturated downloader.
pub struct MockDownloader {
    canned: Mutex<HashMap<String, Canned>>,
    fetched: Arc<Mutex<Vec<String>>>,
    active: Arc<AtomicUsize>,
    backout: Arc<AtomicBool>,
    /// When set, each fetch raises the backout flag as it is dispatched
    backout_on_fetch: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MockDownloader {
    /// Create a new mock downloader
    pub fn new() -> Self {
        Self {
            canned: Mutex::new(HashMap::new()),
            fetched: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
            backout: Arc::new(AtomicBool::new(false)),
            backout_on_fetch: AtomicBool::new(false),
            latency: Mutex::new(None),
        }
    }

    /// Add a canned success response for a specific URL
    pub fn add_response(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.canned
            .lock()
            .unwrap()
            .insert(url.to_string(), Canned::Success(status, body.into()));
    }

    /// Make a specific URL redirect to another
    pub fn add_redirect(&self, url: &str, target: &str) {
        self.canned
            .lock()
            .unwrap()
            .insert(url.to_string(), Canned::Redirect(target.to_string()));
    }

    /// Make a specific URL fail
    pub fn add_failure(&self, url: &str, message: &str) {
        self.canned
            .lock()
            .unwrap()
            .insert(url.to_string(), Canned::Failure(message.to_string()));
    }

    /// Toggle the backout flag
    pub fn set_backout(&self, value: bool) {
        self.backout.store(value, Ordering::SeqCst);
    }

    /// Raise the backout flag synchronously on every dispatch, so the
    /// engine's very next backpressure check observes it
    pub fn backout_on_every_fetch(&self, value: bool) {
        self.backout_on_fetch.store(value, Ordering::SeqCst);
    }

    /// Delay each resolution by the given duration
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    /// URLs fetched so far, in dispatch order
    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    /// Number of fetches dispatched so far
    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }
}

impl Default for MockDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    fn fetch(
        &self,
        request: Request,
        _spider: Arc<dyn Spider>,
    ) -> BoxFuture<'static, DownloadOutcome> {
        let url = request.url.to_string();
        self.fetched.lock().unwrap().push(url.clone());
        if self.backout_on_fetch.load(Ordering::SeqCst) {
            self.backout.store(true, Ordering::SeqCst);
        }
        self.active.fetch_add(1, Ordering::SeqCst);

        let canned = self.canned.lock().unwrap().get(&url).cloned();
        let latency = *self.latency.lock().unwrap();
        let active = self.active.clone();

        async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }

            let outcome = match canned {
                Some(Canned::Success(status, body)) => {
                    DownloadOutcome::Response(Box::new(Response::new(
                        request,
                        status,
                        HashMap::new(),
                        body,
                    )))
                }
                Some(Canned::Redirect(target)) => match Request::get(&target) {
                    Ok(redirected) => DownloadOutcome::Redirect(Box::new(redirected)),
                    Err(e) => DownloadOutcome::Failure(e),
                },
                Some(Canned::Failure(message)) => {
                    DownloadOutcome::Failure(Error::download(message))
                }
                None => {
                    let body = format!(
                        "<html><body><h1>Mock response for {}</h1></body></html>",
                        url
                    )
                    .into_bytes();
                    DownloadOutcome::Response(Box::new(Response::new(
                        request,
                        200,
                        HashMap::new(),
                        body,
                    )))
                }
            };

            active.fetch_sub(1, Ordering::SeqCst);
            outcome
        }
        .boxed()
    }

    fn needs_backout(&self) -> bool {
        self.backout.load(Ordering::SeqCst)
    }

    fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    async fn close_spider(&self, _spider: &dyn Spider) -> Result<()> {
        Ok(())
    }
}

/// A mock downloader that always fails
pub struct FailingDownloader;

#[async_trait]
impl Downloader for FailingDownloader {
    fn fetch(
        &self,
        _request: Request,
        _spider: Arc<dyn Spider>,
    ) -> BoxFuture<'static, DownloadOutcome> {
        async { DownloadOutcome::Failure(Error::download("mock downloader failure")) }.boxed()
    }

    fn needs_backout(&self) -> bool {
        false
    }

    fn active_count(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trawler_core::spider::BasicSpider;

    fn spider() -> Arc<dyn Spider> {
        Arc::new(BasicSpider::new("mock", vec![]))
    }

    #[tokio::test]
    async fn test_default_response() {
        let downloader = MockDownloader::new();
        let request = Request::get("https://example.com/page").unwrap();

        let outcome = downloader.fetch(request, spider()).await;
        match outcome {
            DownloadOutcome::Response(response) => {
                assert_eq!(response.status, 200);
                assert!(response.text().unwrap().contains("Mock response"));
            }
            other => panic!("expected response, got {:?}", other),
        }
        assert_eq!(downloader.fetch_count(), 1);
        assert_eq!(downloader.active_count(), 0);
    }

    #[tokio::test]
    async fn test_canned_redirect() {
        let downloader = MockDownloader::new();
        downloader.add_redirect("https://example.com/old", "https://example.com/new");

        let request = Request::get("https://example.com/old").unwrap();
        let outcome = downloader.fetch(request, spider()).await;

        match outcome {
            DownloadOutcome::Redirect(request) => {
                assert_eq!(request.url.as_str(), "https://example.com/new");
            }
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backout_on_fetch_is_synchronous() {
        let downloader = MockDownloader::new();
        downloader.backout_on_every_fetch(true);
        assert!(!downloader.needs_backout());

        let request = Request::get("https://example.com").unwrap();
        // The flag must be visible before the future is awaited
        let fut = downloader.fetch(request, spider());
        assert!(downloader.needs_backout());
        let _ = fut.await;

        downloader.set_backout(false);
        assert!(!downloader.needs_backout());
    }

    #[tokio::test]
    async fn test_failing_downloader() {
        let downloader = FailingDownloader;
        let request = Request::get("https://example.com").unwrap();

        match downloader.fetch(request, spider()).await {
            DownloadOutcome::Failure(e) => {
                assert!(e.to_string().contains("mock downloader failure"))
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
