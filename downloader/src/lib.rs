use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::debug;
use reqwest::redirect::Policy;
use reqwest::Client;

use trawler_core::async_trait;
use trawler_core::error::{Error, Result};
use trawler_core::request::{Method, Request};
use trawler_core::response::Response;
use trawler_core::spider::Spider;

pub mod mock;

pub use mock::{FailingDownloader, MockDownloader};

/// The resolution of a dispatched request.
///
/// A redirect is surfaced as a new `Request` so the engine re-schedules it
/// instead of handing it to the scraper; the three cases are exhaustive at
/// the downloader boundary.
#[derive(Debug)]
pub enum DownloadOutcome {
    /// The request produced a response
    Response(Box<Response>),
    /// The request was redirected; the new request should be scheduled
    Redirect(Box<Request>),
    /// The request failed
    Failure(Error),
}

/// Contract for downloaders: the shared component that performs network I/O
/// for all spiders.
///
/// `fetch` is a plain method returning a boxed future on purpose:
/// implementations must register the request in their active set in the
/// synchronous prefix, before the future is first polled, so that
/// `needs_backout` and `active_count` already reflect the dispatch when the
/// engine's pull loop re-evaluates backpressure.
#[async_trait]
pub trait Downloader: Send + Sync + 'static {
    /// Download a request, eventually resolving to an outcome
    fn fetch(&self, request: Request, spider: Arc<dyn Spider>)
        -> BoxFuture<'static, DownloadOutcome>;

    /// Whether the downloader's concurrency budget is saturated and the
    /// engine should stop pulling new requests
    fn needs_backout(&self) -> bool;

    /// Number of requests currently in flight
    fn active_count(&self) -> usize;

    /// Release any resources held for the given spider
    async fn close_spider(&self, _spider: &dyn Spider) -> Result<()> {
        Ok(())
    }
}

/// Configuration for the HTTP downloader
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Maximum number of concurrent requests
    pub concurrent_requests: usize,

    /// User agent string
    pub user_agent: String,

    /// Default request timeout in seconds
    pub timeout: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            concurrent_requests: 16,
            user_agent: format!("trawler/{}", env!("CARGO_PKG_VERSION")),
            timeout: 30,
        }
    }
}

/// Decrements the shared active counter when a fetch future completes or is
/// dropped.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// HTTP downloader backed by reqwest, with a global concurrency budget
pub struct HttpDownloader {
    client: Client,
    active: Arc<AtomicUsize>,
    config: DownloaderConfig,
}

impl HttpDownloader {
    /// Create a new HTTP downloader with the given configuration
    pub fn new(config: DownloaderConfig) -> Result<Self> {
        // Redirects are not followed by the client; they come back as
        // DownloadOutcome::Redirect so the engine can re-schedule them.
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout))
            .redirect(Policy::none())
            .build()
            .map_err(|e| Error::download(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            active: Arc::new(AtomicUsize::new(0)),
            config,
        })
    }

    fn build_request(client: &Client, request: &Request) -> reqwest::RequestBuilder {
        let mut builder = client.request(
            match request.method {
                Method::GET => reqwest::Method::GET,
                Method::POST => reqwest::Method::POST,
                Method::PUT => reqwest::Method::PUT,
                Method::DELETE => reqwest::Method::DELETE,
                Method::HEAD => reqwest::Method::HEAD,
                Method::OPTIONS => reqwest::Method::OPTIONS,
                Method::PATCH => reqwest::Method::PATCH,
            },
            request.url.clone(),
        );

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        builder
    }

    async fn do_fetch(client: Client, request: Request) -> DownloadOutcome {
        debug!("Downloading URL: {}", request.url);

        let result = Self::build_request(&client, &request).send().await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                return DownloadOutcome::Failure(Error::download(format!(
                    "request to {} failed: {}",
                    request.url, e
                )))
            }
        };

        let status = response.status().as_u16();

        if matches!(status, 301 | 302 | 303 | 307 | 308) {
            if let Some(location) = response
                .headers()
                .get("location")
                .and_then(|v| v.to_str().ok())
            {
                match request.url.join(location) {
                    Ok(target) => {
                        let mut redirected = request.clone();
                        redirected.url = target;
                        redirected.fingerprint = None;
                        return DownloadOutcome::Redirect(Box::new(redirected));
                    }
                    Err(e) => {
                        return DownloadOutcome::Failure(Error::download(format!(
                            "invalid redirect location from {}: {}",
                            request.url, e
                        )))
                    }
                }
            }
        }

        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or("").to_string()))
            .collect();

        match response.bytes().await {
            Ok(body) => DownloadOutcome::Response(Box::new(Response::new(
                request,
                status,
                headers,
                body.to_vec(),
            ))),
            Err(e) => DownloadOutcome::Failure(Error::download(format!(
                "failed to read body from {}: {}",
                request.url, e
            ))),
        }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    fn fetch(
        &self,
        request: Request,
        _spider: Arc<dyn Spider>,
    ) -> BoxFuture<'static, DownloadOutcome> {
        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard(self.active.clone());
        let client = self.client.clone();

        async move {
            let _guard = guard;
            Self::do_fetch(client, request).await
        }
        .boxed()
    }

    fn needs_backout(&self) -> bool {
        self.active.load(Ordering::SeqCst) >= self.config.concurrent_requests
    }

    fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    async fn close_spider(&self, spider: &dyn Spider) -> Result<()> {
        debug!("Downloader closed for spider {}", spider.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_downloader_construction() {
        let downloader = HttpDownloader::new(DownloaderConfig::default()).unwrap();
        assert_eq!(downloader.active_count(), 0);
        assert!(!downloader.needs_backout());
    }

    #[test]
    fn test_backout_threshold() {
        let config = DownloaderConfig {
            concurrent_requests: 2,
            ..DownloaderConfig::default()
        };
        let downloader = HttpDownloader::new(config).unwrap();

        downloader.active.store(2, Ordering::SeqCst);
        assert!(downloader.needs_backout());

        downloader.active.store(1, Ordering::SeqCst);
        assert!(!downloader.needs_backout());
    }
}
