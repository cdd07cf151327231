use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, error};

use trawler_core::async_trait;
use trawler_core::error::{Error, Result};
use trawler_core::request::Request;
use trawler_core::response::Response;
use trawler_core::spider::{Spider, StartRequests};

pub mod pipeline;

pub use pipeline::{DummyPipeline, LogPipeline, Pipeline};

/// Minimum size (in bytes) charged against the scrape budget per response
const MIN_RESPONSE_SIZE: usize = 1024;

/// Default ceiling on the total size of responses being scraped at once
const DEFAULT_MAX_ACTIVE_SIZE: usize = 5_000_000;

/// What the engine hands to the scraper for a resolved request
#[derive(Debug)]
pub enum ScrapeInput {
    /// The request resolved to a response
    Response(Box<Response>),
    /// The request failed; the spider may still want to observe it
    Failure(Error),
}

/// What the scraper hands back: follow-up requests to re-enter the
/// scheduler, and the number of items it emitted.
#[derive(Debug, Default)]
pub struct ScrapeOutput {
    /// Requests to schedule for crawling
    pub requests: Vec<Request>,

    /// Number of items successfully processed
    pub item_count: usize,
}

/// Contract for scrapers: the shared pipeline runner that executes spider
/// callbacks on downloaded responses.
#[async_trait]
pub trait Scraper: Send + Sync + 'static {
    /// Called when a spider is opened
    async fn open_spider(&self, spider: &dyn Spider) -> Result<()>;

    /// Called when a spider is closed
    async fn close_spider(&self, spider: &dyn Spider) -> Result<()>;

    /// Filter/transform the lazy start-request sequence before the engine
    /// wraps it in a slot. The sequence stays lazy and single-pass.
    async fn process_start_requests(
        &self,
        starts: StartRequests,
        spider: &dyn Spider,
    ) -> Result<StartRequests>;

    /// Run the spider callback for one resolved request
    async fn enqueue_scrape(
        &self,
        input: ScrapeInput,
        request: &Request,
        spider: Arc<dyn Spider>,
    ) -> Result<ScrapeOutput>;

    /// Whether no scrapes are currently in processing
    fn is_idle(&self) -> bool;

    /// Whether the processing queue is saturated and the engine should stop
    /// pulling new requests
    fn needs_backout(&self) -> bool;
}

/// Scraper that runs `Spider::parse` and feeds extracted items through an
/// item [`Pipeline`].
///
/// Backpressure is byte-based: each in-processing response is charged at
/// least [`MIN_RESPONSE_SIZE`] against a fixed budget, and `needs_backout`
/// reports saturation once the budget is exceeded.
pub struct SpiderScraper {
    pipeline: Arc<dyn Pipeline>,
    active: AtomicUsize,
    active_size: AtomicUsize,
    max_active_size: usize,
}

impl SpiderScraper {
    /// Create a new scraper with the given item pipeline
    pub fn new(pipeline: Arc<dyn Pipeline>) -> Self {
        Self {
            pipeline,
            active: AtomicUsize::new(0),
            active_size: AtomicUsize::new(0),
            max_active_size: DEFAULT_MAX_ACTIVE_SIZE,
        }
    }

    /// Override the active-size budget
    pub fn with_max_active_size(mut self, max_active_size: usize) -> Self {
        self.max_active_size = max_active_size;
        self
    }

    async fn scrape_response(
        &self,
        response: Response,
        spider: &Arc<dyn Spider>,
    ) -> Result<ScrapeOutput> {
        let output = spider
            .parse(response)
            .await
            .map_err(|e| Error::scrape(format!("spider {} parse failed: {}", spider.name(), e)))?;

        let mut item_count = 0;
        for item in output.items {
            match self.pipeline.process_item(item, &**spider).await {
                Ok(_) => item_count += 1,
                Err(e) => error!("Error processing item from {}: {}", spider.name(), e),
            }
        }

        Ok(ScrapeOutput {
            requests: output.requests,
            item_count,
        })
    }
}

#[async_trait]
impl Scraper for SpiderScraper {
    async fn open_spider(&self, spider: &dyn Spider) -> Result<()> {
        self.pipeline.open_spider(spider).await
    }

    async fn close_spider(&self, spider: &dyn Spider) -> Result<()> {
        self.pipeline.close_spider(spider).await
    }

    async fn process_start_requests(
        &self,
        starts: StartRequests,
        spider: &dyn Spider,
    ) -> Result<StartRequests> {
        let allowed = spider.allowed_domains();
        if allowed.is_empty() {
            return Ok(starts);
        }

        let spider_name = spider.name().to_string();
        Ok(Box::new(starts.filter(move |result| match result {
            Ok(request) => {
                let host = request.url.host_str().unwrap_or("");
                let offsite = !allowed
                    .iter()
                    .any(|domain| host == domain || host.ends_with(&format!(".{}", domain)));
                if offsite {
                    debug!(
                        "Filtered offsite start request {} for spider {}",
                        request.url, spider_name
                    );
                }
                !offsite
            }
            Err(_) => true,
        })))
    }

    async fn enqueue_scrape(
        &self,
        input: ScrapeInput,
        request: &Request,
        spider: Arc<dyn Spider>,
    ) -> Result<ScrapeOutput> {
        let size = match &input {
            ScrapeInput::Response(response) => response.body.len().max(MIN_RESPONSE_SIZE),
            ScrapeInput::Failure(_) => MIN_RESPONSE_SIZE,
        };

        self.active.fetch_add(1, Ordering::SeqCst);
        self.active_size.fetch_add(size, Ordering::SeqCst);

        let result = match input {
            ScrapeInput::Response(response) => self.scrape_response(*response, &spider).await,
            ScrapeInput::Failure(error) => {
                debug!(
                    "Download failure for {} observed by scraper: {}",
                    request.url, error
                );
                Ok(ScrapeOutput::default())
            }
        };

        self.active_size.fetch_sub(size, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);

        result
    }

    fn is_idle(&self) -> bool {
        self.active.load(Ordering::SeqCst) == 0
    }

    fn needs_backout(&self) -> bool {
        self.active_size.load(Ordering::SeqCst) > self.max_active_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use trawler_core::spider::{BasicSpider, ParseOutput};

    struct LinkSpider;

    #[async_trait]
    impl Spider for LinkSpider {
        fn name(&self) -> &str {
            "links"
        }

        async fn parse(&self, response: Response) -> Result<ParseOutput> {
            let mut output = ParseOutput::new();
            output.add_item(serde_json::json!({ "url": response.url.to_string() }));
            output.add_request(Request::get("https://example.com/next")?);
            Ok(output)
        }
    }

    fn response_for(url: &str) -> (Request, Response) {
        let request = Request::get(url).unwrap();
        let response = Response::new(request.clone(), 200, HashMap::new(), Vec::new());
        (request, response)
    }

    #[tokio::test]
    async fn test_scrape_routes_items_and_requests() {
        let scraper = SpiderScraper::new(Arc::new(DummyPipeline::new()));
        let spider: Arc<dyn Spider> = Arc::new(LinkSpider);
        let (request, response) = response_for("https://example.com/page");

        let output = scraper
            .enqueue_scrape(ScrapeInput::Response(Box::new(response)), &request, spider)
            .await
            .unwrap();

        assert_eq!(output.item_count, 1);
        assert_eq!(output.requests.len(), 1);
        assert!(scraper.is_idle());
    }

    #[tokio::test]
    async fn test_failure_input_is_absorbed() {
        let scraper = SpiderScraper::new(Arc::new(DummyPipeline::new()));
        let spider: Arc<dyn Spider> = Arc::new(LinkSpider);
        let request = Request::get("https://example.com/broken").unwrap();

        let output = scraper
            .enqueue_scrape(
                ScrapeInput::Failure(Error::download("connection reset")),
                &request,
                spider,
            )
            .await
            .unwrap();

        assert_eq!(output.item_count, 0);
        assert!(output.requests.is_empty());
        assert!(scraper.is_idle());
    }

    #[tokio::test]
    async fn test_backout_over_budget() {
        let scraper = SpiderScraper::new(Arc::new(DummyPipeline::new())).with_max_active_size(10);
        assert!(!scraper.needs_backout());

        scraper.active_size.store(11, Ordering::SeqCst);
        assert!(scraper.needs_backout());

        scraper.active_size.store(0, Ordering::SeqCst);
        assert!(!scraper.needs_backout());
    }

    #[tokio::test]
    async fn test_offsite_start_requests_filtered() {
        let scraper = SpiderScraper::new(Arc::new(DummyPipeline::new()));
        let spider = BasicSpider::new(
            "offsite",
            vec![
                "https://example.com/a".to_string(),
                "https://other.org/b".to_string(),
                "https://sub.example.com/c".to_string(),
            ],
        )
        .with_allowed_domains(vec!["example.com".to_string()]);

        let starts = scraper
            .process_start_requests(spider.start_requests(), &spider)
            .await
            .unwrap();

        let urls: Vec<String> = starts
            .map(|r| r.unwrap().url.to_string())
            .collect();

        assert_eq!(
            urls,
            vec!["https://example.com/a", "https://sub.example.com/c"]
        );
    }
}
