use std::collections::HashMap;

use crate::async_trait;
use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

/// A lazy, single-pass sequence of initial requests. Once exhausted it is
/// never restarted; the engine pulls from it one item per pull cycle.
pub type StartRequests = Box<dyn Iterator<Item = Result<Request>> + Send>;

/// Trait for spiders: the logical crawl target the engine opens, runs, and
/// closes.
#[async_trait]
pub trait Spider: Send + Sync + 'static {
    /// Get the name of the spider
    fn name(&self) -> &str;

    /// Get the allowed domains for this spider. An empty list allows all.
    fn allowed_domains(&self) -> Vec<String> {
        Vec::new()
    }

    /// Get the start URLs for this spider
    fn start_urls(&self) -> Vec<String> {
        Vec::new()
    }

    /// Produce the lazy start-request sequence
    fn start_requests(&self) -> StartRequests {
        Box::new(self.start_urls().into_iter().map(Request::get))
    }

    /// Process a response and return items and/or requests to follow
    async fn parse(&self, response: Response) -> Result<ParseOutput>;

    /// Called when the spider is closed, with the close reason
    async fn closed(&self, _reason: &str) -> Result<()> {
        Ok(())
    }

    /// Get custom settings for this spider
    fn settings(&self) -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }
}

/// Output from parsing a response
#[derive(Default)]
pub struct ParseOutput {
    /// Items extracted from the response
    pub items: Vec<serde_json::Value>,

    /// Requests to follow
    pub requests: Vec<Request>,
}

impl ParseOutput {
    /// Create a new empty parse output
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item to the output
    pub fn add_item<I: Into<serde_json::Value>>(&mut self, item: I) -> &mut Self {
        self.items.push(item.into());
        self
    }

    /// Add a request to the output
    pub fn add_request(&mut self, request: Request) -> &mut Self {
        self.requests.push(request);
        self
    }

    /// Create a parse output with a single item
    pub fn item<I: Into<serde_json::Value>>(item: I) -> Self {
        let mut output = Self::new();
        output.add_item(item);
        output
    }

    /// Create a parse output with a single request
    pub fn request(request: Request) -> Self {
        let mut output = Self::new();
        output.add_request(request);
        output
    }
}

/// A basic spider implementation that visits its start URLs and extracts
/// nothing. Intended as a building block and for smoke-testing a setup.
pub struct BasicSpider {
    name: String,
    allowed_domains: Vec<String>,
    start_urls: Vec<String>,
    settings: HashMap<String, serde_json::Value>,
}

impl BasicSpider {
    /// Create a new basic spider
    pub fn new<S: Into<String>>(name: S, start_urls: Vec<String>) -> Self {
        Self {
            name: name.into(),
            allowed_domains: Vec::new(),
            start_urls,
            settings: HashMap::new(),
        }
    }

    /// Set the allowed domains for this spider
    pub fn with_allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = domains;
        self
    }

    /// Set a custom setting for this spider
    pub fn with_setting<K: Into<String>, V: Into<serde_json::Value>>(
        mut self,
        key: K,
        value: V,
    ) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl Spider for BasicSpider {
    fn name(&self) -> &str {
        &self.name
    }

    fn allowed_domains(&self) -> Vec<String> {
        self.allowed_domains.clone()
    }

    fn start_urls(&self) -> Vec<String> {
        self.start_urls.clone()
    }

    async fn parse(&self, _response: Response) -> Result<ParseOutput> {
        Ok(ParseOutput::new())
    }

    fn settings(&self) -> HashMap<String, serde_json::Value> {
        self.settings.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct TestSpider {
        name: String,
        start_urls: Vec<String>,
    }

    #[async_trait]
    impl Spider for TestSpider {
        fn name(&self) -> &str {
            &self.name
        }

        fn start_urls(&self) -> Vec<String> {
            self.start_urls.clone()
        }

        async fn parse(&self, response: Response) -> Result<ParseOutput> {
            let mut output = ParseOutput::new();
            output.add_item(serde_json::json!({
                "url": response.url.to_string(),
                "title": "Test Page",
            }));
            output.add_request(Request::get("https://example.com/next")?);
            Ok(output)
        }
    }

    #[tokio::test]
    async fn test_spider_parse() {
        let spider = TestSpider {
            name: "test_spider".to_string(),
            start_urls: vec!["https://example.com".to_string()],
        };

        let request = Request::get("https://example.com").unwrap();
        let response = Response::new(request, 200, HashMap::new(), Vec::new());

        let output = spider.parse(response).await.unwrap();

        assert_eq!(output.items.len(), 1);
        assert_eq!(output.requests.len(), 1);
        assert_eq!(output.requests[0].url.as_str(), "https://example.com/next");
    }

    #[test]
    fn test_start_requests_are_lazy_and_single_pass() {
        let spider = BasicSpider::new(
            "basic",
            vec![
                "https://example.com/a".to_string(),
                "https://example.com/b".to_string(),
            ],
        );

        let mut starts = spider.start_requests();
        assert_eq!(
            starts.next().unwrap().unwrap().url.as_str(),
            "https://example.com/a"
        );
        assert_eq!(
            starts.next().unwrap().unwrap().url.as_str(),
            "https://example.com/b"
        );
        assert!(starts.next().is_none());
        // Exhausted for good
        assert!(starts.next().is_none());
    }

    #[test]
    fn test_basic_spider() {
        let spider = BasicSpider::new("basic_spider", vec!["https://example.com".to_string()])
            .with_allowed_domains(vec!["example.com".to_string()])
            .with_setting("download_delay", 2);

        assert_eq!(spider.name(), "basic_spider");
        assert_eq!(spider.allowed_domains(), vec!["example.com"]);
        assert_eq!(spider.start_urls(), vec!["https://example.com"]);
        assert_eq!(
            spider.settings().get("download_delay").unwrap(),
            &serde_json::json!(2)
        );
    }
}
