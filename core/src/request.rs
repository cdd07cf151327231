use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use url::Url;

use crate::error::Result;

/// HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Method {
    #[default]
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    OPTIONS,
    PATCH,
}

/// An opaque unit of crawl work handed to the engine.
///
/// Identity is defined by the fingerprint: either caller-supplied or derived
/// from the target URL and method. The engine never computes fingerprints
/// itself; schedulers compare them to deduplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// The URL to request
    pub url: Url,

    /// The HTTP method to use
    #[serde(default)]
    pub method: Method,

    /// HTTP headers to include
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request body (for POST, PUT, etc.)
    #[serde(default)]
    pub body: Option<Vec<u8>>,

    /// Metadata associated with this request
    #[serde(default)]
    pub meta: HashMap<String, serde_json::Value>,

    /// Priority of this request (higher values = higher priority)
    #[serde(default)]
    pub priority: i32,

    /// Callback name to be invoked when the response is received
    #[serde(default)]
    pub callback: Option<String>,

    /// Whether to bypass the scheduler's duplicate filter
    #[serde(default)]
    pub dont_filter: bool,

    /// Caller-supplied identity; falls back to url + method when absent
    #[serde(default)]
    pub fingerprint: Option<String>,
}

impl Request {
    /// Create a new GET request
    pub fn get<U: AsRef<str>>(url: U) -> Result<Self> {
        let url = Url::parse(url.as_ref())?;
        Ok(Self {
            url,
            method: Method::GET,
            headers: HashMap::new(),
            body: None,
            meta: HashMap::new(),
            priority: 0,
            callback: None,
            dont_filter: false,
            fingerprint: None,
        })
    }

    /// Create a new POST request
    pub fn post<U: AsRef<str>, B: Into<Vec<u8>>>(url: U, body: B) -> Result<Self> {
        let mut request = Self::get(url)?;
        request.method = Method::POST;
        request.body = Some(body.into());
        Ok(request)
    }

    /// Add a header to the request
    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Add metadata to the request
    pub fn with_meta<K: Into<String>, V: Into<serde_json::Value>>(
        mut self,
        key: K,
        value: V,
    ) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Set the priority for this request
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the callback for this request
    pub fn with_callback<C: Into<String>>(mut self, callback: C) -> Self {
        self.callback = Some(callback.into());
        self
    }

    /// Set whether to bypass duplicate filtering
    pub fn with_dont_filter(mut self, dont_filter: bool) -> Self {
        self.dont_filter = dont_filter;
        self
    }

    /// Set a caller-supplied fingerprint
    pub fn with_fingerprint<F: Into<String>>(mut self, fingerprint: F) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// The identity used by schedulers and slots. Caller-supplied when
    /// present, otherwise derived from url and method.
    pub fn fingerprint(&self) -> String {
        match &self.fingerprint {
            Some(fp) => fp.clone(),
            None => format!("{}-{:?}", self.url.as_str(), self.method),
        }
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl Eq for Request {}

impl Hash for Request {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_get() {
        let req = Request::get("https://example.com").unwrap();
        assert_eq!(req.url.as_str(), "https://example.com/");
        assert_eq!(req.method, Method::GET);
        assert!(req.body.is_none());
    }

    #[test]
    fn test_request_post() {
        let body = "test body";
        let req = Request::post("https://example.com", body).unwrap();
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.body.unwrap(), body.as_bytes());
    }

    #[test]
    fn test_request_with_header() {
        let req = Request::get("https://example.com")
            .unwrap()
            .with_header("User-Agent", "trawler/0.1.0");

        assert_eq!(req.headers.get("User-Agent").unwrap(), "trawler/0.1.0");
    }

    #[test]
    fn test_request_with_meta() {
        let req = Request::get("https://example.com")
            .unwrap()
            .with_meta("depth", 2);

        assert_eq!(req.meta.get("depth").unwrap(), &serde_json::json!(2));
    }

    #[test]
    fn test_default_fingerprint_derives_from_url_and_method() {
        let a = Request::get("https://example.com/a").unwrap();
        let b = Request::get("https://example.com/a").unwrap();
        let c = Request::get("https://example.com/c").unwrap();

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_caller_supplied_fingerprint_wins() {
        let a = Request::get("https://example.com/a")
            .unwrap()
            .with_fingerprint("canonical");
        let b = Request::get("https://example.com/b")
            .unwrap()
            .with_fingerprint("canonical");

        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(Request::get("not a url").is_err());
    }
}
