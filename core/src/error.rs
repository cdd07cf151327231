use thiserror::Error;
use url::ParseError;

/// Error types for the trawler framework.
///
/// Two families live here: content errors (failed downloads, scrape
/// failures) that the engine isolates per request and only logs, and
/// control-plane errors (state machine and capacity violations) that are
/// surfaced to the caller as hard failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Error when parsing a URL
    #[error("URL parse error: {0}")]
    UrlParse(#[from] ParseError),

    /// The engine's own state machine was violated (starting a running
    /// engine, stopping a stopped one, opening a spider beyond capacity)
    #[error("invalid engine state: {0}")]
    InvalidState(String),

    /// Error raised by a scheduler implementation
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// Error while downloading a request
    #[error("download error: {0}")]
    Download(String),

    /// Error while scraping a response
    #[error("scrape error: {0}")]
    Scrape(String),

    /// Raised by a `spider_idle` listener to veto closing an idle spider.
    /// The engine reschedules the pull cycle instead of shutting down.
    #[error("spider must be kept open")]
    DontCloseSpider,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Create a new scheduler error
    pub fn scheduler(message: impl Into<String>) -> Self {
        Self::Scheduler(message.into())
    }

    /// Create a new download error
    pub fn download(message: impl Into<String>) -> Self {
        Self::Download(message.into())
    }

    /// Create a new scrape error
    pub fn scrape(message: impl Into<String>) -> Self {
        Self::Scrape(message.into())
    }

    /// Create a new generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether this error is the idle-close veto
    pub fn is_dont_close(&self) -> bool {
        matches!(self, Self::DontCloseSpider)
    }

    /// Whether this error is fatal to the calling operation rather than
    /// recoverable content of the crawl
    pub fn is_control_plane(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }
}

/// Result type for trawler operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_veto_detection() {
        assert!(Error::DontCloseSpider.is_dont_close());
        assert!(!Error::other("boom").is_dont_close());
    }

    #[test]
    fn test_control_plane_classification() {
        assert!(Error::invalid_state("engine already running").is_control_plane());
        assert!(!Error::download("connection reset").is_control_plane());
    }

    #[test]
    fn test_display() {
        let err = Error::scheduler("queue poisoned");
        assert_eq!(err.to_string(), "scheduler error: queue poisoned");
    }
}
