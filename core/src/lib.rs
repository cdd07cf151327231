pub mod error;
pub mod request;
pub mod response;
pub mod signal;
pub mod spider;

pub use error::{Error, Result};
pub use request::{Method, Request};
pub use response::Response;
pub use signal::{Signal, SignalArgs, SignalManager};
pub use spider::{BasicSpider, ParseOutput, Spider, StartRequests};

/// Re-export commonly used crates
pub use async_trait::async_trait;
pub use futures;
pub use serde;
pub use serde_json;
pub use url;
