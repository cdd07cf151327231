use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use crate::spider::Spider;

/// Signals emitted by the engine and consumed by external listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// Sent when the engine starts
    EngineStarted,
    /// Sent when the engine stops
    EngineStopped,
    /// Sent when a spider opens
    SpiderOpened,
    /// Sent when a spider has no pending, in-flight, or in-processing work.
    /// A listener may veto the close by returning `Error::DontCloseSpider`.
    SpiderIdle,
    /// Sent when a spider closes, with the close reason
    SpiderClosed,
    /// Sent when a request is admitted by the scheduler
    RequestScheduled,
    /// Sent when a response is received from the downloader
    ResponseReceived,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::EngineStarted => write!(f, "engine_started"),
            Signal::EngineStopped => write!(f, "engine_stopped"),
            Signal::SpiderOpened => write!(f, "spider_opened"),
            Signal::SpiderIdle => write!(f, "spider_idle"),
            Signal::SpiderClosed => write!(f, "spider_closed"),
            Signal::RequestScheduled => write!(f, "request_scheduled"),
            Signal::ResponseReceived => write!(f, "response_received"),
        }
    }
}

/// Signal arguments
#[derive(Clone)]
pub enum SignalArgs {
    /// No arguments
    None,
    /// Spider related
    Spider(Arc<dyn Spider>),
    /// Request related
    Request(Box<Request>),
    /// Response related
    Response(Box<Response>),
    /// Spider closed with a free-form reason
    SpiderClosed {
        spider: Arc<dyn Spider>,
        reason: String,
    },
    /// Error related
    Error(String),
}

impl fmt::Debug for SignalArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "SignalArgs::None"),
            Self::Spider(spider) => write!(f, "SignalArgs::Spider({})", spider.name()),
            Self::Request(request) => write!(f, "SignalArgs::Request({})", request.url),
            Self::Response(response) => write!(f, "SignalArgs::Response({})", response.url),
            Self::SpiderClosed { spider, reason } => {
                write!(f, "SignalArgs::SpiderClosed({}, {})", spider.name(), reason)
            }
            Self::Error(error) => write!(f, "SignalArgs::Error({:?})", error),
        }
    }
}

/// Signal handler type
pub type SignalHandler = Box<dyn Fn(SignalArgs) -> Result<()> + Send + Sync + 'static>;

/// Signal manager: a bus connecting the engine to external listeners
pub struct SignalManager {
    handlers: Arc<RwLock<HashMap<Signal, Vec<SignalHandler>>>>,
}

impl SignalManager {
    /// Create a new signal manager
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Connect a signal handler
    pub async fn connect<F>(&self, signal: Signal, handler: F)
    where
        F: Fn(SignalArgs) -> Result<()> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().await;
        handlers.entry(signal).or_default().push(Box::new(handler));
    }

    /// Send a signal, stopping at the first handler error
    pub async fn send(&self, signal: Signal, args: SignalArgs) -> Result<()> {
        let handlers = self.handlers.read().await;
        if let Some(handlers) = handlers.get(&signal) {
            for handler in handlers {
                handler(args.clone())?;
            }
        }
        Ok(())
    }

    /// Send a signal to every handler, collecting all errors. Used where a
    /// single failing listener must not shadow the others, e.g. the
    /// spider-idle veto where any veto wins.
    pub async fn send_collect(&self, signal: Signal, args: SignalArgs) -> Vec<Error> {
        let handlers = self.handlers.read().await;
        let mut errors = Vec::new();
        if let Some(handlers) = handlers.get(&signal) {
            for handler in handlers {
                if let Err(e) = handler(args.clone()) {
                    errors.push(e);
                }
            }
        }
        errors
    }

    /// Send a signal and log any handler errors instead of returning them
    pub async fn send_catch_log(&self, signal: Signal, args: SignalArgs) {
        for e in self.send_collect(signal, args).await {
            log::error!("Error in {} handler: {}", signal, e);
        }
    }

    /// Disconnect all handlers for a specific signal
    pub async fn disconnect(&self, signal: Signal) {
        let mut handlers = self.handlers.write().await;
        handlers.remove(&signal);
    }

    /// Disconnect all signal handlers
    pub async fn disconnect_all(&self) {
        let mut handlers = self.handlers.write().await;
        handlers.clear();
    }
}

impl Default for SignalManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_signal_manager() {
        let signals = SignalManager::new();
        let called = Arc::new(AtomicBool::new(false));

        let called_clone = called.clone();
        signals
            .connect(Signal::EngineStarted, move |_| {
                called_clone.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        signals
            .send(Signal::EngineStarted, SignalArgs::None)
            .await
            .unwrap();

        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_multiple_handlers() {
        let signals = SignalManager::new();
        let counter1 = Arc::new(AtomicUsize::new(0));
        let counter2 = Arc::new(AtomicUsize::new(0));

        let counter1_clone = counter1.clone();
        signals
            .connect(Signal::ResponseReceived, move |_| {
                counter1_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        let counter2_clone = counter2.clone();
        signals
            .connect(Signal::ResponseReceived, move |_| {
                counter2_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        signals
            .send(Signal::ResponseReceived, SignalArgs::None)
            .await
            .unwrap();

        assert_eq!(counter1.load(Ordering::SeqCst), 1);
        assert_eq!(counter2.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_collect_runs_every_handler() {
        let signals = SignalManager::new();
        let ran_after_failure = Arc::new(AtomicBool::new(false));

        signals
            .connect(Signal::SpiderIdle, |_| Err(Error::DontCloseSpider))
            .await;

        let ran = ran_after_failure.clone();
        signals
            .connect(Signal::SpiderIdle, move |_| {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        let errors = signals
            .send_collect(Signal::SpiderIdle, SignalArgs::None)
            .await;

        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_dont_close());
        assert!(ran_after_failure.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_disconnect() {
        let signals = SignalManager::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = counter.clone();
        signals
            .connect(Signal::RequestScheduled, move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        signals
            .send(Signal::RequestScheduled, SignalArgs::None)
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        signals.disconnect(Signal::RequestScheduled).await;

        signals
            .send(Signal::RequestScheduled, SignalArgs::None)
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
