use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::debug;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use trawler_core::error::Result;
use trawler_core::request::Request;
use trawler_core::spider::StartRequests;
use trawler_scheduler::Scheduler;

use crate::trigger::NextCall;

/// Per-spider crawl state: the in-flight request set, the lazy start-request
/// iterator, the scheduler, and the closing protocol.
///
/// Closing runs in two phases. `begin_closing` marks the slot; once the
/// in-flight set drains, the drain signal fires and the first closer runs
/// teardown, after which the closed signal releases every waiter.
pub struct Slot {
    /// Remaining start requests. `None` once the iterator is exhausted.
    start_requests: Mutex<Option<StartRequests>>,

    /// Whether the spider should be closed when it goes idle
    pub close_if_idle: bool,

    /// Fingerprints of requests currently in flight, with a count per
    /// fingerprint: `dont_filter` lets the scheduler admit duplicates, so
    /// the same fingerprint can be in flight more than once
    in_progress: Mutex<HashMap<String, usize>>,

    /// Scheduler owning this spider's pending requests
    pub scheduler: Arc<dyn Scheduler>,

    /// Wake-up trigger for this slot's pull loop
    pub next_call: NextCall,

    closing: Mutex<bool>,
    drain_tx: watch::Sender<bool>,
    drain_rx: watch::Receiver<bool>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,

    /// Periodic re-arm task, aborted at teardown
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl Slot {
    /// Create a slot and the pull-loop receiver for its trigger
    pub fn new(
        start_requests: StartRequests,
        close_if_idle: bool,
        scheduler: Arc<dyn Scheduler>,
    ) -> (Self, mpsc::Receiver<()>) {
        let (next_call, wake_rx) = NextCall::channel();
        let (drain_tx, drain_rx) = watch::channel(false);
        let (closed_tx, closed_rx) = watch::channel(false);

        (
            Self {
                start_requests: Mutex::new(Some(start_requests)),
                close_if_idle,
                in_progress: Mutex::new(HashMap::new()),
                scheduler,
                next_call,
                closing: Mutex::new(false),
                drain_tx,
                drain_rx,
                closed_tx,
                closed_rx,
                heartbeat: Mutex::new(None),
            },
            wake_rx,
        )
    }

    /// Record a request as in flight
    pub fn add_request(&self, request: &Request) {
        *self
            .in_progress
            .lock()
            .unwrap()
            .entry(request.fingerprint())
            .or_insert(0) += 1;
    }

    /// Record a request as no longer in flight and fire the drain signal if
    /// this was the last one during closing
    pub fn remove_request(&self, request: &Request) {
        {
            let mut in_progress = self.in_progress.lock().unwrap();
            if let Some(count) = in_progress.get_mut(&request.fingerprint()) {
                *count -= 1;
                if *count == 0 {
                    in_progress.remove(&request.fingerprint());
                }
            }
        }
        self.maybe_fire_closing();
    }

    /// Number of requests currently in flight
    pub fn in_progress_count(&self) -> usize {
        self.in_progress.lock().unwrap().values().sum()
    }

    /// Mark the slot as closing. Returns `true` if this call initiated the
    /// close, `false` if the slot was already closing.
    pub fn begin_closing(&self) -> bool {
        let mut closing = self.closing.lock().unwrap();
        if *closing {
            return false;
        }
        *closing = true;
        drop(closing);

        debug!("Slot closing, {} requests in flight", self.in_progress_count());
        self.maybe_fire_closing();
        true
    }

    /// Whether the slot is closing or closed
    pub fn is_closing(&self) -> bool {
        *self.closing.lock().unwrap()
    }

    /// Signal resolved once the slot is closing and has no requests in
    /// flight
    pub fn drain_signal(&self) -> watch::Receiver<bool> {
        self.drain_rx.clone()
    }

    /// Signal resolved once teardown has fully completed
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed_rx.clone()
    }

    /// Mark teardown as complete, releasing every close waiter
    pub fn mark_closed(&self) {
        let _ = self.closed_tx.send(true);
    }

    /// Pull the next start request, dropping the iterator on exhaustion
    pub fn next_start_request(&self) -> Option<Result<Request>> {
        let mut starts = self.start_requests.lock().unwrap();
        match starts.as_mut()?.next() {
            Some(result) => Some(result),
            None => {
                *starts = None;
                None
            }
        }
    }

    /// Whether unexhausted start requests may remain
    pub fn has_start_requests(&self) -> bool {
        self.start_requests.lock().unwrap().is_some()
    }

    /// Install the periodic re-arm task
    pub fn set_heartbeat(&self, handle: JoinHandle<()>) {
        *self.heartbeat.lock().unwrap() = Some(handle);
    }

    /// Abort the periodic re-arm task
    pub fn stop_heartbeat(&self) {
        if let Some(handle) = self.heartbeat.lock().unwrap().take() {
            handle.abort();
        }
    }

    fn maybe_fire_closing(&self) {
        if *self.closing.lock().unwrap() && self.in_progress.lock().unwrap().is_empty() {
            self.next_call.cancel();
            let _ = self.drain_tx.send(true);
        }
    }
}
