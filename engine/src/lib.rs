//! The crawl execution engine.
//!
//! The engine coordinates one [`Slot`] per open spider against shared
//! downloader and scraper components. Each slot owns a pull loop that is
//! woken through a debounced trigger; every cycle drains the scheduler into
//! the downloader until a component asks for backout, feeds in at most one
//! start request, and checks whether the spider has gone idle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use log::{debug, error, info};
use tokio::sync::{watch, RwLock};

use trawler_core::error::{Error, Result};
use trawler_core::request::Request;
use trawler_core::signal::{Signal, SignalArgs, SignalManager};
use trawler_core::spider::Spider;
use trawler_downloader::{DownloadOutcome, Downloader};
use trawler_scheduler::SchedulerFactory;
use trawler_scraper::{ScrapeInput, Scraper};

pub mod config;
pub mod slot;
pub mod stats;
pub mod trigger;


pub use config::EngineConfig;
pub use slot::Slot;
pub use stats::CrawlStats;
pub use trigger::NextCall;

/// Engine lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Created but not yet started
    Idle,
    /// Started and processing work
    Running,
    /// Shutting down
    Stopping,
    /// Fully stopped
    Stopped,
}

type SpiderEntry = (Arc<dyn Spider>, Arc<Slot>);

/// Removes a dispatched request from its slot and re-arms the pull trigger
/// when the dispatch task ends, whether it completes or unwinds.
struct DispatchGuard {
    slot: Arc<Slot>,
    request: Request,
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        self.slot.remove_request(&self.request);
        self.slot.next_call.schedule();
    }
}

/// Callback invoked after a spider has fully closed, with its name and the
/// close reason
pub type SpiderFinished = Box<dyn Fn(&str, &str) + Send + Sync>;

/// The crawl execution engine
pub struct ExecutionEngine {
    state: RwLock<EngineState>,
    paused: AtomicBool,
    slots: RwLock<HashMap<String, SpiderEntry>>,
    downloader: Arc<dyn Downloader>,
    scraper: Arc<dyn Scraper>,
    scheduler_factory: SchedulerFactory,
    signals: Arc<SignalManager>,
    stats: RwLock<HashMap<String, CrawlStats>>,
    config: EngineConfig,
    stopped_tx: watch::Sender<bool>,
    stopped_rx: watch::Receiver<bool>,
    spider_finished: StdMutex<Option<SpiderFinished>>,
}

impl ExecutionEngine {
    /// Create a new engine over the given components
    pub fn new(
        downloader: Arc<dyn Downloader>,
        scraper: Arc<dyn Scraper>,
        scheduler_factory: SchedulerFactory,
        config: EngineConfig,
    ) -> Self {
        let (stopped_tx, stopped_rx) = watch::channel(false);
        Self {
            state: RwLock::new(EngineState::Idle),
            paused: AtomicBool::new(false),
            slots: RwLock::new(HashMap::new()),
            downloader,
            scraper,
            scheduler_factory,
            signals: Arc::new(SignalManager::new()),
            stats: RwLock::new(HashMap::new()),
            config,
            stopped_tx,
            stopped_rx,
            spider_finished: StdMutex::new(None),
        }
    }

    /// The engine's signal bus
    pub fn signals(&self) -> &Arc<SignalManager> {
        &self.signals
    }

    /// Current lifecycle state
    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Whether the engine is paused
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Whether another spider can be opened
    pub async fn has_capacity(&self) -> bool {
        self.slots.read().await.len() < self.config.max_open_spiders
    }

    /// Crawl statistics for a spider, if it has been opened
    pub async fn stats(&self, spider_name: &str) -> Option<CrawlStats> {
        self.stats.read().await.get(spider_name).cloned()
    }

    /// Install a callback invoked after each spider fully closes
    pub fn set_spider_finished(&self, callback: SpiderFinished) {
        *self.spider_finished.lock().unwrap() = Some(callback);
    }

    /// Start the engine and run until it is stopped.
    ///
    /// Fails if the engine has already been started.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state != EngineState::Idle {
                return Err(Error::invalid_state(format!(
                    "engine already started ({:?})",
                    *state
                )));
            }
            *state = EngineState::Running;
        }

        info!("Engine started");
        self.signals
            .send_catch_log(Signal::EngineStarted, SignalArgs::None)
            .await;

        if self.config.log_stats {
            self.spawn_stats_logger();
        }

        // Wake slots opened before the engine came up
        for (_, slot) in self.slots.read().await.values() {
            slot.next_call.schedule();
        }

        let mut stopped = self.stopped_rx.clone();
        while !*stopped.borrow() {
            if stopped.changed().await.is_err() {
                break;
            }
        }
        Ok(())
    }

    /// Stop the engine, closing every open spider with reason "shutdown".
    ///
    /// Fails if the engine is not running.
    pub async fn stop(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state != EngineState::Running {
                return Err(Error::invalid_state(format!(
                    "cannot stop engine in state {:?}",
                    *state
                )));
            }
            *state = EngineState::Stopping;
        }

        info!("Engine stopping");

        let spiders: Vec<Arc<dyn Spider>> = self
            .slots
            .read()
            .await
            .values()
            .map(|(spider, _)| spider.clone())
            .collect();

        for spider in spiders {
            if let Err(e) = self.close_spider(&spider, "shutdown").await {
                error!("Error closing spider {}: {}", spider.name(), e);
            }
        }

        self.signals
            .send_catch_log(Signal::EngineStopped, SignalArgs::None)
            .await;
        *self.state.write().await = EngineState::Stopped;
        let _ = self.stopped_tx.send(true);

        info!("Engine stopped");
        Ok(())
    }

    /// Pause the engine: pull cycles keep running but dispatch nothing
    pub fn pause(&self) {
        info!("Engine paused");
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Resume a paused engine
    pub async fn unpause(&self) {
        info!("Engine unpaused");
        self.paused.store(false, Ordering::SeqCst);
        for (_, slot) in self.slots.read().await.values() {
            slot.next_call.schedule();
        }
    }

    /// Open a spider: create its scheduler and slot, start its pull loop,
    /// and schedule the first pull cycle.
    ///
    /// Fails if the engine is stopping, the open-spider capacity is
    /// exhausted, or a spider with the same name is already open.
    pub async fn open_spider(
        self: &Arc<Self>,
        spider: Arc<dyn Spider>,
        close_if_idle: bool,
    ) -> Result<()> {
        {
            let state = self.state.read().await;
            if !matches!(*state, EngineState::Idle | EngineState::Running) {
                return Err(Error::invalid_state(format!(
                    "cannot open spider in engine state {:?}",
                    *state
                )));
            }
        }

        let name = spider.name().to_string();
        info!("Opening spider {}", name);

        let starts = self
            .scraper
            .process_start_requests(spider.start_requests(), &*spider)
            .await?;
        let scheduler = (self.scheduler_factory)();

        let (slot, mut wake_rx) = Slot::new(starts, close_if_idle, scheduler.clone());
        let slot = Arc::new(slot);

        {
            let mut slots = self.slots.write().await;
            if slots.len() >= self.config.max_open_spiders {
                return Err(Error::invalid_state(format!(
                    "cannot open spider {}: {} spider(s) already open",
                    name, self.config.max_open_spiders
                )));
            }
            if slots.contains_key(&name) {
                return Err(Error::invalid_state(format!(
                    "spider {} is already open",
                    name
                )));
            }
            slots.insert(name.clone(), (spider.clone(), slot.clone()));
        }

        if let Err(e) = scheduler.open(&*spider).await {
            self.slots.write().await.remove(&name);
            return Err(e);
        }
        if let Err(e) = self.scraper.open_spider(&*spider).await {
            self.slots.write().await.remove(&name);
            if let Err(close_err) = scheduler.close("cancelled").await {
                error!("Error closing scheduler for {}: {}", name, close_err);
            }
            return Err(e);
        }
        self.stats
            .write()
            .await
            .insert(name.clone(), CrawlStats::started());

        let engine = Arc::clone(self);
        let loop_spider = spider.clone();
        tokio::spawn(async move {
            while wake_rx.recv().await.is_some() {
                if let Err(e) = engine.next_request(&loop_spider).await {
                    error!(
                        "Error in pull cycle for spider {}: {}",
                        loop_spider.name(),
                        e
                    );
                }
            }
            debug!("Pull loop for spider {} ended", loop_spider.name());
        });

        self.spawn_heartbeat(&slot);

        self.signals
            .send_catch_log(Signal::SpiderOpened, SignalArgs::Spider(spider))
            .await;

        slot.next_call.schedule();
        Ok(())
    }

    /// Run one pull cycle for a spider: drain the scheduler into the
    /// downloader until backout, feed in at most one start request, then
    /// check for idleness.
    pub async fn next_request(self: &Arc<Self>, spider: &Arc<dyn Spider>) -> Result<()> {
        let slot = {
            let slots = self.slots.read().await;
            match slots.get(spider.name()) {
                Some((_, slot)) => slot.clone(),
                None => return Ok(()),
            }
        };

        if self.is_paused() {
            slot.next_call.schedule_after(self.config.pause_poll_delay());
            return Ok(());
        }

        loop {
            if self.needs_backout(&slot).await {
                break;
            }
            match slot.scheduler.next_request().await {
                Some(request) => self.dispatch(request, spider, &slot),
                None => break,
            }
        }

        if !self.needs_backout(&slot).await {
            match slot.next_start_request() {
                Some(Ok(request)) => self.schedule_request(request, spider, &slot).await?,
                Some(Err(e)) => {
                    error!(
                        "Error in start requests for spider {}: {}",
                        spider.name(),
                        e
                    );
                    slot.next_call.schedule();
                }
                None => {}
            }
        }

        // Idle handling waits until the engine is actually running, so a
        // spider opened before start() cannot close itself early
        if slot.close_if_idle
            && !slot.is_closing()
            && *self.state.read().await == EngineState::Running
            && self.spider_is_idle(&slot).await
        {
            self.spider_idle(spider, &slot).await;
        }

        Ok(())
    }

    /// Hand a request to the spider's scheduler. Requests rejected as
    /// duplicates are dropped.
    pub async fn crawl(&self, request: Request, spider: &Arc<dyn Spider>) -> Result<()> {
        let slot = {
            let slots = self.slots.read().await;
            match slots.get(spider.name()) {
                Some((_, slot)) => slot.clone(),
                None => {
                    return Err(Error::invalid_state(format!(
                        "spider {} is not open",
                        spider.name()
                    )))
                }
            }
        };
        self.schedule_request(request, spider, &slot).await
    }

    /// Whether a spider has no work anywhere in the system
    pub async fn spider_is_idle(&self, slot: &Arc<Slot>) -> bool {
        self.scraper.is_idle()
            && self.downloader.active_count() == 0
            && !slot.has_start_requests()
            && slot.in_progress_count() == 0
            && !slot.scheduler.has_pending_requests().await
    }

    /// Close a spider with a free-form reason.
    ///
    /// Idempotent: the first call runs the closing protocol, later calls
    /// wait for it to complete.
    pub async fn close_spider(self: &Arc<Self>, spider: &Arc<dyn Spider>, reason: &str) -> Result<()> {
        let slot = {
            let slots = self.slots.read().await;
            match slots.get(spider.name()) {
                Some((_, slot)) => slot.clone(),
                None => return Ok(()),
            }
        };

        if !slot.begin_closing() {
            let mut closed = slot.closed_signal();
            while !*closed.borrow() {
                if closed.changed().await.is_err() {
                    break;
                }
            }
            return Ok(());
        }

        info!("Closing spider {} ({})", spider.name(), reason);

        // Wait for in-flight requests to drain
        let mut drain = slot.drain_signal();
        while !*drain.borrow() {
            if drain.changed().await.is_err() {
                break;
            }
        }

        slot.stop_heartbeat();

        // Teardown continues past individual step failures
        if let Err(e) = self.downloader.close_spider(&**spider).await {
            error!("Error closing downloader for {}: {}", spider.name(), e);
        }
        if let Err(e) = self.scraper.close_spider(&**spider).await {
            error!("Error closing scraper for {}: {}", spider.name(), e);
        }
        if let Err(e) = slot.scheduler.close(reason).await {
            error!("Error closing scheduler for {}: {}", spider.name(), e);
        }

        {
            let mut stats = self.stats.write().await;
            if let Some(stats) = stats.get_mut(spider.name()) {
                stats.end_time = Some(Instant::now());
                stats.finish_reason = Some(reason.to_string());
                info!(
                    "Spider {} closed ({}): {} responses, {} items, {} errors in {:.1}s",
                    spider.name(),
                    reason,
                    stats.response_count,
                    stats.item_count,
                    stats.error_count,
                    stats.duration().unwrap_or_default().as_secs_f64()
                );
            }
        }

        self.signals
            .send_catch_log(
                Signal::SpiderClosed,
                SignalArgs::SpiderClosed {
                    spider: spider.clone(),
                    reason: reason.to_string(),
                },
            )
            .await;

        self.slots.write().await.remove(spider.name());

        if let Err(e) = spider.closed(reason).await {
            error!("Error in closed hook for spider {}: {}", spider.name(), e);
        }

        if let Some(callback) = self.spider_finished.lock().unwrap().as_ref() {
            callback(spider.name(), reason);
        }

        slot.mark_closed();
        Ok(())
    }

    async fn needs_backout(&self, slot: &Arc<Slot>) -> bool {
        *self.state.read().await != EngineState::Running
            || slot.is_closing()
            || self.downloader.needs_backout()
            || self.scraper.needs_backout()
    }

    async fn schedule_request(
        &self,
        request: Request,
        spider: &Arc<dyn Spider>,
        slot: &Arc<Slot>,
    ) -> Result<()> {
        let admitted = slot.scheduler.enqueue_request(request.clone()).await?;
        if admitted {
            self.with_stats(spider.name(), |stats| stats.request_scheduled_count += 1)
                .await;
            self.signals
                .send_catch_log(Signal::RequestScheduled, SignalArgs::Request(Box::new(request)))
                .await;
        } else {
            debug!("Request {} dropped by scheduler", request.url);
        }
        // Re-arm even on a dedupe drop so the next start request is not
        // left waiting for the heartbeat
        slot.next_call.schedule();
        Ok(())
    }

    /// Register the request as in flight and spawn its resolution.
    ///
    /// The fetch future is obtained, and the request added to the slot,
    /// before anything is spawned, so the pull loop's next backpressure
    /// check already sees this dispatch.
    fn dispatch(self: &Arc<Self>, request: Request, spider: &Arc<dyn Spider>, slot: &Arc<Slot>) {
        slot.add_request(&request);
        let outcome = self.downloader.fetch(request.clone(), spider.clone());

        let engine = Arc::clone(self);
        let spider = spider.clone();
        let guard = DispatchGuard {
            slot: slot.clone(),
            request,
        };
        tokio::spawn(async move {
            let outcome = outcome.await;
            if let Err(e) = engine
                .handle_outcome(outcome, &guard.request, &spider, &guard.slot)
                .await
            {
                error!("Error handling outcome of {}: {}", guard.request.url, e);
            }
        });
    }

    async fn handle_outcome(
        &self,
        outcome: DownloadOutcome,
        request: &Request,
        spider: &Arc<dyn Spider>,
        slot: &Arc<Slot>,
    ) -> Result<()> {
        match outcome {
            DownloadOutcome::Response(response) => {
                info!("Crawled ({}) {}", response.status, response.url);
                self.with_stats(spider.name(), |stats| stats.response_count += 1)
                    .await;
                self.signals
                    .send_catch_log(Signal::ResponseReceived, SignalArgs::Response(response.clone()))
                    .await;

                match self
                    .scraper
                    .enqueue_scrape(ScrapeInput::Response(response), request, spider.clone())
                    .await
                {
                    Ok(output) => {
                        self.with_stats(spider.name(), |stats| {
                            stats.item_count += output.item_count
                        })
                        .await;
                        for follow_up in output.requests {
                            if let Err(e) = self.schedule_request(follow_up, spider, slot).await {
                                error!("Error scheduling follow-up request: {}", e);
                            }
                        }
                    }
                    Err(e) => {
                        error!("Error scraping {}: {}", request.url, e);
                        self.with_stats(spider.name(), |stats| stats.error_count += 1)
                            .await;
                    }
                }
            }
            DownloadOutcome::Redirect(redirected) => {
                debug!("Redirected {} -> {}", request.url, redirected.url);
                self.schedule_request(*redirected, spider, slot).await?;
            }
            DownloadOutcome::Failure(e) => {
                error!("Error downloading {}: {}", request.url, e);
                self.with_stats(spider.name(), |stats| stats.error_count += 1)
                    .await;
                if let Err(scrape_err) = self
                    .scraper
                    .enqueue_scrape(ScrapeInput::Failure(e), request, spider.clone())
                    .await
                {
                    error!(
                        "Error handling download failure of {}: {}",
                        request.url, scrape_err
                    );
                }
            }
        }
        Ok(())
    }

    /// Idle handling: let listeners veto the close, otherwise shut the
    /// spider down with reason "finished".
    async fn spider_idle(self: &Arc<Self>, spider: &Arc<dyn Spider>, slot: &Arc<Slot>) {
        let errors = self
            .signals
            .send_collect(Signal::SpiderIdle, SignalArgs::Spider(spider.clone()))
            .await;

        let mut vetoed = false;
        for e in errors {
            if e.is_dont_close() {
                vetoed = true;
            } else {
                error!("Error in spider_idle handler for {}: {}", spider.name(), e);
            }
        }

        if vetoed {
            debug!("Close of idle spider {} vetoed", spider.name());
            slot.next_call.schedule_after(self.config.idle_poll_delay());
            return;
        }

        if !slot.is_closing() && self.spider_is_idle(slot).await {
            let engine = Arc::clone(self);
            let spider = spider.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.close_spider(&spider, "finished").await {
                    error!("Error closing idle spider {}: {}", spider.name(), e);
                }
            });
        }
    }

    async fn with_stats(&self, spider_name: &str, f: impl FnOnce(&mut CrawlStats)) {
        if let Some(stats) = self.stats.write().await.get_mut(spider_name) {
            f(stats);
        }
    }

    fn spawn_heartbeat(&self, slot: &Arc<Slot>) {
        let weak = Arc::downgrade(slot);
        let interval = self.config.heartbeat_interval();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match weak.upgrade() {
                    Some(slot) => slot.next_call.schedule(),
                    None => break,
                }
            }
        });
        slot.set_heartbeat(handle);
    }

    fn spawn_stats_logger(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let interval = self.config.stats_interval();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(engine) = weak.upgrade() else { break };
                if *engine.state.read().await == EngineState::Stopped {
                    break;
                }
                for (name, stats) in engine.stats.read().await.iter() {
                    info!(
                        "Stats for {}: {} scheduled, {} responses, {} items, {} errors ({:.2} rps)",
                        name,
                        stats.request_scheduled_count,
                        stats.response_count,
                        stats.item_count,
                        stats.error_count,
                        stats.requests_per_second()
                    );
                }
            }
        });
    }
}
