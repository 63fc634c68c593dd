//! Crawler coordinator - crawl orchestration
//!
//! This module contains the orchestrator that coordinates one or many crawls,
//! including:
//! - Seeding a fresh frontier and launching the worker pool
//! - Sharing one fetch limiter across every crawl of a [`Crawler`]
//! - Turning the result channel into a lazy [`CrawlStream`]
//! - Tearing workers down on completion, failure or cancellation

use crate::config::{Config, CrawlerConfig};
use crate::crawler::fetcher::{HttpTransport, Transport};
use crate::crawler::frontier::{AttemptLimit, Frontier};
use crate::crawler::stats::{CrawlStats, StatsSnapshot};
use crate::crawler::task::Task;
use crate::crawler::worker::{panic_message, CrawlEvent, Worker};
use crate::proxy::ProxyRotator;
use crate::spider::Spider;
use crate::{CrawlingError, FatalError, HarvestError};
use futures::{Stream, TryStreamExt};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// Per-crawl settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOptions {
    /// Worker loops launched for the crawl
    pub workers: usize,
    pub attempts_limit: AttemptLimit,
    /// HTTP statuses that fail the crawl instead of being retried
    pub fatal_statuses: Vec<u16>,
    /// Capacity of the result channel
    pub result_buffer: usize,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            attempts_limit: AttemptLimit::default(),
            fatal_statuses: vec![404],
            result_buffer: 256,
        }
    }
}

impl From<&CrawlerConfig> for CrawlOptions {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            workers: config.workers,
            attempts_limit: config.attempts_limit,
            fatal_statuses: config.fatal_statuses.clone(),
            result_buffer: config.result_buffer,
        }
    }
}

/// Runs crawls against a shared transport and fetch limiter
#[derive(Clone)]
pub struct Crawler {
    transport: Arc<dyn Transport>,
    limiter: Arc<Semaphore>,
    proxies: Option<Arc<ProxyRotator>>,
    defaults: CrawlOptions,
}

impl Crawler {
    /// Creates a crawler whose crawls never have more than
    /// `max_concurrent_fetches` fetches in flight between them
    pub fn new(transport: Arc<dyn Transport>, max_concurrent_fetches: usize) -> Self {
        Self {
            transport,
            limiter: Arc::new(Semaphore::new(max_concurrent_fetches.max(1))),
            proxies: None,
            defaults: CrawlOptions::default(),
        }
    }

    /// Builds a crawler backed by [`HttpTransport`] from a loaded config
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Crawler with one HTTP client per proxy address
    /// * `Err(HarvestError)` - An HTTP client could not be built
    pub fn from_config(config: &Config) -> Result<Self, HarvestError> {
        let addresses = config
            .proxy
            .as_ref()
            .map(|p| p.addresses.clone())
            .unwrap_or_default();

        let transport = HttpTransport::with_proxies(&config.transport, &addresses)?;
        let mut crawler = Self::new(Arc::new(transport), config.crawler.max_concurrent_fetches)
            .with_defaults(CrawlOptions::from(&config.crawler));

        if !addresses.is_empty() {
            tracing::info!("Rotating requests over {} proxies", addresses.len());
            crawler = crawler.with_proxies(ProxyRotator::new(addresses));
        }

        Ok(crawler)
    }

    pub fn with_proxies(mut self, proxies: ProxyRotator) -> Self {
        self.proxies = Some(Arc::new(proxies));
        self
    }

    /// Options used by [`Crawler::spider_stream`] and friends
    pub fn with_defaults(mut self, defaults: CrawlOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &CrawlOptions {
        &self.defaults
    }

    /// Prepares a crawl starting at `entry`
    ///
    /// Nothing runs until the returned stream is first polled.
    pub fn crawl<T: Send + 'static>(&self, entry: Task<T>, options: CrawlOptions) -> CrawlStream<T> {
        CrawlStream {
            state: CrawlState::Idle,
            launch: Some(Launch {
                entry,
                options,
                transport: Arc::clone(&self.transport),
                proxies: self.proxies.clone(),
                limiter: Arc::clone(&self.limiter),
            }),
            results: None,
            frontier: None,
            tasks: JoinSet::new(),
            stats: Arc::new(CrawlStats::default()),
            started: None,
        }
    }

    /// Prepares a crawl of `spider` with the default options and the
    /// spider's own worker count
    pub fn spider_stream<S: Spider + ?Sized>(&self, spider: &S) -> CrawlStream<S::Item> {
        let mut options = self.defaults.clone();
        if let Some(workers) = spider.workers() {
            options.workers = workers;
        }

        tracing::info!("Launching spider {}", spider.name());
        self.crawl(spider.entry_point(), options)
    }

    /// Runs one spider to completion
    pub async fn run_spider<S: Spider + ?Sized>(
        &self,
        spider: &S,
    ) -> Result<Vec<S::Item>, CrawlingError> {
        self.spider_stream(spider).collect_items().await
    }

    /// Runs several spiders concurrently against the same limiter
    ///
    /// Results come back in input order, one per spider.
    pub async fn run_all<S: Spider>(
        &self,
        spiders: &[S],
    ) -> Vec<Result<Vec<S::Item>, CrawlingError>> {
        futures::future::join_all(spiders.iter().map(|spider| self.run_spider(spider))).await
    }
}

/// Lifecycle of a [`CrawlStream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    /// Not polled yet; nothing is running
    Idle,
    Running,
    /// The frontier drained and every item was delivered
    Completed,
    /// A worker hit a fatal condition
    Failed,
    /// Stopped before completion by the consumer
    Cancelled,
}

impl CrawlState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Everything needed to start a crawl on first poll
struct Launch<T> {
    entry: Task<T>,
    options: CrawlOptions,
    transport: Arc<dyn Transport>,
    proxies: Option<Arc<ProxyRotator>>,
    limiter: Arc<Semaphore>,
}

/// Lazy sequence of the items a crawl produces
///
/// Yields `Ok(item)` in arrival order. Ends with `None` once the frontier
/// drains, or with a single `Err(CrawlingError)` followed by `None` when a
/// worker fails. Dropping the stream cancels every worker of the crawl.
pub struct CrawlStream<T> {
    state: CrawlState,
    launch: Option<Launch<T>>,
    results: Option<mpsc::Receiver<CrawlEvent<T>>>,
    frontier: Option<Arc<Frontier<T>>>,
    tasks: JoinSet<()>,
    stats: Arc<CrawlStats>,
    started: Option<Instant>,
}

// No field is ever pinned in place.
impl<T> Unpin for CrawlStream<T> {}

impl<T> CrawlStream<T> {
    pub fn state(&self) -> CrawlState {
        self.state
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stops the crawl; the stream yields nothing more
    pub fn cancel(&mut self) {
        match self.state {
            CrawlState::Idle => {
                self.launch = None;
                self.state = CrawlState::Cancelled;
            }
            CrawlState::Running => self.finish(CrawlState::Cancelled),
            _ => {}
        }
    }

    /// Aborts every task of the crawl and records the final state
    fn finish(&mut self, state: CrawlState) {
        self.tasks.abort_all();
        self.results = None;
        if let Some(frontier) = self.frontier.take() {
            frontier.close();
        }
        self.state = state;

        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        tracing::info!("Crawl {} after {:?}: {}", state, elapsed, self.stats.snapshot());
    }
}

impl<T: Send + 'static> CrawlStream<T> {
    /// Drains the crawl into a vector, or returns the error that failed it
    pub async fn collect_items(self) -> Result<Vec<T>, CrawlingError> {
        self.try_collect().await
    }

    fn start(&mut self, launch: Launch<T>) {
        let Launch {
            entry,
            options,
            transport,
            proxies,
            limiter,
        } = launch;

        tracing::info!(
            "Starting crawl at {} with {} workers (attempts limit {})",
            entry.request(),
            options.workers,
            options.attempts_limit
        );

        let frontier = Arc::new(Frontier::new(options.attempts_limit));
        frontier.schedule(entry);

        let (tx, rx) = mpsc::channel(options.result_buffer.max(1));
        let fatal_statuses: Arc<[u16]> = options.fatal_statuses.into();

        for id in 0..options.workers.max(1) {
            let worker = Worker {
                id,
                frontier: Arc::clone(&frontier),
                transport: Arc::clone(&transport),
                proxies: proxies.clone(),
                limiter: Arc::clone(&limiter),
                fatal_statuses: Arc::clone(&fatal_statuses),
                results: tx.clone(),
                stats: Arc::clone(&self.stats),
            };
            self.tasks.spawn(worker.run());
        }

        let watched = Arc::clone(&frontier);
        self.tasks.spawn(async move {
            watched.join().await;
            watched.close();
            tracing::debug!("Frontier drained after {} tasks", watched.known());
            let _ = tx.send(CrawlEvent::Finished).await;
        });

        self.frontier = Some(frontier);
        self.results = Some(rx);
        self.started = Some(Instant::now());
        self.state = CrawlState::Running;
    }
}

impl<T: Send + 'static> Stream for CrawlStream<T> {
    type Item = Result<T, CrawlingError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(launch) = this.launch.take() {
            this.start(launch);
        }

        if this.results.is_none() {
            return Poll::Ready(None);
        }

        // A task that died would leave its work outstanding forever
        while let Poll::Ready(Some(joined)) = this.tasks.poll_join_next(cx) {
            let Err(error) = joined else { continue };
            let reason = if error.is_panic() {
                panic_message(error.into_panic().as_ref())
            } else {
                error.to_string()
            };
            tracing::error!("A crawl task died: {}", reason);
            this.finish(CrawlState::Failed);
            return Poll::Ready(Some(Err(CrawlingError::new(
                "crawl task",
                FatalError::TaskLost(reason),
            ))));
        }

        let Some(results) = this.results.as_mut() else {
            return Poll::Ready(None);
        };

        match ready!(results.poll_recv(cx)) {
            Some(CrawlEvent::Item(item)) => Poll::Ready(Some(Ok(item))),
            Some(CrawlEvent::Finished) => {
                this.finish(CrawlState::Completed);
                Poll::Ready(None)
            }
            Some(CrawlEvent::Failed(error)) => {
                this.finish(CrawlState::Failed);
                Poll::Ready(Some(Err(error)))
            }
            None => {
                tracing::warn!("Every crawl task exited without reporting an outcome");
                this.finish(CrawlState::Cancelled);
                Poll::Ready(None)
            }
        }
    }
}

impl<T> Drop for CrawlStream<T> {
    fn drop(&mut self) {
        if self.state == CrawlState::Running {
            self.finish(CrawlState::Cancelled);
        }
    }
}
