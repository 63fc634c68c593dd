//! Worker loop: dequeue, fetch, handle, report
//!
//! Transient fetch failures are retried through the frontier and never leave
//! the worker. Fatal conditions end the loop and are reported once on the
//! result channel.

use crate::crawler::fetcher::{FetchError, Response, Transport};
use crate::crawler::frontier::{Frontier, Scope};
use crate::crawler::stats::CrawlStats;
use crate::crawler::task::Task;
use crate::proxy::ProxyRotator;
use crate::{CrawlingError, FatalError, ScrapingError};
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

/// Values multiplexed on a crawl's result channel
pub(crate) enum CrawlEvent<T> {
    /// One handler-emitted item
    Item(T),
    /// A worker hit a fatal condition
    Failed(CrawlingError),
    /// The frontier drained; no more items will come
    Finished,
}

/// Why a worker loop ended
enum Exit {
    /// The frontier was closed
    Closed,
    /// The result consumer is gone
    Abandoned,
    Fatal(CrawlingError),
}

/// One fetch/handle loop bound to a frontier
pub(crate) struct Worker<T> {
    pub(crate) id: usize,
    pub(crate) frontier: Arc<Frontier<T>>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) proxies: Option<Arc<ProxyRotator>>,
    pub(crate) limiter: Arc<Semaphore>,
    pub(crate) fatal_statuses: Arc<[u16]>,
    pub(crate) results: mpsc::Sender<CrawlEvent<T>>,
    pub(crate) stats: Arc<CrawlStats>,
}

impl<T: Send + 'static> Worker<T> {
    /// Runs until the frontier closes, the consumer leaves or a fatal
    /// condition occurs
    pub(crate) async fn run(self) {
        match self.work().await {
            Exit::Closed => tracing::debug!("Worker {} finished: frontier closed", self.id),
            Exit::Abandoned => {
                tracing::debug!("Worker {} stopped: result consumer went away", self.id)
            }
            Exit::Fatal(error) => {
                tracing::warn!("Worker {} stopped: {}", self.id, error);
                let _ = self.results.send(CrawlEvent::Failed(error)).await;
            }
        }
    }

    async fn work(&self) -> Exit {
        while let Some(task) = self.frontier.next().await {
            tracing::debug!(
                "Worker {} picked {} (attempt {})",
                self.id,
                task.request(),
                task.attempts()
            );

            let outcome = match self.fetch(&task).await {
                Ok(response) => self.process(task, response).await,
                Err(error) => self.reschedule(task, error),
            };

            if let Err(exit) = outcome {
                return exit;
            }
        }

        Exit::Closed
    }

    /// Fetches while holding a permit from the global limiter
    ///
    /// A panicking transport counts as a transport failure and is retried.
    async fn fetch(&self, task: &Task<T>) -> Result<Response, FetchError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| FetchError::Transport("concurrency limiter closed".to_string()))?;

        let proxy = self.proxies.as_ref().and_then(|p| p.next());
        self.stats.record_fetch();

        AssertUnwindSafe(self.transport.fetch(task.request(), proxy.as_deref()))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(FetchError::Transport(format!(
                    "transport panicked: {}",
                    panic_message(payload.as_ref())
                )))
            })
    }

    /// Routes a failed fetch: fatal status, retry, or attempts exhausted
    fn reschedule(&self, task: Task<T>, error: FetchError) -> Result<(), Exit> {
        if let FetchError::HttpStatus { status } = error {
            if self.fatal_statuses.contains(&status) {
                return Err(Exit::Fatal(CrawlingError::new(
                    task.request().to_string(),
                    FatalError::FatalStatus { status },
                )));
            }
        }

        tracing::warn!(
            "Fetch of {} failed on attempt {}: {}",
            task.request(),
            task.attempts(),
            error
        );

        let request = task.request().to_string();
        match self.frontier.repeat(task) {
            Ok(()) => {
                self.stats.record_retry();
                Ok(())
            }
            Err(exceeded) => Err(Exit::Fatal(CrawlingError::new(request, exceeded))),
        }
    }

    /// Runs the handler, forwards its items, then acknowledges the task
    async fn process(&self, task: Task<T>, response: Response) -> Result<(), Exit> {
        let request = task.request().to_string();
        let scope = Scope::new(Arc::clone(&self.frontier));
        let handler = task.handler();

        let mut items = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(response, &scope)))
            .map_err(|payload| scraping_failure(&request, panicked(payload.as_ref())))?;

        loop {
            match AssertUnwindSafe(items.next()).catch_unwind().await {
                Ok(Some(Ok(item))) => {
                    self.stats.record_item();
                    if self.results.send(CrawlEvent::Item(item)).await.is_err() {
                        return Err(Exit::Abandoned);
                    }
                }
                Ok(Some(Err(error))) => return Err(scraping_failure(&request, error)),
                Ok(None) => break,
                Err(payload) => {
                    return Err(scraping_failure(&request, panicked(payload.as_ref())))
                }
            }
        }
        drop(items);

        // Counted first so the snapshot is final once the frontier drains
        self.stats.record_acknowledged();
        self.frontier.acknowledge();
        tracing::debug!("Worker {} completed {}", self.id, request);

        Ok(())
    }
}

fn scraping_failure(request: &str, error: anyhow::Error) -> Exit {
    Exit::Fatal(CrawlingError::new(
        request,
        ScrapingError::new(request, error),
    ))
}

fn panicked(payload: &(dyn Any + Send)) -> anyhow::Error {
    anyhow::anyhow!("handler panicked: {}", panic_message(payload))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
