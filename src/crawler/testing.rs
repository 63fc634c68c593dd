//! Transport doubles for unit tests

use crate::crawler::fetcher::{FetchError, Response, Transport};
use crate::crawler::task::Request;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Answers each URL from a script, then with an empty 200
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Result<Response, FetchError>>>>,
    fetches: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script<I>(self, url: &str, outcomes: I) -> Self
    where
        I: IntoIterator<Item = Result<Response, FetchError>>,
    {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), outcomes.into_iter().collect());
        self
    }

    pub(crate) fn fetch_count(&self, url: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|(fetched, _)| fetched == url)
            .count()
    }

    pub(crate) fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub(crate) fn proxies_used(&self) -> Vec<Option<String>> {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .map(|(_, proxy)| proxy.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, request: &Request, proxy: Option<&str>) -> Result<Response, FetchError> {
        self.fetches
            .lock()
            .unwrap()
            .push((request.url.clone(), proxy.map(str::to_string)));

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(VecDeque::pop_front);

        scripted.unwrap_or_else(|| Ok(Response::new(request.url.clone(), 200, "")))
    }
}

/// Counts fetches in flight; can hang forever on selected URLs
pub(crate) struct ProbeTransport {
    active: Arc<AtomicUsize>,
    peak: AtomicUsize,
    delay: Duration,
    hang_on: Option<String>,
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ProbeTransport {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            peak: AtomicUsize::new(0),
            delay,
            hang_on: None,
        }
    }

    /// Never answers URLs containing `fragment`
    pub(crate) fn hanging_on(mut self, fragment: &str) -> Self {
        self.hang_on = Some(fragment.to_string());
        self
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ProbeTransport {
    async fn fetch(&self, request: &Request, _proxy: Option<&str>) -> Result<Response, FetchError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(Arc::clone(&self.active));

        if let Some(fragment) = &self.hang_on {
            if request.url.contains(fragment.as_str()) {
                std::future::pending::<()>().await;
            }
        }

        tokio::time::sleep(self.delay).await;
        Ok(Response::new(request.url.clone(), 200, ""))
    }
}

/// Panics instead of answering URLs containing a fragment
pub(crate) struct PanickingTransport {
    fragment: String,
    fetches: AtomicUsize,
}

impl PanickingTransport {
    pub(crate) fn on(fragment: &str) -> Self {
        Self {
            fragment: fragment.to_string(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for PanickingTransport {
    async fn fetch(&self, request: &Request, _proxy: Option<&str>) -> Result<Response, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if request.url.contains(self.fragment.as_str()) {
            panic!("connection pool poisoned");
        }
        Ok(Response::new(request.url.clone(), 200, ""))
    }
}
