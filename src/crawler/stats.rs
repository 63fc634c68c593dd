//! Per-crawl counters
//!
//! Workers bump these as they go; the orchestrator reports a snapshot when
//! the crawl ends.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by the workers of one crawl
#[derive(Debug, Default)]
pub struct CrawlStats {
    fetches: AtomicU64,
    retries: AtomicU64,
    items: AtomicU64,
    acknowledged: AtomicU64,
}

impl CrawlStats {
    pub fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_item(&self) {
        self.items.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acknowledged(&self) {
        self.acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fetches: self.fetches.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            items: self.items.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CrawlStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Fetches started, including retries
    pub fetches: u64,
    /// Tasks put back for another attempt
    pub retries: u64,
    /// Items forwarded to the consumer
    pub items: u64,
    /// Tasks fully processed
    pub acknowledged: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fetches, {} retries, {} tasks done, {} items",
            self.fetches, self.retries, self.acknowledged, self.items
        )
    }
}
