//! Crawl core: tasks, frontier, workers and the orchestrator
//!
//! This module contains the scheduling machinery, including:
//! - [`Task`] identity and handlers
//! - The deduplicated, retry-bounded [`Frontier`]
//! - Worker loops that fetch through a [`Transport`]
//! - The [`Crawler`] that runs crawls and streams their items
//! - HTML link and metadata extraction for handlers

mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod stats;
mod task;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{CrawlOptions, CrawlState, CrawlStream, Crawler};
pub use fetcher::{build_http_client, Cookie, FetchError, HttpTransport, Response, Transport};
pub use frontier::{AttemptLimit, AttemptsExceeded, Frontier, Scope};
pub use parser::{parse_page, ParsedPage};
pub use stats::{CrawlStats, StatsSnapshot};
pub use task::{
    failed, items, nothing, Body, Handler, HttpMethod, ItemStream, Request, Task, TaskKey,
};
