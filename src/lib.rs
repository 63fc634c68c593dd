//! Sumi-Harvest: a concurrent crawling engine
//!
//! This crate fetches pages over HTTP, hands each page to a handler that may
//! schedule further requests, and keeps going until no work remains. The
//! scheduling core (frontier, workers, orchestrator) lives in [`crawler`];
//! [`spider`] packages entry points and handlers into reusable crawls.

pub mod config;
pub mod crawler;
pub mod proxy;
pub mod spider;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Crawl(#[from] CrawlingError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// A handler failed while processing a fetched page
///
/// Never retried: the page was fetched fine, so fetching it again will not
/// fix a processing bug.
#[derive(Debug, Error)]
#[error("handler failed for {request}: {source}")]
pub struct ScrapingError {
    request: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl ScrapingError {
    pub fn new(request: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            request: request.into(),
            source: source.into(),
        }
    }

    /// The request whose handler failed
    pub fn request(&self) -> &str {
        &self.request
    }
}

/// A condition that stops a worker loop and fails the whole crawl
#[derive(Debug, Error)]
pub enum FatalError {
    #[error(transparent)]
    AttemptsExceeded(#[from] crawler::AttemptsExceeded),

    #[error("HTTP status {status} is configured as fatal")]
    FatalStatus { status: u16 },

    #[error(transparent)]
    Scraping(#[from] ScrapingError),

    /// A crawl task ended without reporting an outcome
    #[error("crawl task died: {0}")]
    TaskLost(String),
}

/// The only error a crawl reports to its caller
///
/// Carries the request that triggered the failure; the underlying
/// [`FatalError`] is available through [`CrawlingError::cause`] and
/// `std::error::Error::source`.
#[derive(Debug, Error)]
#[error("crawl failed at {request}: {cause}")]
pub struct CrawlingError {
    request: String,
    #[source]
    cause: FatalError,
}

impl CrawlingError {
    pub fn new(request: impl Into<String>, cause: impl Into<FatalError>) -> Self {
        Self {
            request: request.into(),
            cause: cause.into(),
        }
    }

    /// The request (`METHOD url`) being processed when the crawl failed
    pub fn request(&self) -> &str {
        &self.request
    }

    pub fn cause(&self) -> &FatalError {
        &self.cause
    }
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{
    items, nothing, CrawlOptions, CrawlState, CrawlStream, Crawler, Frontier, ItemStream,
    Response, Scope, Task,
};
pub use spider::{SiteSpider, Spider, SpiderRegistry};
pub use url::{extract_domain, normalize_url};
