use crate::crawler::AttemptLimit;
use serde::Deserialize;

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    pub proxy: Option<ProxyConfig>,
    /// Sites crawled by the command line tool
    #[serde(rename = "seed", default)]
    pub seeds: Vec<SeedConfig>,
}

/// Scheduling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Worker loops per crawl
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Admissions allowed per task, or "unbounded"
    #[serde(rename = "attempts-limit", default)]
    pub attempts_limit: AttemptLimit,

    /// Fetches in flight across all crawls of the process
    #[serde(rename = "max-concurrent-fetches", default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Capacity of each crawl's result channel
    #[serde(rename = "result-buffer", default = "default_result_buffer")]
    pub result_buffer: usize,

    /// HTTP statuses that fail a crawl instead of being retried
    #[serde(rename = "fatal-statuses", default = "default_fatal_statuses")]
    pub fatal_statuses: Vec<u16>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            attempts_limit: AttemptLimit::default(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            result_buffer: default_result_buffer(),
            fatal_statuses: default_fatal_statuses(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Set to false to accept invalid TLS certificates
    #[serde(rename = "verify-tls", default = "default_true")]
    pub verify_tls: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            verify_tls: true,
        }
    }
}

/// Proxy rotation configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    /// Proxy URLs (http, https or socks5), used round-robin
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// A site crawled by the command line tool
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    /// Entry page
    pub url: String,

    /// Link hops followed from the entry page
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Only follow links on the entry page's domain
    #[serde(rename = "same-domain", default = "default_true")]
    pub same_domain: bool,

    /// Overrides `crawler.workers` for this site
    pub workers: Option<usize>,
}

fn default_workers() -> usize {
    4
}

fn default_max_concurrent_fetches() -> usize {
    16
}

fn default_result_buffer() -> usize {
    256
}

fn default_fatal_statuses() -> Vec<u16> {
    vec![404]
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("sumi-harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_depth() -> u32 {
    2
}

fn default_true() -> bool {
    true
}
