use crate::config::types::{Config, CrawlerConfig, ProxyConfig, SeedConfig, TransportConfig};
use crate::crawler::AttemptLimit;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_transport_config(&config.transport)?;
    if let Some(proxy) = &config.proxy {
        validate_proxy_config(proxy)?;
    }
    validate_seeds(&config.seeds)?;
    Ok(())
}

fn check_range(name: &str, value: usize, min: usize, max: usize) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::Validation(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

/// Validates scheduling configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    check_range("workers", config.workers, 1, 256)?;
    check_range(
        "max-concurrent-fetches",
        config.max_concurrent_fetches,
        1,
        1024,
    )?;

    if config.result_buffer < 1 {
        return Err(ConfigError::Validation(
            "result-buffer must be >= 1".to_string(),
        ));
    }

    if config.attempts_limit == AttemptLimit::Bounded(0) {
        return Err(ConfigError::Validation(
            "attempts-limit must be >= 1 or \"unbounded\"".to_string(),
        ));
    }

    if let Some(status) = config
        .fatal_statuses
        .iter()
        .find(|s| !(400..=599).contains(*s))
    {
        return Err(ConfigError::Validation(format!(
            "fatal-statuses may only list HTTP error statuses (400-599), got {}",
            status
        )));
    }

    Ok(())
}

/// Validates HTTP client configuration
fn validate_transport_config(config: &TransportConfig) -> Result<(), ConfigError> {
    if config.timeout_secs == 0 || config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeouts must be at least 1 second".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates proxy addresses
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    for address in &config.addresses {
        let url = Url::parse(address).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid proxy address '{}': {}", address, e))
        })?;

        if !matches!(url.scheme(), "http" | "https" | "socks5" | "socks5h") {
            return Err(ConfigError::Validation(format!(
                "Proxy '{}' must use http, https or socks5",
                address
            )));
        }
    }

    Ok(())
}

/// Validates seed entries
fn validate_seeds(seeds: &[SeedConfig]) -> Result<(), ConfigError> {
    for seed in seeds {
        let url = Url::parse(&seed.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed.url, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use HTTP or HTTPS",
                seed.url
            )));
        }

        if let Some(workers) = seed.workers {
            check_range("seed workers", workers, 1, 256)?;
        }
    }

    Ok(())
}
