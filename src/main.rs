//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest crawling engine.

use clap::Parser;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use sumi_harvest::config::{load_config_with_hash, Config};
use sumi_harvest::crawler::AttemptLimit;
use sumi_harvest::{Crawler, SiteSpider, Spider};
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: a concurrent crawling engine
///
/// Crawls every `[[seed]]` of the configuration by following links up to the
/// seed's depth, and prints one JSON object per fetched page on stdout.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version)]
#[command(about = "A concurrent crawling engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Worker loops per crawl (overrides crawler.workers)
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Admissions allowed per task (overrides crawler.attempts-limit)
    #[arg(long, value_name = "N")]
    attempts: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let mut config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    apply_overrides(&mut config, &cli)?;

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else {
        handle_crawl(&config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr; stdout carries the crawl output.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies command line overrides on top of the loaded configuration
fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(workers) = cli.workers {
        if !(1..=256).contains(&workers) {
            return Err(format!("--workers must be between 1 and 256, got {}", workers).into());
        }
        config.crawler.workers = workers;
    }

    if let Some(attempts) = cli.attempts {
        if attempts == 0 {
            return Err("--attempts must be >= 1".into());
        }
        config.crawler.attempts_limit = AttemptLimit::Bounded(attempts);
    }

    Ok(())
}

fn build_spiders(config: &Config) -> Result<Vec<SiteSpider>, Box<dyn std::error::Error>> {
    config
        .seeds
        .iter()
        .map(|seed| SiteSpider::from_seed(seed).map_err(Into::into))
        .collect()
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let spiders = build_spiders(config)?;

    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers per crawl: {}", config.crawler.workers);
    println!("  Attempts limit: {}", config.crawler.attempts_limit);
    println!(
        "  Max concurrent fetches: {}",
        config.crawler.max_concurrent_fetches
    );
    println!("  Result buffer: {}", config.crawler.result_buffer);
    println!("  Fatal statuses: {:?}", config.crawler.fatal_statuses);

    println!("\nTransport:");
    println!("  User agent: {}", config.transport.user_agent);
    println!(
        "  Timeouts: {}s total, {}s connect",
        config.transport.timeout_secs, config.transport.connect_timeout_secs
    );
    println!("  Verify TLS: {}", config.transport.verify_tls);

    let proxies = config
        .proxy
        .as_ref()
        .map(|p| p.addresses.as_slice())
        .unwrap_or_default();
    println!("\nProxies ({}):", proxies.len());
    for address in proxies {
        println!("  - {}", address);
    }

    println!("\nSeeds ({}):", config.seeds.len());
    for (seed, spider) in config.seeds.iter().zip(&spiders) {
        println!(
            "  - {} (depth {}, {}, {} workers)",
            spider.seed(),
            seed.max_depth,
            if seed.same_domain {
                "same domain"
            } else {
                "any domain"
            },
            spider.workers().unwrap_or(config.crawler.workers)
        );
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start {} crawls", spiders.len());

    Ok(())
}

/// Handles the main crawl operation
///
/// All seeds are crawled concurrently; pages are printed as they arrive. A
/// failed crawl does not stop the others, but makes the run fail.
async fn handle_crawl(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let spiders = build_spiders(config)?;
    if spiders.is_empty() {
        tracing::warn!("No [[seed]] entries configured, nothing to crawl");
        return Ok(());
    }

    let crawler = Crawler::from_config(config)?;
    tracing::info!(
        "Crawling {} seeds with at most {} fetches in flight",
        spiders.len(),
        config.crawler.max_concurrent_fetches
    );

    let mut pages = stream::select_all(spiders.iter().map(|spider| crawler.spider_stream(spider)));
    let mut printed = 0usize;
    let mut failures = 0usize;

    loop {
        tokio::select! {
            next = pages.next() => match next {
                Some(Ok(record)) => {
                    println!("{}", serde_json::to_string(&record)?);
                    printed += 1;
                }
                Some(Err(e)) => {
                    tracing::error!("Crawl failed: {}", e);
                    failures += 1;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, cancelling remaining crawls");
                break;
            }
        }
    }

    // Dropping the streams cancels any crawl still running
    drop(pages);
    tracing::info!("{} pages harvested", printed);

    if failures > 0 {
        return Err(format!("{} of {} crawls failed", failures, spiders.len()).into());
    }

    Ok(())
}
