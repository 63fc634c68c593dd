//! Built-in spider that walks a site by following its links

use crate::config::SeedConfig;
use crate::crawler::{failed, items, parse_page, Handler, ItemStream, Response, Scope, Task};
use crate::spider::Spider;
use crate::url::{extract_domain, normalize_url, within_domain};
use crate::UrlError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

/// One crawled page, as printed by the command line tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRecord {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    /// Link hops from the seed page
    pub depth: u32,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Normalized links found on the page
    pub links: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Follows links breadth-first from a seed URL up to a maximum depth
#[derive(Debug, Clone)]
pub struct SiteSpider {
    name: String,
    seed: Url,
    max_depth: u32,
    same_domain: bool,
    workers: Option<usize>,
}

impl SiteSpider {
    /// Creates a spider for `seed`, named after its domain
    ///
    /// Defaults to depth 2 and same-domain links only.
    pub fn new(seed: &str) -> Result<Self, UrlError> {
        let seed = normalize_url(seed)?;
        let name = extract_domain(&seed).ok_or(UrlError::MissingDomain)?;

        Ok(Self {
            name,
            seed,
            max_depth: 2,
            same_domain: true,
            workers: None,
        })
    }

    pub fn from_seed(config: &SeedConfig) -> Result<Self, UrlError> {
        let spider = Self::new(&config.url)?
            .with_max_depth(config.max_depth)
            .with_same_domain(config.same_domain);

        Ok(match config.workers {
            Some(workers) => spider.with_workers(workers),
            None => spider,
        })
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_same_domain(mut self, same_domain: bool) -> Self {
        self.same_domain = same_domain;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn seed(&self) -> &Url {
        &self.seed
    }
}

impl Spider for SiteSpider {
    type Item = PageRecord;

    fn name(&self) -> &str {
        &self.name
    }

    fn entry_point(&self) -> Task<PageRecord> {
        let handler = PageHandler {
            depth: 0,
            max_depth: self.max_depth,
            domain: self.same_domain.then(|| self.name.clone()),
        };
        Task::with_handler(self.seed.as_str(), Arc::new(handler))
    }

    fn workers(&self) -> Option<usize> {
        self.workers
    }
}

/// Records a page and schedules its links one level deeper
struct PageHandler {
    depth: u32,
    max_depth: u32,
    /// Links outside this domain are recorded but not followed
    domain: Option<String>,
}

impl PageHandler {
    fn followable(&self, url: &Url) -> bool {
        self.domain
            .as_deref()
            .map_or(true, |domain| within_domain(url, domain))
    }
}

impl Handler<PageRecord> for PageHandler {
    fn handle(&self, response: Response, scope: &Scope<PageRecord>) -> ItemStream<PageRecord> {
        let base = match Url::parse(response.url()) {
            Ok(base) => base,
            Err(e) => return failed(anyhow::anyhow!("unusable page URL {}: {}", response.url(), e)),
        };

        let page = parse_page(&response.html(), &base);

        let mut seen = HashSet::new();
        let links: Vec<Url> = page
            .links
            .iter()
            .filter_map(|link| normalize_url(link).ok())
            .filter(|url| seen.insert(url.to_string()))
            .collect();

        if self.depth < self.max_depth {
            let child: Arc<dyn Handler<PageRecord>> = Arc::new(PageHandler {
                depth: self.depth + 1,
                max_depth: self.max_depth,
                domain: self.domain.clone(),
            });

            let scheduled = links
                .iter()
                .filter(|url| self.followable(url))
                .filter(|url| scope.follow(url.as_str(), Arc::clone(&child)))
                .count();
            tracing::debug!(
                "{} at depth {}: {} links, {} new",
                base,
                self.depth,
                links.len(),
                scheduled
            );
        }

        items([PageRecord {
            url: response.url().to_string(),
            status: response.status(),
            depth: self.depth,
            title: page.title,
            description: page.description,
            links: links.into_iter().map(String::from).collect(),
            fetched_at: Utc::now(),
        }])
    }
}
