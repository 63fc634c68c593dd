//! Spiders: named, reusable crawl definitions
//!
//! A [`Spider`] bundles an entry task with the worker count it wants. The
//! [`SpiderRegistry`] picks the spider responsible for a URL, and
//! [`Crawler::run_all`](crate::Crawler::run_all) runs many spiders at once.

mod site;

pub use site::{PageRecord, SiteSpider};

use crate::crawler::Task;

/// A crawl definition
pub trait Spider: Send + Sync {
    /// What the spider's handlers emit
    type Item: Send + 'static;

    fn name(&self) -> &str;

    /// The task each crawl of this spider starts from
    fn entry_point(&self) -> Task<Self::Item>;

    /// Worker loops to run; `None` uses the crawler's default
    fn workers(&self) -> Option<usize> {
        None
    }

    /// Substring a URL must contain for this spider to handle it
    fn pattern(&self) -> &str {
        self.name()
    }

    fn suitable_for(&self, url: &str) -> bool {
        let pattern = self.pattern();
        !pattern.is_empty() && url.contains(pattern)
    }
}

impl<S: Spider + ?Sized> Spider for Box<S> {
    type Item = S::Item;

    fn name(&self) -> &str {
        (**self).name()
    }

    fn entry_point(&self) -> Task<Self::Item> {
        (**self).entry_point()
    }

    fn workers(&self) -> Option<usize> {
        (**self).workers()
    }

    fn pattern(&self) -> &str {
        (**self).pattern()
    }

    fn suitable_for(&self, url: &str) -> bool {
        (**self).suitable_for(url)
    }
}

/// Spiders producing the same item type, looked up by URL
pub struct SpiderRegistry<T: Send + 'static> {
    spiders: Vec<Box<dyn Spider<Item = T>>>,
}

impl<T: Send + 'static> SpiderRegistry<T> {
    pub fn new() -> Self {
        Self {
            spiders: Vec::new(),
        }
    }

    pub fn register<S>(&mut self, spider: S) -> &mut Self
    where
        S: Spider<Item = T> + 'static,
    {
        tracing::debug!("Registered spider {}", spider.name());
        self.spiders.push(Box::new(spider));
        self
    }

    /// First registered spider suitable for `url`
    pub fn find(&self, url: &str) -> Option<&dyn Spider<Item = T>> {
        self.spiders
            .iter()
            .find(|spider| spider.suitable_for(url))
            .map(|spider| &**spider)
    }

    pub fn spiders(&self) -> &[Box<dyn Spider<Item = T>>] {
        &self.spiders
    }

    pub fn len(&self) -> usize {
        self.spiders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spiders.is_empty()
    }
}

impl<T: Send + 'static> Default for SpiderRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
