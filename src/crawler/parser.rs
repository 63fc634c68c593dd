//! Link and metadata extraction from fetched HTML
//!
//! Followable links are `<a href>` targets and the canonical link. Skipped:
//! - `download` anchors and same-page fragments
//! - `javascript:`, `mailto:`, `tel:` and `data:` targets
//! - anything that does not resolve to http(s)

use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// What a crawled page offers beyond its raw body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    pub title: Option<String>,
    /// `<meta name="description">` content
    pub description: Option<String>,
    /// Absolute http(s) links in document order, without duplicates
    pub links: Vec<String>,
}

/// Extracts title, description and followable links from a document
///
/// # Arguments
///
/// * `document` - Parsed HTML, e.g. from [`Response::html`](crate::Response::html)
/// * `base_url` - URL relative links are resolved against
pub fn parse_page(document: &Html, base_url: &Url) -> ParsedPage {
    ParsedPage {
        title: first_text(document, "title"),
        description: first_attr(document, "meta[name='description'][content]", "content"),
        links: extract_links(document, base_url),
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = selector(css)?;
    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn first_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = selector(css)?;
    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let anchors = selector("a[href]");
    let canonical = selector("link[rel='canonical'][href]");

    let candidates = anchors
        .iter()
        .flat_map(|s| document.select(s))
        .filter(|element| element.value().attr("download").is_none())
        .chain(canonical.iter().flat_map(|s| document.select(s)));

    for element in candidates {
        if let Some(link) = href_of(element).and_then(|href| resolve_link(href, base_url)) {
            if seen.insert(link.clone()) {
                links.push(link);
            }
        }
    }

    links
}

fn href_of(element: ElementRef<'_>) -> Option<&str> {
    element.value().attr("href")
}

/// Resolves `href` against `base_url`, or `None` when it is not followable
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    const SKIPPED: [&str; 4] = ["javascript:", "mailto:", "tel:", "data:"];
    let lowered = href.to_ascii_lowercase();
    if SKIPPED.iter().any(|scheme| lowered.starts_with(scheme)) {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    matches!(absolute.scheme(), "http" | "https").then(|| absolute.to_string())
}
