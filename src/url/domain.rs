use url::Url;

/// Extracts the lowercase host of a URL
///
/// Returns `None` for URLs without a host, such as `data:` URLs.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_harvest::url::extract_domain;
///
/// let url = Url::parse("https://Blog.Example.com:8443/post").unwrap();
/// assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns true if `url` is served by `domain` or one of its subdomains
///
/// A leading `www.` on either side is ignored.
pub fn within_domain(url: &Url, domain: &str) -> bool {
    let Some(host) = extract_domain(url) else {
        return false;
    };

    let host = strip_www(&host);
    let domain = domain.to_lowercase();
    let domain = strip_www(&domain);

    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}
