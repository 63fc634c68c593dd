use crate::UrlError;
use url::Url;

/// Query parameters that only identify where a visitor came from
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "msclkid", "_ga", "ref"];

/// Normalizes a URL so that trivial variants of the same page compare equal
///
/// The result is still fetchable: scheme, host and trailing slashes are
/// kept. Applied steps:
///
/// 1. Parse; only `http` and `https` with a host are accepted
/// 2. Lowercase the host and drop the default port
/// 3. Collapse repeated slashes in the path
/// 4. Drop the fragment
/// 5. Drop tracking parameters (`utm_*` and a fixed list)
/// 6. Sort the remaining query parameters by key, keeping the relative
///    order of repeated keys; an empty query is removed
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::normalize_url;
///
/// let url = normalize_url("https://Example.COM:443//docs?b=2&utm_source=x&a=1#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/docs?a=1&b=2");
/// ```
pub fn normalize_url(raw: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .map(str::to_lowercase)
        .ok_or(UrlError::MissingDomain)?;
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(e.to_string()))?;

    // `Url` already omits a port equal to the scheme default
    let path = collapse_slashes(url.path());
    url.set_path(&path);
    url.set_fragment(None);

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if params.is_empty() {
        url.set_query(None);
    } else {
        params.sort_by(|a, b| a.0.cmp(&b.0));
        url.query_pairs_mut().clear().extend_pairs(&params);
    }

    Ok(url)
}

fn collapse_slashes(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len().max(1));
    for c in path.chars() {
        if c == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(c);
    }
    if collapsed.is_empty() {
        collapsed.push('/');
    }
    collapsed
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
