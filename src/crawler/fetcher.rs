//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - The [`Transport`] seam workers fetch through
//! - Building HTTP clients with proper user agent strings and timeouts
//! - One client per proxy address for rotated requests
//! - Error classification into transport, status and content failures

use crate::config::TransportConfig;
use crate::crawler::task::{Body, Request};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Proxy};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Why a fetch did not produce a usable response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Timeout, refused connection or any other network-level failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server answered with a non-success status
    #[error("HTTP status {status}")]
    HttpStatus { status: u16 },

    /// The body could not be read or decoded
    #[error("unreadable body: {0}")]
    Content(String),
}

/// A cookie set by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// A fetched page with its body already read
#[derive(Debug, Clone)]
pub struct Response {
    url: String,
    status: u16,
    headers: HeaderMap,
    cookies: Vec<Cookie>,
    body: String,
}

impl Response {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: body.into(),
        }
    }

    /// Adds a header; invalid names or values are ignored
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push(Cookie {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Final URL after redirects
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    /// Raw body text
    pub fn text(&self) -> &str {
        &self.body
    }

    /// Parses the body as an HTML document
    pub fn html(&self) -> scraper::Html {
        scraper::Html::parse_document(&self.body)
    }

    /// Parses the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Performs fetches on behalf of workers
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches `request`, through `proxy` when one is given
    async fn fetch(&self, request: &Request, proxy: Option<&str>) -> Result<Response, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The transport configuration
/// * `proxy` - Proxy address all requests of this client go through
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Invalid proxy address or TLS setup failure
pub fn build_http_client(
    config: &TransportConfig,
    proxy: Option<&str>,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .danger_accept_invalid_certs(!config.verify_tls)
        .cookie_store(true)
        .gzip(true)
        .brotli(true);

    if let Some(address) = proxy {
        builder = builder.proxy(Proxy::all(address)?);
    }

    builder.build()
}

/// [`Transport`] backed by `reqwest`
pub struct HttpTransport {
    direct: Client,
    proxied: HashMap<String, Client>,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, reqwest::Error> {
        Self::with_proxies(config, &[])
    }

    /// Builds a direct client plus one client per proxy address
    pub fn with_proxies(config: &TransportConfig, proxies: &[String]) -> Result<Self, reqwest::Error> {
        let direct = build_http_client(config, None)?;
        let mut proxied = HashMap::with_capacity(proxies.len());
        for address in proxies {
            proxied.insert(address.clone(), build_http_client(config, Some(address))?);
        }

        Ok(Self { direct, proxied })
    }

    fn client_for(&self, proxy: Option<&str>) -> &Client {
        match proxy {
            Some(address) => self.proxied.get(address).unwrap_or_else(|| {
                tracing::warn!("No client for proxy {}, fetching directly", address);
                &self.direct
            }),
            None => &self.direct,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &Request, proxy: Option<&str>) -> Result<Response, FetchError> {
        let mut builder = self
            .client_for(proxy)
            .request(request.method.into(), request.url.as_str());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match &request.body {
            Some(Body::Form(fields)) => builder.form(fields),
            Some(Body::Json(json)) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(json.clone()),
            Some(Body::Raw(text)) => builder.body(text.clone()),
            None => builder,
        };

        let response = builder.send().await.map_err(classify_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let url = response.url().to_string();
        let headers = response.headers().clone();
        let cookies = response
            .cookies()
            .map(|c| Cookie {
                name: c.name().to_string(),
                value: c.value().to_string(),
            })
            .collect();

        let body = match &request.charset {
            Some(charset) => response.text_with_charset(charset).await,
            None => response.text().await,
        }
        .map_err(|e| FetchError::Content(e.to_string()))?;

        Ok(Response {
            url,
            status: status.as_u16(),
            headers,
            cookies,
            body,
        })
    }
}

/// Maps a `reqwest` error onto a [`FetchError`]
///
/// Statuses never arrive here; they are checked after `send`.
fn classify_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Transport("Request timeout".to_string())
    } else if error.is_connect() {
        FetchError::Transport(format!("Connection failed: {}", error))
    } else if error.is_body() || error.is_decode() {
        FetchError::Content(error.to_string())
    } else {
        FetchError::Transport(error.to_string())
    }
}
