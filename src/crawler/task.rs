//! Units of crawl work
//!
//! A [`Task`] pairs a [`Request`] with the [`Handler`] that processes its
//! response. Tasks are deduplicated by [`TaskKey`]: URL, method and body.
//! Headers, charset and the handler itself are not part of the identity.

use crate::crawler::fetcher::Response;
use crate::crawler::frontier::Scope;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// HTTP methods a task can use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }
}

/// Request payload
///
/// JSON bodies are kept in serialized form so the body can take part in
/// task identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Body {
    /// URL-encoded form fields, sent in the given order
    Form(Vec<(String, String)>),
    /// Serialized JSON document
    Json(String),
    /// Raw text
    Raw(String),
}

impl Body {
    pub fn form<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn json<S: Serialize + ?Sized>(value: &S) -> Result<Self, serde_json::Error> {
        serde_json::to_string(value).map(Self::Json)
    }
}

/// Identity of a task inside a frontier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    url: String,
    method: HttpMethod,
    body: Option<Body>,
}

/// Request parameters for one fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub method: HttpMethod,
    pub body: Option<Body>,
    pub headers: Vec<(String, String)>,
    /// Charset used to decode the body when the server does not declare one
    pub charset: Option<String>,
}

impl Request {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            body: None,
            headers: Vec::new(),
            charset: None,
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey {
            url: self.url.clone(),
            method: self.method,
            body: self.body.clone(),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Lazily produced handler output
pub type ItemStream<T> = BoxStream<'static, anyhow::Result<T>>;

/// Processes a fetched response
///
/// A handler may schedule follow-up tasks through the [`Scope`] and returns
/// a possibly-empty stream of items. An `Err` in the stream, or a panic,
/// fails the crawl.
pub trait Handler<T>: Send + Sync + 'static {
    fn handle(&self, response: Response, scope: &Scope<T>) -> ItemStream<T>;
}

impl<T, F> Handler<T> for F
where
    F: Fn(Response, &Scope<T>) -> ItemStream<T> + Send + Sync + 'static,
{
    fn handle(&self, response: Response, scope: &Scope<T>) -> ItemStream<T> {
        self(response, scope)
    }
}

/// Wraps already-computed items as handler output
pub fn items<T, I>(items: I) -> ItemStream<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = T>,
{
    let items: Vec<anyhow::Result<T>> = items.into_iter().map(Ok).collect();
    stream::iter(items).boxed()
}

/// Handler output with no items
pub fn nothing<T: Send + 'static>() -> ItemStream<T> {
    stream::empty().boxed()
}

/// Handler output that fails immediately
pub fn failed<T: Send + 'static>(error: anyhow::Error) -> ItemStream<T> {
    stream::once(async move { Err(error) }).boxed()
}

/// One deduplicated unit of fetch-and-handle work
pub struct Task<T> {
    request: Request,
    handler: Arc<dyn Handler<T>>,
    attempts: u32,
}

impl<T: 'static> Task<T> {
    /// Creates a GET task handled by a closure
    pub fn new<F>(url: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Response, &Scope<T>) -> ItemStream<T> + Send + Sync + 'static,
    {
        Self::with_handler(url, Arc::new(handler))
    }

    /// Creates a GET task with a shared handler
    pub fn with_handler(url: impl Into<String>, handler: Arc<dyn Handler<T>>) -> Self {
        Self {
            request: Request::new(url),
            handler,
            attempts: 0,
        }
    }
}

impl<T> Task<T> {
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.request.method = method;
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.request.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push((name.into(), value.into()));
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.request.charset = Some(charset.into());
        self
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn handler(&self) -> Arc<dyn Handler<T>> {
        Arc::clone(&self.handler)
    }

    /// Number of times this task has been admitted to a frontier
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn key(&self) -> TaskKey {
        self.request.key()
    }

    /// Counts a new admission and returns the updated attempt number
    pub(crate) fn register_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            request: self.request.clone(),
            handler: Arc::clone(&self.handler),
            attempts: self.attempts,
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("request", &self.request)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

impl<T> PartialEq for Task<T> {
    fn eq(&self, other: &Self) -> bool {
        self.request.url == other.request.url
            && self.request.method == other.request.method
            && self.request.body == other.request.body
    }
}

impl<T> Eq for Task<T> {}

impl<T> Hash for Task<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.request.url.hash(state);
        self.request.method.hash(state);
        self.request.body.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn task(url: &str) -> Task<String> {
        Task::new(url, |_, _| nothing())
    }

    #[test]
    fn test_identity_ignores_headers_and_handler() {
        let plain = task("https://example.com/a");
        let decorated = Task::new("https://example.com/a", |_, _| items(["x".to_string()]))
            .header("Accept", "text/html")
            .charset("utf-8");

        assert_eq!(plain, decorated);
        assert_eq!(plain.key(), decorated.key());
    }

    #[test]
    fn test_identity_includes_method_and_body() {
        let get = task("https://example.com/search");
        let post = task("https://example.com/search").method(HttpMethod::Post);
        let post_q1 = post.clone().body(Body::form([("q", "1")]));
        let post_q2 = post.clone().body(Body::form([("q", "2")]));

        assert_ne!(get, post);
        assert_ne!(post, post_q1);
        assert_ne!(post_q1, post_q2);

        let keys: HashSet<TaskKey> = [&get, &post, &post_q1, &post_q2, &get]
            .iter()
            .map(|t| t.key())
            .collect();
        assert_eq!(keys.len(), 4);
    }

    #[test]
    fn test_attempts_start_at_zero_and_increase() {
        let mut t = task("https://example.com/");
        assert_eq!(t.attempts(), 0);
        assert_eq!(t.register_attempt(), 1);
        assert_eq!(t.register_attempt(), 2);
        assert_eq!(t.attempts(), 2);
    }

    #[test]
    fn test_json_body_is_serialized() {
        let body = Body::json(&serde_json::json!({"page": 2})).unwrap();
        assert_eq!(body, Body::Json(r#"{"page":2}"#.to_string()));
    }

    #[test]
    fn test_request_display() {
        let t = task("https://example.com/form").method(HttpMethod::Post);
        assert_eq!(t.request().to_string(), "POST https://example.com/form");
    }

    #[tokio::test]
    async fn test_items_helper_yields_in_order() {
        let collected: Vec<u32> = items([1, 2, 3])
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(collected, vec![1, 2, 3]);
    }
}
