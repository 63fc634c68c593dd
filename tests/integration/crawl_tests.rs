//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and drive full
//! crawls through the real HTTP transport.

use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use sumi_harvest::config::{parse_config, TransportConfig};
use sumi_harvest::crawler::{
    AttemptLimit, Body, Handler, HttpMethod, HttpTransport, ItemStream,
};
use sumi_harvest::{
    items, CrawlOptions, CrawlState, Crawler, FatalError, Response, Scope, SiteSpider, Spider,
    Task,
};
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_crawler() -> Crawler {
    let transport = HttpTransport::new(&TransportConfig::default()).expect("client builds");
    Crawler::new(Arc::new(transport), 8)
}

fn options(attempts: u32, fatal_statuses: Vec<u16>) -> CrawlOptions {
    CrawlOptions {
        workers: 2,
        attempts_limit: AttemptLimit::Bounded(attempts),
        fatal_statuses,
        result_buffer: 16,
    }
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html; charset=utf-8")
}

fn status_task(url: String) -> Task<u16> {
    Task::new(url, |response, _| items([response.status()]))
}

#[tokio::test]
async fn test_site_crawl_fetches_each_page_once() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(format!(
            r#"<html><head><title>Home</title></head><body>
            <a href="/page1">One</a>
            <a href="{}/page2?utm_source=nav">Two</a>
            <a href="/page1#top">One again</a>
            </body></html>"#,
            base
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(html(
            r#"<title>One</title><a href="/">home</a><a href="/page2">two</a>"#.to_string(),
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(html("<title>Two</title>".to_string()))
        .expect(1)
        .mount(&server)
        .await;

    let spider = SiteSpider::new(&base).unwrap().with_max_depth(3);
    let records = http_crawler().run_spider(&spider).await.unwrap();

    let titles: HashSet<String> = records.iter().filter_map(|r| r.title.clone()).collect();
    assert_eq!(
        titles,
        HashSet::from(["Home".to_string(), "One".to_string(), "Two".to_string()])
    );

    let home = records.iter().find(|r| r.depth == 0).unwrap();
    assert_eq!(home.status, 200);
    assert_eq!(
        home.links,
        vec![format!("{}/page1", base), format!("{}/page2", base)]
    );
}

#[tokio::test]
async fn test_server_errors_are_retried_until_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut stream = http_crawler().crawl(
        status_task(format!("{}/flaky", server.uri())),
        options(3, vec![404]),
    );

    let mut statuses = Vec::new();
    while let Some(item) = futures::StreamExt::next(&mut stream).await {
        statuses.push(item.unwrap());
    }

    assert_eq!(statuses, vec![200]);
    assert_eq!(stream.state(), CrawlState::Completed);
    assert_eq!(stream.stats().retries, 2);
    assert_eq!(stream.stats().fetches, 3);
}

#[tokio::test]
async fn test_not_found_fails_the_crawl() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/missing", server.uri());
    let error = http_crawler()
        .crawl(status_task(url.clone()), options(3, vec![404]))
        .collect_items()
        .await
        .unwrap_err();

    assert_eq!(error.request(), format!("GET {}", url));
    assert!(matches!(
        error.cause(),
        FatalError::FatalStatus { status: 404 }
    ));
}

#[tokio::test]
async fn test_configured_fatal_statuses_are_honoured() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&server)
        .await;

    let config = parse_config(&format!(
        r#"
[crawler]
workers = 2
attempts-limit = 3
fatal-statuses = []

[transport]
timeout-secs = 5

[[seed]]
url = "{}/"
max-depth = 0
"#,
        server.uri()
    ))
    .unwrap();

    let crawler = Crawler::from_config(&config).unwrap();
    let spider = SiteSpider::from_seed(&config.seeds[0]).unwrap();

    let error = crawler.run_spider(&spider).await.unwrap_err();
    match error.cause() {
        FatalError::AttemptsExceeded(exceeded) => assert_eq!(exceeded.limit, 3),
        other => panic!("expected AttemptsExceeded, got {:?}", other),
    }
}

#[tokio::test]
async fn test_task_charset_decodes_undeclared_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/legacy"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_bytes(b"<html><head><title>Caf\xe9 cr\xe8me</title></head></html>".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let task = Task::new(format!("{}/legacy", server.uri()), |response, _| {
        let page = sumi_harvest::crawler::parse_page(
            &response.html(),
            &url::Url::parse(response.url()).expect("fetched URL parses"),
        );
        items(page.title)
    })
    .charset("iso-8859-1");

    let titles = http_crawler()
        .crawl(task, options(1, vec![404]))
        .collect_items()
        .await
        .unwrap();

    assert_eq!(titles, vec!["Café crème".to_string()]);
}

#[tokio::test]
async fn test_undecodable_body_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/corrupt"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", "gzip")
                .set_body_bytes(b"definitely not a gzip stream".to_vec()),
        )
        .expect(3)
        .mount(&server)
        .await;

    let mut stream = http_crawler().crawl(
        status_task(format!("{}/corrupt", server.uri())),
        options(3, vec![404]),
    );

    let error = futures::StreamExt::next(&mut stream).await.unwrap().unwrap_err();
    match error.cause() {
        FatalError::AttemptsExceeded(exceeded) => assert_eq!(exceeded.limit, 3),
        other => panic!("expected AttemptsExceeded, got {:?}", other),
    }
    assert_eq!(stream.state(), CrawlState::Failed);
    assert_eq!(stream.stats().retries, 2);
}

#[tokio::test]
async fn test_form_post_with_json_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("q=rust"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": ["tokio", "reqwest"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let task = Task::new(format!("{}/search", server.uri()), |response, _| {
        let names: Vec<String> = match response.json::<Value>() {
            Ok(body) => body["results"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Err(e) => return sumi_harvest::crawler::failed(e.into()),
        };
        items(names)
    })
    .method(HttpMethod::Post)
    .body(Body::form([("q", "rust"), ("page", "1")]));

    let found = http_crawler()
        .crawl(task, options(1, vec![404]))
        .collect_items()
        .await
        .unwrap();

    assert_eq!(found, vec!["tokio".to_string(), "reqwest".to_string()]);
}

#[tokio::test]
async fn test_json_body_and_headers_are_sent() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/jobs"))
        .and(header("x-api-token", "secret"))
        .and(body_json(json!({"name": "harvest", "priority": 2})))
        .respond_with(ResponseTemplate::new(200).insert_header("x-job-id", "42"))
        .expect(1)
        .mount(&server)
        .await;

    let task = Task::new(format!("{}/jobs", server.uri()), |response, _| {
        items([response.header("x-job-id").unwrap_or_default().to_string()])
    })
    .method(HttpMethod::Put)
    .header("X-Api-Token", "secret")
    .body(Body::json(&json!({"name": "harvest", "priority": 2})).unwrap());

    let ids = http_crawler()
        .crawl(task, options(1, vec![404]))
        .collect_items()
        .await
        .unwrap();

    assert_eq!(ids, vec!["42".to_string()]);
}

/// Walks a paginated JSON API, scheduling the next page from each response
struct PageWalker {
    base: String,
}

impl Handler<Value> for PageWalker {
    fn handle(&self, response: Response, scope: &Scope<Value>) -> ItemStream<Value> {
        let body: Value = match response.json() {
            Ok(body) => body,
            Err(e) => return sumi_harvest::crawler::failed(e.into()),
        };

        if let Some(next) = body["next"].as_u64() {
            scope.schedule(Task::with_handler(
                format!("{}/api/items?page={}", self.base, next),
                Arc::new(PageWalker {
                    base: self.base.clone(),
                }),
            ));
        }

        items(body["items"].as_array().cloned().unwrap_or_default())
    }
}

#[tokio::test]
async fn test_handler_follows_pagination() {
    let server = MockServer::start().await;

    for (page, items, next) in [
        ("1", json!([1, 2]), json!(2)),
        ("2", json!([3]), json!(3)),
        ("3", json!([]), Value::Null),
    ] {
        Mock::given(method("GET"))
            .and(path("/api/items"))
            .and(query_param("page", page))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"items": items, "next": next})),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    struct Api {
        base: String,
    }

    impl Spider for Api {
        type Item = Value;

        fn name(&self) -> &str {
            "api"
        }

        fn entry_point(&self) -> Task<Value> {
            Task::with_handler(
                format!("{}/api/items?page=1", self.base),
                Arc::new(PageWalker {
                    base: self.base.clone(),
                }),
            )
        }
    }

    let spider = Api { base: server.uri() };
    let mut found: Vec<u64> = http_crawler()
        .run_spider(&spider)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|v| v.as_u64())
        .collect();
    found.sort_unstable();

    assert_eq!(found, vec![1, 2, 3]);
}
