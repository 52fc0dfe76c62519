//! The HTTP API served on a real socket, with a mock site behind it

use crate::support::{html, RecordingSink};
use crawl_indexer::crawler::{CrawlLauncher, CrawlSettings};
use crawl_indexer::request::Backend;
use crawl_indexer::server::{self, AppState, Lifecycle, CORRELATION_ID_HEADER};
use crawl_indexer::sink::Sinks;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    run: JoinHandle<Result<(), server::LifecycleError>>,
}

impl TestServer {
    fn url(&self, route: &str) -> String {
        format!("http://{}{}", self.addr, route)
    }

    async fn stop(self) {
        self.shutdown.cancel();
        assert!(self.run.await.unwrap().is_ok());
    }
}

async fn start_server(sink: Arc<RecordingSink>) -> TestServer {
    let lifecycle = Lifecycle::new(Duration::from_secs(5));
    let launcher = CrawlLauncher::new(
        Client::new(),
        CrawlSettings::default(),
        Sinks::new().with(sink),
        lifecycle.tracker(),
        lifecycle.shutdown_token(),
    );
    let router = server::router(AppState::new(launcher));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    TestServer {
        addr,
        shutdown: lifecycle.shutdown_token(),
        tracker: lifecycle.tracker(),
        run: tokio::spawn(lifecycle.run(listener, router)),
    }
}

#[tokio::test]
async fn test_crawl_request_is_accepted_and_runs() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<title>Home</title><a href="/">home</a><a href="/about">about</a>"#))
        .expect(1)
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(html("<title>About</title><p>about us</p>"))
        .expect(1)
        .mount(&site)
        .await;

    let sink = Arc::new(RecordingSink::new(Backend::Elasticsearch));
    let server = start_server(sink.clone()).await;

    let seed = format!("{}/", site.uri());
    let response = Client::new()
        .post(server.url("/crawl"))
        .json(&json!({ "url": seed, "index": "site", "onDomain": true }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({ "status": 201, "url": seed, "type": "elasticsearch", "index": "site" })
    );

    server.tracker.close();
    tokio::time::timeout(Duration::from_secs(10), server.tracker.wait())
        .await
        .unwrap();

    assert_eq!(sink.uris(), vec![seed.clone(), format!("{}/about", site.uri())]);
    server.stop().await;
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let sink = Arc::new(RecordingSink::new(Backend::Elasticsearch));
    let server = start_server(sink.clone()).await;
    let client = Client::new();

    let response = client
        .post(server.url("/crawl"))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());

    let response = client
        .post(server.url("/crawl"))
        .json(&json!({ "url": "ftp://example.com/", "index": "site" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(server.url("/crawl"))
        .json(&json!({ "url": "https://example.com/", "index": "../_bulk" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("invalid Index in request"));

    let response = client
        .post(server.url("/crawl"))
        .json(&json!({ "url": "https://example.com/", "engine": "docs" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "backend 'app-search' is not configured");

    assert!(sink.documents().is_empty());
    server.stop().await;
}

#[tokio::test]
async fn test_health_echoes_correlation_id() {
    let server = start_server(Arc::new(RecordingSink::new(Backend::Elasticsearch))).await;

    let response = Client::new()
        .get(server.url("/health"))
        .header(CORRELATION_ID_HEADER, "trace-me")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CORRELATION_ID_HEADER], "trace-me");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "status": "ok", "active_crawls": 0 }));

    server.stop().await;
}
