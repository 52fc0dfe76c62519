//! End-to-end crawl runs against mock sites

use crate::support::{crawl_request, html, RecordingSink};
use crawl_indexer::config::{AppSearchConfig, ElasticsearchConfig};
use crawl_indexer::crawler::{crawl, CrawlSettings};
use crawl_indexer::document::document_id;
use crawl_indexer::request::Backend;
use crawl_indexer::sink::{AppSearchSink, ElasticsearchSink};
use reqwest::Client;
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_full_crawl_single_site() {
    let site = MockServer::start().await;
    let base = site.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&format!(
            r#"<html><head><title>Home</title>
            <meta name="description" content="The home page">
            </head><body>
            <h1>Welcome</h1>
            <a href="/page1">Page 1</a>
            <a href="{}/page2">Page 2</a>
            <a href="/logo.png">logo</a>
            </body></html>"#,
            base
        )))
        .expect(1)
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(html(r#"<title>One</title><p>first</p><a href="/page2">two</a><a href="/">home</a>"#))
        .expect(1)
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(html(r#"<title>Two</title><p>second</p><a href="/missing">gone</a>"#))
        .expect(1)
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&site)
        .await;

    let seed = format!("{}/", base);
    let sink = Arc::new(RecordingSink::new(Backend::Elasticsearch));
    let report = crawl(
        crawl_request(&seed, Backend::Elasticsearch, "site", true),
        Client::new(),
        sink.clone(),
        CrawlSettings::default(),
    )
    .await;

    assert_eq!(report.pages_attempted, 4);
    assert_eq!(report.pages_indexed, 3);
    assert_eq!(report.fetch_failures, 1);
    assert!(!report.cancelled);

    assert_eq!(
        sink.uris(),
        vec![
            seed.clone(),
            format!("{}/page1", base),
            format!("{}/page2", base),
        ]
    );

    let home = sink
        .documents()
        .into_iter()
        .find(|d| d.uri == seed)
        .unwrap();
    assert_eq!(home.id, document_id(&seed));
    assert_eq!(home.target, "site");

    let body: serde_json::Value = serde_json::from_str(&home.body).unwrap();
    assert_eq!(body["meta"]["title"], "Home");
    assert_eq!(body["meta"]["description"], "The home page");
    assert_eq!(body["source"]["h1"][0], "Welcome");
    assert!(body.get("links").is_none());
}

#[tokio::test]
async fn test_self_linking_seed_is_fetched_once() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/">again</a><a href="./">again</a><a href="/#top">top</a>"#))
        .expect(1)
        .mount(&site)
        .await;

    let seed = format!("{}/", site.uri());
    let sink = Arc::new(RecordingSink::new(Backend::Elasticsearch));
    let report = crawl(
        crawl_request(&seed, Backend::Elasticsearch, "site", true),
        Client::new(),
        sink.clone(),
        CrawlSettings::default(),
    )
    .await;

    assert_eq!(report.pages_attempted, 1);
    assert_eq!(sink.uris(), vec![seed]);
}

#[tokio::test]
async fn test_on_domain_skips_other_hosts() {
    let site = MockServer::start().await;
    let port = url::Url::parse(&site.uri()).unwrap().port().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&format!(
            r#"<a href="http://localhost:{}/elsewhere">other host</a>"#,
            port
        )))
        .expect(1)
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/elsewhere"))
        .respond_with(html("<p>should not be fetched</p>"))
        .expect(0)
        .mount(&site)
        .await;

    let seed = format!("{}/", site.uri());
    let sink = Arc::new(RecordingSink::new(Backend::Elasticsearch));
    let report = crawl(
        crawl_request(&seed, Backend::Elasticsearch, "site", true),
        Client::new(),
        sink,
        CrawlSettings::default(),
    )
    .await;

    assert_eq!(report.pages_attempted, 1);
    assert_eq!(report.links_rejected, 1);
}

#[tokio::test]
async fn test_max_pages_caps_the_run() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/a">a</a><a href="/b">b</a><a href="/c">c</a>"#))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .respond_with(html("<p>leaf</p>"))
        .mount(&site)
        .await;

    let settings = CrawlSettings {
        max_pages: 2,
        max_concurrent_fetches: 1,
        ..CrawlSettings::default()
    };
    let sink = Arc::new(RecordingSink::new(Backend::Elasticsearch));
    let report = crawl(
        crawl_request(&format!("{}/", site.uri()), Backend::Elasticsearch, "site", true),
        Client::new(),
        sink.clone(),
        settings,
    )
    .await;

    assert_eq!(report.pages_attempted, 2);
    assert_eq!(report.pages_dropped, 2);
    assert_eq!(sink.documents().len(), 2);
}

#[tokio::test]
async fn test_crawl_into_app_search() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<title>Docs</title><meta property="og:image" content="https://cdn.example/og.png"><h2>Install</h2>"#,
        ))
        .mount(&site)
        .await;

    let seed = format!("{}/", site.uri());
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/as/v1/engines/docs/documents"))
        .and(header("authorization", "Bearer private-key"))
        .and(body_string_contains(format!(r#""id":"{}""#, document_id(&seed))))
        .and(body_string_contains(r#""ogimage":"https://cdn.example/og.png""#))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(r#"[{{"id":"{}","errors":[]}}]"#, document_id(&seed))),
        )
        .expect(1)
        .mount(&backend)
        .await;

    let sink = AppSearchSink::new(
        Client::new(),
        &AppSearchConfig {
            endpoint: Some(backend.uri()),
            api_path: "/api/as/v1/".to_string(),
            token: Some("private-key".to_string()),
            secrets_file: None,
        },
    )
    .unwrap();

    let report = crawl(
        crawl_request(&seed, Backend::AppSearch, "docs", false),
        Client::new(),
        Arc::new(sink),
        CrawlSettings::default(),
    )
    .await;

    assert_eq!(report.pages_indexed, 1);
    assert_eq!(report.index_failures, 0);
}

#[tokio::test]
async fn test_backend_rejection_counts_as_index_failure() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<title>Docs</title>"))
        .mount(&site)
        .await;

    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"id":"x","errors":["bad field"]}]"#))
        .mount(&backend)
        .await;

    let sink = AppSearchSink::new(
        Client::new(),
        &AppSearchConfig {
            endpoint: Some(backend.uri()),
            api_path: "/api/as/v1/".to_string(),
            token: Some("private-key".to_string()),
            secrets_file: None,
        },
    )
    .unwrap();

    let report = crawl(
        crawl_request(&format!("{}/", site.uri()), Backend::AppSearch, "docs", true),
        Client::new(),
        Arc::new(sink),
        CrawlSettings::default(),
    )
    .await;

    assert_eq!(report.pages_attempted, 1);
    assert_eq!(report.pages_indexed, 0);
    assert_eq!(report.index_failures, 1);
}

#[tokio::test]
async fn test_crawl_into_elasticsearch_sends_one_bulk_request() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<title>Home</title><a href="/a">a</a><a href="/b">b</a>"#))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .respond_with(html("<p>leaf</p>"))
        .mount(&site)
        .await;

    let seed = format!("{}/", site.uri());
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(query_param("refresh", "true"))
        .and(body_string_contains(format!(r#""_id":"{}""#, document_id(&seed))))
        .and(body_string_contains(r#""_index":"site""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errors": false,
            "items": [
                {"index": {"status": 201}},
                {"index": {"status": 201}},
                {"index": {"status": 201}}
            ]
        })))
        .expect(1)
        .mount(&backend)
        .await;

    let sink = ElasticsearchSink::new(
        Client::new(),
        &ElasticsearchConfig {
            endpoint: Some(backend.uri()),
            username: None,
            password: None,
            secrets_file: None,
            refresh: true,
            ensure_indices: vec![],
        },
    )
    .unwrap();

    let report = crawl(
        crawl_request(&seed, Backend::Elasticsearch, "site", true),
        Client::new(),
        Arc::new(sink),
        CrawlSettings::default(),
    )
    .await;

    assert_eq!(report.pages_attempted, 3);
    assert_eq!(report.pages_indexed, 3);
    assert_eq!(report.index_failures, 0);
}
