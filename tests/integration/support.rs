//! Helpers shared by the integration tests

use async_trait::async_trait;
use crawl_indexer::document::Document;
use crawl_indexer::request::{Backend, CrawlRequest};
use crawl_indexer::sink::{IndexResult, IndexSink};
use std::sync::Mutex;
use url::Url;
use wiremock::ResponseTemplate;

/// Sink that keeps every document it is handed
pub struct RecordingSink {
    backend: Backend,
    documents: Mutex<Vec<Document>>,
}

impl RecordingSink {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            documents: Mutex::new(Vec::new()),
        }
    }

    pub fn documents(&self) -> Vec<Document> {
        self.documents.lock().unwrap().clone()
    }

    /// Indexed URIs, sorted
    pub fn uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.documents().into_iter().map(|d| d.uri).collect();
        uris.sort();
        uris
    }
}

#[async_trait]
impl IndexSink for RecordingSink {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn index(&self, document: &Document) -> IndexResult {
        self.documents.lock().unwrap().push(document.clone());
        IndexResult::accepted(&document.id)
    }
}

pub fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_raw(body.to_string(), "text/html; charset=utf-8")
}

pub fn crawl_request(seed: &str, backend: Backend, target: &str, on_domain: bool) -> CrawlRequest {
    CrawlRequest {
        url: seed.to_string(),
        seed: Url::parse(seed).unwrap(),
        target: target.to_string(),
        backend,
        on_domain,
    }
}
