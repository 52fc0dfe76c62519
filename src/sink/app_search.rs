//! App Search sink
//!
//! Documents are posted as JSON arrays to
//! `{endpoint}{api-path}engines/{engine}/documents` with a bearer token. The service
//! answers 200 even when single documents are rejected; those carry a non-empty
//! `errors` array in their response entry.

use crate::config::AppSearchConfig;
use crate::document::Document;
use crate::request::Backend;
use crate::sink::traits::{IndexError, IndexResult, IndexSink};
use crate::ConfigError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

/// Maximum documents per request accepted by the documents API
const MAX_DOCUMENTS_PER_REQUEST: usize = 100;

/// Writes documents into App Search engines
#[derive(Debug, Clone)]
pub struct AppSearchSink {
    client: Client,
    base: Url,
    api_path: Vec<String>,
    token: String,
}

#[derive(Debug, Deserialize)]
struct DocumentStatus {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RequestErrors {
    errors: Vec<String>,
}

impl AppSearchSink {
    pub fn new(client: Client, config: &AppSearchConfig) -> Result<Self, ConfigError> {
        let endpoint = config.endpoint.as_deref().ok_or_else(|| {
            ConfigError::Validation("[app-search] endpoint is required".to_string())
        })?;
        let token = config.token.clone().ok_or_else(|| {
            ConfigError::Validation("[app-search] token is required".to_string())
        })?;

        let base = Url::parse(endpoint.trim_end_matches('/')).map_err(|e| {
            ConfigError::InvalidUrl(format!("[app-search] endpoint '{}': {}", endpoint, e))
        })?;

        Ok(Self {
            client,
            base,
            api_path: config
                .api_path
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
            token,
        })
    }

    /// URL of an engine's documents API; the engine name stays one path segment
    pub fn documents_url(&self, engine: &str) -> Result<Url, IndexError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| IndexError::transport("endpoint cannot carry a path"))?
            .pop_if_empty()
            .extend(&self.api_path)
            .extend(["engines", engine, "documents"]);
        Ok(url)
    }

    /// Posts documents for one engine; results are in input order
    async fn post(&self, engine: &str, documents: &[&Document]) -> Vec<IndexResult> {
        let mut body = String::from("[");
        for (i, doc) in documents.iter().enumerate() {
            if i > 0 {
                body.push(',');
            }
            body.push_str(&doc.body);
        }
        body.push(']');

        match self.send(engine, body).await {
            Ok(statuses) => {
                let mut statuses = statuses.into_iter();
                documents
                    .iter()
                    .map(|doc| match statuses.next() {
                        Some(status) => status_result(doc, status),
                        None => IndexResult::rejected(
                            &doc.id,
                            IndexError::transport("response is missing this document"),
                        ),
                    })
                    .collect()
            }
            Err(err) => documents
                .iter()
                .map(|doc| IndexResult::rejected(&doc.id, err.clone()))
                .collect(),
        }
    }

    async fn send(&self, engine: &str, body: String) -> Result<Vec<DocumentStatus>, IndexError> {
        let response = self
            .client
            .post(self.documents_url(engine)?)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<RequestErrors>(&text) {
                Ok(parsed) if !parsed.errors.is_empty() => IndexError::Backend {
                    status: status.as_u16(),
                    kind: "request".to_string(),
                    reason: parsed.errors.join("; "),
                },
                _ => IndexError::transport(format!("HTTP {}", status.as_u16())),
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| IndexError::transport(format!("unreadable documents response: {}", e)))
    }
}

fn status_result(doc: &Document, status: DocumentStatus) -> IndexResult {
    if let Some(id) = status.id.as_deref().filter(|id| *id != doc.id) {
        tracing::warn!(expected = %doc.id, got = id, "Document status id does not match");
    }

    if status.errors.is_empty() {
        IndexResult::accepted(&doc.id)
    } else {
        IndexResult::rejected(
            &doc.id,
            IndexError::Backend {
                status: 200,
                kind: "document".to_string(),
                reason: status.errors.join("; "),
            },
        )
    }
}

#[async_trait]
impl IndexSink for AppSearchSink {
    fn backend(&self) -> Backend {
        Backend::AppSearch
    }

    async fn index(&self, document: &Document) -> IndexResult {
        let mut results = self.post(&document.target, &[document]).await;
        results
            .pop()
            .unwrap_or_else(|| IndexResult::rejected(&document.id, IndexError::transport("no result")))
    }

    async fn index_batch(&self, documents: &[Document]) -> Vec<IndexResult> {
        let mut results: Vec<Option<IndexResult>> = vec![None; documents.len()];

        // One request per engine and chunk, keeping each document's position
        let mut engines: Vec<&str> = Vec::new();
        for doc in documents {
            if !engines.contains(&doc.target.as_str()) {
                engines.push(&doc.target);
            }
        }

        for engine in engines {
            let positions: Vec<usize> = documents
                .iter()
                .enumerate()
                .filter(|(_, doc)| doc.target == engine)
                .map(|(i, _)| i)
                .collect();

            for chunk in positions.chunks(MAX_DOCUMENTS_PER_REQUEST) {
                let batch: Vec<&Document> = chunk.iter().map(|&i| &documents[i]).collect();
                let outcomes = self.post(engine, &batch).await;
                for (&i, outcome) in chunk.iter().zip(outcomes) {
                    results[i] = Some(outcome);
                }
            }
        }

        results
            .into_iter()
            .zip(documents)
            .map(|(result, doc)| {
                result.unwrap_or_else(|| {
                    IndexResult::rejected(&doc.id, IndexError::transport("document was not sent"))
                })
            })
            .collect()
    }
}
