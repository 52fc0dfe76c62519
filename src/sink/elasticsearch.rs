//! Elasticsearch sink
//!
//! Single documents go through the document API (`PUT /{index}/_doc/{id}`), batches
//! through `_bulk`. Bulk responses are mapped item by item so a partially failed
//! batch reports every document's outcome on its own.

use crate::config::ElasticsearchConfig;
use crate::document::Document;
use crate::request::Backend;
use crate::sink::traits::{IndexError, IndexResult, IndexSink};
use crate::ConfigError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use url::Url;

/// Longest response snippet kept in a transport error
const MAX_ERROR_BODY: usize = 512;

/// Writes documents into Elasticsearch indices
#[derive(Debug, Clone)]
pub struct ElasticsearchSink {
    client: Client,
    endpoint: String,
    base: Url,
    username: Option<String>,
    password: Option<String>,
    refresh: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Structured {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        reason: Option<String>,
    },
    Plain(String),
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    items: Vec<BulkItem>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    index: BulkItemResult,
}

#[derive(Debug, Deserialize)]
struct BulkItemResult {
    #[serde(rename = "_id")]
    id: Option<String>,
    status: u16,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

impl ElasticsearchSink {
    /// Creates a sink from its configuration section
    ///
    /// Secrets files must already be merged in (see [`crate::config::load_config`]).
    pub fn new(client: Client, config: &ElasticsearchConfig) -> Result<Self, ConfigError> {
        let endpoint = config.endpoint.as_deref().ok_or_else(|| {
            ConfigError::Validation("[elasticsearch] endpoint is required".to_string())
        })?;
        let endpoint = endpoint.trim_end_matches('/');
        let base = Url::parse(endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("[elasticsearch] endpoint '{}': {}", endpoint, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(ConfigError::InvalidUrl(format!(
                "[elasticsearch] endpoint '{}' cannot carry a path",
                endpoint
            )));
        }

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            base,
            username: config.username.clone(),
            password: config.password.clone(),
            refresh: config.refresh,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Appends `segments` to the endpoint path, percent-encoding each one
    fn url_for(&self, segments: &[&str]) -> Result<Url, IndexError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| IndexError::transport("endpoint cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_deref()),
            None => request,
        }
    }

    fn refresh_param(&self) -> &'static str {
        if self.refresh {
            "true"
        } else {
            "false"
        }
    }

    /// Checks whether an index exists (`HEAD /{name}`)
    pub async fn exists(&self, name: &str) -> Result<bool, IndexError> {
        let url = self.url_for(&[name])?;
        let response = self.authorize(self.client.head(url)).send().await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(error_from_response(response).await),
        }
    }

    /// Creates an index with default settings (`PUT /{name}`)
    ///
    /// An index that already exists counts as success.
    pub async fn create(&self, name: &str) -> Result<(), IndexError> {
        let url = self.url_for(&[name])?;
        let response = self.authorize(self.client.put(url)).send().await?;

        if response.status().is_success() {
            tracing::info!(index = name, "Created Elasticsearch index");
            return Ok(());
        }

        match error_from_response(response).await {
            IndexError::Backend { kind, .. } if kind == "resource_already_exists_exception" => {
                Ok(())
            }
            err => Err(err),
        }
    }

    /// Creates every missing index in `names`
    pub async fn ensure_indices(&self, names: &[String]) -> Result<(), IndexError> {
        for name in names {
            if self.exists(name).await? {
                tracing::debug!(index = %name, "Index already exists");
            } else {
                self.create(name).await?;
            }
        }
        Ok(())
    }

    /// Appends raw JSON sources to `index` through `_bulk`, letting Elasticsearch
    /// assign the ids
    ///
    /// Used for log shipping, where nothing is ever overwritten. Fails when the
    /// request fails or any item is rejected.
    pub async fn append(&self, index: &str, sources: &[String]) -> Result<(), IndexError> {
        if sources.is_empty() {
            return Ok(());
        }

        let action = json!({"index": {"_index": index}}).to_string();
        let mut body = String::new();
        for source in sources {
            body.push_str(&action);
            body.push('\n');
            body.push_str(source);
            body.push('\n');
        }

        let bulk = self.send_bulk(body, "false").await?;
        let rejected = bulk
            .items
            .into_iter()
            .filter(|item| !(200..300).contains(&item.index.status))
            .count();
        if rejected > 0 {
            return Err(IndexError::Backend {
                status: 400,
                kind: "bulk_item_rejected".to_string(),
                reason: format!("{} of {} entries rejected", rejected, sources.len()),
            });
        }
        Ok(())
    }

    async fn bulk_documents(&self, documents: &[Document]) -> Result<BulkResponse, IndexError> {
        let mut body = String::new();
        for doc in documents {
            let action = json!({"index": {"_index": doc.target, "_id": doc.id}});
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(&doc.body);
            body.push('\n');
        }
        self.send_bulk(body, self.refresh_param()).await
    }

    async fn send_bulk(&self, body: String, refresh: &str) -> Result<BulkResponse, IndexError> {
        let url = self.url_for(&["_bulk"])?;
        let response = self
            .authorize(self.client.post(url))
            .query(&[("refresh", refresh)])
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let bulk: BulkResponse = response
            .json()
            .await
            .map_err(|e| IndexError::transport(format!("unreadable bulk response: {}", e)))?;
        if bulk.errors {
            tracing::debug!("Bulk request finished with item errors");
        }
        Ok(bulk)
    }
}

#[async_trait]
impl IndexSink for ElasticsearchSink {
    fn backend(&self) -> Backend {
        Backend::Elasticsearch
    }

    async fn index(&self, document: &Document) -> IndexResult {
        let url = match self.url_for(&[document.target.as_str(), "_doc", document.id.as_str()]) {
            Ok(url) => url,
            Err(e) => return IndexResult::rejected(&document.id, e),
        };

        let sent = self
            .authorize(self.client.put(url))
            .query(&[("refresh", self.refresh_param())])
            .header(CONTENT_TYPE, "application/json")
            .body(document.body.clone())
            .send()
            .await;

        match sent {
            Ok(response) if response.status().is_success() => IndexResult::accepted(&document.id),
            Ok(response) => IndexResult::rejected(&document.id, error_from_response(response).await),
            Err(e) => IndexResult::rejected(&document.id, e.into()),
        }
    }

    async fn index_batch(&self, documents: &[Document]) -> Vec<IndexResult> {
        if documents.is_empty() {
            return Vec::new();
        }

        let bulk = match self.bulk_documents(documents).await {
            Ok(bulk) => bulk,
            Err(err) => {
                return documents
                    .iter()
                    .map(|doc| IndexResult::rejected(&doc.id, err.clone()))
                    .collect();
            }
        };

        let mut items = bulk.items.into_iter();
        documents
            .iter()
            .map(|doc| match items.next() {
                Some(BulkItem { index: item }) => item_result(doc, item),
                None => IndexResult::rejected(
                    &doc.id,
                    IndexError::transport("bulk response is missing this item"),
                ),
            })
            .collect()
    }
}

fn item_result(doc: &Document, item: BulkItemResult) -> IndexResult {
    if let Some(id) = item.id.as_deref().filter(|id| *id != doc.id) {
        tracing::warn!(expected = %doc.id, got = id, "Bulk item id does not match document");
    }

    if (200..300).contains(&item.status) && item.error.is_none() {
        return IndexResult::accepted(&doc.id);
    }

    let error = match item.error {
        Some(detail) => backend_error(item.status, detail),
        None => IndexError::Backend {
            status: item.status,
            kind: "unknown".to_string(),
            reason: "item failed without error detail".to_string(),
        },
    };
    IndexResult::rejected(&doc.id, error)
}

fn backend_error(status: u16, detail: ErrorDetail) -> IndexError {
    match detail {
        ErrorDetail::Structured { kind, reason } => IndexError::Backend {
            status,
            kind,
            reason: reason.unwrap_or_default(),
        },
        ErrorDetail::Plain(reason) => IndexError::Backend {
            status,
            kind: "error".to_string(),
            reason,
        },
    }
}

/// Maps a non-2xx response to a backend error when its body carries one
async fn error_from_response(response: Response) -> IndexError {
    let status = response.status().as_u16();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => return IndexError::transport(format!("HTTP {}: {}", status, e)),
    };

    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => backend_error(status, body.error),
        Err(_) => IndexError::transport(format!("HTTP {}: {}", status, snippet(&text))),
    }
}

fn snippet(text: &str) -> &str {
    if text.len() <= MAX_ERROR_BODY {
        return text;
    }
    let mut end = MAX_ERROR_BODY;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
