use crate::document::Document;
use crate::request::Backend;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Why a document was not indexed
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum IndexError {
    /// Network failure, timeout, or a non-2xx response without a parseable error body
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// The backend rejected the document (mapping conflict, malformed field, ...)
    #[error("backend rejected document (HTTP {status}, {kind}): {reason}")]
    Backend {
        status: u16,
        kind: String,
        reason: String,
    },
}

impl IndexError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<reqwest::Error> for IndexError {
    fn from(err: reqwest::Error) -> Self {
        Self::transport(err.to_string())
    }
}

/// Outcome of indexing one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexResult {
    pub document_id: String,
    pub accepted: bool,
    pub error: Option<IndexError>,
}

impl IndexResult {
    pub fn accepted(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            accepted: true,
            error: None,
        }
    }

    pub fn rejected(document_id: impl Into<String>, error: IndexError) -> Self {
        Self {
            document_id: document_id.into(),
            accepted: false,
            error: Some(error),
        }
    }
}

/// A search backend that accepts built documents
///
/// Implementations are shared by every crawl run and must tolerate concurrent use.
#[async_trait]
pub trait IndexSink: Send + Sync {
    /// Backend this sink writes to
    fn backend(&self) -> Backend;

    /// Indexes a single document into `document.target`
    async fn index(&self, document: &Document) -> IndexResult;

    /// Indexes several documents, reporting every document's outcome separately
    ///
    /// The default sends them one at a time. Results are in input order.
    async fn index_batch(&self, documents: &[Document]) -> Vec<IndexResult> {
        let mut results = Vec::with_capacity(documents.len());
        for document in documents {
            results.push(self.index(document).await);
        }
        results
    }
}
