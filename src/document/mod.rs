//! Document builder
//!
//! Turns a [`RenderedPage`] into the document shape of the chosen backend. The
//! document id is derived from the page URI only, so re-crawling a URL overwrites
//! its previous document instead of adding a second one.

mod shape;

pub use shape::{AppSearchBody, ElasticsearchBody, ElasticsearchMeta};

use crate::crawler::RenderedPage;
use crate::request::Backend;
use thiserror::Error;

/// Document building errors
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to serialize document for {uri}: {source}")]
    Serialize {
        uri: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A serialized document ready for a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Hex-encoded MD5 of the page URI
    pub id: String,

    /// Index name or engine name
    pub target: String,

    pub uri: String,

    /// JSON body in the backend's shape
    pub body: String,
}

/// Content-addressed id of a URI: 32 lowercase hex characters
pub fn document_id(uri: &str) -> String {
    format!("{:x}", md5::compute(uri.as_bytes()))
}

/// Builds the document for `page` in the shape `backend` expects
///
/// # Arguments
///
/// * `backend` - Selects the document shape
/// * `target` - Index or engine the document is written to
/// * `page` - The extracted page
///
/// # Returns
///
/// * `Ok(Document)` - Serialized document
/// * `Err(DocumentError)` - Serialization failed; this indicates a bug
pub fn build(backend: Backend, target: &str, page: &RenderedPage) -> Result<Document, DocumentError> {
    let id = document_id(&page.uri);

    let body = match backend {
        Backend::Elasticsearch => serde_json::to_string(&ElasticsearchBody::new(&id, page)),
        Backend::AppSearch => serde_json::to_string(&AppSearchBody::new(&id, page)),
    }
    .map_err(|source| DocumentError::Serialize {
        uri: page.uri.clone(),
        source,
    })?;

    Ok(Document {
        id,
        target: target.to_string(),
        uri: page.uri.clone(),
        body,
    })
}
