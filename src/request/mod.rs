//! Crawl request types
//!
//! The raw `POST /crawl` body is deserialized into [`CrawlRequestBody`] and turned
//! into an immutable [`CrawlRequest`] by [`validate`]. Validation collects every
//! problem it finds instead of stopping at the first one.

mod validation;

pub use validation::validate;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// Search backend a crawl run writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    /// Self-hosted full-text index addressed by index name
    #[serde(rename = "elasticsearch")]
    Elasticsearch,
    /// Hosted search service addressed by engine name
    #[serde(rename = "app-search")]
    AppSearch,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Elasticsearch => "elasticsearch",
            Self::AppSearch => "app-search",
        }
    }

    /// Name of the request field carrying this backend's target
    pub fn target_field(&self) -> &'static str {
        match self {
            Self::Elasticsearch => "Index",
            Self::AppSearch => "Engine",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Backend {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elasticsearch" | "search-index" => Ok(Self::Elasticsearch),
            "app-search" | "appsearch" | "search-service" => Ok(Self::AppSearch),
            other => Err(RequestError::Invalid(vec![format!(
                "unknown backend type '{}'",
                other
            )])),
        }
    }
}

/// Body of `POST /crawl` as sent by the client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrawlRequestBody {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub index: Option<String>,

    #[serde(default)]
    pub engine: Option<String>,

    /// Explicit backend; inferred from `index` / `engine` when absent
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    #[serde(default, alias = "onDomain")]
    pub on_domain: bool,
}

/// A validated crawl request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    /// The URL exactly as submitted
    pub url: String,

    /// Parsed seed URL
    pub seed: Url,

    /// Index name (Elasticsearch) or engine name (App Search)
    pub target: String,

    pub backend: Backend,

    /// Only follow links on the seed's host
    pub on_domain: bool,
}

impl CrawlRequest {
    /// Host of the seed URL
    pub fn seed_host(&self) -> &str {
        self.seed.host_str().unwrap_or_default()
    }

    /// Response body acknowledging the request
    pub fn accepted(&self) -> CrawlAccepted {
        let (index, engine) = match self.backend {
            Backend::Elasticsearch => (Some(self.target.clone()), None),
            Backend::AppSearch => (None, Some(self.target.clone())),
        };

        CrawlAccepted {
            status: 201,
            url: self.url.clone(),
            backend: self.backend,
            index,
            engine,
        }
    }
}

/// Body of the `202 Accepted` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlAccepted {
    pub status: u16,
    pub url: String,
    #[serde(rename = "type")]
    pub backend: Backend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
}

/// Crawl request validation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("{}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("backend '{0}' is not configured")]
    UnconfiguredBackend(Backend),
}

impl RequestError {
    /// Individual problems found in the request
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Invalid(messages) => messages.clone(),
            other => vec![other.to_string()],
        }
    }
}
