//! HTTP fetcher implementation
//!
//! This module handles all page requests for the crawler, including:
//! - Building the shared HTTP client with connect and keep-alive timeouts
//! - Bounding the wait for response headers
//! - Rejecting non-2xx statuses and non-HTML content types
//! - Exposing the body as a chunk stream with a per-chunk idle timeout
//!
//! Nothing here retries. A failed fetch abandons that single URL.

use crate::config::CrawlerConfig;
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, redirect::Policy, Client, Response};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum number of redirects followed for one page
const MAX_REDIRECTS: usize = 10;

/// TCP keep-alive interval for pooled connections
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

/// Page fetch failures
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("timed out waiting for {stage} from {url}")]
    Timeout { url: String, stage: &'static str },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} is not HTML (Content-Type: {content_type})")]
    NotHtml { url: String, content_type: String },
}

/// Per-request limits applied by [`fetch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    /// Maximum wait between sending the request and receiving response headers
    pub response_header_timeout: Duration,

    /// Maximum idle time between two body chunks
    pub body_timeout: Duration,
}

impl FetchSettings {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            response_header_timeout: Duration::from_secs(config.response_header_timeout_secs),
            body_timeout: Duration::from_secs(config.body_timeout_secs),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}

/// A page whose headers arrived and passed the status and content-type checks
#[derive(Debug)]
pub struct FetchedPage {
    /// URL after following redirects; relative links resolve against it
    pub final_url: Url,

    pub status: u16,

    pub content_type: Option<String>,

    pub body: BodyStream,
}

/// Response body read chunk by chunk
#[derive(Debug)]
pub struct BodyStream {
    response: Response,
    chunk_timeout: Duration,
    url: String,
}

impl BodyStream {
    /// Reads the next chunk of the body
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Bytes))` - The next chunk
    /// * `Ok(None)` - The body is complete
    /// * `Err(FetchError)` - The connection failed or stalled for longer than the chunk timeout
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, FetchError> {
        match tokio::time::timeout(self.chunk_timeout, self.response.chunk()).await {
            Ok(Ok(chunk)) => Ok(chunk),
            Ok(Err(source)) => Err(FetchError::Transport {
                url: self.url.clone(),
                source,
            }),
            Err(_) => Err(FetchError::Timeout {
                url: self.url.clone(),
                stage: "body",
            }),
        }
    }
}

/// Builds the HTTP client shared by every crawl run
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use crawl_indexer::config::CrawlerConfig;
/// use crawl_indexer::crawler::build_http_client;
///
/// let client = build_http_client(&CrawlerConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &CrawlerConfig) -> Result<Client, reqwest::Error> {
    if config.accept_invalid_certs {
        tracing::warn!("TLS certificate verification is DISABLED for page fetches");
    }

    Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .tcp_keepalive(TCP_KEEPALIVE)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a page and checks that it is HTML
///
/// The response-header wait is bounded by `settings.response_header_timeout`.
/// The body is not read here; callers drain [`FetchedPage::body`].
///
/// # Arguments
///
/// * `client` - The shared HTTP client
/// * `url` - The URL to fetch
/// * `settings` - Timeouts for this request
///
/// # Returns
///
/// * `Ok(FetchedPage)` - 2xx response with an HTML (or missing) Content-Type
/// * `Err(FetchError)` - Transport failure, timeout, non-2xx status or non-HTML content
pub async fn fetch(
    client: &Client,
    url: &Url,
    settings: &FetchSettings,
) -> Result<FetchedPage, FetchError> {
    let request = client.get(url.clone()).send();

    let response = tokio::time::timeout(settings.response_header_timeout, request)
        .await
        .map_err(|_| FetchError::Timeout {
            url: url.to_string(),
            stage: "response headers",
        })?
        .map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if !is_html(content_type.as_deref()) {
        return Err(FetchError::NotHtml {
            url: url.to_string(),
            content_type: content_type.unwrap_or_default(),
        });
    }

    let final_url = response.url().clone();
    if final_url != *url {
        tracing::debug!(url = %url, final_url = %final_url, "Followed redirect");
    }

    Ok(FetchedPage {
        final_url,
        status: status.as_u16(),
        content_type,
        body: BodyStream {
            response,
            chunk_timeout: settings.body_timeout,
            url: url.to_string(),
        },
    })
}

/// Returns true for HTML media types; a missing Content-Type counts as HTML
pub fn is_html(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return true;
    };

    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    essence == "text/html" || essence == "application/xhtml+xml"
}
