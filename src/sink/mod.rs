//! Indexing sinks
//!
//! This module contains the search backends crawl runs write to:
//! - [`ElasticsearchSink`] for self-hosted indices
//! - [`AppSearchSink`] for hosted engines
//! - [`Sinks`], the registry a validated request selects its sink from

mod app_search;
mod elasticsearch;
mod traits;

pub use app_search::AppSearchSink;
pub use elasticsearch::ElasticsearchSink;
pub use traits::{IndexError, IndexResult, IndexSink};

use crate::config::Config;
use crate::request::{Backend, RequestError};
use crate::CrawlerError;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Configured sinks, keyed by backend
#[derive(Clone, Default)]
pub struct Sinks {
    sinks: HashMap<Backend, Arc<dyn IndexSink>>,
    elasticsearch: Option<Arc<ElasticsearchSink>>,
}

impl std::fmt::Debug for Sinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sinks")
            .field("backends", &self.backends())
            .finish()
    }
}

impl Sinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sink under its own backend, replacing any previous one
    pub fn with(mut self, sink: Arc<dyn IndexSink>) -> Self {
        self.sinks.insert(sink.backend(), sink);
        self
    }

    /// Sink for a validated request's backend
    pub fn get(&self, backend: Backend) -> Result<Arc<dyn IndexSink>, RequestError> {
        self.sinks
            .get(&backend)
            .cloned()
            .ok_or(RequestError::UnconfiguredBackend(backend))
    }

    /// The Elasticsearch sink itself, for writes outside crawl runs
    pub fn elasticsearch(&self) -> Option<Arc<ElasticsearchSink>> {
        self.elasticsearch.clone()
    }

    pub fn backends(&self) -> Vec<Backend> {
        let mut backends: Vec<Backend> = self.sinks.keys().copied().collect();
        backends.sort_by_key(|b| b.as_str());
        backends
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

/// Builds the HTTP client used for backend requests
pub fn build_backend_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(30))
        .timeout(Duration::from_secs(60))
        .build()
}

/// Builds every configured sink and creates missing Elasticsearch indices
///
/// # Arguments
///
/// * `config` - The validated configuration, secrets already merged
///
/// # Returns
///
/// * `Ok(Sinks)` - One sink per configured backend
/// * `Err(CrawlerError)` - A client could not be built or an index could not be ensured
pub async fn connect(config: &Config) -> Result<Sinks, CrawlerError> {
    let client = build_backend_client()?;
    let mut sinks = Sinks::new();

    if let Some(es_config) = &config.elasticsearch {
        let sink = ElasticsearchSink::new(client.clone(), es_config)?;
        if !es_config.ensure_indices.is_empty() {
            tracing::info!(
                "Ensuring {} Elasticsearch indices exist",
                es_config.ensure_indices.len()
            );
            sink.ensure_indices(&es_config.ensure_indices).await?;
        }
        tracing::info!(endpoint = sink.endpoint(), "Elasticsearch sink ready");
        let sink = Arc::new(sink);
        sinks.elasticsearch = Some(Arc::clone(&sink));
        sinks = sinks.with(sink);
    }

    if let Some(as_config) = &config.app_search {
        let sink = AppSearchSink::new(client.clone(), as_config)?;
        tracing::info!("App Search sink ready");
        sinks = sinks.with(Arc::new(sink));
    }

    Ok(sinks)
}
