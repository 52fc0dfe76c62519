//! Log shipping into Elasticsearch
//!
//! When `[log-shipping]` is configured, every log event that passes the process
//! filter is also written to an Elasticsearch index through the `[elasticsearch]`
//! sink. The [`ElasticLogLayer`] only queues events; a [`LogShipper`] task groups
//! them into `_bulk` requests off the logging path.
//!
//! Logging starts before the configuration is read, so the layer sits in the
//! subscriber as an empty reloadable slot and is filled in by [`start`].

mod layer;
mod shipper;

pub use layer::{ElasticLogLayer, LogDocument};
pub use shipper::LogShipper;

use crate::config::LogShippingConfig;
use crate::sink::{ElasticsearchSink, IndexError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{reload, Registry};

/// Reload handle of the shipping slot installed at startup
pub type ShippingHandle = reload::Handle<Option<ElasticLogLayer>, Registry>;

#[derive(Debug, Error)]
pub enum LogShippingError {
    #[error("invalid log shipping level '{0}'")]
    Level(String),

    #[error("failed to prepare log index: {0}")]
    Index(#[from] IndexError),

    #[error("failed to install log shipping layer: {0}")]
    Install(#[from] reload::Error),
}

/// A running shipper
pub struct LogShipping {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl LogShipping {
    /// Stops shipping, giving queued events up to `grace` to reach the index
    pub async fn stop(self, grace: Duration) {
        self.shutdown.cancel();
        if tokio::time::timeout(grace, self.task).await.is_err() {
            tracing::warn!("Log shipper did not flush within {}s", grace.as_secs());
        }
    }
}

/// Creates the log index when missing, fills the shipping slot and spawns the shipper
///
/// # Arguments
///
/// * `config` - The `[log-shipping]` section
/// * `sink` - The Elasticsearch sink events are written through
/// * `handle` - Slot returned when logging was set up
pub async fn start(
    config: &LogShippingConfig,
    sink: Arc<ElasticsearchSink>,
    handle: &ShippingHandle,
) -> Result<LogShipping, LogShippingError> {
    let level = config
        .level
        .parse::<tracing::Level>()
        .map_err(|_| LogShippingError::Level(config.level.clone()))?;

    sink.ensure_indices(std::slice::from_ref(&config.index)).await?;

    let host = config
        .host
        .clone()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unknown".to_string());

    let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
    handle.reload(Some(ElasticLogLayer::new(tx, host, level)))?;

    let shutdown = CancellationToken::new();
    let shipper = LogShipper::new(sink, config.index.clone(), rx);
    let task = tokio::spawn(shipper.run(shutdown.clone()));

    tracing::info!(index = %config.index, level = %level, "Shipping logs to Elasticsearch");
    Ok(LogShipping { shutdown, task })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ElasticsearchConfig;
    use reqwest::Client;
    use tracing_subscriber::layer::SubscriberExt;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sink(server: &MockServer) -> Arc<ElasticsearchSink> {
        let config = ElasticsearchConfig {
            endpoint: Some(server.uri()),
            username: None,
            password: None,
            secrets_file: None,
            refresh: false,
            ensure_indices: vec![],
        };
        Arc::new(ElasticsearchSink::new(Client::new(), &config).unwrap())
    }

    #[tokio::test]
    async fn test_events_reach_the_log_index() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/app-logs"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/app-logs"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(body_string_contains(r#""_index":"app-logs""#))
            .and(body_string_contains(r#""message":"Crawl finished""#))
            .and(body_string_contains(r#""host":"crawler-1""#))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errors": false,
                "items": [{"index": {"status": 201}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (slot, handle) = reload::Layer::new(None::<ElasticLogLayer>);
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(slot));

        let config = LogShippingConfig {
            index: "app-logs".to_string(),
            host: Some("crawler-1".to_string()),
            ..LogShippingConfig::default()
        };
        let shipping = start(&config, sink(&server), &handle).await.unwrap();

        tracing::debug!("below the shipping level");
        tracing::info!(pages = 3u64, "Crawl finished");

        shipping.stop(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_unreachable_backend_fails_start() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (_slot, handle) = reload::Layer::new(None::<ElasticLogLayer>);
        let result = start(&LogShippingConfig::default(), sink(&server), &handle).await;
        assert!(matches!(result, Err(LogShippingError::Index(_))));
    }
}
