use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for crawl-indexer
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub elasticsearch: Option<ElasticsearchConfig>,
    #[serde(rename = "app-search")]
    pub app_search: Option<AppSearchConfig>,
    /// Present when log events should also be written to Elasticsearch
    #[serde(rename = "log-shipping")]
    pub log_shipping: Option<LogShippingConfig>,
}

/// HTTP server and lifecycle configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Grace period for in-flight requests and crawls on shutdown (seconds)
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    /// Connections that have not sent complete request headers by then are closed (milliseconds)
    #[serde(default = "default_read_header_timeout")]
    pub read_header_timeout_ms: u64,
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn read_header_timeout(&self) -> Duration {
        Duration::from_millis(self.read_header_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            shutdown_grace_secs: default_shutdown_grace(),
            read_header_timeout_ms: default_read_header_timeout(),
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// User-Agent header sent with every page fetch
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum number of pages fetched concurrently within one crawl run
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Maximum number of pages attempted per crawl run (0 = unlimited)
    #[serde(default)]
    pub max_pages: usize,

    /// Documents collected before they are sent to the backend in one batch
    #[serde(default = "default_index_batch_size")]
    pub index_batch_size: usize,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_response_header_timeout")]
    pub response_header_timeout_secs: u64,

    /// Maximum idle time between two body chunks (seconds)
    #[serde(default = "default_body_timeout")]
    pub body_timeout_secs: u64,

    /// Time in-flight pages get to finish after a crawl is cancelled (seconds)
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,

    /// Skip TLS certificate verification when fetching pages
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Treat `/path/` and `/path` as the same page
    #[serde(default)]
    pub strip_trailing_slash: bool,

    /// Sort query parameters before deduplication
    #[serde(default)]
    pub sort_query: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            max_pages: 0,
            index_batch_size: default_index_batch_size(),
            connect_timeout_secs: default_connect_timeout(),
            response_header_timeout_secs: default_response_header_timeout(),
            body_timeout_secs: default_body_timeout(),
            drain_timeout_secs: default_drain_timeout(),
            accept_invalid_certs: false,
            strip_trailing_slash: false,
            sort_query: false,
        }
    }
}

/// Elasticsearch ("search-index") backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ElasticsearchConfig {
    pub endpoint: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,

    /// JSON file with `endpoint`, `username` and `password`; overrides inline values
    pub secrets_file: Option<PathBuf>,

    /// Refresh the index after each write so documents are searchable immediately
    #[serde(default = "default_true")]
    pub refresh: bool,

    /// Indices created at startup when they do not exist yet
    #[serde(default)]
    pub ensure_indices: Vec<String>,
}

/// App Search ("search-service") backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppSearchConfig {
    pub endpoint: Option<String>,

    /// API prefix joined between the endpoint and `engines/...`
    #[serde(default = "default_api_path")]
    pub api_path: String,

    /// Private API key
    pub token: Option<String>,

    /// JSON file with `endpoint` and `token`; overrides inline values
    pub secrets_file: Option<PathBuf>,
}

/// Shipping of log events into an Elasticsearch index
///
/// Uses the `[elasticsearch]` connection, which must be configured.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LogShippingConfig {
    #[serde(default = "default_log_index")]
    pub index: String,

    /// Most verbose level shipped (`error`, `warn`, `info`, `debug` or `trace`)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Events buffered while the shipper is busy; further events are dropped
    #[serde(default = "default_log_buffer")]
    pub buffer_size: usize,

    /// Host name recorded on every event; defaults to `$HOSTNAME`
    pub host: Option<String>,
}

impl Default for LogShippingConfig {
    fn default() -> Self {
        Self {
            index: default_log_index(),
            level: default_log_level(),
            buffer_size: default_log_buffer(),
            host: None,
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_grace() -> u64 {
    15
}

fn default_read_header_timeout() -> u64 {
    3000
}

fn default_index_batch_size() -> usize {
    10
}

fn default_log_index() -> String {
    "crawl-indexer-logs".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_buffer() -> usize {
    1024
}

fn default_user_agent() -> String {
    format!("crawl-indexer/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_concurrent_fetches() -> usize {
    16
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_response_header_timeout() -> u64 {
    10
}

fn default_body_timeout() -> u64 {
    30
}

fn default_drain_timeout() -> u64 {
    10
}

fn default_api_path() -> String {
    "/api/as/v1/".to_string()
}

fn default_true() -> bool {
    true
}
