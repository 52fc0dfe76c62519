//! crawl-indexer: a site crawler that feeds search backends
//!
//! This crate accepts crawl requests over HTTP, walks a website's link graph from a
//! seed URL, extracts structured content from each page and ships it to Elasticsearch
//! or App Search.

pub mod config;
pub mod crawler;
pub mod document;
pub mod logging;
pub mod request;
pub mod server;
pub mod sink;
pub mod url;

use thiserror::Error;

/// Main error type for crawl-indexer operations
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Document error: {0}")]
    Document(#[from] document::DocumentError),

    #[error("Index error: {0}")]
    Index(#[from] sink::IndexError),

    #[error("Invalid crawl request: {0}")]
    Request(#[from] request::RequestError),

    #[error("Server error: {0}")]
    Lifecycle(#[from] server::LifecycleError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Extraction failed for {url}: {message}")]
    Extraction { url: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to parse secrets file {path}: {source}")]
    Secrets {
        path: String,
        source: serde_json::Error,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for crawl-indexer operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use request::{Backend, CrawlRequest};
pub use crate::url::{filter, normalize, CanonicalPolicy, FilterPolicy};
