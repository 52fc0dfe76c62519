//! Configuration module for crawl-indexer
//!
//! This module handles loading, parsing, and validating the TOML configuration
//! file, including backend credentials read from JSON secrets files.
//!
//! # Example
//!
//! ```no_run
//! use crawl_indexer::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Fetching up to {} pages at once", config.crawler.max_concurrent_fetches);
//! ```

mod parser;
mod secrets;
mod types;
mod validation;

pub use validation::check_index_name;

// Re-export types
pub use secrets::{load_credentials, Credentials};
pub use types::{
    AppSearchConfig, Config, CrawlerConfig, ElasticsearchConfig, LogShippingConfig, ServerConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
