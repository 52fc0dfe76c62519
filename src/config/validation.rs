use crate::config::types::{
    AppSearchConfig, Config, CrawlerConfig, ElasticsearchConfig, LogShippingConfig, ServerConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_server_config(&config.server)?;
    validate_crawler_config(&config.crawler)?;

    if config.elasticsearch.is_none() && config.app_search.is_none() {
        return Err(ConfigError::Validation(
            "at least one of [elasticsearch] or [app-search] must be configured".to_string(),
        ));
    }

    if let Some(es) = &config.elasticsearch {
        validate_elasticsearch_config(es)?;
    }
    if let Some(app_search) = &config.app_search {
        validate_app_search_config(app_search)?;
    }
    if let Some(shipping) = &config.log_shipping {
        if config.elasticsearch.is_none() {
            return Err(ConfigError::Validation(
                "[log-shipping] requires [elasticsearch] to be configured".to_string(),
            ));
        }
        validate_log_shipping_config(shipping)?;
    }

    Ok(())
}

fn validate_server_config(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.read_header_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "read-header-timeout-ms must be >= 1".to_string(),
        ));
    }
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 256 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-fetches must be between 1 and 256, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.index_batch_size < 1 || config.index_batch_size > 500 {
        return Err(ConfigError::Validation(format!(
            "index-batch-size must be between 1 and 500, got {}",
            config.index_batch_size
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    for (name, value) in [
        ("connect-timeout-secs", config.connect_timeout_secs),
        ("response-header-timeout-secs", config.response_header_timeout_secs),
        ("body-timeout-secs", config.body_timeout_secs),
    ] {
        if value == 0 {
            return Err(ConfigError::Validation(format!("{} must be >= 1", name)));
        }
    }

    Ok(())
}

fn validate_elasticsearch_config(config: &ElasticsearchConfig) -> Result<(), ConfigError> {
    let endpoint = config.endpoint.as_deref().ok_or_else(|| {
        ConfigError::Validation(
            "[elasticsearch] endpoint is required (inline or via secrets-file)".to_string(),
        )
    })?;
    validate_endpoint("elasticsearch", endpoint)?;

    if config.password.is_some() && config.username.is_none() {
        return Err(ConfigError::Validation(
            "[elasticsearch] password given without username".to_string(),
        ));
    }

    for index in &config.ensure_indices {
        validate_index_name(index)?;
    }

    Ok(())
}

fn validate_app_search_config(config: &AppSearchConfig) -> Result<(), ConfigError> {
    let endpoint = config.endpoint.as_deref().ok_or_else(|| {
        ConfigError::Validation(
            "[app-search] endpoint is required (inline or via secrets-file)".to_string(),
        )
    })?;
    validate_endpoint("app-search", endpoint)?;

    if config.token.as_deref().map_or(true, str::is_empty) {
        return Err(ConfigError::Validation(
            "[app-search] token is required (inline or via secrets-file)".to_string(),
        ));
    }

    if !config.api_path.starts_with('/') || !config.api_path.ends_with('/') {
        return Err(ConfigError::Validation(format!(
            "[app-search] api-path must start and end with '/', got '{}'",
            config.api_path
        )));
    }

    Ok(())
}

fn validate_log_shipping_config(config: &LogShippingConfig) -> Result<(), ConfigError> {
    if config.level.parse::<tracing::Level>().is_err() {
        return Err(ConfigError::Validation(format!(
            "[log-shipping] level must be one of error, warn, info, debug or trace, got '{}'",
            config.level
        )));
    }

    if config.buffer_size == 0 {
        return Err(ConfigError::Validation(
            "[log-shipping] buffer-size must be >= 1".to_string(),
        ));
    }

    check_index_name(&config.index)
        .map_err(|reason| ConfigError::Validation(format!("[log-shipping] index: {}", reason)))
}

/// Backend endpoints must be absolute http(s) URLs
fn validate_endpoint(section: &str, endpoint: &str) -> Result<(), ConfigError> {
    let url = Url::parse(endpoint).map_err(|e| {
        ConfigError::InvalidUrl(format!("[{}] endpoint '{}': {}", section, endpoint, e))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "[{}] endpoint '{}' must use http or https",
            section, endpoint
        )));
    }

    Ok(())
}

/// Checks an Elasticsearch index or App Search engine name
///
/// Names end up as a single path segment of a backend URL, so anything that could
/// change the path or query of that URL is refused along with the characters
/// Elasticsearch itself forbids.
///
/// # Returns
///
/// A short reason when the name is not acceptable
pub fn check_index_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name cannot be empty".to_string());
    }
    if name == "." || name == ".." {
        return Err(format!("'{}' is not a valid name", name));
    }
    if name.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(format!("'{}' must be lowercase", name));
    }
    if name.chars().any(|c| {
        c.is_control()
            || matches!(c, '/' | '\\' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' | ',' | '#' | ':' | '%')
    }) {
        return Err(format!("'{}' contains a forbidden character", name));
    }
    if name.starts_with(['-', '_', '+']) {
        return Err(format!("'{}' cannot start with '-', '_' or '+'", name));
    }

    Ok(())
}

fn validate_index_name(index: &str) -> Result<(), ConfigError> {
    check_index_name(index)
        .map_err(|reason| ConfigError::Validation(format!("ensure-indices: {}", reason)))
}
