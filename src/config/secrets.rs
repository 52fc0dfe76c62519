//! Credential provider
//!
//! Backend endpoints and credentials may live in a JSON secrets file next to the
//! configuration (for example one rendered by a secret store agent). Values read
//! from the file take precedence over inline configuration values.

use crate::config::types::{AppSearchConfig, Config, ElasticsearchConfig};
use crate::ConfigError;
use serde::Deserialize;
use std::path::Path;

/// Credentials as stored in a secrets file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub endpoint: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

/// Reads a credentials JSON file
pub fn load_credentials(path: &Path) -> Result<Credentials, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Secrets {
        path: path.display().to_string(),
        source,
    })
}

/// Merges every configured secrets file into the configuration
pub fn apply_secrets(config: &mut Config) -> Result<(), ConfigError> {
    if let Some(es) = config.elasticsearch.as_mut() {
        apply_elasticsearch(es)?;
    }
    if let Some(app_search) = config.app_search.as_mut() {
        apply_app_search(app_search)?;
    }
    Ok(())
}

fn apply_elasticsearch(config: &mut ElasticsearchConfig) -> Result<(), ConfigError> {
    let Some(path) = config.secrets_file.as_deref() else {
        return Ok(());
    };

    tracing::debug!("Loading Elasticsearch credentials from {}", path.display());
    let creds = load_credentials(path)?;

    override_with(&mut config.endpoint, creds.endpoint);
    override_with(&mut config.username, creds.username);
    override_with(&mut config.password, creds.password);
    Ok(())
}

fn apply_app_search(config: &mut AppSearchConfig) -> Result<(), ConfigError> {
    let Some(path) = config.secrets_file.as_deref() else {
        return Ok(());
    };

    tracing::debug!("Loading App Search credentials from {}", path.display());
    let creds = load_credentials(path)?;

    override_with(&mut config.endpoint, creds.endpoint);
    // App Search keys are sometimes stored under `password`
    override_with(&mut config.token, creds.token.or(creds.password));
    Ok(())
}

fn override_with(slot: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        *slot = Some(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn secrets_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn es_config(secrets: Option<&Path>) -> ElasticsearchConfig {
        ElasticsearchConfig {
            endpoint: Some("http://inline:9200".to_string()),
            username: Some("inline-user".to_string()),
            password: None,
            secrets_file: secrets.map(Path::to_path_buf),
            refresh: true,
            ensure_indices: vec![],
        }
    }

    #[test]
    fn test_load_credentials() {
        let file = secrets_file(
            r#"{"username":"elastic","password":"changeme","endpoint":"http://es:9200"}"#,
        );
        let creds = load_credentials(file.path()).unwrap();
        assert_eq!(creds.username.as_deref(), Some("elastic"));
        assert_eq!(creds.password.as_deref(), Some("changeme"));
        assert_eq!(creds.endpoint.as_deref(), Some("http://es:9200"));
        assert!(creds.token.is_none());
    }

    #[test]
    fn test_invalid_json_is_reported_with_path() {
        let file = secrets_file("{not json");
        let err = load_credentials(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Secrets { .. }));
    }

    #[test]
    fn test_secrets_override_inline_values() {
        let file = secrets_file(r#"{"password":"s3cret","endpoint":"http://es:9200"}"#);
        let mut config = es_config(Some(file.path()));
        apply_elasticsearch(&mut config).unwrap();

        assert_eq!(config.endpoint.as_deref(), Some("http://es:9200"));
        assert_eq!(config.password.as_deref(), Some("s3cret"));
        // Absent in the file, so the inline value stays
        assert_eq!(config.username.as_deref(), Some("inline-user"));
    }

    #[test]
    fn test_no_secrets_file_is_noop() {
        let mut config = es_config(None);
        apply_elasticsearch(&mut config).unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("http://inline:9200"));
    }

    #[test]
    fn test_app_search_token_falls_back_to_password() {
        let file = secrets_file(r#"{"password":"private-key","endpoint":"http://as:3002"}"#);
        let mut config = AppSearchConfig {
            endpoint: None,
            api_path: "/api/as/v1/".to_string(),
            token: None,
            secrets_file: Some(file.path().to_path_buf()),
        };
        apply_app_search(&mut config).unwrap();

        assert_eq!(config.token.as_deref(), Some("private-key"));
        assert_eq!(config.endpoint.as_deref(), Some("http://as:3002"));
    }
}
