//! Server configuration
//!
//! Loaded from YAML. Every field has a default, so an empty document (or no
//! file at all) yields a server on `127.0.0.1:5000` over an in-memory model.
//!
//! ```yaml
//! server:
//!   port: 5000
//! endpoint:
//!   port: 8080
//! backend:
//!   name: sqlite
//!   settings:
//!     storage_path: ./triples.db
//!     page_size: 512
//! ```

use crate::error::{Error, Result};
use crate::protocol::ServerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    /// SPARQL HTTP endpoint; disabled when absent
    pub endpoint: Option<EndpointConfig>,
    pub backend: BackendConfig,
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::invalid_argument(format!("invalid configuration: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::invalid_argument(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml(&text)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::unknown(e.to_string()))
    }
}

/// SPARQL protocol endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub address: String,
    pub port: u16,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Which backend to instantiate and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Registered backend name, see [`BackendRegistry`](crate::backend::BackendRegistry)
    pub name: String,
    pub settings: BackendSettings,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            settings: BackendSettings::default(),
        }
    }
}

/// Backend options. Each backend reads the ones it understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Database file for storage backends
    pub storage_path: Option<PathBuf>,
    /// Keep storage in memory even when a path is set
    pub in_memory: bool,
    /// SPARQL endpoint URL
    pub endpoint_url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Rows fetched per cursor round trip
    pub page_size: usize,
    /// Retries of a busy or locked database
    pub busy_retries: u32,
    pub busy_retry_interval_ms: u64,
    /// HTTP request timeout; 0 disables it
    pub request_timeout_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            storage_path: None,
            in_memory: false,
            endpoint_url: None,
            user: None,
            password: None,
            page_size: 256,
            busy_retries: 10,
            busy_retry_interval_ms: 50,
            request_timeout_ms: 30_000,
        }
    }
}

impl BackendSettings {
    pub fn busy_retry_interval(&self) -> Duration {
        Duration::from_millis(self.busy_retry_interval_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.backend.name, "memory");
        assert!(config.endpoint.is_none());
    }

    #[test]
    fn test_partial_document() {
        let config = Config::from_yaml(
            "server:\n  port: 7000\nendpoint: {}\nbackend:\n  name: sqlite\n  settings:\n    storage_path: /tmp/t.db\n    page_size: 16\n",
        )
        .unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.endpoint, Some(EndpointConfig::default()));
        assert_eq!(config.backend.name, "sqlite");
        assert_eq!(config.backend.settings.page_size, 16);
        assert_eq!(config.backend.settings.busy_retries, 10);
        assert_eq!(config.backend.settings.storage_path, Some(PathBuf::from("/tmp/t.db")));
    }

    #[test]
    fn test_yaml_round_trip_and_errors() {
        let mut config = Config::default();
        config.backend.settings.request_timeout_ms = 0;
        let back = Config::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(back, config);
        assert!(back.backend.settings.request_timeout().is_none());
        assert!(Config::from_yaml("server: [1, 2]").is_err());
    }
}
