//! Storage backends by name
//!
//! A [`Backend`] turns [`BackendSettings`] into a ready [`Model`]. The
//! [`BackendRegistry`] is an ordinary value owned by whoever needs it; the
//! server and the CLI each build one with [`BackendRegistry::with_defaults`].

use crate::config::BackendSettings;
use crate::error::{Error, Result};
use crate::model::{MemoryModel, Model, SparqlModel, SqlConfig, SqlModel};
use crate::sparql::SparqlClient;
use indexmap::IndexMap;
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;
use tracing::info;

/// Capability flags reported by a backend and sent over the transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BackendFeatures(u32);

impl BackendFeatures {
    pub const NONE: Self = Self(0);
    pub const ADD_STATEMENT: Self = Self(1);
    pub const REMOVE_STATEMENTS: Self = Self(1 << 1);
    pub const LIST_STATEMENTS: Self = Self(1 << 2);
    pub const QUERY: Self = Self(1 << 3);
    pub const IN_MEMORY: Self = Self(1 << 4);
    pub const CONTEXT: Self = Self(1 << 5);
    pub const STORAGE_SIZE: Self = Self(1 << 6);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for BackendFeatures {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for BackendFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(BackendFeatures, &str); 7] = [
            (BackendFeatures::ADD_STATEMENT, "add"),
            (BackendFeatures::REMOVE_STATEMENTS, "remove"),
            (BackendFeatures::LIST_STATEMENTS, "list"),
            (BackendFeatures::QUERY, "query"),
            (BackendFeatures::IN_MEMORY, "in-memory"),
            (BackendFeatures::CONTEXT, "context"),
            (BackendFeatures::STORAGE_SIZE, "storage-size"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join(","))
    }
}

/// Factory for one kind of model
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    fn create_model(&self, settings: &BackendSettings) -> Result<Arc<dyn Model>>;

    fn supported_features(&self) -> BackendFeatures;
}

/// In-process quad store
#[derive(Debug, Default)]
pub struct MemoryBackend;

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn create_model(&self, _settings: &BackendSettings) -> Result<Arc<dyn Model>> {
        Ok(Arc::new(MemoryModel::new()))
    }

    fn supported_features(&self) -> BackendFeatures {
        BackendFeatures::ADD_STATEMENT
            | BackendFeatures::REMOVE_STATEMENTS
            | BackendFeatures::LIST_STATEMENTS
            | BackendFeatures::QUERY
            | BackendFeatures::IN_MEMORY
            | BackendFeatures::CONTEXT
            | BackendFeatures::STORAGE_SIZE
    }
}

/// SQLite quad table
#[derive(Debug, Default)]
pub struct SqliteBackend;

impl Backend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn create_model(&self, settings: &BackendSettings) -> Result<Arc<dyn Model>> {
        let base = match (&settings.storage_path, settings.in_memory) {
            (Some(path), false) => SqlConfig::file(path),
            _ => SqlConfig::in_memory(),
        };
        let config = SqlConfig {
            busy_retries: settings.busy_retries,
            busy_retry_interval: settings.busy_retry_interval(),
            ..base.with_page_size(settings.page_size)
        };
        Ok(Arc::new(SqlModel::open(config)?))
    }

    fn supported_features(&self) -> BackendFeatures {
        BackendFeatures::ADD_STATEMENT
            | BackendFeatures::REMOVE_STATEMENTS
            | BackendFeatures::LIST_STATEMENTS
            | BackendFeatures::QUERY
            | BackendFeatures::CONTEXT
            | BackendFeatures::STORAGE_SIZE
    }
}

/// Remote SPARQL 1.1 endpoint
#[derive(Debug, Default)]
pub struct SparqlBackend;

impl Backend for SparqlBackend {
    fn name(&self) -> &str {
        "sparql"
    }

    fn create_model(&self, settings: &BackendSettings) -> Result<Arc<dyn Model>> {
        let url = settings
            .endpoint_url
            .as_deref()
            .ok_or_else(|| Error::invalid_argument("the sparql backend needs an endpoint_url"))?;
        let mut client = SparqlClient::with_timeout(url, settings.request_timeout())?;
        if let Some(user) = &settings.user {
            client = client.with_credentials(user.clone(), settings.password.clone());
        }
        Ok(Arc::new(SparqlModel::with_client(client)))
    }

    fn supported_features(&self) -> BackendFeatures {
        BackendFeatures::ADD_STATEMENT
            | BackendFeatures::REMOVE_STATEMENTS
            | BackendFeatures::LIST_STATEMENTS
            | BackendFeatures::QUERY
            | BackendFeatures::CONTEXT
    }
}

/// Backends by name, in registration order
#[derive(Default)]
pub struct BackendRegistry {
    backends: IndexMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `memory`, `sqlite` and `sparql`
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MemoryBackend));
        registry.register(Arc::new(SqliteBackend));
        registry.register(Arc::new(SparqlBackend));
        registry
    }

    /// Add `backend`, replacing any backend of the same name
    pub fn register(&mut self, backend: Arc<dyn Backend>) -> Option<Arc<dyn Backend>> {
        self.backends.insert(backend.name().to_ascii_lowercase(), backend)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Backend>> {
        self.backends.get(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    pub fn create_model(&self, name: &str, settings: &BackendSettings) -> Result<Arc<dyn Model>> {
        let backend = self
            .get(name)
            .ok_or_else(|| Error::invalid_argument(format!("unknown backend '{}'", name)))?;
        let model = backend.create_model(settings)?;
        info!(backend = backend.name(), features = %backend.supported_features(), "model created");
        Ok(model)
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry").field("backends", &self.names()).finish()
    }
}
