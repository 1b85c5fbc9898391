//! Node configuration.

use std::path::{Path, PathBuf};

use relay_actors::EngineConfig;
use relay_core::InstanceProperties;
use relay_db::DbConfig;
use serde::Deserialize;
use thiserror::Error;
use ulid::Ulid;

/// Environment variable overriding the instance id.
pub const ENV_SLING_ID: &str = "RELAY_SLING_ID";
/// Environment variable overriding the store location.
pub const ENV_STORE_PATH: &str = "RELAY_STORE_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Where jobs are persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Process memory; jobs are lost on restart.
    #[default]
    Memory,
    /// One JSON file per job under `path`.
    File { path: PathBuf },
    /// SurrealDB.
    Surreal(DbConfig),
}

/// Configuration of one relay node.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Unique id of this instance. Generated when not configured.
    pub sling_id: String,
    pub store: StoreConfig,
    pub engine: EngineConfig,
    /// Instance properties published in the topology.
    pub properties: InstanceProperties,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            sling_id: Ulid::new().to_string(),
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
            properties: InstanceProperties::new(),
        }
    }
}

impl NodeConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` if given, otherwise defaults; then apply `RELAY_*`
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_overrides(|name| std::env::var(name).ok()))
    }

    /// Apply overrides looked up by variable name.
    ///
    /// A store path switches a memory store to a file store; for SurrealDB
    /// it becomes a file-backed endpoint.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(sling_id) = lookup(ENV_SLING_ID).filter(|s| !s.is_empty()) {
            self.sling_id = sling_id;
        }
        if let Some(path) = lookup(ENV_STORE_PATH).filter(|s| !s.is_empty()) {
            self.store = match self.store {
                StoreConfig::Memory | StoreConfig::File { .. } => StoreConfig::File {
                    path: PathBuf::from(path),
                },
                StoreConfig::Surreal(db) => StoreConfig::Surreal(DbConfig {
                    endpoint: DbConfig::file(path).endpoint,
                    ..db
                }),
            };
        }
        self
    }

    pub fn with_sling_id(mut self, sling_id: impl Into<String>) -> Self {
        self.sling_id = sling_id.into();
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}
