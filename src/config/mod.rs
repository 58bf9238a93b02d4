// src/config/mod.rs
// Environment-derived configuration, composed from one struct per component.

mod helpers;

pub mod embedding;
pub mod insights;
pub mod self_query;
pub mod store;
pub mod sync;

use std::path::PathBuf;
use std::sync::OnceLock;

use thiserror::Error;

pub use embedding::EmbeddingConfig;
pub use insights::InsightsConfig;
pub use self_query::SelfQueryConfig;
pub use store::StoreConfig;
pub use sync::SyncConfig;

/// Configuration errors. Construction fails fast rather than panicking so an
/// embedding application can report a clean startup error instead of a trap.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    Missing(String),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    pub fn missing(key: impl Into<String>) -> Self {
        Self::Missing(key.into())
    }

    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub self_query: SelfQueryConfig,
    pub insights: InsightsConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path = PathBuf::from(helpers::env_or("IVDEX_DB_PATH", "./data/ivdex"));
        Ok(Self {
            embedding: EmbeddingConfig::from_env()?,
            store: StoreConfig::from_env()?,
            sync: SyncConfig::from_env()?,
            self_query: SelfQueryConfig::from_env()?,
            insights: InsightsConfig::from_env()?,
            db_path,
        })
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.db_path.join("embedding_cache.db")
    }

    pub fn vector_store_path(&self) -> PathBuf {
        self.db_path.join("vector_store.db")
    }

    pub fn sync_state_path(&self) -> PathBuf {
        self.db_path.join("sync_state.json")
    }
}

/// Process-wide config for code paths that cannot thread a reference
/// through, such as the scheduler's signal handler. Set once via
/// `install()` during startup; reads before that return `None`.
static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Install the process-wide config. Returns an error if called twice.
pub fn install(config: AppConfig) -> Result<(), ConfigError> {
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::invalid("CONFIG", "already installed"))
}

pub fn global() -> Option<&'static AppConfig> {
    CONFIG.get()
}
