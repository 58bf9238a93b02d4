// src/error.rs
// Top-level error type unifying every component's error enum

use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::embedding::EmbeddingError;
use crate::insights::InsightsError;
use crate::self_query::SelfQueryError;
use crate::store::StoreError;
use crate::sync::SyncError;

/// Crate-wide error type. Components return their own typed error; code that
/// crosses component boundaries (AppContext, the scheduler) collapses into this.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
    #[error("self-query error: {0}")]
    SelfQuery(#[from] SelfQueryError),
    #[error("insights error: {0}")]
    Insights(#[from] InsightsError),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type IndexResult<T> = Result<T, IndexError>;
