// src/cache/error.rs
// Error type for the embedding cache

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache internal error: {0}")]
    Internal(String),
}

impl CacheError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

pub trait IntoCacheErrorResult<T> {
    fn into_cache_error(self, context: &str) -> Result<T, CacheError>;
}

impl<T, E: std::fmt::Display> IntoCacheErrorResult<T> for Result<T, E> {
    fn into_cache_error(self, context: &str) -> Result<T, CacheError> {
        self.map_err(|e| CacheError::Internal(format!("{context}: {e}")))
    }
}
