// src/embedding/error.rs
// Error type for the embedding pipeline and its providers

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("transient provider error: {0}")]
    Transient(String),
    #[error("provider hard failure: {0}")]
    ProviderFailure(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("embedding internal error: {0}")]
    Internal(String),
}

impl EmbeddingError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn provider_failure(msg: impl Into<String>) -> Self {
        Self::ProviderFailure(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error should be retried with backoff rather than
    /// treated as a hard failure for the whole batch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EmbeddingError::Transient(_))
            || matches!(self, EmbeddingError::Http(e) if e.is_timeout() || e.is_connect())
    }
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;
