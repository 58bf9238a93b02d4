// src/sync/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("sync source error: {0}")]
    Source(String),
    #[error("sync store error: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error("sync embedding error: {0}")]
    Embedding(#[from] crate::embedding::EmbeddingError),
    #[error("sync state io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sync state serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("sync internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
