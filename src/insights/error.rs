// src/insights/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightsError {
    #[error("insights store error: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error("insights computation was cancelled")]
    JoinError(#[from] tokio::task::JoinError),
    #[error("insights internal error: {0}")]
    Internal(String),
}

impl InsightsError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type InsightsResult<T> = Result<T, InsightsError>;
