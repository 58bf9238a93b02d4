// src/store/error.rs
// Error type for the vector store

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait IntoStoreErrorResult<T> {
    fn into_store_error(self, context: &str) -> Result<T, StoreError>;
}

impl<T, E: std::fmt::Display> IntoStoreErrorResult<T> for Result<T, E> {
    fn into_store_error(self, context: &str) -> Result<T, StoreError> {
        self.map_err(|e| StoreError::Internal(format!("{context}: {e}")))
    }
}
