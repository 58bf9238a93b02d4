// src/self_query/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SelfQueryError {
    #[error("self-query request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("self-query provider returned an error: {0}")]
    ProviderFailure(String),
    #[error("self-query internal error: {0}")]
    Internal(String),
}

impl SelfQueryError {
    pub fn provider_failure(msg: impl Into<String>) -> Self {
        Self::ProviderFailure(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type SelfQueryResult<T> = Result<T, SelfQueryError>;
