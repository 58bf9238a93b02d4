// src/config/self_query.rs
// Self-query parser configuration

use super::helpers::{env_or, env_parsed_or};
use super::ConfigError;

#[derive(Debug, Clone)]
pub struct SelfQueryConfig {
    pub model: String,
    pub cache_ttl_seconds: u64,
    pub cache_cap: usize,
    /// Shares `OPENAI_API_KEY` with the embedding provider. `None` disables
    /// natural-language query parsing; callers fall back to plain vector search.
    pub api_key: Option<String>,
}

impl SelfQueryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            model: env_or("IVDEX_SELF_QUERY_MODEL", "gpt-4o-mini"),
            cache_ttl_seconds: env_parsed_or("IVDEX_SELF_QUERY_CACHE_TTL_SECONDS", 300),
            cache_cap: env_parsed_or("IVDEX_SELF_QUERY_CACHE_CAP", 1000),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
        })
    }
}
