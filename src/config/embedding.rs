// src/config/embedding.rs
// Embedding provider and pipeline configuration

use super::helpers::{env_bool_or, env_or, env_parsed_or, require_env};
use super::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Local,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown embedding provider '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub max_concurrent_embeddings: usize,
    pub cache_embeddings: bool,
    pub max_cache_entries: usize,
    /// Only required when `provider == OpenAi`.
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
}

impl EmbeddingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider: ProviderKind = env_or("IVDEX_EMBEDDING_PROVIDER", "openai")
            .parse()
            .map_err(|e| ConfigError::invalid("IVDEX_EMBEDDING_PROVIDER", e))?;

        let openai_api_key = match provider {
            ProviderKind::OpenAi => Some(require_env("OPENAI_API_KEY")?),
            ProviderKind::Local => None,
        };

        Ok(Self {
            provider,
            model: env_or("IVDEX_EMBEDDING_MODEL", "text-embedding-3-small"),
            dimensions: env_parsed_or("IVDEX_EMBEDDING_DIMENSIONS", 1536),
            batch_size: env_parsed_or("IVDEX_BATCH_SIZE", 100),
            max_concurrent_embeddings: env_parsed_or("IVDEX_MAX_CONCURRENT_EMBEDDINGS", 5),
            cache_embeddings: env_bool_or("IVDEX_CACHE_EMBEDDINGS", true),
            max_cache_entries: env_parsed_or("IVDEX_MAX_CACHE_ENTRIES", 100_000),
            openai_api_key,
            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
        })
    }
}
