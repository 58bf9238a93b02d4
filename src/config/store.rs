// src/config/store.rs
// Vector store configuration

use super::helpers::env_parsed_or;
use super::ConfigError;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub fts_weight: f32,
    pub default_min_score: f32,
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let fts_weight: f32 = env_parsed_or("IVDEX_FTS_WEIGHT", 0.3);
        if !(0.0..=1.0).contains(&fts_weight) {
            return Err(ConfigError::invalid(
                "IVDEX_FTS_WEIGHT",
                "must be within [0, 1]",
            ));
        }
        Ok(Self {
            fts_weight,
            default_min_score: env_parsed_or("IVDEX_DEFAULT_MIN_SCORE", 0.2),
        })
    }
}
