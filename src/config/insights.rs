// src/config/insights.rs
// Insights engine thresholds

use super::helpers::env_parsed_or;
use super::ConfigError;

#[derive(Debug, Clone)]
pub struct InsightsConfig {
    pub duplicate_threshold: f32,
    pub similar_threshold: f32,
}

impl InsightsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            duplicate_threshold: env_parsed_or("IVDEX_DUPLICATE_THRESHOLD", 0.85),
            similar_threshold: env_parsed_or("IVDEX_SIMILAR_THRESHOLD", 0.70),
        })
    }
}
