// src/config/sync.rs
// Sync engine and scheduler configuration

use super::helpers::{env_bool_or, env_or, env_parsed_or};
use super::ConfigError;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
    /// Empty means "all projects" (source had `sync_projects = "*"`).
    pub projects: Vec<String>,
    pub sync_comments: bool,
    pub embed_batch_size: usize,
    pub full_sync_lookback_days: i64,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: env_bool_or("IVDEX_SYNC_ENABLED", true),
            interval_minutes: env_parsed_or("IVDEX_SYNC_INTERVAL_MINUTES", 30),
            projects: parse_projects(&env_or("IVDEX_SYNC_PROJECTS", "*")),
            sync_comments: env_bool_or("IVDEX_SYNC_COMMENTS", true),
            embed_batch_size: env_parsed_or("IVDEX_EMBED_BATCH_SIZE", 100),
            full_sync_lookback_days: env_parsed_or("IVDEX_FULL_SYNC_LOOKBACK_DAYS", 365),
        })
    }
}

fn parse_projects(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "*" {
        return Vec::new();
    }
    trimmed
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
