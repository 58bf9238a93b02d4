// src/config/helpers.rs
// Helper functions for loading typed configuration from environment variables

use std::env;

use super::ConfigError;

pub fn require_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::missing(key))
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn require_env_parsed<T: std::str::FromStr>(key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    let raw = require_env(key)?;
    raw.parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string()))
}

pub fn env_parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn env_bool_or(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
