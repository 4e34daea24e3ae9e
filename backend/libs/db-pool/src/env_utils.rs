//! Environment variable parsing utilities
//!
//! Safe functions for reading numeric pool settings from the environment
//! without unwrap() calls.

use std::str::FromStr;

/// Parse an environment variable with a default fallback
///
/// Missing, empty and unparsable values all yield `default`.
///
/// # Example
/// ```ignore
/// let max: u32 = parse_env_with_default("DB_MAX_CONNECTIONS", 5);
/// ```
pub fn parse_env_with_default<T: FromStr>(key: &str, default: T) -> T {
    parse_env_optional(key).unwrap_or(default)
}

/// Parse an environment variable, returning None if missing, empty or invalid
pub fn parse_env_optional<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| v.trim().parse().ok())
}
