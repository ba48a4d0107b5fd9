//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so a client can start with zero
//! configuration against a local development server.

use std::time::Duration;

use quickchat_shared::constants::{
    CACHE_RETENTION_DAYS, DEFAULT_FETCH_LIMIT, DEFAULT_HTTP_TIMEOUT_MS, DEFAULT_MAX_BACKOFF_MS,
    DEFAULT_POLL_INTERVAL_MS,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the chat API.
    /// Env: `QUICKCHAT_API_URL`
    /// Default: `http://localhost:8000/api`
    pub api_url: String,

    /// Interval between polls while the view is visible and online.
    /// Env: `QUICKCHAT_POLL_INTERVAL_MS`
    /// Default: 3000
    pub poll_interval: Duration,

    /// Maximum messages requested per fetch.
    /// Env: `QUICKCHAT_FETCH_LIMIT`
    /// Default: 50
    pub fetch_limit: u32,

    /// Per-request HTTP timeout.
    /// Env: `QUICKCHAT_HTTP_TIMEOUT_MS`
    /// Default: 10000
    pub http_timeout: Duration,

    /// Cached snapshots older than this are swept at startup.
    /// Env: `QUICKCHAT_CACHE_MAX_AGE_DAYS`
    /// Default: 30
    pub cache_max_age_days: i64,

    /// Ceiling for the failure backoff between polls.
    /// Env: `QUICKCHAT_MAX_BACKOFF_MS`
    /// Default: 60000
    pub max_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/api".to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            fetch_limit: DEFAULT_FETCH_LIMIT,
            http_timeout: Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS),
            cache_max_age_days: CACHE_RETENTION_DAYS,
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.  Invalid values warn and keep the default rather than
    /// refusing to start.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("QUICKCHAT_API_URL") {
            if !url.is_empty() {
                config.api_url = url;
            }
        }

        if let Ok(val) = std::env::var("QUICKCHAT_POLL_INTERVAL_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.poll_interval = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid QUICKCHAT_POLL_INTERVAL_MS, using default"),
            }
        }

        if let Ok(val) = std::env::var("QUICKCHAT_FETCH_LIMIT") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.fetch_limit = n,
                _ => tracing::warn!(value = %val, "Invalid QUICKCHAT_FETCH_LIMIT, using default"),
            }
        }

        if let Ok(val) = std::env::var("QUICKCHAT_HTTP_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.http_timeout = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid QUICKCHAT_HTTP_TIMEOUT_MS, using default"),
            }
        }

        if let Ok(val) = std::env::var("QUICKCHAT_CACHE_MAX_AGE_DAYS") {
            match val.parse::<i64>() {
                Ok(days) if days > 0 => config.cache_max_age_days = days,
                _ => tracing::warn!(value = %val, "Invalid QUICKCHAT_CACHE_MAX_AGE_DAYS, using default"),
            }
        }

        if let Ok(val) = std::env::var("QUICKCHAT_MAX_BACKOFF_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.max_backoff = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid QUICKCHAT_MAX_BACKOFF_MS, using default"),
            }
        }

        config
    }

    /// Retention window for cached snapshots.
    pub fn cache_max_age(&self) -> chrono::Duration {
        chrono::Duration::days(self.cache_max_age_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = ClientConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.fetch_limit, 50);
        assert_eq!(config.max_backoff, Duration::from_secs(60));
        assert_eq!(config.cache_max_age(), chrono::Duration::days(30));
    }
}
