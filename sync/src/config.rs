//! Configuration for the sync client.

use satchel_engine::DEFAULT_MAX_RETRIES;
use std::env;
use std::time::Duration;

/// Tunables for the sync coordinator and its triggers.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the backend, e.g. `https://api.example.com`
    pub base_url: String,
    /// Automatic retries per mutation before it turns Failed
    pub max_retries: u32,
    /// Per-request network timeout
    pub request_timeout: Duration,
    /// Fixed delay between network operations within a drain cycle
    pub item_delay: Duration,
    /// Minimum interval between automatically triggered cycles
    pub cycle_floor: Duration,
    /// Coarse periodic drain trigger
    pub poll_interval: Duration,
    /// Queue bound; when full, the oldest Failed item is evicted to make
    /// room. `None` means unbounded.
    pub max_queue_len: Option<usize>,
}

impl SyncConfig {
    /// Configuration with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: Duration::from_secs(10),
            item_delay: Duration::from_millis(150),
            cycle_floor: Duration::from_secs(5),
            poll_interval: Duration::from_secs(30),
            max_queue_len: None,
        }
    }

    /// Load configuration from `SATCHEL_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = env::var("SATCHEL_BASE_URL").map_err(|_| ConfigError::MissingBaseUrl)?;
        let mut config = Self::new(base_url);

        if let Ok(raw) = env::var("SATCHEL_MAX_RETRIES") {
            config.max_retries = raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SATCHEL_MAX_RETRIES"))?;
        }
        if let Ok(raw) = env::var("SATCHEL_REQUEST_TIMEOUT_MS") {
            config.request_timeout = parse_millis(raw, "SATCHEL_REQUEST_TIMEOUT_MS")?;
        }
        if let Ok(raw) = env::var("SATCHEL_ITEM_DELAY_MS") {
            config.item_delay = parse_millis(raw, "SATCHEL_ITEM_DELAY_MS")?;
        }
        if let Ok(raw) = env::var("SATCHEL_CYCLE_FLOOR_MS") {
            config.cycle_floor = parse_millis(raw, "SATCHEL_CYCLE_FLOOR_MS")?;
        }
        if let Ok(raw) = env::var("SATCHEL_POLL_INTERVAL_MS") {
            config.poll_interval = parse_millis(raw, "SATCHEL_POLL_INTERVAL_MS")?;
        }
        if let Ok(raw) = env::var("SATCHEL_MAX_QUEUE_LEN") {
            config.max_queue_len = Some(
                raw.parse()
                    .map_err(|_| ConfigError::InvalidValue("SATCHEL_MAX_QUEUE_LEN"))?,
            );
        }

        Ok(config)
    }
}

fn parse_millis(raw: String, var: &'static str) -> Result<Duration, ConfigError> {
    raw.parse()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidValue(var))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SATCHEL_BASE_URL environment variable is required")]
    MissingBaseUrl,

    #[error("Invalid value for {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::new("https://api.example.com");
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.item_delay, Duration::from_millis(150));
        assert!(config.max_queue_len.is_none());
    }
}
