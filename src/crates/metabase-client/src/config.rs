//! Configuration management for the Metabase client.
//!
//! # Example
//!
//! ```rust,ignore
//! use metabase_client::config::{get_env, MetabaseConfig};
//!
//! let config = MetabaseConfig::from_env()?;
//! let key = get_env("METABASE_API_KEY")?;
//! ```

use crate::error::{MetabaseError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Get an environment variable as a string.
pub fn get_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|e| {
        MetabaseError::ConfigError(format!("Environment variable '{}' not found: {}", key, e))
    })
}

/// Get an environment variable and parse it to the specified type.
pub fn get_env_parse<T: std::str::FromStr>(key: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let value = get_env(key)?;
    value.trim().parse::<T>().map_err(|e| {
        MetabaseError::ConfigError(format!(
            "Failed to parse environment variable '{}': {}",
            key, e
        ))
    })
}

/// Get an environment variable and parse it, or use a default value.
pub fn get_env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    get_env_parse(key).unwrap_or(default)
}

/// Connection settings for a Metabase instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetabaseConfig {
    /// Instance root, without trailing slash.
    pub base_url: String,

    /// Sent as the `x-api-key` header.
    pub api_key: String,

    /// Minimum delay between consecutive requests.
    #[serde(default = "default_api_delay")]
    pub api_delay: Duration,

    /// Request timeout duration.
    #[serde(default = "default_timeout")]
    pub request_timeout: Duration,

    /// Maximum number of retries for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay between retries.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: Duration,
}

impl MetabaseConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_delay: default_api_delay(),
            request_timeout: default_timeout(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
        }
    }

    /// Read `METABASE_BASE_URL`, `METABASE_API_KEY`, and the optional
    /// `API_DELAY_SECONDS` / `REQUEST_TIMEOUT_SECONDS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(get_env("METABASE_BASE_URL")?, get_env("METABASE_API_KEY")?);
        config.api_delay =
            Duration::from_secs_f64(get_env_parse_or("API_DELAY_SECONDS", 0.2_f64).max(0.0));
        config.request_timeout =
            Duration::from_secs(get_env_parse_or("REQUEST_TIMEOUT_SECONDS", 30_u64));
        config.validate()?;
        Ok(config)
    }

    pub fn with_api_delay(mut self, delay: Duration) -> Self {
        self.api_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(MetabaseError::ConfigError("base_url is empty".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(MetabaseError::ConfigError(format!(
                "base_url must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.api_key.trim().is_empty() {
            return Err(MetabaseError::ConfigError("api_key is empty".to_string()));
        }
        Ok(())
    }
}

fn default_api_delay() -> Duration {
    Duration::from_millis(200)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}
