//! Configuration for retries and pacing

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for a [`RetryExecutor`](crate::RetryExecutor).
///
/// Durations are (de)serialized as whole milliseconds under `*_ms` keys so a
/// config file reads naturally:
///
/// ```toml
/// max_retries_per_request = 3
/// base_retry_delay_ms = 5000
/// max_retry_delay_ms = 120000
/// error_threshold_percent = 20.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the initial attempt (0 means a single attempt)
    pub max_retries_per_request: u32,

    /// Base delay for generic failures; rate-limited failures use three times this
    #[serde(rename = "base_retry_delay_ms", with = "duration_ms")]
    pub base_retry_delay: Duration,

    /// Upper bound for any single backoff delay
    #[serde(rename = "max_retry_delay_ms", with = "duration_ms")]
    pub max_retry_delay: Duration,

    /// Error rate (percent) at or above which slow mode is recommended
    pub error_threshold_percent: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries_per_request: 3,
            base_retry_delay: Duration::from_secs(5),
            max_retry_delay: Duration::from_secs(120),
            error_threshold_percent: 20.0,
        }
    }
}

impl RetryConfig {
    /// Check that the policy is usable.
    pub fn validate(&self) -> Result<()> {
        if !self.error_threshold_percent.is_finite() || self.error_threshold_percent < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "error_threshold_percent must be a non-negative number, got {}",
                self.error_threshold_percent
            )));
        }
        Ok(())
    }
}

/// Base pacing window for an [`AdaptiveThrottler`](crate::AdaptiveThrottler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Shortest pause between two units of work at normal speed
    #[serde(rename = "min_delay_ms", with = "duration_ms")]
    pub base_min_delay: Duration,

    /// Longest pause between two units of work at normal speed
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub base_max_delay: Duration,
}

impl Default for ThrottleConfig {
    /// 5-15 seconds between page fetches, a conservative scraping cadence.
    fn default() -> Self {
        Self {
            base_min_delay: Duration::from_secs(5),
            base_max_delay: Duration::from_secs(15),
        }
    }
}

impl ThrottleConfig {
    /// Check that the window is not inverted.
    pub fn validate(&self) -> Result<()> {
        if self.base_min_delay > self.base_max_delay {
            return Err(Error::InvalidConfig(format!(
                "min_delay ({:?}) exceeds max_delay ({:?})",
                self.base_min_delay, self.base_max_delay
            )));
        }
        Ok(())
    }
}

/// Combined configuration for one paced session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaceguardConfig {
    /// Retry policy
    pub retry: RetryConfig,

    /// Pacing window
    pub throttle: ThrottleConfig,
}

impl PaceguardConfig {
    /// Validate both sections.
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        self.throttle.validate()
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honored. Unset variables keep
    /// their defaults; set but malformed ones are an error.
    ///
    /// This will look for:
    /// - `PACEGUARD_MAX_RETRIES`
    /// - `PACEGUARD_BASE_RETRY_DELAY_MS`
    /// - `PACEGUARD_MAX_RETRY_DELAY_MS`
    /// - `PACEGUARD_ERROR_THRESHOLD_PERCENT`
    /// - `PACEGUARD_MIN_DELAY_MS`
    /// - `PACEGUARD_MAX_DELAY_MS`
    #[cfg(feature = "env")]
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Some(max_retries) = env_var::<u32>("PACEGUARD_MAX_RETRIES")? {
            config.retry.max_retries_per_request = max_retries;
        }
        if let Some(ms) = env_var::<u64>("PACEGUARD_BASE_RETRY_DELAY_MS")? {
            config.retry.base_retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_var::<u64>("PACEGUARD_MAX_RETRY_DELAY_MS")? {
            config.retry.max_retry_delay = Duration::from_millis(ms);
        }
        if let Some(threshold) = env_var::<f64>("PACEGUARD_ERROR_THRESHOLD_PERCENT")? {
            config.retry.error_threshold_percent = threshold;
        }
        if let Some(ms) = env_var::<u64>("PACEGUARD_MIN_DELAY_MS")? {
            config.throttle.base_min_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_var::<u64>("PACEGUARD_MAX_DELAY_MS")? {
            config.throttle.base_max_delay = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(feature = "env")]
fn env_var<T>(var: &'static str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| Error::Env {
            var,
            message: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
