//! Exponential backoff with jitter and a rate-limit factor.

use super::classify::FailureKind;
use super::strategy::BackoffStrategy;
use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff that waits longer after rate-limited failures.
///
/// # Mathematical Formula
///
/// For failed attempt `n` (0-indexed):
/// ```text
/// base_delay = rate_limited ? base * rate_limit_factor : base
/// raw_delay  = base_delay * multiplier^n
/// jitter     = raw_delay * jitter_ratio * uniform(-1, 1)
/// delay      = clamp(raw_delay + jitter, 0, max_delay)
/// ```
///
/// With the defaults (`multiplier = 2`, `jitter_ratio = 0.2`,
/// `rate_limit_factor = 3`) a 5s base gives roughly 5s, 10s, 20s for generic
/// failures and 15s, 30s, 60s after a 429.
///
/// # Examples
///
/// ```rust
/// use paceguard::retry::{ExponentialBackoff, FailureKind};
/// use std::time::Duration;
///
/// let backoff = ExponentialBackoff::builder()
///     .base_delay(Duration::from_secs(1))
///     .max_delay(Duration::from_secs(10))
///     .build();
///
/// assert_eq!(backoff.nominal_delay(1, FailureKind::Generic), Duration::from_secs(2));
/// assert_eq!(backoff.nominal_delay(1, FailureKind::RateLimited), Duration::from_secs(6));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: f64,
    rate_limit_factor: f64,
}

impl ExponentialBackoff {
    /// Create a new builder for configuring exponential backoff.
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    /// Backoff matching a retry policy's base and maximum delay.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::builder()
            .base_delay(config.base_retry_delay)
            .max_delay(config.max_retry_delay)
            .build()
    }

    /// Upper bound of any delay this backoff produces.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay without jitter, capped at `max_delay`.
    pub fn nominal_delay(&self, attempt: u32, kind: FailureKind) -> Duration {
        self.delay_with_jitter(attempt, kind, 0.0)
    }

    /// Delay for a given jitter sample.
    ///
    /// `unit` is the random draw in `[-1.0, 1.0]`; values outside are clamped.
    /// [`BackoffStrategy::next_delay`] calls this with a fresh uniform sample.
    pub fn delay_with_jitter(&self, attempt: u32, kind: FailureKind, unit: f64) -> Duration {
        let max = self.max_delay.as_secs_f64();
        let base = match kind {
            FailureKind::RateLimited => self.base_delay.as_secs_f64() * self.rate_limit_factor,
            FailureKind::Generic => self.base_delay.as_secs_f64(),
        };
        if base <= 0.0 {
            return Duration::ZERO;
        }

        let raw = base * self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        if !raw.is_finite() {
            return self.max_delay;
        }

        let jitter = raw * self.jitter * unit.clamp(-1.0, 1.0);
        from_secs_rounded((raw + jitter).max(0.0).min(max))
    }
}

// Rounds to the nearest nanosecond so that e.g. 2.4s is exactly 2400ms.
fn from_secs_rounded(secs: f64) -> Duration {
    Duration::from_nanos((secs * 1e9).round() as u64)
}

impl Default for ExponentialBackoff {
    /// Defaults:
    /// - `base_delay`: 5s
    /// - `max_delay`: 120s
    /// - `multiplier`: 2.0
    /// - `jitter`: 0.2 (±20%)
    /// - `rate_limit_factor`: 3.0
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32, kind: FailureKind) -> Duration {
        let unit = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(-1.0..=1.0)
        } else {
            0.0
        };
        self.delay_with_jitter(attempt, kind, unit)
    }
}

/// Builder for configuring [`ExponentialBackoff`].
///
/// ```rust
/// use paceguard::retry::ExponentialBackoff;
/// use std::time::Duration;
///
/// let backoff = ExponentialBackoff::builder()
///     .base_delay(Duration::from_millis(500))
///     .max_delay(Duration::from_secs(30))
///     .jitter(0.1)
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct ExponentialBackoffBuilder {
    base_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
    rate_limit_factor: Option<f64>,
}

impl ExponentialBackoffBuilder {
    /// Base delay for generic failures.
    ///
    /// Default: 5s
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    /// Maximum delay between attempts.
    ///
    /// Default: 120s
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Growth factor per attempt. Values below 1.0 are raised to 1.0.
    ///
    /// Default: 2.0
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier.max(1.0));
        self
    }

    /// Jitter ratio (0.0 to 1.0).
    ///
    /// Default: 0.2
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter.clamp(0.0, 1.0));
        self
    }

    /// Base delay multiplier applied to rate-limited failures. Values below 1.0
    /// are raised to 1.0.
    ///
    /// Default: 3.0
    pub fn rate_limit_factor(mut self, factor: f64) -> Self {
        self.rate_limit_factor = Some(factor.max(1.0));
        self
    }

    /// Build the `ExponentialBackoff` instance.
    pub fn build(self) -> ExponentialBackoff {
        ExponentialBackoff {
            base_delay: self.base_delay.unwrap_or(Duration::from_secs(5)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(120)),
            multiplier: self.multiplier.unwrap_or(2.0),
            jitter: self.jitter.unwrap_or(0.2),
            rate_limit_factor: self.rate_limit_factor.unwrap_or(3.0),
        }
    }
}
