//! Adaptive pacing between units of work.
//!
//! [`AdaptiveThrottler`] holds a base pause window (say 5-15 seconds between
//! page fetches) and stretches it by a discrete speed multiplier chosen from
//! the caller's current error rate:
//!
//! | error rate      | level                  | multiplier |
//! |-----------------|------------------------|------------|
//! | `> 50%`         | [`SpeedLevel::Crawl`]    | 3.0        |
//! | `> 30%`         | [`SpeedLevel::Slow`]     | 2.0        |
//! | `> 15%`         | [`SpeedLevel::Moderate`] | 1.5        |
//! | otherwise       | [`SpeedLevel::Normal`]   | 1.0        |
//!
//! Each adjustment looks only at the rate it is given. A rate hovering around
//! a boundary flips the level on every call; callers that want damping can
//! feed rates through an [`ErrorRateSmoother`] first.

use crate::config::ThrottleConfig;
use crate::error::Result;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Discrete pacing speed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SpeedLevel {
    /// Few errors, base window
    #[default]
    Normal,
    /// Some errors, window ×1.5
    Moderate,
    /// Many errors, window ×2
    Slow,
    /// Critical error rate, window ×3
    Crawl,
}

impl SpeedLevel {
    /// Level for an error rate in percent. `NaN` maps to [`SpeedLevel::Normal`].
    pub fn for_error_rate(error_rate_percent: f64) -> Self {
        if error_rate_percent > 50.0 {
            SpeedLevel::Crawl
        } else if error_rate_percent > 30.0 {
            SpeedLevel::Slow
        } else if error_rate_percent > 15.0 {
            SpeedLevel::Moderate
        } else {
            SpeedLevel::Normal
        }
    }

    /// Factor applied to the base window.
    pub fn multiplier(self) -> f64 {
        match self {
            SpeedLevel::Normal => 1.0,
            SpeedLevel::Moderate => 1.5,
            SpeedLevel::Slow => 2.0,
            SpeedLevel::Crawl => 3.0,
        }
    }
}

/// Effective pause window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    /// Shortest pause
    pub min: Duration,
    /// Longest pause
    pub max: Duration,
}

impl DelayRange {
    /// Draw a whole-millisecond pause uniformly from `[min, max]`.
    ///
    /// An inverted range yields `min`.
    pub fn sample(&self) -> Duration {
        let min = millis(self.min);
        let max = millis(self.max);
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Scales a base pause window by a speed multiplier driven by the error rate.
///
/// # Examples
///
/// ```rust
/// use paceguard::AdaptiveThrottler;
/// use std::time::Duration;
///
/// let mut throttler = AdaptiveThrottler::new(Duration::from_secs(5), Duration::from_secs(15));
///
/// throttler.adjust_speed(35.0);
/// assert_eq!(throttler.multiplier(), 2.0);
/// assert_eq!(throttler.current_delays().max, Duration::from_secs(30));
///
/// throttler.reset();
/// assert_eq!(throttler.multiplier(), 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct AdaptiveThrottler {
    base_min_delay: Duration,
    base_max_delay: Duration,
    level: SpeedLevel,
}

impl AdaptiveThrottler {
    /// Throttler at normal speed over `[base_min_delay, base_max_delay]`.
    pub fn new(base_min_delay: Duration, base_max_delay: Duration) -> Self {
        Self {
            base_min_delay,
            base_max_delay,
            level: SpeedLevel::Normal,
        }
    }

    /// Throttler from a validated [`ThrottleConfig`].
    pub fn from_config(config: &ThrottleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.base_min_delay, config.base_max_delay))
    }

    /// Recompute the speed level from the current error rate (percent).
    pub fn adjust_speed(&mut self, error_rate_percent: f64) {
        let level = SpeedLevel::for_error_rate(error_rate_percent);
        if level != self.level {
            debug!(
                error_rate_percent,
                from = ?self.level,
                to = ?level,
                multiplier = level.multiplier(),
                "throttle speed changed"
            );
        }
        self.level = level;
    }

    /// Base window scaled by the current multiplier, rounded to whole milliseconds.
    pub fn current_delays(&self) -> DelayRange {
        let multiplier = self.multiplier();
        DelayRange {
            min: scale(self.base_min_delay, multiplier),
            max: scale(self.base_max_delay, multiplier),
        }
    }

    /// Current multiplier: one of 1.0, 1.5, 2.0 or 3.0.
    pub fn multiplier(&self) -> f64 {
        self.level.multiplier()
    }

    /// Current speed level.
    pub fn speed_level(&self) -> SpeedLevel {
        self.level
    }

    /// Back to normal speed.
    pub fn reset(&mut self) {
        self.level = SpeedLevel::Normal;
    }

    /// A random pause drawn from the current window.
    pub fn sample_delay(&self) -> Duration {
        self.current_delays().sample()
    }

    /// Sleep for a random pause from the current window and return it.
    pub async fn pace(&self) -> Duration {
        let delay = self.sample_delay();
        debug!(?delay, multiplier = self.multiplier(), "pacing");
        tokio::time::sleep(delay).await;
        delay
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn scale(base: Duration, multiplier: f64) -> Duration {
    Duration::from_millis((base.as_nanos() as f64 * multiplier / 1e6).round() as u64)
}

/// Exponential moving average of error rates.
///
/// Put it in front of [`AdaptiveThrottler::adjust_speed`] to stop a rate that
/// oscillates around a threshold from flipping the speed level on every
/// call. `alpha` is the weight of the newest observation.
///
/// ```rust
/// use paceguard::{AdaptiveThrottler, ErrorRateSmoother, SpeedLevel};
/// use std::time::Duration;
///
/// let mut smoother = ErrorRateSmoother::new(0.3);
/// let mut throttler = AdaptiveThrottler::new(Duration::from_secs(1), Duration::from_secs(2));
///
/// for rate in [14.9, 15.1, 14.9, 15.1] {
///     throttler.adjust_speed(smoother.observe(rate));
/// }
/// assert_eq!(throttler.speed_level(), SpeedLevel::Normal);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRateSmoother {
    alpha: f64,
    value: Option<f64>,
}

impl ErrorRateSmoother {
    /// Smoother with weight `alpha`, clamped to `(0, 1]`.
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_finite() {
            alpha.clamp(f64::EPSILON, 1.0)
        } else {
            1.0
        };
        Self { alpha, value: None }
    }

    /// Fold in a new error rate and return the smoothed value.
    ///
    /// The first observation is taken as is. Non-finite rates are ignored.
    pub fn observe(&mut self, error_rate_percent: f64) -> f64 {
        if !error_rate_percent.is_finite() {
            return self.value.unwrap_or(0.0);
        }
        let next = match self.value {
            Some(current) => current + self.alpha * (error_rate_percent - current),
            None => error_rate_percent,
        };
        self.value = Some(next);
        next
    }

    /// Smoothed rate so far, if any rate has been observed.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Forget all observations.
    pub fn reset(&mut self) {
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn throttler() -> AdaptiveThrottler {
        AdaptiveThrottler::new(Duration::from_millis(5000), Duration::from_millis(15000))
    }

    #[rstest]
    #[case(0.0, 1.0)]
    #[case(10.0, 1.0)]
    #[case(15.0, 1.0)]
    #[case(15.1, 1.5)]
    #[case(30.0, 1.5)]
    #[case(30.5, 2.0)]
    #[case(50.0, 2.0)]
    #[case(50.1, 3.0)]
    #[case(100.0, 3.0)]
    #[case(f64::NAN, 1.0)]
    fn test_multiplier_thresholds(#[case] error_rate: f64, #[case] expected: f64) {
        let mut throttler = throttler();
        throttler.adjust_speed(error_rate);
        assert_eq!(throttler.multiplier(), expected);
    }

    #[test]
    fn test_every_call_recomputes() {
        let mut throttler = throttler();

        throttler.adjust_speed(60.0);
        assert_eq!(throttler.speed_level(), SpeedLevel::Crawl);

        throttler.adjust_speed(14.9);
        assert_eq!(throttler.speed_level(), SpeedLevel::Normal);

        throttler.adjust_speed(15.1);
        assert_eq!(throttler.speed_level(), SpeedLevel::Moderate);
    }

    #[test]
    fn test_window_follows_level_and_reset() {
        let mut throttler = throttler();
        let base = DelayRange {
            min: Duration::from_millis(5000),
            max: Duration::from_millis(15000),
        };

        throttler.adjust_speed(10.0);
        assert_eq!(throttler.current_delays(), base);

        throttler.adjust_speed(60.0);
        assert_eq!(
            throttler.current_delays(),
            DelayRange {
                min: Duration::from_millis(15000),
                max: Duration::from_millis(45000),
            }
        );

        throttler.reset();
        assert_eq!(throttler.multiplier(), 1.0);
        assert_eq!(throttler.speed_level(), SpeedLevel::Normal);
        assert_eq!(throttler.current_delays(), base);
    }

    #[test]
    fn test_current_delays_scaled_and_rounded() {
        let mut throttler = AdaptiveThrottler::new(Duration::from_millis(333), Duration::from_millis(1001));

        throttler.adjust_speed(20.0);
        let delays = throttler.current_delays();
        // 333 * 1.5 = 499.5, 1001 * 1.5 = 1501.5
        assert_eq!(delays.min, Duration::from_millis(500));
        assert_eq!(delays.max, Duration::from_millis(1502));
    }

    #[test]
    fn test_sample_within_window() {
        let mut throttler = throttler();
        throttler.adjust_speed(40.0);

        for _ in 0..50 {
            let delay = throttler.sample_delay();
            assert!(delay >= Duration::from_secs(10) && delay <= Duration::from_secs(30));
        }
    }

    #[test]
    fn test_sample_degenerate_windows() {
        let fixed = DelayRange {
            min: Duration::from_millis(700),
            max: Duration::from_millis(700),
        };
        assert_eq!(fixed.sample(), Duration::from_millis(700));

        let inverted = DelayRange {
            min: Duration::from_millis(900),
            max: Duration::from_millis(100),
        };
        assert_eq!(inverted.sample(), Duration::from_millis(900));
    }

    #[test]
    fn test_from_config_rejects_inverted_window() {
        let config = ThrottleConfig {
            base_min_delay: Duration::from_secs(3),
            base_max_delay: Duration::from_secs(1),
        };
        assert!(AdaptiveThrottler::from_config(&config).is_err());

        let throttler = AdaptiveThrottler::from_config(&ThrottleConfig::default()).unwrap();
        assert_eq!(throttler.current_delays().min, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_sleeps_sampled_delay() {
        let throttler = AdaptiveThrottler::new(Duration::from_millis(100), Duration::from_millis(200));

        let start = tokio::time::Instant::now();
        let slept = throttler.pace().await;

        assert!(slept >= Duration::from_millis(100) && slept <= Duration::from_millis(200));
        assert!(start.elapsed() >= slept);
    }

    #[test]
    fn test_smoother() {
        let mut smoother = ErrorRateSmoother::new(0.5);
        assert_eq!(smoother.value(), None);

        assert_eq!(smoother.observe(40.0), 40.0);
        assert_eq!(smoother.observe(20.0), 30.0);
        assert_eq!(smoother.observe(f64::NAN), 30.0);

        smoother.reset();
        assert_eq!(smoother.value(), None);
    }
}
