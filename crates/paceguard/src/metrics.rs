//! Request counters and the snapshots derived from them.

use crate::retry::FailureKind;
use serde::{Deserialize, Serialize};

/// Below this many requests the error rate is not trusted for slow mode.
pub const MIN_REQUESTS_FOR_SLOW_MODE: u64 = 10;

/// Point-in-time view of a [`RetryExecutor`](crate::RetryExecutor)'s counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Attempts made, retries included
    pub total_requests: u64,

    /// Attempts that failed
    pub total_errors: u64,

    /// `total_errors / total_requests * 100`, rounded to one decimal (0 with no requests)
    pub error_rate_percent: f64,

    /// Rate-limited failures seen
    pub rate_limit_count: u64,

    /// Current run of back-to-back rate-limited failures
    pub consecutive_rate_limits: u32,

    /// Whether the caller should slow down (see [`RetryExecutor::should_enter_slow_mode`](crate::RetryExecutor::should_enter_slow_mode))
    pub should_slow_down: bool,
}

/// Counters owned by one executor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RequestCounters {
    pub(crate) total_requests: u64,
    pub(crate) total_errors: u64,
    pub(crate) rate_limit_count: u64,
    pub(crate) consecutive_rate_limits: u32,
}

impl RequestCounters {
    pub(crate) fn record_attempt(&mut self) {
        self.total_requests += 1;
    }

    pub(crate) fn record_success(&mut self) {
        self.consecutive_rate_limits = 0;
    }

    /// Returns the rate-limit streak after this failure.
    pub(crate) fn record_failure(&mut self, kind: FailureKind) -> u32 {
        self.total_errors += 1;
        match kind {
            FailureKind::RateLimited => {
                self.rate_limit_count += 1;
                self.consecutive_rate_limits += 1;
            }
            FailureKind::Generic => self.consecutive_rate_limits = 0,
        }
        self.consecutive_rate_limits
    }

    pub(crate) fn error_rate_percent(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.total_errors as f64 / self.total_requests as f64 * 100.0
    }

    pub(crate) fn should_slow_down(&self, threshold_percent: f64) -> bool {
        self.total_requests >= MIN_REQUESTS_FOR_SLOW_MODE
            && self.error_rate_percent() >= threshold_percent
    }

    pub(crate) fn snapshot(&self, threshold_percent: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests,
            total_errors: self.total_errors,
            error_rate_percent: (self.error_rate_percent() * 10.0).round() / 10.0,
            rate_limit_count: self.rate_limit_count,
            consecutive_rate_limits: self.consecutive_rate_limits,
            should_slow_down: self.should_slow_down(threshold_percent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(requests: u64, errors: u64) -> RequestCounters {
        RequestCounters {
            total_requests: requests,
            total_errors: errors,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = RequestCounters::default().snapshot(20.0);

        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.error_rate_percent, 0.0);
        assert!(!snapshot.should_slow_down);
    }

    #[test]
    fn test_error_rate_rounded_to_one_decimal() {
        // 1/3 = 33.333...%
        assert_eq!(counters(3, 1).snapshot(20.0).error_rate_percent, 33.3);
        // 2/3 = 66.666...%
        assert_eq!(counters(3, 2).snapshot(20.0).error_rate_percent, 66.7);
    }

    #[test]
    fn test_slow_mode_needs_ten_requests() {
        assert!(!counters(9, 9).should_slow_down(20.0));
        assert!(counters(10, 2).should_slow_down(20.0));
        assert!(!counters(10, 1).should_slow_down(20.0));
    }

    #[test]
    fn test_streak_resets_on_generic_failure() {
        let mut counters = RequestCounters::default();

        assert_eq!(counters.record_failure(FailureKind::RateLimited), 1);
        assert_eq!(counters.record_failure(FailureKind::RateLimited), 2);
        assert_eq!(counters.record_failure(FailureKind::Generic), 0);
        assert_eq!(counters.rate_limit_count, 2);
        assert_eq!(counters.total_errors, 3);

        counters.record_failure(FailureKind::RateLimited);
        counters.record_success();
        assert_eq!(counters.consecutive_rate_limits, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(counters(10, 5).snapshot(20.0)).unwrap();

        assert_eq!(json["total_requests"], 10);
        assert_eq!(json["error_rate_percent"], 50.0);
        assert_eq!(json["should_slow_down"], true);
    }
}
