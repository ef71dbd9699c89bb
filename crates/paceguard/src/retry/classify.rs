//! Failure classification.

/// Markers that identify a rate-limited failure, matched case-insensitively.
const RATE_LIMIT_MARKERS: [&str; 3] = ["429", "too many requests", "rate limit"];

/// How a failed attempt is treated by the backoff and the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Transient failure, retried with the standard backoff
    Generic,
    /// The remote side asked us to slow down; tripled backoff, counts toward the breaker
    RateLimited,
}

impl FailureKind {
    /// Returns `true` for [`FailureKind::RateLimited`].
    pub fn is_rate_limited(self) -> bool {
        matches!(self, FailureKind::RateLimited)
    }
}

/// Classify a failure from its message.
///
/// An empty message carries no signal and is treated as generic.
///
/// ```rust
/// use paceguard::{FailureKind, classify_failure};
///
/// assert_eq!(classify_failure("HTTP 429"), FailureKind::RateLimited);
/// assert_eq!(classify_failure("Too Many Requests"), FailureKind::RateLimited);
/// assert_eq!(classify_failure("connection reset by peer"), FailureKind::Generic);
/// ```
pub fn classify_failure(message: &str) -> FailureKind {
    let lowered = message.to_lowercase();
    if RATE_LIMIT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        FailureKind::RateLimited
    } else {
        FailureKind::Generic
    }
}
