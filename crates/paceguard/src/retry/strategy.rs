//! Backoff strategy trait.

use super::classify::FailureKind;
use std::time::Duration;

/// Computes how long to wait before retrying a failed attempt.
///
/// Implementations decide the delay only; the retry loop, the attempt budget
/// and the circuit breaker live in [`RetryExecutor`](super::RetryExecutor).
///
/// # Examples
///
/// A fixed delay that ignores the failure kind:
///
/// ```rust
/// use paceguard::retry::{BackoffStrategy, FailureKind, RetryExecutor};
/// use paceguard::RetryConfig;
/// use std::time::Duration;
///
/// struct Fixed(Duration);
///
/// impl BackoffStrategy for Fixed {
///     fn next_delay(&self, _attempt: u32, _kind: FailureKind) -> Duration {
///         self.0
///     }
/// }
///
/// let executor = RetryExecutor::with_backoff(
///     RetryConfig::default(),
///     Fixed(Duration::from_millis(250)),
/// )?;
/// assert_eq!(executor.backoff().next_delay(3, FailureKind::RateLimited), Duration::from_millis(250));
/// # Ok::<(), paceguard::Error>(())
/// ```
///
/// Strategies can also be chosen at runtime behind a `Box<dyn BackoffStrategy>`.
pub trait BackoffStrategy: Send + Sync {
    /// Delay before the retry that follows failed attempt `attempt` (0-indexed).
    ///
    /// `attempt == 0` is the delay between the initial attempt and the first
    /// retry.
    fn next_delay(&self, attempt: u32, kind: FailureKind) -> Duration;
}

impl<B: BackoffStrategy + ?Sized> BackoffStrategy for Box<B> {
    fn next_delay(&self, attempt: u32, kind: FailureKind) -> Duration {
        (**self).next_delay(attempt, kind)
    }
}
