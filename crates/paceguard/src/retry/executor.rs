//! The retry loop, its counters and the rate-limit circuit breaker.

use super::classify::classify_failure;
use super::exponential::ExponentialBackoff;
use super::outcome::RetryOutcome;
use super::strategy::BackoffStrategy;
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::metrics::{MetricsSnapshot, RequestCounters};
use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Consecutive rate-limited failures that trip the circuit breaker.
pub const CIRCUIT_BREAKER_THRESHOLD: u32 = 5;

/// Observer notified before each backoff sleep.
///
/// Called synchronously with the number of the upcoming attempt (1 for the
/// first retry) and the delay about to be slept. It cannot influence the retry
/// loop. Any `Fn(u32, Duration)` closure is an observer.
pub trait RetryObserver: Send + Sync {
    /// A retry is scheduled after `delay`.
    fn on_retry(&self, attempt: u32, delay: Duration);
}

impl<F> RetryObserver for F
where
    F: Fn(u32, Duration) + Send + Sync,
{
    fn on_retry(&self, attempt: u32, delay: Duration) {
        self(attempt, delay)
    }
}

/// Runs fallible operations with bounded retries and tracks how they fare.
///
/// Every attempt is counted. Failures are classified from their message: a
/// message containing `429`, `too many requests` or `rate limit` (any case)
/// is a rate limit, which triples the base backoff and extends the
/// consecutive rate-limit streak. Any success or generic failure ends the
/// streak. A streak of [`CIRCUIT_BREAKER_THRESHOLD`] aborts the call with
/// [`Error::CircuitOpen`] no matter how many retries remain.
///
/// Counters live for the lifetime of the executor (until [`reset`](Self::reset))
/// and span calls, so a streak can carry over from one call into the next.
/// They sit behind a mutex, which makes an executor safe to share through an
/// `Arc`, but one executor per session keeps the failure budget isolated.
///
/// # Examples
///
/// ```rust
/// use paceguard::RetryExecutor;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// # async fn example() -> paceguard::Result<()> {
/// let executor = RetryExecutor::builder()
///     .base_retry_delay(Duration::from_millis(10))
///     .build()?;
///
/// let calls = &AtomicU32::new(0);
/// let outcome = executor
///     .execute(|| async move {
///         if calls.fetch_add(1, Ordering::SeqCst) == 0 {
///             Err("connection reset")
///         } else {
///             Ok(42)
///         }
///     })
///     .await?;
///
/// assert_eq!(outcome.value, Some(42));
/// assert_eq!(outcome.retries, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RetryExecutor<B = ExponentialBackoff> {
    config: RetryConfig,
    backoff: B,
    counters: Mutex<RequestCounters>,
}

impl RetryExecutor {
    /// Executor with exponential backoff derived from `config`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if `config` fails [`RetryConfig::validate`].
    pub fn new(config: RetryConfig) -> Result<Self> {
        let backoff = ExponentialBackoff::from_config(&config);
        Self::with_backoff(config, backoff)
    }

    /// Create a new builder for configuring an executor.
    pub fn builder() -> RetryExecutorBuilder {
        RetryExecutorBuilder::default()
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        let config = RetryConfig::default();
        let backoff = ExponentialBackoff::from_config(&config);
        Self::from_parts(config, backoff)
    }
}

impl<B: BackoffStrategy> RetryExecutor<B> {
    /// Executor with a custom backoff strategy.
    ///
    /// `config.base_retry_delay` and `config.max_retry_delay` are not consulted;
    /// the strategy owns the delay computation.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if `config` fails [`RetryConfig::validate`].
    pub fn with_backoff(config: RetryConfig, backoff: B) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(config, backoff))
    }

    fn from_parts(config: RetryConfig, backoff: B) -> Self {
        Self {
            config,
            backoff,
            counters: Mutex::new(RequestCounters::default()),
        }
    }

    /// The retry policy.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// The backoff strategy.
    pub fn backoff(&self) -> &B {
        &self.backoff
    }

    /// Run `operation` until it succeeds, the retry budget is spent, or the
    /// circuit breaker trips.
    ///
    /// The operation is attempted at most `max_retries_per_request + 1` times;
    /// with a budget of 0 it runs exactly once. Between attempts the executor
    /// sleeps for the backoff delay, calling `on_retry` first. There is no
    /// deadline on the operation or the sleep; race the returned future if
    /// you need one.
    ///
    /// # Errors
    ///
    /// [`Error::CircuitOpen`] when the consecutive rate-limit streak reaches
    /// [`CIRCUIT_BREAKER_THRESHOLD`]. Exhausting the retry budget is not an
    /// error; it yields `Ok` with `success == false`.
    pub async fn execute_with_retry<F, Fut, T, E>(
        &self,
        operation: F,
        on_retry: Option<&dyn RetryObserver>,
    ) -> Result<RetryOutcome<T>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        let max_retries = self.config.max_retries_per_request;
        let mut was_rate_limited = false;
        let mut attempt = 0;

        loop {
            self.counters().record_attempt();

            let last_error = match operation().await {
                Ok(value) => {
                    self.counters().record_success();
                    return Ok(RetryOutcome::succeeded(value, attempt));
                }
                Err(err) => err.to_string(),
            };

            let kind = classify_failure(&last_error);
            let streak = self.counters().record_failure(kind);

            if kind.is_rate_limited() {
                was_rate_limited = true;
                warn!(streak, error = %last_error, "rate limit detected");

                if streak >= CIRCUIT_BREAKER_THRESHOLD {
                    error!(streak, "too many consecutive rate limits, opening circuit");
                    return Err(Error::CircuitOpen {
                        consecutive_rate_limits: streak,
                        last_error,
                    });
                }
            }

            if attempt >= max_retries {
                return Ok(RetryOutcome::exhausted(
                    last_error,
                    attempt,
                    was_rate_limited,
                ));
            }

            let delay = self.backoff.next_delay(attempt, kind);
            debug!(
                retry = attempt + 1,
                max_retries,
                ?delay,
                error = %last_error,
                "scheduling retry"
            );

            if let Some(observer) = on_retry {
                observer.on_retry(attempt + 1, delay);
            }

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// [`execute_with_retry`](Self::execute_with_retry) without an observer.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<RetryOutcome<T>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        self.execute_with_retry(operation, None).await
    }

    /// Whether the observed error rate calls for slowing down.
    ///
    /// Always `false` before 10 requests; afterwards `true` once the error
    /// rate reaches `error_threshold_percent`.
    pub fn should_enter_slow_mode(&self) -> bool {
        self.counters()
            .should_slow_down(self.config.error_threshold_percent)
    }

    /// Snapshot of the counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.counters().snapshot(self.config.error_threshold_percent)
    }

    /// Current run of back-to-back rate-limited failures.
    pub fn consecutive_rate_limits(&self) -> u32 {
        self.counters().consecutive_rate_limits
    }

    /// Zero every counter.
    pub fn reset(&self) {
        *self.counters() = RequestCounters::default();
    }

    // The guard is a temporary at every call site, never held across an await.
    fn counters(&self) -> MutexGuard<'_, RequestCounters> {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Builder for configuring a [`RetryExecutor`].
///
/// ```rust
/// use paceguard::RetryExecutor;
/// use std::time::Duration;
///
/// let executor = RetryExecutor::builder()
///     .max_retries_per_request(5)
///     .base_retry_delay(Duration::from_secs(1))
///     .max_retry_delay(Duration::from_secs(30))
///     .error_threshold_percent(25.0)
///     .build()?;
///
/// assert_eq!(executor.config().max_retries_per_request, 5);
/// # Ok::<(), paceguard::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct RetryExecutorBuilder {
    config: RetryConfig,
}

impl RetryExecutorBuilder {
    /// Start from an existing policy.
    pub fn config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    /// Retries after the initial attempt.
    ///
    /// Default: 3
    pub fn max_retries_per_request(mut self, max_retries: u32) -> Self {
        self.config.max_retries_per_request = max_retries;
        self
    }

    /// Base delay before the first retry of a generic failure.
    ///
    /// Default: 5s
    pub fn base_retry_delay(mut self, delay: Duration) -> Self {
        self.config.base_retry_delay = delay;
        self
    }

    /// Cap on any single backoff delay.
    ///
    /// Default: 120s
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.config.max_retry_delay = delay;
        self
    }

    /// Error rate (percent) that flags slow mode.
    ///
    /// Default: 20.0
    pub fn error_threshold_percent(mut self, threshold: f64) -> Self {
        self.config.error_threshold_percent = threshold;
        self
    }

    /// Build the executor.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] for a negative or non-finite threshold.
    pub fn build(self) -> Result<RetryExecutor> {
        RetryExecutor::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::FailureKind;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_executor(max_retries: u32) -> RetryExecutor {
        RetryExecutor::builder()
            .max_retries_per_request(max_retries)
            .base_retry_delay(Duration::from_millis(1))
            .max_retry_delay(Duration::from_millis(50))
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success() {
        let executor = fast_executor(3);

        let outcome = executor
            .execute(|| async { Ok::<_, std::io::Error>(42) })
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.value, Some(42));
        assert_eq!(outcome.retries, 0);
        assert!(!outcome.was_rate_limited);
        assert_eq!(executor.metrics().total_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_on_third_attempt() {
        let executor = fast_executor(5);
        let attempts = Arc::new(AtomicU32::new(0));

        let outcome = executor
            .execute(|| {
                let attempts = Arc::clone(&attempts);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(std::io::Error::other("retry me"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.value, Some("done"));
        assert_eq!(outcome.retries, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let metrics = executor.metrics();
        assert_eq!(metrics.total_requests, 3);
        assert_eq!(metrics.total_errors, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_runs_once() {
        let executor = fast_executor(0);
        let attempts = &AtomicU32::new(0);

        let outcome = executor
            .execute(|| async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("boom")
            })
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.retries, 0);
        assert_eq!(outcome.error.as_deref(), Some("boom"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_backoff_strategy() {
        struct Recording(Mutex<Vec<(u32, FailureKind)>>);

        impl BackoffStrategy for Recording {
            fn next_delay(&self, attempt: u32, kind: FailureKind) -> Duration {
                self.0
                    .lock()
                    .unwrap()
                    .push((attempt, kind));
                Duration::from_millis(1)
            }
        }

        let executor = RetryExecutor::with_backoff(
            RetryConfig {
                max_retries_per_request: 2,
                ..Default::default()
            },
            Recording(Mutex::new(Vec::new())),
        )
        .unwrap();
        let attempts = &AtomicU32::new(0);

        let outcome = executor
            .execute(|| async move {
                match attempts.fetch_add(1, Ordering::SeqCst) {
                    0 => Err::<(), _>("HTTP 429"),
                    _ => Err("socket closed"),
                }
            })
            .await
            .unwrap();

        assert!(outcome.was_rate_limited);
        assert_eq!(
            *executor.backoff().0.lock().unwrap(),
            vec![(0, FailureKind::RateLimited), (1, FailureKind::Generic)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_executor_counts_every_attempt() {
        let executor = Arc::new(fast_executor(1));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let executor = Arc::clone(&executor);
                tokio::spawn(async move {
                    executor
                        .execute(|| async { Err::<(), _>("flaky upstream") })
                        .await
                })
            })
            .collect();

        for task in tasks {
            let outcome = task.await.unwrap().unwrap();
            assert_eq!(outcome.retries, 1);
        }

        let metrics = executor.metrics();
        assert_eq!(metrics.total_requests, 16);
        assert_eq!(metrics.total_errors, 16);
    }

    #[tokio::test(start_paused = true)]
    async fn test_boxed_backoff_strategy() {
        let backoff: Box<dyn BackoffStrategy> = Box::new(
            ExponentialBackoff::builder()
                .base_delay(Duration::from_millis(10))
                .max_delay(Duration::from_millis(40))
                .jitter(0.0)
                .build(),
        );
        let executor = RetryExecutor::with_backoff(
            RetryConfig {
                max_retries_per_request: 4,
                ..Default::default()
            },
            backoff,
        )
        .unwrap();
        let delays = Mutex::new(Vec::new());

        executor
            .execute_with_retry(
                || async { Err::<(), _>("connection reset") },
                Some(&|_attempt: u32, delay: Duration| delays.lock().unwrap().push(delay)),
            )
            .await
            .unwrap();

        assert_eq!(
            *delays.lock().unwrap(),
            [10, 20, 40, 40].map(Duration::from_millis).to_vec()
        );
    }

    #[test]
    fn test_invalid_threshold_rejected_on_every_path() {
        for threshold in [f64::NAN, f64::INFINITY, -1.0] {
            let config = RetryConfig {
                error_threshold_percent: threshold,
                ..Default::default()
            };

            let err = RetryExecutor::new(config.clone()).unwrap_err();
            assert!(matches!(err, Error::InvalidConfig(_)), "{threshold}: {err}");

            let err = RetryExecutor::builder()
                .error_threshold_percent(threshold)
                .build()
                .unwrap_err();
            assert!(matches!(err, Error::InvalidConfig(_)), "{threshold}: {err}");

            let err = RetryExecutor::builder().config(config).build().unwrap_err();
            assert!(matches!(err, Error::InvalidConfig(_)), "{threshold}: {err}");
        }
    }

    #[test]
    fn test_default_executor_is_valid() {
        let executor = RetryExecutor::default();
        assert!(executor.config().validate().is_ok());
        assert_eq!(executor.config(), &RetryConfig::default());
    }
}
