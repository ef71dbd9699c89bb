//! Paced processing of a batch of work items.
//!
//! [`PacedBatch`] is the loop that usually surrounds a [`RetryExecutor`] and an
//! [`AdaptiveThrottler`]: run each item with retries, feed the executor's error
//! rate into the throttler, pause for a random slice of the current window
//! before the next item, and stop everything once the circuit breaker trips.

use crate::error::Error;
use crate::metrics::MetricsSnapshot;
use crate::retry::{BackoffStrategy, ExponentialBackoff, RetryExecutor, RetryOutcome};
use crate::throttle::AdaptiveThrottler;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info};

/// Summary of one [`PacedBatch::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport<T> {
    /// Outcome per processed item, in input order
    pub outcomes: Vec<RetryOutcome<T>>,

    /// Items that ended in success
    pub succeeded: usize,

    /// Items that exhausted their retries
    pub failed: usize,

    /// Retries spent across all items
    pub retries: u64,

    /// Failed items that saw at least one rate limit
    pub rate_limited_items: usize,

    /// Set when the circuit breaker stopped the batch early
    pub halted: Option<Error>,

    /// Executor counters when the batch finished
    pub final_metrics: MetricsSnapshot,

    /// Throttle multiplier when the batch finished
    pub final_multiplier: f64,
}

impl<T> BatchReport<T> {
    /// Items that produced an outcome.
    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the batch stopped before reaching the last item.
    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    fn record(&mut self, outcome: RetryOutcome<T>) {
        self.retries += u64::from(outcome.retries);
        if outcome.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
            if outcome.was_rate_limited {
                self.rate_limited_items += 1;
            }
        }
        self.outcomes.push(outcome);
    }
}

/// Drives a sequence of items through one executor and one throttler.
///
/// # Examples
///
/// ```rust
/// use paceguard::{AdaptiveThrottler, PacedBatch, RetryExecutor};
/// use std::time::Duration;
///
/// # async fn example() -> paceguard::Result<()> {
/// let executor = RetryExecutor::builder()
///     .base_retry_delay(Duration::from_millis(100))
///     .build()?;
/// let throttler = AdaptiveThrottler::new(Duration::from_millis(50), Duration::from_millis(150));
/// let mut batch = PacedBatch::new(executor, throttler);
///
/// let report = batch
///     .run(["/players/1", "/players/2"], |url| {
///         let url = url.to_string();
///         async move { Ok::<_, std::io::Error>(url.len()) }
///     })
///     .await;
///
/// assert_eq!(report.succeeded, 2);
/// assert!(!report.is_halted());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PacedBatch<B = ExponentialBackoff> {
    executor: RetryExecutor<B>,
    throttler: AdaptiveThrottler,
}

impl<B: BackoffStrategy> PacedBatch<B> {
    /// Combine an executor and a throttler for one session.
    pub fn new(executor: RetryExecutor<B>, throttler: AdaptiveThrottler) -> Self {
        Self {
            executor,
            throttler,
        }
    }

    /// The executor and its accumulated counters.
    pub fn executor(&self) -> &RetryExecutor<B> {
        &self.executor
    }

    /// The throttler.
    pub fn throttler(&self) -> &AdaptiveThrottler {
        &self.throttler
    }

    /// Mutable access to the throttler, e.g. to reset it between batches.
    pub fn throttler_mut(&mut self) -> &mut AdaptiveThrottler {
        &mut self.throttler
    }

    /// Split back into the executor and the throttler.
    pub fn into_parts(self) -> (RetryExecutor<B>, AdaptiveThrottler) {
        (self.executor, self.throttler)
    }

    /// Process `items` in order with `operation`.
    ///
    /// After each item the throttler is adjusted to the executor's error rate;
    /// between items (not after the last) the batch sleeps for a random pause
    /// from the throttler's window. A circuit-breaker trip ends the run at
    /// once and is recorded in [`BatchReport::halted`]; remaining items are
    /// left untouched.
    pub async fn run<I, F, Fut, T, E>(&mut self, items: I, operation: F) -> BatchReport<T>
    where
        I: IntoIterator,
        F: Fn(&I::Item) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        let items: Vec<I::Item> = items.into_iter().collect();
        let total = items.len();
        let mut report = BatchReport {
            outcomes: Vec::with_capacity(total),
            succeeded: 0,
            failed: 0,
            retries: 0,
            rate_limited_items: 0,
            halted: None,
            final_metrics: self.executor.metrics(),
            final_multiplier: self.throttler.multiplier(),
        };

        for (index, item) in items.iter().enumerate() {
            let position = index + 1;
            let observer = move |attempt: u32, delay: Duration| {
                debug!(item = position, total, attempt, ?delay, "retrying item");
            };

            let outcome = match self
                .executor
                .execute_with_retry(|| operation(item), Some(&observer))
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(item = position, total, error = %err, "batch halted");
                    report.halted = Some(err);
                    break;
                }
            };

            if outcome.success {
                info!(item = position, total, retries = outcome.retries, "item succeeded");
            } else {
                info!(
                    item = position,
                    total,
                    retries = outcome.retries,
                    error = outcome.error.as_deref().unwrap_or_default(),
                    "item failed"
                );
            }
            report.record(outcome);

            self.throttler
                .adjust_speed(self.executor.metrics().error_rate_percent);

            if position < total {
                self.throttler.pace().await;
            }
        }

        report.final_metrics = self.executor.metrics();
        report.final_multiplier = self.throttler.multiplier();
        report
    }
}
