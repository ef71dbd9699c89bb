#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Resilient retries and adaptive request pacing for outbound operations.
//!
//! This crate wraps fallible network work (page fetches, API calls) with:
//!
//! - **Bounded retries** via [`RetryExecutor`]
//!   - Exponential backoff with ±20% jitter
//!   - Rate-limit detection (`429`, "too many requests", "rate limit")
//!   - Tripled base delay for rate-limited failures
//!   - A hard circuit breaker after five consecutive rate limits
//! - **Running metrics** via [`MetricsSnapshot`] (error rate, slow-mode flag)
//! - **Adaptive pacing** via [`AdaptiveThrottler`], which scales an
//!   inter-request delay window by a discrete speed multiplier
//! - **Batch driving** via [`PacedBatch`], which ties the two together
//!
//! All state is per instance. Nothing here is global: build one executor and
//! one throttler per session and pass them where they are needed.
//!
//! # Examples
//!
//! ```rust
//! use paceguard::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let executor = RetryExecutor::builder()
//!     .max_retries_per_request(3)
//!     .base_retry_delay(Duration::from_millis(500))
//!     .build()?;
//! let mut throttler = AdaptiveThrottler::new(Duration::from_secs(5), Duration::from_secs(15));
//!
//! let outcome = executor
//!     .execute(|| async { Ok::<_, std::io::Error>("page body") })
//!     .await?;
//! assert!(outcome.success);
//!
//! throttler.adjust_speed(executor.metrics().error_rate_percent);
//! let window = throttler.current_delays();
//! assert_eq!(window.min, Duration::from_secs(5));
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod throttle;

pub use batch::{BatchReport, PacedBatch};
pub use config::{PaceguardConfig, RetryConfig, ThrottleConfig};
pub use error::{Error, Result};
pub use metrics::MetricsSnapshot;
pub use retry::{
    BackoffStrategy, CIRCUIT_BREAKER_THRESHOLD, ExponentialBackoff, ExponentialBackoffBuilder,
    FailureKind, RetryExecutor, RetryExecutorBuilder, RetryObserver, RetryOutcome,
    classify_failure,
};
pub use throttle::{AdaptiveThrottler, DelayRange, ErrorRateSmoother, SpeedLevel};

/// Convenient re-exports of commonly used items.
///
/// ```rust
/// use paceguard::prelude::*;
/// ```
pub mod prelude {
    pub use crate::batch::{BatchReport, PacedBatch};
    pub use crate::config::{RetryConfig, ThrottleConfig};
    pub use crate::error::{Error, Result};
    pub use crate::metrics::MetricsSnapshot;
    pub use crate::retry::{
        BackoffStrategy, ExponentialBackoff, FailureKind, RetryExecutor, RetryObserver,
        RetryOutcome,
    };
    pub use crate::throttle::{AdaptiveThrottler, DelayRange, SpeedLevel};
}
