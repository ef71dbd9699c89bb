//! Bounded retries with rate-limit aware exponential backoff.
//!
//! # Key Types
//!
//! - [`RetryExecutor`] - Runs an operation with retries, metrics and a circuit breaker
//! - [`BackoffStrategy`] - Trait for computing the delay before a retry
//! - [`ExponentialBackoff`] - Exponential backoff with jitter and a rate-limit factor
//! - [`RetryOutcome`] - Result of one `execute_with_retry` call
//!
//! # Examples
//!
//! ```rust
//! use paceguard::retry::RetryExecutor;
//! use std::time::Duration;
//!
//! # async fn example() -> paceguard::Result<()> {
//! let executor = RetryExecutor::builder()
//!     .max_retries_per_request(2)
//!     .base_retry_delay(Duration::from_millis(100))
//!     .build()?;
//!
//! let outcome = executor
//!     .execute_with_retry(
//!         || async { Err::<(), _>("HTTP 503 Service Unavailable") },
//!         Some(&|attempt: u32, delay: Duration| {
//!             println!("retry {attempt} in {delay:?}");
//!         }),
//!     )
//!     .await?;
//!
//! assert!(!outcome.success);
//! assert_eq!(outcome.retries, 2);
//! # Ok(())
//! # }
//! ```

mod classify;
mod executor;
mod exponential;
mod outcome;
mod strategy;

pub use classify::{FailureKind, classify_failure};
pub use executor::{CIRCUIT_BREAKER_THRESHOLD, RetryExecutor, RetryExecutorBuilder, RetryObserver};
pub use exponential::{ExponentialBackoff, ExponentialBackoffBuilder};
pub use outcome::RetryOutcome;
pub use strategy::BackoffStrategy;
