//! Error types for paceguard
//!
//! Ordinary operation failures never show up here: they are retried and, once
//! the retry budget is spent, reported through [`RetryOutcome`](crate::RetryOutcome).
//! This enum carries the conditions that must stop the caller instead.

use thiserror::Error;

/// Result type alias for paceguard operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for paceguard.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Too many consecutive rate-limited attempts; the remote side is pushing back
    /// and the whole workflow should pause.
    #[error(
        "circuit open after {consecutive_rate_limits} consecutive rate-limited attempts: {last_error}"
    )]
    CircuitOpen {
        /// Length of the rate-limit streak that tripped the breaker
        consecutive_rate_limits: u32,
        /// Failure message of the attempt that tripped the breaker
        last_error: String,
    },

    /// Configuration failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An environment variable is set but could not be parsed.
    #[error("Invalid environment variable {var}: {message}")]
    Env {
        /// Variable name
        var: &'static str,
        /// Parse failure description
        message: String,
    },
}

impl Error {
    /// Returns `true` if this is the rate-limit circuit breaker.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Error::CircuitOpen { .. })
    }

    /// Returns `true` if the caller should stop issuing requests altogether.
    ///
    /// Only the circuit breaker is fatal; configuration errors are raised
    /// before any request is made.
    pub fn is_fatal(&self) -> bool {
        self.is_circuit_open()
    }
}
