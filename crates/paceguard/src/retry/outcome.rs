//! Result of a retried operation.

/// What happened to one `execute_with_retry` call.
///
/// Produced once per call by [`RetryExecutor`](super::RetryExecutor). A
/// circuit-breaker trip is not an outcome; it is returned as
/// [`Error::CircuitOpen`](crate::Error::CircuitOpen).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    /// Whether some attempt succeeded
    pub success: bool,

    /// Value of the successful attempt
    pub value: Option<T>,

    /// Message of the last failed attempt, when every attempt failed
    pub error: Option<String>,

    /// Number of retries performed (0 when the first attempt decided the outcome)
    pub retries: u32,

    /// Whether any attempt of a failed call was rate-limited
    pub was_rate_limited: bool,
}

impl<T> RetryOutcome<T> {
    pub(crate) fn succeeded(value: T, retries: u32) -> Self {
        Self {
            success: true,
            value: Some(value),
            error: None,
            retries,
            was_rate_limited: false,
        }
    }

    pub(crate) fn exhausted(error: String, retries: u32, was_rate_limited: bool) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(error),
            retries,
            was_rate_limited,
        }
    }

    /// Convert into a plain `Result`, keeping the last error message on failure.
    pub fn into_result(self) -> Result<T, String> {
        match self.value {
            Some(value) => Ok(value),
            None => Err(self.error.unwrap_or_default()),
        }
    }
}
