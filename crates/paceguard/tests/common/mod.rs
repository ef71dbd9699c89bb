//! Common test utilities
//!
//! - [`Script`] plays back a fixed sequence of attempt results
//! - [`RecordingObserver`] captures `(attempt, delay)` retry notifications
//! - [`init_tracing`] routes logs to the test writer

#![allow(dead_code)]

use paceguard::RetryObserver;
use std::collections::VecDeque;
use std::sync::{Mutex, Once};
use std::time::Duration;

/// Install a tracing subscriber once per test binary (`RUST_LOG` controls the level).
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Scripted operation: each call pops the next result; once the script runs
/// out, the last result repeats.
pub struct Script {
    steps: Mutex<VecDeque<Result<&'static str, String>>>,
    last: Mutex<Option<Result<&'static str, String>>>,
    calls: Mutex<u32>,
}

impl Script {
    pub fn new(steps: impl IntoIterator<Item = Result<&'static str, &'static str>>) -> Self {
        Self {
            steps: Mutex::new(
                steps
                    .into_iter()
                    .map(|step| step.map_err(str::to_string))
                    .collect(),
            ),
            last: Mutex::new(None),
            calls: Mutex::new(0),
        }
    }

    /// Fails with `message` forever.
    pub fn always_failing(message: &'static str) -> Self {
        Self::new([Err(message)])
    }

    /// Fails `failures` times with `message`, then succeeds.
    pub fn failing_then_ok(failures: usize, message: &'static str) -> Self {
        Self::new(
            std::iter::repeat_n(Err(message), failures).chain(std::iter::once(Ok("payload"))),
        )
    }

    pub async fn call(&self) -> Result<&'static str, String> {
        *self.calls.lock().unwrap() += 1;
        let next = self.steps.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last.clone().unwrap_or(Ok("payload")),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

/// Collects every retry notification.
#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<(u32, Duration)>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<(u32, Duration)> {
        self.events.lock().unwrap().clone()
    }
}

impl RetryObserver for RecordingObserver {
    fn on_retry(&self, attempt: u32, delay: Duration) {
        self.events.lock().unwrap().push((attempt, delay));
    }
}
