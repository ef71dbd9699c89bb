//! Example: pacing a batch of page fetches against a flaky, rate-limiting site
//!
//! This example demonstrates:
//! 1. Retries with backoff for transient failures
//! 2. Tripled backoff after a 429
//! 3. The throttle slowing down as the error rate climbs
//! 4. The circuit breaker stopping the batch
//!
//! Run with:
//! ```bash
//! RUST_LOG=paceguard=debug cargo run -p paceguard --example paced_batch
//! ```

use paceguard::prelude::*;
use std::error::Error;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// A simulated site: every third request fails, and after `throttle_after`
/// requests it answers nothing but 429s.
struct FlakySite {
    requests: AtomicU32,
    throttle_after: u32,
}

impl FlakySite {
    fn new(throttle_after: u32) -> Self {
        Self {
            requests: AtomicU32::new(0),
            throttle_after,
        }
    }

    async fn fetch(&self, path: &str) -> std::result::Result<String, String> {
        let n = self.requests.fetch_add(1, Ordering::SeqCst) + 1;

        if n > self.throttle_after {
            println!("  GET {path} -> 429");
            Err(format!("GET {path}: 429 Too Many Requests"))
        } else if n % 3 == 0 {
            println!("  GET {path} -> 503");
            Err(format!("GET {path}: 503 Service Unavailable"))
        } else {
            println!("  GET {path} -> 200");
            Ok(format!("<html>{path}</html>"))
        }
    }
}

/// Example 1: A short batch that survives transient errors
async fn example_transient_errors() -> std::result::Result<(), Box<dyn Error>> {
    println!("\n=== Example 1: Transient Errors ===\n");

    let executor = RetryExecutor::builder()
        .max_retries_per_request(3)
        .base_retry_delay(Duration::from_millis(50))
        .max_retry_delay(Duration::from_secs(1))
        .build()?;
    let throttler = AdaptiveThrottler::new(Duration::from_millis(20), Duration::from_millis(60));
    let mut batch = PacedBatch::new(executor, throttler);

    let site = FlakySite::new(u32::MAX);
    let paths: Vec<String> = (1..=5).map(|id| format!("/players/{id}")).collect();
    let start = Instant::now();

    let report = batch
        .run(paths, |path| {
            let site = &site;
            let path = path.clone();
            async move { site.fetch(&path).await }
        })
        .await;

    println!("\nSucceeded: {}", report.succeeded);
    println!("Failed: {}", report.failed);
    println!("Retries: {}", report.retries);
    println!("Error rate: {}%", report.final_metrics.error_rate_percent);
    println!("Speed multiplier: {:.2}x", report.final_multiplier);
    println!("Total time: {:?}", start.elapsed());

    Ok(())
}

/// Example 2: The site starts rate limiting and the breaker trips
async fn example_circuit_breaker() -> std::result::Result<(), Box<dyn Error>> {
    println!("\n=== Example 2: Circuit Breaker ===\n");

    let executor = RetryExecutor::builder()
        .max_retries_per_request(10)
        .base_retry_delay(Duration::from_millis(10))
        .max_retry_delay(Duration::from_millis(200))
        .build()?;
    let throttler = AdaptiveThrottler::new(Duration::from_millis(20), Duration::from_millis(60));
    let mut batch = PacedBatch::new(executor, throttler);

    let site = FlakySite::new(4);
    let paths: Vec<String> = (1..=10).map(|id| format!("/players/{id}")).collect();

    let report = batch
        .run(paths, |path| {
            let site = &site;
            let path = path.clone();
            async move { site.fetch(&path).await }
        })
        .await;

    match &report.halted {
        Some(err) => println!("\nBatch halted after {} items: {err}", report.processed()),
        None => println!("\nBatch finished without halting"),
    }
    println!("Rate limits seen: {}", report.final_metrics.rate_limit_count);
    println!(
        "Slow mode recommended: {}",
        report.final_metrics.should_slow_down
    );

    Ok(())
}

/// Example 3: How the throttle window stretches with the error rate
fn example_throttle_levels() {
    println!("\n=== Example 3: Throttle Levels ===\n");

    let mut throttler = AdaptiveThrottler::new(Duration::from_secs(5), Duration::from_secs(15));
    for error_rate in [5.0, 20.0, 40.0, 75.0] {
        throttler.adjust_speed(error_rate);
        let window = throttler.current_delays();
        println!(
            "  error rate {error_rate:>5.1}% -> {:?} ({:.1}x): {:?}..{:?}",
            throttler.speed_level(),
            throttler.multiplier(),
            window.min,
            window.max
        );
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("==============================================");
    println!("   paceguard: Paced Batch Examples");
    println!("==============================================");

    example_transient_errors().await?;
    example_circuit_breaker().await?;
    example_throttle_levels();

    println!("\n==============================================");
    println!("   All examples completed successfully!");
    println!("==============================================\n");

    Ok(())
}
