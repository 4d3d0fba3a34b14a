//! Bounded retry with exponential backoff and jitter, for store reads on the
//! maintenance paths (sweep, recovery). Action handlers never retry; their
//! failure codes are retry-safe for the client instead.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry logic with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Fraction of the delay randomized away (0.0 to 1.0).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Tuned for store reads on periodic maintenance paths.
    pub fn storage() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(1000),
            backoff_multiplier: 1.8,
            jitter_factor: 0.15,
        }
    }
}

/// Run `operation` until it succeeds or attempts are exhausted; the last
/// error is returned.
pub async fn with_retries<T, E, F, Fut>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Operation recovered");
                }
                return Ok(value);
            }
            Err(err) if attempt == config.max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    "Operation failed, attempts exhausted"
                );
                return Err(err);
            }
            Err(err) => {
                debug!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );
                sleep(jittered(delay, config.jitter_factor)).await;
                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }

    unreachable!("loop returns on the final attempt")
}

fn jittered(delay: Duration, jitter_factor: f64) -> Duration {
    let jitter = delay.as_secs_f64() * jitter_factor * fastrand::f64();
    Duration::from_secs_f64(delay.as_secs_f64() + jitter)
}
