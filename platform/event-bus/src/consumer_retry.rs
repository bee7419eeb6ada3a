//! Consumer retry logic with exponential backoff
//!
//! Used by the router's retry middleware to re-invoke a handler for the same
//! message before giving up on it.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Growth factor applied per attempt
    pub multiplier: f64,
    /// Upper bound for any single delay
    pub max_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_interval: Duration::from_millis(100),
            multiplier: 2.0,
            max_interval: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Delay after the failed attempt number `attempt` (0-based):
    /// `min(initial_interval * multiplier^attempt, max_interval)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);

        if !secs.is_finite() || secs >= self.max_interval.as_secs_f64() {
            return self.max_interval;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Upper bound on handler invocations for one message
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// The last error of an operation that did not succeed
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure<E> {
    pub error: E,
    /// Invocations performed, including the first one
    pub attempts: u32,
}

/// Retry a fallible async operation with exponential backoff
///
/// Stops as soon as `should_retry` rejects an error, or once
/// `config.max_retries` retries have failed. The returned failure carries the
/// last error and how many attempts were made.
///
/// # Arguments
/// * `operation` - The async operation to retry
/// * `config` - Retry configuration
/// * `context` - Context string for logging (e.g., "issue-receipt")
/// * `should_retry` - Whether an error is worth another attempt
///
/// # Example
/// ```rust
/// use event_bus::consumer_retry::{retry_with_policy, RetryConfig};
///
/// # async fn example() -> Result<(), String> {
/// let config = RetryConfig::default();
/// let result = retry_with_policy(
///     || async { Ok::<_, String>(42) },
///     &config,
///     "example_operation",
///     |_| true,
/// )
/// .await
/// .map_err(|failure| failure.error)?;
/// assert_eq!(result, 42);
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_policy<F, Fut, T, E, P>(
    operation: F,
    config: &RetryConfig,
    context: &str,
    should_retry: P,
) -> Result<T, RetryFailure<E>>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        context = %context,
                        attempt = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                let attempts = attempt + 1;

                if !should_retry(&e) {
                    return Err(RetryFailure { error: e, attempts });
                }
                if attempt >= config.max_retries {
                    warn!(
                        context = %context,
                        attempts = attempts,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(RetryFailure { error: e, attempts });
                }

                let backoff = config.backoff(attempt);
                warn!(
                    context = %context,
                    attempt = attempts,
                    max_retries = config.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Operation failed, retrying with backoff"
                );

                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
