//! Retry utility for handling transient errors in async operations
//!
//! Provides configurable retry policies with exponential, jittered backoff.
//! The broker uses it for the optimistic cursor updates in `get_next` and `reprocess`,
//! where a lost compare-and-apply race is retried from scratch.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Configurable retry policy for async operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    /// Base delay; attempt `n` waits up to `delay * 2^n`
    pub delay: Duration,
    /// Upper bound for a single backoff sleep
    pub max_delay: Duration,
    /// Randomise each sleep within `[0, computed delay]`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Policy for lock-free contention loops: many cheap attempts, short jittered sleeps
    pub fn contention(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: base_delay,
            max_delay: Duration::from_millis(250),
            jitter: true,
        }
    }

    /// Backoff to sleep after the given zero-based failed attempt
    pub fn backoff(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16) as u32).unwrap_or(u32::MAX);
        let exp = self.delay.saturating_mul(factor).min(self.max_delay);
        if self.jitter && !exp.is_zero() {
            let millis = exp.as_millis() as u64;
            Duration::from_millis(rand::rng().random_range(0..=millis))
        } else {
            exp
        }
    }
}

/// Execute an async operation, retrying only errors accepted by `is_retryable`
///
/// Non-retryable errors are returned immediately. When attempts run out the
/// last error is returned unchanged so the caller can map it.
///
/// # Examples
/// ```rust
/// use lanequeue::core::retry::{retry_async_if, RetryPolicy};
///
/// # async fn example() -> Result<String, String> {
/// let result = retry_async_if(
///     "store_connection",
///     RetryPolicy::default(),
///     |error: &String| error.contains("busy"),
///     || async {
///         Ok::<String, String>("success".to_string())
///     }
/// ).await?;
/// # Ok(result)
/// # }
/// ```
pub async fn retry_async_if<F, T, E, Fut, P>(
    operation_name: &str,
    policy: RetryPolicy,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) if is_retryable(&error) && attempt + 1 < max_attempts => {
                let wait = policy.backoff(attempt);
                log::debug!(
                    "Operation '{}' failed on attempt {}/{}, retrying in {:?}: {}",
                    operation_name,
                    attempt + 1,
                    max_attempts,
                    wait,
                    error
                );
                attempt += 1;
                if !wait.is_zero() {
                    sleep(wait).await;
                }
            }
            Err(error) => return Err(error),
        }
    }
}
