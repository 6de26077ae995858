//! Bounded retry for startup connections
//!
//! Services must not come up half-connected: each dependency (database,
//! remote server) gets a fixed number of attempts, after which startup fails.

use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// All attempts failed; carries the last error
#[derive(Error, Debug)]
#[error("{operation} failed after {attempts} attempts: {last_error}")]
pub struct RetryExhausted<E: std::fmt::Display> {
    pub operation: String,
    pub attempts: u32,
    pub last_error: E,
}

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one (minimum 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// 1.0 gives a fixed delay
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    /// Ten attempts, two seconds apart
    fn default() -> Self {
        Self::fixed(10, Duration::from_secs(2))
    }
}

impl RetryPolicy {
    /// Same delay between every attempt
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
        }
    }

    /// Exponential backoff capped at `max_delay`
    pub fn exponential(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self
            .initial_delay
            .mul_f64(self.backoff_multiplier.max(1.0).powi(exponent));
        delay.min(self.max_delay)
    }
}

/// Run `op` until it succeeds or the policy is exhausted
pub async fn retry_with_policy<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        info!("{}: attempt {}/{}", operation, attempt, max_attempts);

        let start_time = Instant::now();
        match op().await {
            Ok(value) => {
                info!(
                    "{}: succeeded after {:?} (attempt {})",
                    operation,
                    start_time.elapsed(),
                    attempt
                );
                return Ok(value);
            },
            Err(e) if attempt >= max_attempts => {
                warn!("{}: attempt {} failed, giving up: {}", operation, attempt, e);
                return Err(RetryExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last_error: e,
                });
            },
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "{}: attempt {} failed: {}; retrying in {:?}",
                    operation, attempt, e, delay
                );
                tokio::time::sleep(delay).await;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(9), Duration::from_secs(2));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = RetryPolicy::exponential(
            5,
            Duration::from_millis(100),
            Duration::from_millis(500),
            2.0,
        );
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(5, Duration::from_millis(1));

        let result = retry_with_policy(&policy, "connect", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(format!("refused #{}", n))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert!(matches!(result, Ok(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1));

        let result: Result<(), _> = retry_with_policy(&policy, "connect", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(format!("refused #{}", n)) }
        })
        .await;

        match result {
            Err(exhausted) => {
                assert_eq!(exhausted.attempts, 3);
                assert_eq!(exhausted.last_error, "refused #3");
                assert_eq!(
                    exhausted.to_string(),
                    "connect failed after 3 attempts: refused #3"
                );
            },
            Ok(()) => panic!("expected exhaustion"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(0, Duration::from_millis(1));

        let result = retry_with_policy(&policy, "connect", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(()) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
