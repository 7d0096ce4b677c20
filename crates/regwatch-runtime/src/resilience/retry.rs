//! Bounded retry with exponential backoff and jitter.

use backon::ExponentialBuilder;
use std::time::Duration;

/// Upper bound on a single backoff sleep.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// How transient backend failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: usize,

    /// First backoff delay
    pub min_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, min_delay: Duration) -> Self {
        Self {
            max_retries,
            min_delay,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Backoff schedule for [`backon::Retryable::retry`].
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(MAX_RETRY_DELAY.max(self.min_delay))
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backon::Retryable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retries_until_success() {
        let attempts = AtomicUsize::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let result = (|| async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("transient")
            } else {
                Ok("done")
            }
        })
        .retry(policy.backoff())
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_bound() {
        let attempts = AtomicUsize::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(1));

        let result: Result<(), &str> = (|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err("down")
        })
        .retry(policy.backoff())
        .await;

        assert_eq!(result, Err("down"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_policy() {
        let attempts = AtomicUsize::new(0);

        let result: Result<(), &str> = (|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err("down")
        })
        .retry(RetryPolicy::none().backoff())
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
