//! Retry policy for provider calls.

use std::future::Future;
use std::time::Duration;

use crate::config::RetrySettings;
use crate::llm::ProviderError;

/// Bounded retry with a short pause before the first attempt and a longer
/// pause before every retry.
///
/// Whether to retry is decided from the error kind; a rate-limit reply
/// carrying `Retry-After` stretches the pause to at least that long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// No pauses at all.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
        }
    }

    /// Pause before attempt `attempt` (0-based), given the previous failure.
    pub fn delay_before(&self, attempt: u32, last_error: Option<&ProviderError>) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }
        let hinted = last_error
            .and_then(ProviderError::retry_after_secs)
            .map(Duration::from_secs)
            .unwrap_or(Duration::ZERO);
        self.retry_delay.max(hinted)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. `on_retry` is told about each failure that will be
    /// retried, with the 1-based number of the attempt that failed.
    pub async fn run<T, F, Fut, R>(&self, mut op: F, mut on_retry: R) -> Result<T, ProviderError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
        R: FnMut(u32, &ProviderError),
    {
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..self.max_attempts {
            let delay = self.delay_before(attempt, last_error.as_ref());
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let last = attempt + 1 == self.max_attempts;
                    if !e.is_retryable() || last {
                        return Err(e);
                    }
                    on_retry(attempt + 1, &e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::IoFailure("no attempts made".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let mut retries = Vec::new();

        let result = RetryPolicy::immediate(3)
            .run(
                |_| async {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(ProviderError::from_status(500, "boom", None))
                    } else {
                        Ok(n)
                    }
                },
                |attempt, _| retries.push(attempt),
            )
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = RetryPolicy::immediate(3)
            .run(
                |_| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::RateLimited { retry_after: None })
                },
                |_, _| {},
            )
            .await;

        assert_eq!(result.unwrap_err().kind(), ProviderErrorKind::RateLimited);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = RetryPolicy::immediate(3)
            .run(
                |_| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::NotConfigured("no key".into()))
                },
                |_, _| panic!("must not retry"),
            )
            .await;

        assert_eq!(result.unwrap_err().kind(), ProviderErrorKind::NotConfigured);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delays_grow_after_first_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(0, None), Duration::from_millis(1500));
        assert_eq!(policy.delay_before(1, None), Duration::from_millis(5000));

        let hinted = ProviderError::RateLimited {
            retry_after: Some(30),
        };
        assert_eq!(policy.delay_before(2, Some(&hinted)), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_sleeps_follow_policy() {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            retry_delay: Duration::from_millis(50),
        };
        let start = std::time::Instant::now();

        let _: Result<(), _> = policy
            .run(
                |_| async { Err(ProviderError::IoFailure("reset".into())) },
                |_, _| {},
            )
            .await;

        assert!(start.elapsed() >= Duration::from_millis(60));
    }
}
