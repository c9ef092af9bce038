//! Retry loop with linear backoff for backend fetches.
//!
//! A fetch is attempted up to `max_attempts` times. Between attempts the
//! loop sleeps `attempt * backoff` (1x, 2x, 3x ...). A rate-limit response
//! carrying a `Retry-After` hint overrides the computed delay, capped at
//! [`MAX_RATE_LIMIT_WAIT`]. Non-retryable errors end the loop immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use pincache_types::config::RetryConfig;
use pincache_types::error::FetchError;

/// Upper bound on a server-requested rate-limit wait.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(30);

/// Result of a retried operation plus the number of extra attempts it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, FetchError>,
    pub retries: u32,
}

/// Stateless retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Determine whether a retry should be attempted.
    ///
    /// `attempt` is 1-based (first execution is attempt 1).
    pub fn should_retry(&self, attempt: u32, error: &FetchError) -> bool {
        attempt < self.max_attempts && error.is_retryable()
    }

    /// Delay to wait after failed attempt number `attempt`.
    pub fn backoff_for(&self, attempt: u32, error: &FetchError) -> Duration {
        if let FetchError::RateLimited {
            retry_after_ms: Some(ms),
        } = error
        {
            return Duration::from_millis(*ms).min(MAX_RATE_LIMIT_WAIT);
        }
        self.backoff.saturating_mul(attempt)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `label` identifies the operation in retry log lines.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        retries: attempt - 1,
                    };
                }
                Err(error) if self.should_retry(attempt, &error) => {
                    let delay = self.backoff_for(attempt, &error);
                    warn!(
                        operation = label,
                        error = %error,
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = delay.as_millis() as u64,
                        "retrying fetch"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    return RetryOutcome {
                        result: Err(error),
                        retries: attempt - 1,
                    };
                }
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.backoff_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn server_error() -> FetchError {
        FetchError::Server {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    // -------------------------------------------------------------------
    // should_retry
    // -------------------------------------------------------------------

    #[test]
    fn test_should_retry_within_limit() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        assert!(policy.should_retry(1, &server_error()));
        assert!(policy.should_retry(2, &server_error()));
        assert!(!policy.should_retry(3, &server_error()));
        assert!(!policy.should_retry(4, &server_error()));
    }

    #[test]
    fn test_should_not_retry_permanent_errors() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        assert!(!policy.should_retry(1, &FetchError::Unauthorized));
        assert!(!policy.should_retry(
            1,
            &FetchError::NotFound {
                key: "k".to_string()
            }
        ));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.should_retry(1, &server_error()));
    }

    // -------------------------------------------------------------------
    // backoff_for
    // -------------------------------------------------------------------

    #[test]
    fn test_backoff_is_linear() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(1, &server_error()), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(2, &server_error()), Duration::from_millis(2000));
        assert_eq!(policy.backoff_for(3, &server_error()), Duration::from_millis(3000));
    }

    #[test]
    fn test_rate_limit_hint_overrides_and_is_capped() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        let hinted = FetchError::RateLimited {
            retry_after_ms: Some(250),
        };
        assert_eq!(policy.backoff_for(2, &hinted), Duration::from_millis(250));

        let huge = FetchError::RateLimited {
            retry_after_ms: Some(10 * 60 * 1000),
        };
        assert_eq!(policy.backoff_for(1, &huge), MAX_RATE_LIMIT_WAIT);

        let unhinted = FetchError::RateLimited {
            retry_after_ms: None,
        };
        assert_eq!(policy.backoff_for(2, &unhinted), Duration::from_millis(2000));
    }

    #[test]
    fn test_default_policy_from_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff, Duration::from_millis(1000));
    }

    // -------------------------------------------------------------------
    // run
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn test_run_recovers_after_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let attempts = Arc::new(AtomicU32::new(0));

        let outcome = policy
            .run("chunk", || {
                let attempts = attempts.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 { Err(server_error()) } else { Ok(n) }
                }
            })
            .await;

        assert_eq!(outcome.result, Ok(3));
        assert_eq!(outcome.retries, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let attempts = Arc::new(AtomicU32::new(0));

        let outcome: RetryOutcome<()> = policy
            .run("chunk", || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::Network("timed out".to_string()))
                }
            })
            .await;

        assert_eq!(outcome.result, Err(FetchError::Network("timed out".to_string())));
        assert_eq!(outcome.retries, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_permanent_error() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let attempts = Arc::new(AtomicU32::new(0));

        let outcome: RetryOutcome<()> = policy
            .run("count", || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::Decode("expected array".to_string()))
                }
            })
            .await;

        assert!(matches!(outcome.result, Err(FetchError::Decode(_))));
        assert_eq!(outcome.retries, 0);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
