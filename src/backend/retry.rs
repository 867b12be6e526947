// Retry logic with exponential backoff and a per-attempt deadline

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use super::{BackendError, GenerativeBackend, ImageData, ReasonOutput, ReasonRequest, RenderRequest};
use crate::config::BackendConfig;

/// Bounded raw-retry policy for a single backend call.
///
/// This is independent of the Critic refinement loop: it only absorbs
/// transient transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (>= 1)
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt
    pub base_delay: Duration,
    /// Deadline for each individual attempt
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            attempt_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&BackendConfig::default())
    }
}

/// Execute `f` with a deadline per attempt and exponential backoff between
/// transient failures. Non-transient errors are returned immediately.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, label: &str, f: F) -> Result<T, BackendError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = BackendError::unavailable("no attempt was made");

    for attempt in 0..attempts {
        let outcome = match timeout(policy.attempt_timeout, f()).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(policy.attempt_timeout)),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                if attempt + 1 < attempts {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        label,
                        attempt + 1,
                        attempts,
                        e,
                        delay
                    );
                    sleep(delay).await;
                }
                last_error = e;
            }
        }
    }

    tracing::error!("{} failed after {} attempts: {}", label, attempts, last_error);
    Err(last_error)
}

/// Wraps any backend with [`with_retry`] on both call kinds.
pub struct RetryingBackend {
    inner: Arc<dyn GenerativeBackend>,
    policy: RetryPolicy,
}

impl RetryingBackend {
    pub fn new(inner: Arc<dyn GenerativeBackend>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl GenerativeBackend for RetryingBackend {
    async fn reason(&self, request: &ReasonRequest) -> Result<ReasonOutput, BackendError> {
        with_retry(&self.policy, "reason", || self.inner.reason(request)).await
    }

    async fn render(&self, request: &RenderRequest) -> Result<ImageData, BackendError> {
        with_retry(&self.policy, "render", || self.inner.render(request)).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&policy(), "test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(BackendError::unavailable("503"))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&policy(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::unavailable("503"))
        })
        .await;
        assert!(matches!(result, Err(BackendError::Unavailable { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schema_mismatch_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&policy(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::SchemaMismatch("not json".into()))
        })
        .await;
        assert!(matches!(result, Err(BackendError::SchemaMismatch(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out_and_retries() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&policy(), "test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                sleep(Duration::from_secs(60)).await;
            }
            Ok::<_, BackendError>("done")
        })
        .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_attempts_time_out() {
        let result: Result<(), _> = with_retry(&policy(), "test", || async {
            sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(BackendError::Timeout(Duration::from_secs(5))));
    }

    #[test]
    fn test_backoff_doubles() {
        let p = policy();
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(2), Duration::from_millis(400));
    }
}
