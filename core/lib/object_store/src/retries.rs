use std::{future::Future, time::Duration};

use rand::Rng;

use crate::{error::ObjectStoreError, rate_limiter::RateLimiter};

/// Exponential backoff parameters for transient store failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u16,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u16) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// `initial * base^attempt`, capped at `max_delay`, with ±10% jitter.
    pub fn backoff_delay(&self, attempt: u16) -> Duration {
        let exp = self.exponential_base.powi(attempt as i32);
        let delay = self
            .initial_delay
            .mul_f64(exp)
            .min(self.max_delay);
        delay.mul_f64(rand::thread_rng().gen_range(0.9..1.1))
    }
}

/// Runs `f` under the retry policy, consuming one rate limiter token per
/// attempt. SlowDown responses halve the limiter's rate before retrying;
/// non-retriable errors surface immediately.
pub async fn retry_with_limiter<T, Fut, F>(
    policy: &RetryPolicy,
    limiter: &RateLimiter,
    op: &'static str,
    mut f: F,
) -> Result<T, ObjectStoreError>
where
    Fut: Future<Output = Result<T, ObjectStoreError>>,
    F: FnMut() -> Fut,
{
    let mut attempt: u16 = 0;
    loop {
        limiter.acquire(1.0, true).await;
        match f().await {
            Ok(result) => return Ok(result),
            Err(ObjectStoreError::SlowDown { retry_after }) if attempt < policy.max_retries => {
                attempt += 1;
                limiter.handle_slowdown(retry_after).await;
            }
            Err(err) if err.is_retriable() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.backoff_delay(attempt);
                tracing::warn!(
                    %err,
                    op,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Object store request failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let policy = RetryPolicy::with_max_retries(3);
        let limiter = RateLimiter::new(100.0);
        let calls = AtomicU32::new(0);

        let result = retry_with_limiter(&policy, &limiter, "put", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ObjectStoreError::Transient {
                    message: "boom".to_string(),
                })
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let policy = RetryPolicy::with_max_retries(2);
        let limiter = RateLimiter::new(100.0);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_limiter(&policy, &limiter, "put", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ObjectStoreError::Transient {
                message: "boom".to_string(),
            })
        })
        .await;

        assert_matches!(result, Err(ObjectStoreError::Transient { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3); // initial try + 2 retries
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let policy = RetryPolicy::with_max_retries(5);
        let limiter = RateLimiter::new(100.0);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_limiter(&policy, &limiter, "put", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ObjectStoreError::Permanent {
                message: "denied".to_string(),
            })
        })
        .await;

        assert_matches!(result, Err(ObjectStoreError::Permanent { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slowdown_halves_the_limiter_rate() {
        let policy = RetryPolicy::with_max_retries(2);
        let limiter = RateLimiter::new(10.0);
        let calls = AtomicU32::new(0);

        let result = retry_with_limiter(&policy, &limiter, "put", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ObjectStoreError::SlowDown { retry_after: None })
            } else {
                Ok(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(limiter.current_rate().await, 5.0);
    }
}
