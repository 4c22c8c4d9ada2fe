//! Reified retry policy (§4.3, Design Note 9).
//!
//! `RetryPolicy` is a plain data value, not a decorator wrapping a
//! client; call sites pass it explicitly to `retry(policy, op)` the way
//! the spec requires. Backoff is exponential with full jitter, capped at
//! `max_backoff`.

use std::time::Duration;

use rand::Rng;

use super::AcquisitionError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub jitter_fraction: f64,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_fraction: 0.2,
            max_retries: 5,
        }
    }
}

impl RetryPolicy {
    /// Backoff duration before attempt `attempt` (0-indexed: the delay
    /// before the *first* retry, i.e. after attempt 0 failed, is
    /// `delay_for(0)`), with jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_backoff.as_secs_f64());
        let jitter_span = capped * self.jitter_fraction;
        let jittered = if jitter_span > 0.0 {
            let offset = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
            (capped + offset).max(0.0)
        } else {
            capped
        };
        Duration::from_secs_f64(jittered)
    }
}

/// Outcome of a single `retry` call, recording how many attempts it took.
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts: u32,
}

/// Run `op` under `policy`, retrying on retryable `AcquisitionError`s up
/// to `policy.max_retries` additional attempts. Non-retryable errors and
/// exhausted retries are returned immediately.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, AcquisitionError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AcquisitionError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                let delay = err
                    .retry_after_ms()
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| policy.delay_for(attempt));
                tracing::debug!(attempt, ?delay, "retrying after retryable error: {err}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            multiplier: 2.0,
            jitter_fraction: 0.0,
            max_retries: 10,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for(10), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 1.0,
            jitter_fraction: 0.0,
            max_retries: 5,
        };
        let attempts = AtomicU32::new(0);
        let result = retry(&policy, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AcquisitionError::Transient("boom".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let policy = RetryPolicy::default();
        let attempts = AtomicU32::new(0);
        let result: Result<(), AcquisitionError> = retry(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(AcquisitionError::NotFound("x".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 1.0,
            jitter_fraction: 0.0,
            max_retries: 2,
        };
        let attempts = AtomicU32::new(0);
        let result: Result<(), AcquisitionError> = retry(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(AcquisitionError::Transient("still failing".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
