use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::CoreError;

/// Shared retry policy for the three places spec.md §9 calls out as
/// duplicating backoff loops: the LLM client, tool HTTP calls, and DB-pool
/// reconnect.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 4_000,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
        if let Some(ms) = retry_after_ms {
            return Duration::from_millis(ms);
        }
        let exp = self.base_delay_ms.saturating_mul(1u64 << attempt.min(10));
        let capped = exp.min(self.max_delay_ms);
        let jitter = rand::thread_rng().gen_range(0..=capped / 4 + 1);
        Duration::from_millis(capped + jitter)
    }
}

/// Runs `op` up to `policy.max_attempts` times, retrying only when the
/// returned error is [`CoreError::is_retryable`]. Retries are jittered and
/// exponential, except when the error carries an explicit
/// `ProviderRateLimited { retry_after_ms }`, in which case that delay is
/// honored instead.
pub async fn retry_with_backoff<F, Fut, T>(policy: RetryPolicy, mut op: F) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                let retry_after_ms = match &err {
                    CoreError::ProviderRateLimited { retry_after_ms } => Some(*retry_after_ms),
                    _ => None,
                };
                let delay = policy.delay_for(attempt, retry_after_ms);
                tracing::warn!(attempt, ?delay, error = %err, "retrying after transient failure");
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

    #[tokio::test]
    async fn succeeds_without_retry_when_first_call_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, CoreError>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_retryable_errors_up_to_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        };
        let result = retry_with_backoff(policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>(CoreError::ProviderUnavailable("down".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>(CoreError::ContentBlocked("nope".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
