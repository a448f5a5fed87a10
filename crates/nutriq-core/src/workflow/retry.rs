//! Timeout, retry, and backoff for outbound provider calls.
//!
//! Every call into the model layer or mail delivery gets an explicit
//! per-attempt timeout; transient failures (rate limit, overload, timeout)
//! are retried with exponential backoff and full jitter up to a fixed
//! attempt cap, then surfaced as a terminal failure for the invocation.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use crate::error::CoordinatorError;

/// Failure modes of a single provider attempt.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider rate limited the request")]
    RateLimited,
    #[error("provider is overloaded")]
    Overloaded,
    #[error("provider call timed out")]
    Timeout,
    #[error("provider call failed: {0}")]
    Fatal(#[source] anyhow::Error),
}

impl ProviderError {
    /// Transient failures are worth another attempt; fatal ones are not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ProviderError::Fatal(_))
    }
}

/// Retry budget for one logical provider call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff base; attempt `n` may wait up to `base * 2^(n-1)`.
    pub base_delay: Duration,
    /// Ceiling on any single backoff wait.
    pub max_delay: Duration,
    /// Per-attempt wall-clock budget.
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Budget for language-model calls: generous timeout, several retries.
    pub fn model_calls() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            timeout: Duration::from_secs(120),
        }
    }

    /// Budget for outbound mail: ~10s total per attempt, few retries.
    pub fn mail() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Backoff before the next attempt after `attempt` failures: full jitter
/// over the capped exponential window.
fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base_ms = policy.base_delay.as_millis() as u64;
    let cap_ms = policy.max_delay.as_millis() as u64;
    let window_ms = base_ms
        .saturating_mul(1u64 << (attempt - 1).min(20))
        .min(cap_ms);
    let jittered = rand::rng().random_range(0..=window_ms);
    Duration::from_millis(jittered)
}

/// Run `op` under the retry policy.
///
/// Each attempt is wrapped in the policy's timeout; a timed-out attempt
/// counts as a transient failure. Exhausting the attempt cap (or hitting a
/// fatal error) yields `CoordinatorError::TransientProviderFailure` with
/// the attempt count -- never an indefinite retry loop, never a silent
/// swallow.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, CoordinatorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ProviderError::Timeout),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < policy.max_attempts => {
                let delay = backoff_delay(policy, attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient provider failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                return Err(CoordinatorError::TransientProviderFailure {
                    attempts: attempt,
                    source: error.into(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = call_with_retry(&fast_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::Overloaded)
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_attempt_cap() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = call_with_retry(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::RateLimited) }
        })
        .await;
        match result.unwrap_err() {
            CoordinatorError::TransientProviderFailure { attempts, .. } => {
                assert_eq!(attempts, 3)
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = call_with_retry(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Fatal(anyhow::anyhow!("bad request"))) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_counts_as_transient() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            timeout: Duration::from_millis(10),
            ..fast_policy()
        };
        let result: Result<u32, _> = call_with_retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(1)
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_stays_within_window() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
            timeout: Duration::from_secs(1),
        };
        for attempt in 1..10 {
            let delay = backoff_delay(&policy, attempt);
            assert!(delay <= policy.max_delay);
        }
    }
}
