//! Bounded retry with exponential backoff and jitter around external calls.
//!
//! Every extractor/segmenter invocation goes through [`call_with_retry`]
//! exactly once. The combinator never propagates an error: after the attempt
//! budget is spent (or on the first fatal failure) it returns `None`, and the
//! caller treats that as "no new information this round" — a single bad call
//! degrades a step, it never aborts a session.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use threadline_shared::{LlmError, RetryConfig};

/// Attempt budget and backoff base for one call site.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Base of the exponential backoff, in seconds; attempt `n` sleeps
    /// `base^n + jitter` before the next try.
    pub backoff_base: f64,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            attempts: config.attempts,
            backoff_base: config.backoff_base,
        }
    }
}

/// Run `op` up to `policy.attempts` times.
///
/// Retryable and malformed-response failures sleep `backoff_base^attempt`
/// seconds plus up to one second of jitter, then try again. Fatal failures
/// (credential rejection, unclassified errors) short-circuit with no sleep.
pub async fn call_with_retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, LlmError>>,
{
    for attempt in 0..policy.attempts {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(what, attempt, "call succeeded after retry");
                }
                return Some(value);
            }
            Err(e) if e.is_retryable() => {
                warn!(what, attempt, kind = ?e.kind, error = %e, "retryable failure");
                if attempt + 1 < policy.attempts {
                    let backoff = policy.backoff_base.powi(attempt as i32);
                    let jitter: f64 = rand::rng().random_range(0.0..1.0);
                    tokio::time::sleep(Duration::from_secs_f64(backoff + jitter)).await;
                }
            }
            Err(e) => {
                warn!(what, attempt, error = %e, "fatal failure, not retrying");
                return None;
            }
        }
    }

    warn!(what, attempts = policy.attempts, "retry budget exhausted");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use threadline_shared::LlmError;

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff_base: 2.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = call_with_retry(policy(3), "fake", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LlmError::retryable("rate limited"))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(result, Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_none_without_raising() {
        let calls = AtomicU32::new(0);
        let result: Option<u32> = call_with_retry(policy(2), "fake", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::retryable("rate limited")) }
        })
        .await;
        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_output_is_retried() {
        let calls = AtomicU32::new(0);
        let result = call_with_retry(policy(2), "fake", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(LlmError::malformed("invalid JSON"))
                } else {
                    Ok("parsed")
                }
            }
        })
        .await;
        assert_eq!(result, Some("parsed"));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_short_circuits_without_backoff() {
        let calls = AtomicU32::new(0);
        let before = tokio::time::Instant::now();
        let result: Option<u32> = call_with_retry(policy(10), "fake", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::fatal("authentication failed")) }
        })
        .await;
        // One attempt, no sleep: under paused time any sleep would advance
        // the virtual clock.
        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(tokio::time::Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_exponentially() {
        let calls = AtomicU32::new(0);
        let before = tokio::time::Instant::now();
        let _: Option<u32> = call_with_retry(policy(3), "fake", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::retryable("overloaded")) }
        })
        .await;
        // Sleeps after attempts 0 and 1: 2^0 + 2^1 = 3s plus at most 2s jitter.
        let elapsed = tokio::time::Instant::now() - before;
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(5));
    }
}
