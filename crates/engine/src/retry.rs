//! Bounded retry for provider calls
//!
//! Transient provider failures are retried with exponential backoff up to a
//! fixed attempt budget; validation and precondition failures surface on the
//! first attempt.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::{future::retry, Error as BackoffError, ExponentialBackoffBuilder};
use ddq_common::errors::{EngineError, Result};
use tracing::warn;

/// Run `operation`, retrying transient errors until `max_attempts` total
/// attempts have been spent.
pub async fn with_retries<T, Fut, F>(
    max_attempts: u32,
    initial_delay: Duration,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let attempts = AtomicU32::new(0);

    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(initial_delay)
        .with_max_elapsed_time(None) // bounded by attempt count, not wall clock
        .build();

    retry(policy, || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let fut = operation();
        async move {
            match fut.await {
                Ok(value) => Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    Err(BackoffError::transient(e))
                }
                Err(e) => Err(BackoffError::permanent(e)),
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_transient_error_is_retried_up_to_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Result<()> = with_retries(3, Duration::from_millis(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(EngineError::Provider {
                    message: "unreachable".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_validation_error_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Result<()> = with_retries(3, Duration::from_millis(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(EngineError::validation("bad input"))
            }
        })
        .await;

        assert!(matches!(result, Err(EngineError::Validation { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = with_retries(3, Duration::from_millis(1), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(EngineError::Provider {
                        message: "flaky".to_string(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
