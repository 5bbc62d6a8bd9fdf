use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Default attempt count for idempotent chain reads.
pub const DEFAULT_READ_ATTEMPTS: u32 = 3;
/// Linear backoff unit: attempt N sleeps `N * BACKOFF_UNIT` before retrying.
pub const BACKOFF_UNIT: Duration = Duration::from_millis(1000);

/// Retry an operation with linear backoff, degrading to a fallback value once
/// attempts are exhausted.
///
/// Only for idempotent reads (balances, counters, receipts). Mutating calls
/// must never pass through here: a retried submission can double-spend.
pub async fn attempt<F, Fut, T, E>(
    mut operation: F,
    max_attempts: u32,
    backoff_unit: Duration,
    fallback: T,
) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    for index in 0..max_attempts {
        match operation().await {
            Ok(value) => {
                if index > 0 {
                    debug!("read succeeded after {} retries", index);
                }
                return value;
            }
            Err(e) => {
                let remaining = max_attempts - index - 1;
                if remaining == 0 {
                    warn!("read failed after {} attempts, using fallback: {}", max_attempts, e);
                    break;
                }
                let delay = backoff_unit * (index + 1);
                warn!(
                    "read failed (attempt {}/{}): {} - retrying in {}ms",
                    index + 1,
                    max_attempts,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    fallback
}

/// [`attempt`] with the standard read policy: 3 attempts, 1s linear backoff.
pub async fn read_with_retry<F, Fut, T, E>(operation: F, fallback: T) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    attempt(operation, DEFAULT_READ_ATTEMPTS, BACKOFF_UNIT, fallback).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn returns_value_on_first_success() {
        let result = attempt(
            || async { Ok::<_, String>(7u32) },
            3,
            Duration::from_millis(1),
            0,
        )
        .await;
        assert_eq!(result, 7);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = attempt(
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("boom".to_string())
                } else {
                    Ok("42".to_string())
                }
            },
            3,
            Duration::from_millis(1),
            "0".to_string(),
        )
        .await;

        assert_eq!(result, "42");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn falls_back_after_exhausting_attempts() {
        let calls = AtomicU32::new(0);
        let result = attempt(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>("down".to_string())
            },
            3,
            Duration::from_millis(1),
            "0".to_string(),
        )
        .await;

        assert_eq!(result, "0");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
