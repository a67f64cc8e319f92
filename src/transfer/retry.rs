//! Bounded per-chunk retry
//!
//! Fixed attempt ceiling, no backoff, no jitter.

use std::future::Future;

use tracing::{debug, error, warn};

use crate::error::{Result, TransferError};

/// Run `attempt` until it succeeds or `max_attempts` calls have failed
///
/// The closure receives the 1-based attempt number. Every failure is
/// treated as transient; once the ceiling is hit the last failure is
/// wrapped in [`TransferError::RetriesExhausted`] naming `chunk`.
pub async fn with_retries<T, F, Fut>(chunk: u32, max_attempts: u32, operation: &str, mut attempt: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut last_error: Option<TransferError> = None;

    for n in 1..=max_attempts {
        match attempt(n).await {
            Ok(value) => {
                if n > 1 {
                    debug!("{} chunk {} succeeded on attempt {}", operation, chunk, n);
                }
                return Ok(value);
            }
            Err(e) => {
                if n < max_attempts {
                    warn!("{} chunk {} failed (attempt {}/{}): {}, retrying", operation, chunk, n, max_attempts, e);
                } else {
                    warn!("{} chunk {} failed (attempt {}/{}): {}", operation, chunk, n, max_attempts, e);
                }
                last_error = Some(e);
            }
        }
    }

    let reason = last_error.map(|e| e.to_string()).unwrap_or_else(|| "unknown failure".to_string());
    error!("Failed to {} chunk {} after {} attempts", operation.to_lowercase(), chunk, max_attempts);
    Err(TransferError::retries_exhausted(chunk, max_attempts, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_first_attempt_succeeds() {
        let calls = AtomicU32::new(0);
        let value = with_retries(0, 3, "Upload", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, TransferError>(42) }
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let result = with_retries(5, 3, "Upload", |n| async move {
            if n < 3 {
                Err(TransferError::transport_error("connection reset"))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_names_chunk() {
        let calls = AtomicU32::new(0);
        let err = with_retries(7, 3, "Download", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(TransferError::transport_error("status 503")) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            TransferError::RetriesExhausted { chunk, attempts, reason } => {
                assert_eq!(chunk, 7);
                assert_eq!(attempts, 3);
                assert!(reason.contains("status 503"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_ceiling_still_attempts_once() {
        let calls = AtomicU32::new(0);
        let _ = with_retries(0, 0, "Upload", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(TransferError::transport_error("down")) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
