//! Bounded exponential backoff for transient HTTP failures. Grounded in the teacher's use of the
//! `backon` crate for its snapshot-fetch retry loop.

use backon::{ExponentialBuilder, Retryable};
use std::future::Future;

use crate::error::RecoverableError;

/// Runs `op`, retrying up to `max_retries` times with exponential backoff
/// whenever it returns [`RecoverableError`]. Any other error type is not
/// retried; the caller is expected to map it directly to a [`ChainError`](crate::error::ChainError).
pub async fn with_retries<T, F, Fut>(max_retries: u32, op: F) -> Result<T, RecoverableError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RecoverableError>>,
{
    let backoff = ExponentialBuilder::default()
        .with_max_times(max_retries as usize)
        .with_jitter();

    op.retry(backoff)
        .when(|_: &RecoverableError| true)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result = with_retries(5, || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(RecoverableError::Transient {
                    status: 503,
                    message: "busy".into(),
                })
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let result: Result<(), RecoverableError> = with_retries(2, || async {
            Err(RecoverableError::Transient {
                status: 500,
                message: "down".into(),
            })
        })
        .await;
        assert!(result.is_err());
    }
}
