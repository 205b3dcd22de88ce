//! Bounded retry for backend calls.
//!
//! Exponential backoff with jitter on top of `tokio-retry`. Only errors
//! that [`CacheError::is_retryable`] accepts are repeated; once attempts
//! run out, transport-class failures surface as
//! [`CacheError::StorageUnavailable`].

use crate::config::RetryConfig;
use crate::error::{CacheError, Result};
use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{error, warn};

impl RetryConfig {
    /// Delays between attempts; yields `max_attempts - 1` items.
    ///
    /// With base 2 and factor `initial/2` the first delay is `initial`,
    /// then each delay doubles up to `max_backoff`, with jitter applied.
    pub fn strategy(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        let initial_ms = self.initial_backoff.as_millis() as u64;
        // a zero factor would disable the delay entirely
        let factor = (initial_ms / 2).max(1);

        Box::new(
            ExponentialBackoff::from_millis(2)
                .factor(factor)
                .max_delay(self.max_backoff)
                .map(jitter)
                .take(self.max_attempts.saturating_sub(1)),
        )
    }
}

/// Run `op` under the retry policy.
///
/// `operation` names the call in log output.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0usize;

    let result = RetryIf::spawn(
        config.strategy(),
        || {
            attempts += 1;
            op()
        },
        |err: &CacheError| {
            let retryable = err.is_retryable();
            if retryable {
                warn!(operation, error = %err, "backend call failed");
            }
            retryable
        },
    )
    .await;

    result.map_err(|err| {
        let err = exhausted(err, attempts);
        if matches!(err, CacheError::StorageUnavailable { .. }) {
            error!(operation, attempts, error = %err, "backend call failed after all retry attempts");
        }
        err
    })
}

fn exhausted(err: CacheError, attempts: usize) -> CacheError {
    match err {
        CacheError::NotFound(_)
        | CacheError::Conflict(_)
        | CacheError::Decode(_)
        | CacheError::Config(_)
        | CacheError::StorageUnavailable { .. } => err,
        other => CacheError::StorageUnavailable {
            attempts,
            source: Box::new(other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_strategy_length() {
        assert_eq!(fast(3).strategy().count(), 2);
        assert_eq!(fast(1).strategy().count(), 0);
        assert_eq!(fast(0).strategy().count(), 0);
    }

    #[test]
    fn test_strategy_respects_max_backoff() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
        };
        for delay in config.strategy() {
            assert!(delay <= Duration::from_millis(300));
        }
    }

    #[tokio::test]
    async fn test_transient_failure_is_absorbed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result = with_retry(&fast(3), "test", || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(CacheError::Timeout)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_becomes_storage_unavailable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = with_retry(&fast(3), "test", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Err(CacheError::Backend {
                    status: 503,
                    body: "unavailable".into(),
                })
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(CacheError::StorageUnavailable { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, CacheError::Backend { status: 503, .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = with_retry(&fast(5), "test", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(CacheError::NotFound("k".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_conflict_is_retried_and_kept() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = with_retry(&fast(2), "test", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(CacheError::Conflict("k".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(result, Err(CacheError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_client_error_fails_fast() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = with_retry(&fast(4), "test", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Err(CacheError::Backend {
                    status: 400,
                    body: "mapper_parsing_exception".into(),
                })
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(CacheError::StorageUnavailable { attempts: 1, .. })
        ));
    }
}
