//! Retry Logic with Exponential Backoff
//!
//! Wraps a single data API call. Only retries errors classified as
//! retryable by `DataApiError::is_retryable`; the wait after the n-th
//! failed attempt (0-based) is `base_delay_ms * 2^n`, without jitter.

use super::api_errors::DataApiError;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Backoff after the given 0-based failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Execute an async closure with retry logic.
///
/// The closure should return `Result<T, DataApiError>`. It is called at most
/// `max_retries + 1` times. Backoff waits race `cancel`.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    cancel: &CancellationToken,
    mut f: F,
) -> Result<T, DataApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DataApiError>>,
{
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(DataApiError::Cancelled);
        }

        match f().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err);
                }
                if attempt >= config.max_retries {
                    warn!(
                        "[Retry] {} failed after {} attempts: {}",
                        operation_name,
                        attempt + 1,
                        err
                    );
                    return Err(err);
                }

                let delay = config.delay_for(attempt);
                debug!(
                    "[Retry] {} attempt {}/{} failed ({}), retrying in {:?}",
                    operation_name,
                    attempt + 1,
                    config.max_retries + 1,
                    err,
                    delay
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Err(DataApiError::Cancelled),
                    _ = sleep(delay) => {}
                }

                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn http(status: u16) -> DataApiError {
        DataApiError::from_response(status, "")
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let config = RetryConfig::default();
        let cancel = CancellationToken::new();
        let result = with_retry(&config, "test", &cancel, || async { Ok::<_, DataApiError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_delay_doubles() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(0), Duration::from_millis(1000));
        assert_eq!(config.delay_for(1), Duration::from_millis(2000));
        assert_eq!(config.delay_for(4), Duration::from_millis(16000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_503_503_200_waits_d_then_2d() {
        let config = RetryConfig::default();
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();

        let result = with_retry(&config, "test", &cancel, || {
            let mut seen = calls_clone.lock().unwrap();
            let n = seen.len();
            seen.push(start.elapsed());
            async move {
                if n < 2 {
                    Err(http(503))
                } else {
                    Ok(200)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 200);
        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                Duration::ZERO,
                Duration::from_millis(1000),
                Duration::from_millis(3000),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_404_aborts_immediately() {
        let config = RetryConfig::default();
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let start = Instant::now();

        let result = with_retry(&config, "test", &cancel, || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(http(404)) }
        })
        .await;

        assert_eq!(result.unwrap_err().status(), Some(404));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_error() {
        let config = RetryConfig {
            max_retries: 2,
            base_delay_ms: 10,
        };
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&config, "test", &cancel, || {
            let n = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err::<i32, _>(DataApiError::Network("reset".to_string()))
                } else {
                    Err(http(429))
                }
            }
        })
        .await;

        assert_eq!(result.unwrap_err().status(), Some(429));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let config = RetryConfig::default();
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });

        let result = with_retry(&config, "test", &cancel, || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(http(502)) }
        })
        .await;

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
