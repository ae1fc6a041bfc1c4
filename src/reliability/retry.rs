//! Retry utilities with bounded backoff.
//!
//! Provides retry logic for transient failures using the `backon` crate.
//! Retries fire only for errors the engine classifies as transient
//! ([`crate::error::Error::is_transient`]); auth rejections and integrity
//! failures fail fast.

use backon::{ConstantBuilder, Retryable};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{Error, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: usize,
    /// Fixed delay between retries.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::page()
    }
}

impl RetryConfig {
    /// Config for listing page fetches: short fixed backoff, two retries.
    #[must_use]
    pub const fn page() -> Self {
        Self {
            max_retries: crate::constants::LIST_PAGE_RETRIES,
            delay: crate::constants::LIST_RETRY_DELAY,
        }
    }

    /// Config for body transfers: slightly longer backoff.
    #[must_use]
    pub const fn transfer() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(1),
        }
    }

    fn build_backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.max_retries)
    }
}

/// Retry an async operation while its error is transient.
///
/// Non-transient errors (401, 404, hash mismatch, protocol mismatch)
/// propagate immediately without burning retries.
pub async fn retry_typed<F, Fut, T>(
    config: RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let name = operation_name.to_string();
    let max_retries = config.max_retries;

    let mut attempt = 0usize;
    let notify = |err: &Error, dur: Duration| {
        attempt += 1;
        warn!(
            operation = %name,
            attempt = attempt,
            max_retries = max_retries,
            next_delay_ms = dur.as_millis() as u64,
            error = %err,
            "Transient failure, will retry"
        );
    };

    operation
        .retry(config.build_backoff())
        .when(Error::is_transient)
        .notify(notify)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn page_config_matches_constants() {
        let config = RetryConfig::page();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.delay, Duration::from_millis(400));
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = retry_typed(RetryConfig::page(), "test", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let config = RetryConfig {
            max_retries: 2,
            delay: Duration::from_millis(5),
        };
        let result = retry_typed(config, "test", || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::transient("test", "connection reset"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_retries_on_persistent_transient_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let config = RetryConfig {
            max_retries: 2,
            delay: Duration::from_millis(5),
        };
        let result: Result<u32> = retry_typed(config, "test", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Error::transient("test", "timed out"))
            }
        })
        .await;

        assert!(result.is_err());
        // Initial attempt + 2 retries = 3 total
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_rejection_fails_fast() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let config = RetryConfig {
            max_retries: 3,
            delay: Duration::from_millis(5),
        };
        let result: Result<u32> = retry_typed(config, "test", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Error::auth_rejected("https://a.example.com"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
