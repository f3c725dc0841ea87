//! Retry policy with fixed delay.
//!
//! The orchestrator's only retry rule is narrow: a failed checkpoint save
//! may be retried once before the investigation fails. The policy stays
//! configurable so callers can widen it where appropriate.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 1,
            delay: Duration::from_millis(100),
        }
    }
}

/// Runs `operation` and retries it per the config. Returns the last error
/// when every attempt fails.
pub async fn retry<T, E, F, Fut>(config: &RetryConfig, name: &str, mut operation: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < config.max_retries => {
                attempt += 1;
                warn!(
                    operation = name,
                    attempt,
                    max_retries = config.max_retries,
                    error = %err,
                    "operation failed, retrying"
                );
                tokio::time::sleep(config.delay).await;
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
    async fn succeeds_without_retry() {
        let config = RetryConfig::default();
        let result: Result<i32, String> = retry(&config, "op", || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn retries_once_then_succeeds() {
        let config = RetryConfig {
            max_retries: 1,
            delay: Duration::from_millis(1),
        };
        let calls = AtomicU32::new(0);
        let result: Result<i32, String> = retry(&config, "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err("transient".to_string())
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
    async fn exhausts_retries_and_returns_last_error() {
        let config = RetryConfig {
            max_retries: 1,
            delay: Duration::from_millis(1),
        };
        let result: Result<i32, String> =
            retry(&config, "op", || async { Err("persistent".to_string()) }).await;
        assert_eq!(result.unwrap_err(), "persistent");
    }
}
