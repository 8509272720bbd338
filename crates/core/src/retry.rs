//! Retry with exponential backoff and jitter.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    /// 3 attempts, 500ms initial, x2 multiplier, 5s cap, +-25% jitter.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Which errors `retry_with_backoff` should retry.
#[derive(Debug, Clone, Copy)]
pub enum RetryPolicy {
    All,
    Transient,
    Never,
}

fn should_retry(error: &Error, policy: RetryPolicy) -> bool {
    match policy {
        RetryPolicy::Never => false,
        RetryPolicy::All => true,
        RetryPolicy::Transient => error.is_transient(),
    }
}

fn calculate_next_delay(current: Duration, config: &RetryConfig) -> Duration {
    let mut next = current.mul_f64(config.backoff_multiplier);
    if next > config.max_delay {
        next = config.max_delay;
    }
    if config.jitter {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let jitter_factor = rng.gen_range(0.75..1.25);
        next = next.mul_f64(jitter_factor);
    }
    next
}

/// Execute `operation` with retry under `config`, only retrying errors that
/// `policy` selects. On first non-retryable error, returns immediately
/// without further attempts.
pub async fn retry_with_backoff<F, Fut, T>(
    config: RetryConfig,
    policy: RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !should_retry(&err, policy) {
                    debug!("{operation_name} failed with non-retryable error: {err}");
                    return Err(err);
                }
                if attempt >= config.max_attempts {
                    return Err(Error::RetryExhausted {
                        operation: operation_name.to_string(),
                        attempts: config.max_attempts,
                        last_error: Box::new(err),
                    });
                }
                warn!(
                    "{operation_name} failed on attempt {attempt}/{}: {err}. retrying in {delay:?}",
                    config.max_attempts
                );
                sleep(delay).await;
                delay = calculate_next_delay(delay, &config);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_on_second_attempt() {
        let attempt = Arc::new(AtomicU32::new(0));
        let config = RetryConfig {
            initial_delay: Duration::from_millis(5),
            ..Default::default()
        };
        let attempt_clone = attempt.clone();
        let result = retry_with_backoff(config, RetryPolicy::All, "op", move || {
            let attempt = attempt_clone.clone();
            async move {
                if attempt.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
                    Ok(42)
                } else {
                    Err(Error::Transient("flaky".to_string()))
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let config = RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(5),
            ..Default::default()
        };
        let result: Result<()> = retry_with_backoff(config, RetryPolicy::All, "op", || async {
            Err(Error::Transient("always fails".to_string()))
        })
        .await;
        assert!(matches!(result, Err(Error::RetryExhausted { .. })));
    }

    #[tokio::test]
    async fn non_transient_error_never_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let config = RetryConfig::default();
        let result: Result<()> =
            retry_with_backoff(config, RetryPolicy::Transient, "op", move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Permanent("bad request".to_string()))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
