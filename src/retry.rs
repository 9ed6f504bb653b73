//! Retry logic with exponential backoff
//!
//! Every store call that can fail transiently runs through
//! [`execute_with_retry`]. Retries happen at the finest meaningful
//! granularity (one part, one initiate, one complete), never by restarting a
//! whole transfer.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Result, StoreError};

/// Hard ceiling on the configurable attempt cap
pub const MAX_RETRY_ATTEMPTS: u32 = 50;

/// Default attempt cap
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 10;

/// Retry configuration shared by all call sites of one client
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Ceiling on the backoff delay
    pub max_delay: Duration,

    /// Jitter factor (0.0-1.0) added on top of the computed delay
    pub jitter_factor: f64,

    /// Retry errors classified as client-side (4xx other than throttling)
    pub retry_client_errors: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.3,
            retry_client_errors: false,
        }
    }
}

impl RetryConfig {
    /// Set the attempt cap, clamped to `1..=MAX_RETRY_ATTEMPTS`
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.clamp(1, MAX_RETRY_ATTEMPTS);
        self
    }

    /// Calculate the backoff delay before the given retry (1-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exp = 2_u64.saturating_pow(attempt.saturating_sub(1));
        let base = self
            .initial_delay
            .saturating_mul(exp.min(u32::MAX as u64) as u32)
            .min(self.max_delay);

        if self.jitter_factor > 0.0 {
            let jitter = rand::thread_rng().gen_range(0.0..self.jitter_factor);
            base + Duration::from_secs_f64(base.as_secs_f64() * jitter)
        } else {
            base
        }
    }
}

/// Decide whether an error is worth another attempt under this config
fn should_retry(config: &RetryConfig, error: &StoreError) -> bool {
    if matches!(error.root_cause(), StoreError::Cancelled) {
        return false;
    }
    if error.is_retryable() {
        return true;
    }
    error.is_client_error() && config.retry_client_errors
}

/// Run `operation` until it succeeds, fails non-retryably, or exhausts the
/// attempt cap. `description` names the operation in logs and in the final
/// error's context.
///
/// Cancellation is observed between attempts and during the backoff sleep;
/// a cancelled operation yields `StoreError::Cancelled` without further
/// attempts.
pub async fn execute_with_retry<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    description: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !should_retry(config, &error) {
                    return Err(error);
                }
                if attempt >= config.max_attempts {
                    return Err(error.context(format!(
                        "{} failed after {} attempts",
                        description, attempt
                    )));
                }

                let delay = config.calculate_delay(attempt);
                warn!(
                    "error {} (attempt {}/{}), retrying in {:?}: {}",
                    description, attempt, config.max_attempts, delay, error
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Err(StoreError::Cancelled),
                    _ = sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter_factor: 0.0,
            ..Default::default()
        }
    }

    fn transient() -> StoreError {
        StoreError::Network("connection reset".to_string())
    }

    fn client_error() -> StoreError {
        StoreError::Service {
            code: "AccessDenied".to_string(),
            status: 403,
            message: "denied".to_string(),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let config = fast_config().with_max_attempts(5);
        let attempts = AtomicU32::new(0);

        let result = execute_with_retry(&config, &CancellationToken::new(), "test op", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 4 {
                    Err(transient())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        // fails cap - 1 times, then succeeds
        assert_eq!(result.unwrap(), 4);
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_cap_is_honoured() {
        let config = fast_config().with_max_attempts(3);
        let attempts = AtomicU32::new(0);

        let result: Result<()> =
            execute_with_retry(&config, &CancellationToken::new(), "doomed op", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("doomed op"));
        assert!(err.to_string().contains("3 attempts"));
        assert!(matches!(err.root_cause(), StoreError::Network(_)));
    }

    #[tokio::test]
    async fn test_client_error_not_retried_by_default() {
        let config = fast_config().with_max_attempts(5);
        let attempts = AtomicU32::new(0);

        let result: Result<()> =
            execute_with_retry(&config, &CancellationToken::new(), "denied op", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(client_error()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_client_error_retried_when_opted_in() {
        let config = RetryConfig {
            retry_client_errors: true,
            ..fast_config()
        }
        .with_max_attempts(3);
        let attempts = AtomicU32::new(0);

        let result: Result<()> =
            execute_with_retry(&config, &CancellationToken::new(), "denied op", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(client_error()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_usage_error_never_retried() {
        let config = fast_config().with_max_attempts(5);
        let attempts = AtomicU32::new(0);

        let result: Result<()> =
            execute_with_retry(&config, &CancellationToken::new(), "bad op", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(StoreError::Usage("missing bucket".to_string())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_retries() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(60),
            jitter_factor: 0.0,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let attempts = AtomicU32::new(0);

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });

        // The first failure parks the loop in a long backoff sleep; the
        // cancel must cut that sleep short.
        let result: Result<()> = execute_with_retry(&config, &cancel, "slow op", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

        assert!(matches!(result.unwrap_err(), StoreError::Cancelled));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let attempts = AtomicU32::new(0);

        let result: Result<()> =
            execute_with_retry(&fast_config(), &cancel, "op", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result.unwrap_err(), StoreError::Cancelled));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter_factor: 0.0,
            ..Default::default()
        };
        assert_eq!(config.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(config.calculate_delay(3), Duration::from_millis(400));
        // far past the cap
        assert_eq!(config.calculate_delay(30), Duration::from_secs(5));
    }

    #[test]
    fn test_attempt_cap_clamped() {
        assert_eq!(
            RetryConfig::default().with_max_attempts(500).max_attempts,
            MAX_RETRY_ATTEMPTS
        );
        assert_eq!(RetryConfig::default().with_max_attempts(0).max_attempts, 1);
    }
}
