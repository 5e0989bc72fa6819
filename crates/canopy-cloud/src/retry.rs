//! Bounded retry with exponential backoff and jitter
//!
//! Wraps idempotent upstream calls. Only errors the classifier calls
//! retryable are re-attempted; everything else is returned at once.
//! Creates are not idempotent: a 500 may follow an accepted request, so
//! they go through [`with_retry_if`] with [`conflict_only`].

use crate::context::Context;
use crate::error::{CloudError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry budget for one resource type
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Cap for the exponential backoff
    pub max_delay: Duration,

    pub backoff_multiplier: f64,

    /// Relative jitter; `0.5` spreads each delay over 0.5x to 1.5x
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: 0.5,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Default::default()
        }
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self::with_max_attempts(1)
    }

    /// Backoff before attempt `attempt + 1` (0-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let secs = (self.initial_delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Backoff with jitter applied, never above `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt).as_secs_f64();
        let spread = if self.jitter > 0.0 {
            rand::thread_rng().gen_range((1.0 - self.jitter)..(1.0 + self.jitter))
        } else {
            1.0
        };
        Duration::from_secs_f64((base * spread).min(self.max_delay.as_secs_f64()))
    }
}

/// A 409: the upstream refused the request without acting on it.
pub fn conflict_only(err: &CloudError) -> bool {
    matches!(err.root(), CloudError::Api(api) if api.status == 409)
}

/// Run `operation` until it succeeds, fails with a non-retryable error or
/// the attempts run out. Backoff sleeps observe cancellation.
pub async fn retry<T, F, Fut>(
    ctx: &Context,
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let classifier = ctx.classifier();
    retry_if(ctx, config, operation_name, |e| classifier.is_retryable(e), operation).await
}

/// [`retry`] that re-attempts only the retryable errors `should_retry`
/// also accepts.
pub async fn retry_if<T, F, Fut, P>(
    ctx: &Context,
    config: &RetryConfig,
    operation_name: &str,
    mut should_retry: P,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: FnMut(&CloudError) -> bool,
{
    let mut attempt = 0u32;
    loop {
        ctx.check()?;
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = %operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e)
                if attempt < config.max_attempts
                    && ctx.classifier().is_retryable(&e)
                    && should_retry(&e) =>
            {
                let delay = config.delay_for_attempt(attempt - 1);
                warn!(
                    operation = %operation_name,
                    attempt,
                    max_attempts = config.max_attempts,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Retryable failure, backing off"
                );
                ctx.sleep(delay).await?;
            }
            Err(e) => return Err(e),
        }
    }
}

/// [`retry`] with the budget carried by the context.
pub async fn with_retry<T, F, Fut>(ctx: &Context, operation_name: &str, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let config = ctx.retry_config().clone();
    retry(ctx, &config, operation_name, operation).await
}

/// [`retry_if`] with the budget carried by the context.
pub async fn with_retry_if<T, F, Fut, P>(
    ctx: &Context,
    operation_name: &str,
    should_retry: P,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: FnMut(&CloudError) -> bool,
{
    let config = ctx.retry_config().clone();
    retry_if(ctx, &config, operation_name, should_retry, operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, CloudError};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(config.base_delay(0), Duration::from_secs(1));
        assert_eq!(config.base_delay(1), Duration::from_secs(2));
        assert_eq!(config.base_delay(10), Duration::from_secs(30));
        for attempt in 0..10 {
            assert!(config.delay_for_attempt(attempt) <= Duration::from_secs(30));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_retryable_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = retry(&Context::new("r"), &RetryConfig::default(), "create", move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CloudError::Api(ApiError::new(409, "conflict")))
                } else {
                    Ok("lb-1")
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, "lb-1");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let err = retry(&Context::new("r"), &RetryConfig::default(), "create", move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(CloudError::Api(ApiError::new(503, "unavailable"))) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CloudError::Api(ApiError { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_does_not_retry_fatal() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let err = retry(&Context::new("r"), &RetryConfig::default(), "read", move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(CloudError::Api(ApiError::new(401, "expired token"))) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CloudError::Api(ApiError { status: 401, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let ctx = Context::new("r").with_retry(RetryConfig::with_max_attempts(2));
        let _ = with_retry(&ctx, "delete", move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(CloudError::Api(ApiError::new(500, "oops"))) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_attempt() {
        let ctx = Context::new("r");
        ctx.cancel();
        let result = retry(&ctx, &RetryConfig::default(), "read", || async { Ok(()) }).await;
        assert!(matches!(result, Err(CloudError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_is_not_replayed_after_server_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let err = with_retry_if(&Context::new("r"), "create", conflict_only, move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CloudError::Api(ApiError::new(500, "accepted, then failed")))
                } else {
                    Ok("lb-2")
                }
            }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CloudError::Api(ApiError { status: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_retries_conflict() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let id = with_retry_if(&Context::new("r"), "create", conflict_only, move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CloudError::Api(ApiError::new(409, "vpc busy")))
                } else {
                    Ok("lb-1")
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(id, "lb-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
