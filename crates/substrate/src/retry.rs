use orchestrator::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub const DEFAULT_INITIAL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_BACKOFF_COEFFICIENT: f64 = 2.0;
pub const DEFAULT_MAXIMUM_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_MAXIMUM_ATTEMPTS: u32 = 3;

/// Exponential backoff applied to child invocations and one-shot calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub initial_interval_ms: u64,
    pub backoff_coefficient: f64,
    pub maximum_interval_ms: u64,
    /// Total attempts including the first one; `None` retries forever.
    pub maximum_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: DEFAULT_INITIAL_INTERVAL_MS,
            backoff_coefficient: DEFAULT_BACKOFF_COEFFICIENT,
            maximum_interval_ms: DEFAULT_MAXIMUM_INTERVAL_MS,
            maximum_attempts: Some(DEFAULT_MAXIMUM_ATTEMPTS),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, never retried.
    pub fn no_retry() -> Self {
        Self {
            maximum_attempts: Some(1),
            ..Self::default()
        }
    }

    /// Up to `attempts` attempts with no delay in between.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            initial_interval_ms: 0,
            backoff_coefficient: 1.0,
            maximum_interval_ms: 0,
            maximum_attempts: Some(attempts),
        }
    }

    /// Whether another attempt may follow `attempt` failed ones.
    pub fn allows(&self, attempt: u32) -> bool {
        self.maximum_attempts.map_or(true, |max| attempt < max)
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial_interval_ms as f64 * self.backoff_coefficient.max(1.0).powi(exponent);
        let capped = scaled.min(self.maximum_interval_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Drive `op` until it succeeds, fails with a non-retryable error, runs out of
/// attempts or `cancellation` fires. `on_retry` sees each scheduled retry.
pub(crate) async fn retry_with<T, Op, Fut, OnRetry>(
    policy: &RetryPolicy,
    label: &str,
    cancellation: &CancellationToken,
    mut on_retry: OnRetry,
    mut op: Op,
) -> Result<T>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    OnRetry: FnMut(u32, Duration),
{
    let mut attempt = 1;
    loop {
        let error = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !error.is_retryable() || !policy.allows(attempt) || cancellation.is_cancelled() {
            return Err(error);
        }

        let delay = policy.delay_for(attempt);
        warn!(
            invocation_id = %label,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Attempt failed, retrying"
        );
        on_retry(attempt, delay);

        tokio::select! {
            _ = cancellation.cancelled() => return Err(OrchestratorError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migrator_core::MigrationId;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unit_error() -> OrchestratorError {
        OrchestratorError::unit_failed(MigrationId::from("app::B"), "boom")
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(30), Duration::from_secs(60));
    }

    #[test]
    fn test_unbounded_and_single_attempt() {
        let unbounded = RetryPolicy {
            maximum_attempts: None,
            ..RetryPolicy::default()
        };
        assert!(unbounded.allows(1_000));
        assert!(!RetryPolicy::no_retry().allows(1));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"maximum_attempts": 5}"#).unwrap();
        assert_eq!(policy.maximum_attempts, Some(5));
        assert_eq!(policy.initial_interval_ms, DEFAULT_INITIAL_INTERVAL_MS);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let mut retries = Vec::new();

        let value = retry_with(
            &RetryPolicy::immediate(3),
            "op",
            &CancellationToken::new(),
            |attempt, _| retries.push(attempt),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(unit_error())
                    } else {
                        Ok(attempt)
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_gives_up_after_last_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with(
            &RetryPolicy::immediate(2),
            "op",
            &CancellationToken::new(),
            |_, _| {},
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(unit_error()) }
            },
        )
        .await;

        assert!(matches!(result, Err(OrchestratorError::UnitExecution { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with(
            &RetryPolicy::immediate(5),
            "op",
            &CancellationToken::new(),
            |_, _| {},
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(OrchestratorError::IdentityResolution("app::Z".into())) }
            },
        )
        .await;

        assert!(matches!(result, Err(OrchestratorError::IdentityResolution(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_backoff() {
        let token = CancellationToken::new();
        let cancel = token.clone();
        let policy = RetryPolicy {
            maximum_attempts: None,
            ..RetryPolicy::default()
        };

        let result: Result<()> = retry_with(
            &policy,
            "op",
            &token,
            |_, _| cancel.cancel(),
            |_| async { Err(unit_error()) },
        )
        .await;

        assert!(matches!(result, Err(OrchestratorError::Cancelled)));
    }
}
