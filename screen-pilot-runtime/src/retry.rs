//! Bounded, cancellation-aware retry shared by the three loop stages.

use crate::interfaces::RuntimeError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Called before each retry with the stage name, the error and the retry number (1-based).
pub type RetryObserver = Arc<dyn Fn(&str, &RuntimeError, u32) + Send + Sync>;

/// Retry settings for one stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first; 0 disables retry.
    #[serde(default)]
    pub max_retries: u32,
    /// Whether exhausting retries ends the run with an error. When false the
    /// loop degrades instead: a lost screenshot counts as an invalid frame, a
    /// lost prediction as an empty one, a lost action is skipped.
    #[serde(default = "default_fatal")]
    pub fatal: bool,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_backoff_ms() -> u64 {
    250
}

fn default_fatal() -> bool {
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            fatal: default_fatal(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn non_fatal(mut self) -> Self {
        self.fatal = false;
        self
    }

    /// Exponential backoff, capped at 5s.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(
            self.backoff_ms
                .saturating_mul(2_u64.saturating_pow(attempt))
                .min(5000),
        )
    }
}

/// Retry settings for each stage of an iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StageRetries {
    #[serde(default)]
    pub screenshot: RetryPolicy,
    #[serde(default)]
    pub model: RetryPolicy,
    #[serde(default)]
    pub execute: RetryPolicy,
}

/// Run `op` until it succeeds or `policy.max_retries` retries are spent.
///
/// Cancellation, either signalled on `cancel` or returned by `op`, ends the
/// retry loop at once with [`RuntimeError::Cancelled`]. Errors that cannot
/// change on a second attempt are returned without retrying.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    stage: &str,
    on_retry: Option<&RetryObserver>,
    mut op: F,
) -> Result<T, RuntimeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RuntimeError>>,
{
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }

        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        if attempt >= policy.max_retries {
            return Err(error);
        }

        let delay = policy.delay_for(attempt);
        attempt += 1;
        warn!(
            "{} failed (retry {}/{} in {:?}): {}",
            stage, attempt, policy.max_retries, delay, error
        );
        if let Some(observer) = on_retry {
            observer(stage, &error, attempt);
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            fatal: false,
            backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_retries() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(3), &CancellationToken::new(), "screenshot", None, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(RuntimeError::Screenshot("busy".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            with_retry(&fast(2), &CancellationToken::new(), "model", None, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RuntimeError::Model("500".to_string()))
            })
            .await;
        assert!(matches!(result, Err(RuntimeError::Model(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let calls = AtomicU32::new(0);
        let _: Result<(), _> = with_retry(
            &RetryPolicy::default(),
            &CancellationToken::new(),
            "execute",
            None,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RuntimeError::Execute("nope".to_string()))
            },
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            with_retry(&fast(5), &CancellationToken::new(), "model", None, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RuntimeError::Cancelled)
            })
            .await;
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_aborts() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy {
            max_retries: 10,
            fatal: false,
            backoff_ms: 10_000,
        };
        let observer_cancel = cancel.clone();
        let observer: RetryObserver = Arc::new(move |_, _, _| observer_cancel.cancel());
        let result: Result<(), _> = with_retry(&policy, &cancel, "screenshot", Some(&observer), || async {
            Err(RuntimeError::Screenshot("dark".to_string()))
        })
        .await;
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_observer_sees_each_retry() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer: RetryObserver =
            Arc::new(move |stage, _, attempt| sink.lock().push((stage.to_string(), attempt)));
        let _: Result<(), _> = with_retry(&fast(2), &CancellationToken::new(), "execute", Some(&observer), || async {
            Err(RuntimeError::Execute("x".to_string()))
        })
        .await;
        assert_eq!(
            *seen.lock(),
            vec![("execute".to_string(), 1), ("execute".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_missing_coordinates_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            with_retry(&fast(5), &CancellationToken::new(), "execute", None, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RuntimeError::MissingCoordinates("click".to_string()))
            })
            .await;
        assert!(matches!(result, Err(RuntimeError::MissingCoordinates(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 0);
        assert!(policy.fatal);
        assert!(!RetryPolicy::retries(2).non_fatal().fatal);

        let parsed: RetryPolicy = serde_json::from_str(r#"{"max_retries": 2}"#).unwrap();
        assert!(parsed.fatal);
        assert_eq!(parsed.backoff_ms, 250);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(10), Duration::from_millis(5000));
    }
}
