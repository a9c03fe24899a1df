//! Retry governor for throttled AWS calls
//!
//! Every outbound call that can be throttled goes through a [`RetryPolicy`].
//! The sleep between attempts is a fixed base plus uniform random jitter,
//! expressed as a `backon` [`BackoffBuilder`] so call sites read like any
//! other `backon::Retryable` loop.

use crate::aws::AwsError;
use crate::error::ReapError;
use backon::{BackoffBuilder, Retryable};
use rand::Rng;
use stackreap_common::defaults::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_JITTER_SECS,
    SLOW_SERVICE_BASE_DELAY_MS, SLOW_SERVICE_MAX_JITTER_SECS, SLOW_SERVICE_MAX_RETRIES,
};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry budget and pacing for one class of calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first call (so at most `max_retries + 1` calls)
    pub max_retries: u32,
    /// Fixed part of every sleep
    pub base_delay: Duration,
    /// Upper bound of the uniform random part of every sleep
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            max_jitter: Duration::from_secs(DEFAULT_RETRY_MAX_JITTER_SECS),
        }
    }
}

impl RetryPolicy {
    /// Policy for services with low request quotas (S3 Tables, S3 Vectors)
    pub fn slow_service() -> Self {
        Self {
            max_retries: SLOW_SERVICE_MAX_RETRIES,
            base_delay: Duration::from_millis(SLOW_SERVICE_BASE_DELAY_MS),
            max_jitter: Duration::from_secs(SLOW_SERVICE_MAX_JITTER_SECS),
        }
    }

    /// Backoff iterator for hand-written retry loops
    pub fn backoff(&self) -> JitteredBackoff {
        JitteredBuilder(*self).build()
    }

    /// Run `operation`, retrying throttled and transient AWS errors.
    pub async fn call<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, ReapError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AwsError>>,
    {
        self.run_with_retry(label, AwsError::is_retryable, operation)
            .await
    }

    /// Run `operation`, retrying while `is_retryable` holds.
    ///
    /// Running out of retries yields [`ReapError::RetryBudgetExceeded`]; any
    /// other error is returned on first occurrence as [`ReapError::Aws`].
    pub async fn run_with_retry<T, F, Fut, P>(
        &self,
        label: &str,
        is_retryable: P,
        mut operation: F,
    ) -> Result<T, ReapError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AwsError>>,
        P: Fn(&AwsError) -> bool,
    {
        let mut attempts = 0usize;

        let result = (|| {
            attempts += 1;
            operation()
        })
        .retry(JitteredBuilder(*self))
        .when(|e| is_retryable(e))
        .notify(|e, delay| {
            warn!(
                operation = %label,
                delay = ?delay,
                error = %e,
                "AWS call failed, retrying..."
            );
        })
        .await;

        result.map_err(|source| {
            if is_retryable(&source) {
                ReapError::RetryBudgetExceeded {
                    label: label.to_string(),
                    attempts,
                    source,
                }
            } else {
                ReapError::Aws {
                    context: label.to_string(),
                    source,
                }
            }
        })
    }
}

/// Builds a [`JitteredBackoff`] from a [`RetryPolicy`]
#[derive(Debug, Clone, Copy)]
pub struct JitteredBuilder(pub RetryPolicy);

impl BackoffBuilder for JitteredBuilder {
    type Backoff = JitteredBackoff;

    fn build(self) -> Self::Backoff {
        JitteredBackoff {
            policy: self.0,
            remaining: self.0.max_retries,
        }
    }
}

/// Yields `max_retries` delays of `base_delay + uniform(0, max_jitter)`
#[derive(Debug, Clone)]
pub struct JitteredBackoff {
    policy: RetryPolicy,
    remaining: u32,
}

impl Iterator for JitteredBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let jitter_ms = self.policy.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        Some(self.policy.base_delay + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn throttled() -> AwsError {
        AwsError::Throttled {
            message: "Rate exceeded".to_string(),
        }
    }

    #[test]
    fn backoff_stays_within_bounds() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = policy.backoff().collect();
        assert_eq!(delays.len(), 10);
        for d in delays {
            assert!(d >= Duration::from_secs(1));
            assert!(d <= Duration::from_secs(6));
        }
    }

    #[test]
    fn slow_service_policy_is_stricter() {
        let slow = RetryPolicy::slow_service();
        let default = RetryPolicy::default();
        assert!(slow.max_retries < default.max_retries);
        assert!(slow.base_delay > default.base_delay);
        assert!(slow.max_jitter > default.max_jitter);
    }

    #[test]
    fn zero_jitter_is_exact() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_jitter: Duration::ZERO,
        };
        let delays: Vec<_> = policy.backoff().collect();
        assert_eq!(delays, vec![Duration::from_millis(250); 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_is_max_retries_plus_one_calls() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::default();

        let result: Result<(), _> = policy
            .call("DeleteBucket", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(throttled())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 11);
        match result {
            Err(ReapError::RetryBudgetExceeded {
                label,
                attempts,
                source,
            }) => {
                assert_eq!(label, "DeleteBucket");
                assert_eq!(attempts, 11);
                assert_eq!(source, throttled());
            }
            other => panic!("expected RetryBudgetExceeded, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::slow_service();

        let result = policy
            .call("ListNamespaces", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(AwsError::Transient {
                        message: "connection reset".to_string(),
                    })
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.ok(), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::default();

        let result: Result<(), _> = policy
            .call("DeleteRole", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AwsError::Sdk {
                    code: Some("AccessDenied".to_string()),
                    message: "not authorized".to_string(),
                })
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ReapError::Aws { ref context, .. }) if context == "DeleteRole"));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_predicate_controls_retries() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };

        // Retry on a code the default predicate treats as terminal
        let result: Result<(), _> = policy
            .run_with_retry(
                "DeleteStack",
                |e| e.code() == Some("ResourceInUse"),
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(AwsError::Sdk {
                        code: Some("ResourceInUse".to_string()),
                        message: "busy".to_string(),
                    })
                },
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(ReapError::RetryBudgetExceeded { attempts: 3, .. })
        ));
    }
}
