//! Resource waiting with exponential backoff and cancellation support.
//!
//! Provides a generic abstraction for waiting on a stack (or any async
//! condition) to settle, with configurable exponential backoff, jitter,
//! timeout and cancellation.

use crate::error::ReapError;
use backon::{BackoffBuilder, ExponentialBuilder};
use stackreap_common::defaults::{
    DEFAULT_STACK_WAIT_TIMEOUT_SECS, DEFAULT_VAULT_DRAIN_TIMEOUT_SECS,
};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for resource waiting with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct WaitConfig {
    /// Initial delay between checks
    pub initial_delay: Duration,
    /// Maximum delay between checks (cap for exponential growth)
    pub max_delay: Duration,
    /// Maximum total time to wait before timeout
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
        }
    }
}

impl WaitConfig {
    /// Polling profile for CloudFormation stack operations
    pub fn stack() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            timeout: Duration::from_secs(DEFAULT_STACK_WAIT_TIMEOUT_SECS),
        }
    }

    /// Polling profile for asynchronous deletes inside a resource, such as
    /// backup recovery points
    pub fn drain() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(20),
            timeout: Duration::from_secs(DEFAULT_VAULT_DRAIN_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Wait for a resource to settle with exponential backoff.
///
/// Uses `backon::ExponentialBuilder` for delay calculation and `tokio::select!`
/// for cancellation support.
///
/// # Arguments
/// * `config` - Wait configuration
/// * `cancel` - Cancellation token raced against every sleep
/// * `check` - Async function that returns `Ok(Some(value))` when settled, `Ok(None)` to retry
/// * `resource_name` - Name for logging and errors
///
/// # Returns
/// * `Ok(value)` - The value produced by the settling check
/// * `Err` - [`ReapError::WaitTimeout`], [`ReapError::Cancelled`], or the check's error
///
/// # Example
/// ```ignore
/// let snapshot = wait_for_resource(
///     WaitConfig::stack(),
///     &cancel,
///     || async {
///         let snapshot = describe(&stack).await?;
///         Ok(snapshot.filter(|s| s.status.is_terminal()))
///     },
///     &stack,
/// ).await?;
/// ```
pub async fn wait_for_resource<T, F, Fut>(
    config: WaitConfig,
    cancel: &CancellationToken,
    mut check: F,
    resource_name: &str,
) -> Result<T, ReapError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, ReapError>>,
{
    let start = tokio::time::Instant::now();
    let mut attempts = 0u32;

    let mut delays = ExponentialBuilder::default()
        .with_min_delay(config.initial_delay)
        .with_max_delay(config.max_delay)
        .with_factor(2.0)
        .with_jitter()
        .build();

    loop {
        attempts += 1;

        // Check cancellation before each attempt
        if cancel.is_cancelled() {
            return Err(ReapError::cancelled(resource_name));
        }

        // Check timeout
        if start.elapsed() >= config.timeout {
            warn!(resource = %resource_name, attempts, "Gave up waiting");
            return Err(ReapError::WaitTimeout {
                resource: resource_name.to_string(),
                timeout: config.timeout,
            });
        }

        match check().await {
            Ok(Some(value)) => {
                debug!(resource = %resource_name, attempts, "Resource settled");
                return Ok(value);
            }
            Ok(None) => {
                let delay = delays
                    .next()
                    .unwrap_or(config.max_delay)
                    .min(config.max_delay);
                debug!(
                    resource = %resource_name,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    "Resource not settled, waiting"
                );

                // Wait with cancellation support
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(ReapError::cancelled(resource_name));
                    }
                }
            }
            Err(e) => {
                warn!(resource = %resource_name, error = %e, "Resource check failed");
                return Err(e);
            }
        }
    }
}
