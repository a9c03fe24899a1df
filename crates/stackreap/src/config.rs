//! Configuration types for a reap run

use crate::operator::OperatorSettings;
use crate::orchestrator::DeleterSettings;
use crate::retry::RetryPolicy;
use crate::wait::WaitConfig;
use stackreap_common::defaults::{
    DEFAULT_CLEANUP_CONCURRENCY, DEFAULT_MAX_DELETE_ATTEMPTS, DEFAULT_OBJECT_DELETE_WORKERS,
    DEFAULT_STACK_WAIT_TIMEOUT_SECS,
};
use std::time::Duration;
use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// concurrency was given as zero
    #[error("concurrency must be at least 1")]
    InvalidConcurrency,

    /// cleanup_concurrency is zero
    #[error("cleanup_concurrency must be at least 1")]
    InvalidCleanupConcurrency,

    /// object_workers is zero
    #[error("object_workers must be at least 1")]
    InvalidObjectWorkers,

    /// timeout is zero
    #[error("timeout must be greater than 0")]
    InvalidTimeout,

    /// max_delete_attempts is zero
    #[error("max_delete_attempts must be at least 1")]
    InvalidMaxDeleteAttempts,

    /// region was given but empty
    #[error("region cannot be empty")]
    EmptyRegion,

    /// a target stack name is empty
    #[error("stack names cannot be empty")]
    EmptyStackName,
}

/// AWS connection settings
#[derive(Debug, Clone, Default)]
pub struct AwsConfig {
    /// AWS region (falls back to the SDK's resolution chain)
    pub region: Option<String>,
    /// AWS profile name (overrides default credential resolution)
    pub profile: Option<String>,
}

impl AwsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.region.as_deref() {
            Some(region) if region.trim().is_empty() => Err(ConfigError::EmptyRegion),
            _ => Ok(()),
        }
    }
}

/// Behavior of a reap run
#[derive(Debug, Clone)]
pub struct ReapConfig {
    /// Strip `Retain` deletion policies from root templates before deleting
    pub force: bool,
    /// Root stacks deleted at once within a group; `None` is the whole group
    pub concurrency: Option<usize>,
    /// Blocking resources cleaned at once within one stack
    pub cleanup_concurrency: usize,
    /// Concurrent `DeleteObjects` workers per bucket
    pub object_workers: usize,
    /// How long one stack may take to settle
    pub timeout: Duration,
    /// Delete calls issued per stack before giving up
    pub max_delete_attempts: usize,
    /// Retry policy for throttled AWS calls
    pub retry: RetryPolicy,
    /// Retry policy for S3 Tables and S3 Vectors
    pub slow_retry: RetryPolicy,
}

impl Default for ReapConfig {
    fn default() -> Self {
        Self {
            force: false,
            concurrency: None,
            cleanup_concurrency: DEFAULT_CLEANUP_CONCURRENCY,
            object_workers: DEFAULT_OBJECT_DELETE_WORKERS,
            timeout: Duration::from_secs(DEFAULT_STACK_WAIT_TIMEOUT_SECS),
            max_delete_attempts: DEFAULT_MAX_DELETE_ATTEMPTS,
            retry: RetryPolicy::default(),
            slow_retry: RetryPolicy::slow_service(),
        }
    }
}

impl ReapConfig {
    /// Reject settings that would stall or never make progress
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == Some(0) {
            return Err(ConfigError::InvalidConcurrency);
        }
        if self.cleanup_concurrency == 0 {
            return Err(ConfigError::InvalidCleanupConcurrency);
        }
        if self.object_workers == 0 {
            return Err(ConfigError::InvalidObjectWorkers);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.max_delete_attempts == 0 {
            return Err(ConfigError::InvalidMaxDeleteAttempts);
        }
        Ok(())
    }

    pub fn deleter_settings(&self) -> DeleterSettings {
        DeleterSettings {
            force: self.force,
            cleanup_concurrency: self.cleanup_concurrency,
            max_delete_attempts: self.max_delete_attempts,
            wait: WaitConfig::stack().with_timeout(self.timeout),
            retry: self.retry,
        }
    }

    pub fn operator_settings(&self) -> OperatorSettings {
        OperatorSettings {
            retry: self.retry,
            slow_retry: self.slow_retry,
            object_workers: self.object_workers,
            drain_wait: WaitConfig::drain().with_timeout(self.timeout),
        }
    }
}

/// Reject empty stack names before any AWS call
pub fn validate_targets(targets: &[String]) -> Result<(), ConfigError> {
    if targets.iter().any(|t| t.trim().is_empty()) {
        return Err(ConfigError::EmptyStackName);
    }
    Ok(())
}
