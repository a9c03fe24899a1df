//! Default configuration values for stackreap
//!
//! Limits that mirror AWS service quotas are named after the API they bound.

/// Default number of retries for a throttled AWS call
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Fixed part of the delay between retries, in milliseconds
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Upper bound of the random part of the delay between retries, in seconds
pub const DEFAULT_RETRY_MAX_JITTER_SECS: u64 = 5;

/// Retry ceiling for slow services (S3 Tables, S3 Vectors)
pub const SLOW_SERVICE_MAX_RETRIES: u32 = 5;

/// Fixed part of the slow-service retry delay, in milliseconds
pub const SLOW_SERVICE_BASE_DELAY_MS: u64 = 3_000;

/// Upper bound of the random part of the slow-service retry delay, in seconds
pub const SLOW_SERVICE_MAX_JITTER_SECS: u64 = 10;

/// Maximum number of keys accepted by a single S3 `DeleteObjects` call
pub const DELETE_OBJECTS_BATCH_LIMIT: usize = 1_000;

/// Maximum number of image ids accepted by a single ECR `BatchDeleteImage` call
pub const BATCH_DELETE_IMAGE_LIMIT: usize = 100;

/// Largest template body `UpdateStack` accepts inline, in bytes
pub const INLINE_TEMPLATE_BODY_LIMIT: usize = 51_200;

/// Largest template `UpdateStack` accepts from an S3 URL, in bytes
pub const STAGED_TEMPLATE_BODY_LIMIT: usize = 1_000_000;

/// Default ceiling for waiting on a stack to reach a terminal status (90 minutes)
pub const DEFAULT_STACK_WAIT_TIMEOUT_SECS: u64 = 90 * 60;

/// Default number of delete calls issued per stack before giving up
pub const DEFAULT_MAX_DELETE_ATTEMPTS: usize = 5;

/// Default number of blocking resources cleaned concurrently within one stack
pub const DEFAULT_CLEANUP_CONCURRENCY: usize = 4;

/// Default number of concurrent `DeleteObjects` workers per bucket
pub const DEFAULT_OBJECT_DELETE_WORKERS: usize = 8;

/// Default ceiling for a backup vault's recovery points to finish deleting (30 minutes)
pub const DEFAULT_VAULT_DRAIN_TIMEOUT_SECS: u64 = 30 * 60;
