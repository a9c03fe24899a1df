//! AWS error classification and handling
//!
//! Provides typed errors for AWS SDK operations using the `.code()` method
//! instead of string matching on Debug format. Everything above the client
//! boundary only ever sees an [`AwsError`].

use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// AWS error categories for retry and cleanup logic
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AwsError {
    /// Resource was not found (safe to skip in cleanup)
    #[error("Resource not found: {message}")]
    NotFound { message: String },

    /// Rate limit exceeded (retryable with backoff)
    #[error("Rate limit exceeded: {message}")]
    Throttled { message: String },

    /// Internal or transport-level failure (retryable with backoff)
    #[error("Transient service error: {message}")]
    Transient { message: String },

    /// Generic AWS SDK error with code and message
    #[error("AWS error{}: {message}", code.as_deref().map(|c| format!(" {c}")).unwrap_or_default())]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    /// Classify any SDK operation error.
    ///
    /// Timeouts and dispatch failures carry no error code and are treated as
    /// transient; everything else is classified by its service error code.
    pub fn from_sdk<E, R>(err: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        let rendered = DisplayErrorContext(&err).to_string();
        match &err {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
                return AwsError::Transient { message: rendered };
            }
            _ => {}
        }
        let message = err.message().map(str::to_string).unwrap_or(rendered);
        classify_aws_error(err.code(), Some(&message))
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(self, AwsError::Throttled { .. } | AwsError::Transient { .. })
    }

    /// Error code, when the service returned one
    pub fn code(&self) -> Option<&str> {
        match self {
            AwsError::Sdk { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Error message without the category prefix
    pub fn message(&self) -> &str {
        match self {
            AwsError::NotFound { message }
            | AwsError::Throttled { message }
            | AwsError::Transient { message }
            | AwsError::Sdk { message, .. } => message,
        }
    }
}

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "NoSuchBucket",
    "NoSuchKey",
    "NoSuchVersion",
    "NotFound",
    "NoSuchEntity",
    "RepositoryNotFoundException",
    "ResourceNotFoundException",
    "NotFoundException",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "RequestThrottled",
    "SlowDown",
    "ProvisionedThroughputExceededException",
];

/// Known AWS error codes for internal, transient failures
const TRANSIENT_CODES: &[&str] = &[
    "InternalError",
    "InternalFailure",
    "InternalServerError",
    "InternalServerException",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "RequestTimeout",
];

/// Classify an AWS error using its code and message.
///
/// CloudFormation reports missing stacks as a `ValidationError` whose message
/// ends in "does not exist"; that is the one place the message is consulted.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound { message },
        Some("ValidationError") if message.contains("does not exist") => {
            AwsError::NotFound { message }
        }
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled { message },
        Some(c) if TRANSIENT_CODES.contains(&c) => AwsError::Transient { message },
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

/// Turn a "not found" error into `Ok(None)`, passing everything else through.
pub fn ignore_not_found<T>(result: Result<T, AwsError>) -> Result<Option<T>, AwsError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
