//! Errors raised by the force-delete engine
//!
//! Every variant carries enough identity (stack, resource, label) to be
//! reported on its own; [`ReapError::StackFailures`] keeps one entry per
//! failed stack instead of merging them.

use crate::aws::AwsError;
use crate::config::ConfigError;
use stackreap_common::ResourceClass;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A blocking resource the engine has no strategy for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedResource {
    pub logical_id: String,
    pub resource_type: String,
}

impl fmt::Display for UnrecognizedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.logical_id, self.resource_type)
    }
}

/// One stack that failed (or was cancelled) during a scheduled run
#[derive(Debug)]
pub struct StackFailure {
    pub stack: String,
    pub error: ReapError,
}

#[derive(Debug, Error)]
pub enum ReapError {
    #[error("{label}: retry budget exhausted after {attempts} attempts")]
    RetryBudgetExceeded {
        label: String,
        attempts: usize,
        #[source]
        source: AwsError,
    },

    #[error("{context}")]
    Aws {
        context: String,
        #[source]
        source: AwsError,
    },

    #[error("stack {stack} is in unexpected status {status}")]
    UnexpectedStatus { stack: String, status: String },

    #[error("stack {stack} has termination protection enabled")]
    TerminationProtected { stack: String },

    #[error("stack {stack} has blocking resources with no cleanup strategy: {}", join(resources))]
    UnrecognizedResources {
        stack: String,
        resources: Vec<UnrecognizedResource>,
    },

    #[error("failed to clean up {class} {logical_id} ({physical_id}) in stack {stack}")]
    Cleanup {
        stack: String,
        class: ResourceClass,
        logical_id: String,
        physical_id: String,
        #[source]
        source: Box<ReapError>,
    },

    #[error("could not delete {key} from bucket {bucket}: {code}: {message}")]
    ObjectDelete {
        bucket: String,
        key: String,
        code: String,
        message: String,
    },

    #[error("circular dependency between stacks: {}", path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("export {export} of stack {exporter} is imported by {importer}, which is not being deleted")]
    ExternalImporter {
        exporter: String,
        export: String,
        importer: String,
    },

    #[error("timed out after {timeout:?} waiting for {resource}")]
    WaitTimeout { resource: String, timeout: Duration },

    #[error("cancelled while working on {resource}")]
    Cancelled { resource: String },

    #[error("stack {stack} still DELETE_FAILED after {attempts} delete attempts")]
    DeleteAttemptsExhausted { stack: String, attempts: usize },

    #[error("template of stack {stack} is {size} bytes, larger than the {limit} byte update limit")]
    TemplateTooLarge {
        stack: String,
        size: usize,
        limit: usize,
    },

    #[error("could not parse template of stack {stack}: {message}")]
    TemplateParse { stack: String, message: String },

    #[error("{} stack(s) failed ({} deleted, {} not started)", failures.len(), deleted.len(), not_started.len())]
    StackFailures {
        failures: Vec<StackFailure>,
        deleted: Vec<String>,
        not_started: Vec<String>,
    },

    #[error("deletion task for stack {stack} panicked")]
    TaskPanicked { stack: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn join(resources: &[UnrecognizedResource]) -> String {
    resources
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ReapError {
    /// Wrap an AWS error that is not worth retrying
    pub fn aws(context: impl Into<String>, source: AwsError) -> Self {
        ReapError::Aws {
            context: context.into(),
            source,
        }
    }

    pub fn cancelled(resource: impl Into<String>) -> Self {
        ReapError::Cancelled {
            resource: resource.into(),
        }
    }

    /// True if this error, or the error it wraps, is a cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            ReapError::Cancelled { .. } => true,
            ReapError::Cleanup { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// The underlying AWS error, if any
    pub fn aws_source(&self) -> Option<&AwsError> {
        match self {
            ReapError::RetryBudgetExceeded { source, .. } | ReapError::Aws { source, .. } => {
                Some(source)
            }
            ReapError::Cleanup { source, .. } => source.aws_source(),
            _ => None,
        }
    }
}
