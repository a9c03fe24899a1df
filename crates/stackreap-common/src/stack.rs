//! Point-in-time views of CloudFormation stacks and their resources

use std::fmt;

/// Coarse stack status as far as deletion is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStatus {
    /// Any `*_IN_PROGRESS` status
    InProgress,
    /// Any settled, non-failed status (`CREATE_COMPLETE`, `ROLLBACK_COMPLETE`, ...)
    Complete,
    /// `DELETE_FAILED`
    DeleteFailed,
    /// Any other `*_FAILED` status (`CREATE_FAILED`, `ROLLBACK_FAILED`, ...)
    Failed,
}

impl StackStatus {
    /// Map a raw CloudFormation status string onto a coarse status
    pub fn from_raw(raw: &str) -> Self {
        if raw == "DELETE_FAILED" {
            StackStatus::DeleteFailed
        } else if raw.ends_with("_IN_PROGRESS") {
            StackStatus::InProgress
        } else if raw.ends_with("_FAILED") {
            StackStatus::Failed
        } else {
            StackStatus::Complete
        }
    }

    /// Whether the stack has stopped changing
    pub fn is_terminal(self) -> bool {
        self != StackStatus::InProgress
    }
}

/// A named output value a stack exports for other stacks to import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackExport {
    pub name: String,
    pub value: String,
}

/// Fresh view of a stack that currently exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSnapshot {
    /// Stack name
    pub name: String,
    /// Coarse status
    pub status: StackStatus,
    /// Raw status string as reported by CloudFormation
    pub raw_status: String,
    /// Whether termination protection is enabled
    pub termination_protection: bool,
    /// Exported outputs
    pub exports: Vec<StackExport>,
    /// Name of the top-level stack when this one is nested
    pub root_stack: Option<String>,
}

/// Stack name out of a stack ARN
/// (`arn:aws:cloudformation:<region>:<account>:stack/<name>/<id>`)
pub fn stack_name_from_arn(arn: &str) -> Option<&str> {
    let name = arn
        .split(':')
        .nth(5)?
        .strip_prefix("stack/")?
        .split('/')
        .next()?;
    (!name.is_empty()).then_some(name)
}

/// Status of a single stack resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceStatus {
    DeleteFailed,
    Other(String),
}

impl ResourceStatus {
    pub fn from_raw(raw: &str) -> Self {
        if raw == "DELETE_FAILED" {
            ResourceStatus::DeleteFailed
        } else {
            ResourceStatus::Other(raw.to_string())
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceStatus::DeleteFailed => f.write_str("DELETE_FAILED"),
            ResourceStatus::Other(raw) => f.write_str(raw),
        }
    }
}

/// One resource of a stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSummary {
    /// Template-scoped name
    pub logical_id: String,
    /// Runtime identifier used for cleanup calls (empty if never created)
    pub physical_id: String,
    /// CloudFormation type tag, e.g. `AWS::S3::Bucket`
    pub resource_type: String,
    pub status: ResourceStatus,
}

impl ResourceSummary {
    pub fn is_delete_failed(&self) -> bool {
        self.status == ResourceStatus::DeleteFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_name_from_arn() {
        assert_eq!(
            stack_name_from_arn(
                "arn:aws:cloudformation:us-east-1:123456789012:stack/app/0a1b2c3d-1111-2222-3333-444455556666"
            ),
            Some("app")
        );
        assert_eq!(stack_name_from_arn("app"), None);
        assert_eq!(
            stack_name_from_arn("arn:aws:cloudformation:us-east-1:123456789012:changeSet/x/y"),
            None
        );
    }

    #[test]
    fn test_stack_status_mapping() {
        assert_eq!(StackStatus::from_raw("DELETE_FAILED"), StackStatus::DeleteFailed);
        assert_eq!(StackStatus::from_raw("DELETE_IN_PROGRESS"), StackStatus::InProgress);
        assert_eq!(
            StackStatus::from_raw("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS"),
            StackStatus::InProgress
        );
        assert_eq!(StackStatus::from_raw("CREATE_COMPLETE"), StackStatus::Complete);
        assert_eq!(StackStatus::from_raw("ROLLBACK_COMPLETE"), StackStatus::Complete);
        assert_eq!(StackStatus::from_raw("UPDATE_ROLLBACK_FAILED"), StackStatus::Failed);
    }

    #[test]
    fn test_only_in_progress_is_not_terminal() {
        assert!(!StackStatus::InProgress.is_terminal());
        assert!(StackStatus::DeleteFailed.is_terminal());
        assert!(StackStatus::Complete.is_terminal());
        assert!(StackStatus::Failed.is_terminal());
    }

    #[test]
    fn test_resource_status_round_trips_raw() {
        assert_eq!(ResourceStatus::from_raw("DELETE_FAILED"), ResourceStatus::DeleteFailed);
        let other = ResourceStatus::from_raw("CREATE_COMPLETE");
        assert_eq!(other.to_string(), "CREATE_COMPLETE");
    }
}
