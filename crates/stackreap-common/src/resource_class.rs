//! CloudFormation resource classes that can block a stack deletion
//!
//! Classification is a pure, total function of the resource type tag so the
//! same tag always lands in the same bucket.

use std::fmt;

/// Prefix of user-defined custom resource type tags
const CUSTOM_RESOURCE_PREFIX: &str = "Custom::";

/// Classes of resources stackreap knows how to unblock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceClass {
    /// Nested CloudFormation stack (handled by recursing into it)
    NestedStack,
    /// S3 bucket, possibly versioned and non-empty
    ObjectBucket,
    /// IAM role with policies attached from outside the stack
    Role,
    /// ECR repository still holding images
    ContainerRegistry,
    /// AWS Backup vault still holding recovery points
    BackupVault,
    /// S3 Tables table bucket with namespaces and tables
    TableBucket,
    /// S3 Vectors vector bucket with indexes
    VectorBucket,
    /// Custom resource; contents are opaque so it is only retained
    CustomResource,
    /// Anything else. Never cleaned automatically.
    Unrecognized,
}

impl ResourceClass {
    /// Classify a CloudFormation resource type tag (e.g. `AWS::S3::Bucket`)
    pub fn from_type_tag(type_tag: &str) -> Self {
        match type_tag {
            "AWS::CloudFormation::Stack" => ResourceClass::NestedStack,
            "AWS::S3::Bucket" => ResourceClass::ObjectBucket,
            "AWS::IAM::Role" => ResourceClass::Role,
            "AWS::ECR::Repository" => ResourceClass::ContainerRegistry,
            "AWS::Backup::BackupVault" => ResourceClass::BackupVault,
            "AWS::S3Tables::TableBucket" => ResourceClass::TableBucket,
            "AWS::S3Vectors::VectorBucket" => ResourceClass::VectorBucket,
            "AWS::CloudFormation::CustomResource" => ResourceClass::CustomResource,
            t if t.starts_with(CUSTOM_RESOURCE_PREFIX) => ResourceClass::CustomResource,
            _ => ResourceClass::Unrecognized,
        }
    }

    /// Short stable name used in logs and error messages
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceClass::NestedStack => "nested-stack",
            ResourceClass::ObjectBucket => "object-bucket",
            ResourceClass::Role => "role",
            ResourceClass::ContainerRegistry => "container-registry",
            ResourceClass::BackupVault => "backup-vault",
            ResourceClass::TableBucket => "table-bucket",
            ResourceClass::VectorBucket => "vector-bucket",
            ResourceClass::CustomResource => "custom-resource",
            ResourceClass::Unrecognized => "unrecognized",
        }
    }

    /// Whether resources of this class can be unblocked automatically
    pub fn is_supported(self) -> bool {
        self != ResourceClass::Unrecognized
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_type_tags() {
        let cases = [
            ("AWS::CloudFormation::Stack", ResourceClass::NestedStack),
            ("AWS::S3::Bucket", ResourceClass::ObjectBucket),
            ("AWS::IAM::Role", ResourceClass::Role),
            ("AWS::ECR::Repository", ResourceClass::ContainerRegistry),
            ("AWS::Backup::BackupVault", ResourceClass::BackupVault),
            ("AWS::S3Tables::TableBucket", ResourceClass::TableBucket),
            ("AWS::S3Vectors::VectorBucket", ResourceClass::VectorBucket),
        ];
        for (tag, class) in cases {
            assert_eq!(ResourceClass::from_type_tag(tag), class, "tag: {tag}");
        }
    }

    #[test]
    fn test_custom_resources() {
        assert_eq!(
            ResourceClass::from_type_tag("Custom::EmptyBucket"),
            ResourceClass::CustomResource
        );
        assert_eq!(
            ResourceClass::from_type_tag("AWS::CloudFormation::CustomResource"),
            ResourceClass::CustomResource
        );
    }

    #[test]
    fn test_unrecognized_is_not_supported() {
        let class = ResourceClass::from_type_tag("AWS::EC2::VPC");
        assert_eq!(class, ResourceClass::Unrecognized);
        assert!(!class.is_supported());
        // Case matters: CloudFormation tags are case-sensitive
        assert_eq!(
            ResourceClass::from_type_tag("aws::s3::bucket"),
            ResourceClass::Unrecognized
        );
        assert_eq!(
            ResourceClass::from_type_tag("custom::thing"),
            ResourceClass::Unrecognized
        );
    }

    #[test]
    fn test_display_matches_as_str() {
        assert_eq!(ResourceClass::ObjectBucket.to_string(), "object-bucket");
        assert_eq!(ResourceClass::NestedStack.to_string(), "nested-stack");
    }
}
