//! Collaborator traits at the AWS boundary
//!
//! The force-delete engine only talks to AWS through these traits, so the
//! orchestration logic can be tested without hitting real AWS. Every
//! implementation classifies SDK failures into [`AwsError`] before returning.
//!
//! The traits are object-safe (`async_trait`) because the operator registry
//! holds heterogeneous operators behind `Arc<dyn ...>`.

use super::error::AwsError;
use async_trait::async_trait;
use stackreap_common::{ResourceSummary, StackSnapshot};
use std::sync::Arc;

/// A live stack as returned by `ListStacks`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSummary {
    pub name: String,
    pub raw_status: String,
}

/// How a modified template is handed to `UpdateStack`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Inline template body
    Body(String),
    /// S3 URL of a staged template body
    Url(String),
}

/// A template body uploaded to S3 for a large update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedTemplate {
    pub bucket: String,
    pub key: String,
    pub url: String,
}

/// CloudFormation stack operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StackApi: Send + Sync {
    /// Describe a stack; `None` if it does not exist (or is `DELETE_COMPLETE`)
    async fn describe_stack(&self, stack: &str) -> Result<Option<StackSnapshot>, AwsError>;

    /// Issue a delete, retaining the given logical ids
    async fn delete_stack(&self, stack: &str, retain: &[String]) -> Result<(), AwsError>;

    /// List every resource of a stack
    async fn list_stack_resources(&self, stack: &str) -> Result<Vec<ResourceSummary>, AwsError>;

    /// List every stack that has not been deleted
    async fn list_stacks(&self) -> Result<Vec<StackSummary>, AwsError>;

    /// Names of the stacks importing an export (empty if none)
    async fn list_imports(&self, export_name: &str) -> Result<Vec<String>, AwsError>;

    /// Original template body of a stack
    async fn get_template(&self, stack: &str) -> Result<String, AwsError>;

    /// Submit a template update reusing previous parameter values.
    ///
    /// Returns `false` when CloudFormation reports there is nothing to update.
    async fn update_template(&self, stack: &str, source: TemplateSource)
    -> Result<bool, AwsError>;
}

/// Uploads templates that are too large for an inline update
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemplateStager: Send + Sync {
    async fn stage(&self, stack: &str, body: &str) -> Result<StagedTemplate, AwsError>;

    async fn discard(&self, staged: &StagedTemplate) -> Result<(), AwsError>;
}

/// One object version or delete marker in a bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectVersion {
    pub key: String,
    pub version_id: Option<String>,
}

/// Continuation point for `ListObjectVersions`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMarker {
    pub key_marker: String,
    pub version_id_marker: Option<String>,
}

/// One page of object versions and delete markers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectVersionPage {
    pub objects: Vec<ObjectVersion>,
    pub next: Option<VersionMarker>,
}

/// A per-key failure reported by `DeleteObjects`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDeleteFailure {
    pub object: ObjectVersion,
    pub code: String,
    pub message: String,
}

impl ObjectDeleteFailure {
    pub fn to_aws_error(&self) -> AwsError {
        super::error::classify_aws_error(Some(&self.code), Some(&self.message))
    }

    pub fn is_retryable(&self) -> bool {
        self.to_aws_error().is_retryable()
    }
}

/// S3 general purpose bucket operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BucketApi: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, AwsError>;

    async fn list_object_versions(
        &self,
        bucket: &str,
        marker: Option<VersionMarker>,
    ) -> Result<ObjectVersionPage, AwsError>;

    /// Delete up to 1000 objects; returns the keys that could not be deleted
    async fn delete_objects(
        &self,
        bucket: &str,
        objects: &[ObjectVersion],
    ) -> Result<Vec<ObjectDeleteFailure>, AwsError>;

    async fn delete_bucket(&self, bucket: &str) -> Result<(), AwsError>;
}

/// IAM role operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleApi: Send + Sync {
    async fn role_exists(&self, role: &str) -> Result<bool, AwsError>;

    /// ARNs of managed policies attached to the role
    async fn list_attached_policies(&self, role: &str) -> Result<Vec<String>, AwsError>;

    async fn detach_policy(&self, role: &str, policy_arn: &str) -> Result<(), AwsError>;

    /// Names of inline policies embedded in the role
    async fn list_inline_policies(&self, role: &str) -> Result<Vec<String>, AwsError>;

    async fn delete_inline_policy(&self, role: &str, policy_name: &str) -> Result<(), AwsError>;

    /// Names of instance profiles the role belongs to
    async fn list_instance_profiles(&self, role: &str) -> Result<Vec<String>, AwsError>;

    async fn remove_from_instance_profile(
        &self,
        role: &str,
        profile: &str,
    ) -> Result<(), AwsError>;

    async fn delete_role(&self, role: &str) -> Result<(), AwsError>;
}

/// An image in a container repository, addressed by digest and/or tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageId {
    pub digest: Option<String>,
    pub tag: Option<String>,
}

/// ECR repository operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositoryApi: Send + Sync {
    async fn repository_exists(&self, repository: &str) -> Result<bool, AwsError>;

    async fn list_images(&self, repository: &str) -> Result<Vec<ImageId>, AwsError>;

    /// Delete up to 100 images
    async fn batch_delete_images(
        &self,
        repository: &str,
        images: &[ImageId],
    ) -> Result<(), AwsError>;

    async fn delete_repository(&self, repository: &str) -> Result<(), AwsError>;
}

/// AWS Backup vault operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VaultApi: Send + Sync {
    async fn vault_exists(&self, vault: &str) -> Result<bool, AwsError>;

    /// ARNs of every recovery point in the vault
    async fn list_recovery_points(&self, vault: &str) -> Result<Vec<String>, AwsError>;

    async fn delete_recovery_point(&self, vault: &str, arn: &str) -> Result<(), AwsError>;

    async fn delete_vault(&self, vault: &str) -> Result<(), AwsError>;
}

/// S3 Tables table bucket operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TableBucketApi: Send + Sync {
    async fn table_bucket_exists(&self, bucket_arn: &str) -> Result<bool, AwsError>;

    async fn list_namespaces(&self, bucket_arn: &str) -> Result<Vec<String>, AwsError>;

    async fn list_tables(&self, bucket_arn: &str, namespace: &str)
    -> Result<Vec<String>, AwsError>;

    async fn delete_table(
        &self,
        bucket_arn: &str,
        namespace: &str,
        table: &str,
    ) -> Result<(), AwsError>;

    async fn delete_namespace(&self, bucket_arn: &str, namespace: &str) -> Result<(), AwsError>;

    async fn delete_table_bucket(&self, bucket_arn: &str) -> Result<(), AwsError>;
}

/// S3 Vectors vector bucket operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorBucketApi: Send + Sync {
    async fn vector_bucket_exists(&self, bucket: &str) -> Result<bool, AwsError>;

    async fn list_indexes(&self, bucket: &str) -> Result<Vec<String>, AwsError>;

    async fn delete_index(&self, bucket: &str, index: &str) -> Result<(), AwsError>;

    async fn delete_vector_bucket(&self, bucket: &str) -> Result<(), AwsError>;
}

/// Every collaborator the force-delete engine needs, behind trait objects
#[derive(Clone)]
pub struct CloudClients {
    pub stacks: Arc<dyn StackApi>,
    pub stager: Arc<dyn TemplateStager>,
    pub buckets: Arc<dyn BucketApi>,
    pub roles: Arc<dyn RoleApi>,
    pub repositories: Arc<dyn RepositoryApi>,
    pub vaults: Arc<dyn VaultApi>,
    pub table_buckets: Arc<dyn TableBucketApi>,
    pub vector_buckets: Arc<dyn VectorBucketApi>,
}

impl std::fmt::Debug for CloudClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudClients").finish_non_exhaustive()
    }
}
