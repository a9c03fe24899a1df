//! AWS client modules
//!
//! This module provides wrappers around AWS SDK clients for:
//! - CloudFormation: Stack inspection, deletion and template updates
//! - S3: Emptying versioned buckets and staging large templates
//! - IAM: Stripping and deleting roles
//! - ECR: Emptying and deleting repositories
//! - Backup: Draining and deleting vaults
//! - S3 Tables / S3 Vectors: Emptying and deleting table and vector buckets
//!
//! The rest of the crate only sees the traits in [`api`].

pub mod api;
pub mod backup;
pub mod cloudformation;
pub mod context;
pub mod ecr;
pub mod error;
pub mod iam;
pub mod s3;
pub mod s3tables;
pub mod s3vectors;

use std::sync::Arc;

// Core clients
pub use backup::BackupClient;
pub use cloudformation::CloudFormationClient;
pub use context::{AwsContext, FromAwsContext};
pub use ecr::EcrClient;
pub use iam::IamClient;
pub use s3::S3Client;
pub use s3tables::S3TablesClient;
pub use s3vectors::S3VectorsClient;

// Collaborator traits
pub use api::{
    BucketApi, CloudClients, RepositoryApi, RoleApi, StackApi, TableBucketApi, TemplateStager,
    VaultApi, VectorBucketApi,
};

// Error handling
pub use error::{AwsError, classify_aws_error, ignore_not_found};

impl CloudClients {
    /// Build the SDK-backed collaborators from one shared config
    pub fn from_context(ctx: &AwsContext) -> Self {
        let s3 = Arc::new(S3Client::from_context(ctx));
        Self {
            stacks: Arc::new(CloudFormationClient::from_context(ctx)),
            stager: s3.clone(),
            buckets: s3,
            roles: Arc::new(IamClient::from_context(ctx)),
            repositories: Arc::new(EcrClient::from_context(ctx)),
            vaults: Arc::new(BackupClient::from_context(ctx)),
            table_buckets: Arc::new(S3TablesClient::from_context(ctx)),
            vector_buckets: Arc::new(S3VectorsClient::from_context(ctx)),
        }
    }
}
