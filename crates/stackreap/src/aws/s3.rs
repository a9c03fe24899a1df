//! S3 bucket and object management

use super::api::{
    BucketApi, ObjectDeleteFailure, ObjectVersion, ObjectVersionPage, StagedTemplate,
    TemplateStager, VersionMarker,
};
use super::context::{AwsContext, FromAwsContext};
use super::error::{AwsError, ignore_not_found};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectIdentifier,
};
use tracing::{debug, info, warn};

/// Region S3 treats as the default location (no location constraint allowed)
const DEFAULT_S3_REGION: &str = "us-east-1";

/// S3 client for emptying buckets and staging large templates
pub struct S3Client {
    client: Client,
    region: String,
}

impl FromAwsContext for S3Client {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.s3_client(),
            region: ctx.region().unwrap_or(DEFAULT_S3_REGION).to_string(),
        }
    }
}

fn build_error(e: impl std::fmt::Display) -> AwsError {
    AwsError::Sdk {
        code: None,
        message: format!("invalid request: {e}"),
    }
}

impl S3Client {
    /// Create a bucket in this client's region
    async fn create_bucket(&self, bucket_name: &str) -> Result<(), AwsError> {
        info!(bucket = %bucket_name, region = %self.region, "Creating S3 bucket");

        let mut request = self.client.create_bucket().bucket(bucket_name);
        if self.region != DEFAULT_S3_REGION {
            let create_config = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                .build();
            request = request.create_bucket_configuration(create_config);
        }

        request.send().await.map_err(AwsError::from_sdk)?;
        Ok(())
    }
}

#[async_trait]
impl BucketApi for S3Client {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, AwsError> {
        let found = ignore_not_found(
            self.client
                .head_bucket()
                .bucket(bucket)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )?;
        Ok(found.is_some())
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        marker: Option<VersionMarker>,
    ) -> Result<ObjectVersionPage, AwsError> {
        let mut request = self.client.list_object_versions().bucket(bucket);
        if let Some(marker) = marker {
            request = request
                .key_marker(marker.key_marker)
                .set_version_id_marker(marker.version_id_marker);
        }

        let response = request.send().await.map_err(AwsError::from_sdk)?;

        let versions = response.versions().iter().filter_map(|v| {
            Some(ObjectVersion {
                key: v.key()?.to_string(),
                version_id: v.version_id().map(str::to_string),
            })
        });
        let markers = response.delete_markers().iter().filter_map(|m| {
            Some(ObjectVersion {
                key: m.key()?.to_string(),
                version_id: m.version_id().map(str::to_string),
            })
        });
        let objects: Vec<_> = versions.chain(markers).collect();

        let next = if response.is_truncated() == Some(true) {
            response.next_key_marker().map(|key| VersionMarker {
                key_marker: key.to_string(),
                version_id_marker: response.next_version_id_marker().map(str::to_string),
            })
        } else {
            None
        };

        debug!(bucket = %bucket, count = objects.len(), more = next.is_some(), "Listed object versions");
        Ok(ObjectVersionPage { objects, next })
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        objects: &[ObjectVersion],
    ) -> Result<Vec<ObjectDeleteFailure>, AwsError> {
        let identifiers = objects
            .iter()
            .map(|o| {
                ObjectIdentifier::builder()
                    .key(&o.key)
                    .set_version_id(o.version_id.clone())
                    .build()
                    .map_err(build_error)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(true)
            .build()
            .map_err(build_error)?;

        let response = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(AwsError::from_sdk)?;

        Ok(response
            .errors()
            .iter()
            .map(|e| ObjectDeleteFailure {
                object: ObjectVersion {
                    key: e.key().unwrap_or_default().to_string(),
                    version_id: e.version_id().map(str::to_string),
                },
                code: e.code().unwrap_or_default().to_string(),
                message: e.message().unwrap_or_default().to_string(),
            })
            .collect())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), AwsError> {
        match ignore_not_found(
            self.client
                .delete_bucket()
                .bucket(bucket)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )? {
            Some(_) => info!(bucket = %bucket, "Bucket deleted"),
            None => debug!(bucket = %bucket, "Bucket already deleted"),
        }
        Ok(())
    }
}

#[async_trait]
impl TemplateStager for S3Client {
    async fn stage(&self, stack: &str, body: &str) -> Result<StagedTemplate, AwsError> {
        let bucket = format!("stackreap-templates-{}", uuid::Uuid::new_v4().simple());
        // Stack ARNs end in `stack/<name>/<id>`
        let key = format!("{}.template", stack.rsplit('/').nth(1).unwrap_or(stack));

        self.create_bucket(&bucket).await?;

        debug!(bucket = %bucket, key = %key, size = body.len(), "Uploading template");
        let uploaded = self
            .client
            .put_object()
            .bucket(&bucket)
            .key(&key)
            .body(ByteStream::from(body.as_bytes().to_vec()))
            .send()
            .await
            .map_err(AwsError::from_sdk);

        if let Err(e) = uploaded {
            if let Err(cleanup) = self.delete_bucket(&bucket).await {
                warn!(bucket = %bucket, error = %cleanup, "Failed to remove staging bucket");
            }
            return Err(e);
        }

        let url = format!("https://{bucket}.s3.{}.amazonaws.com/{key}", self.region);
        Ok(StagedTemplate { bucket, key, url })
    }

    async fn discard(&self, staged: &StagedTemplate) -> Result<(), AwsError> {
        ignore_not_found(
            self.client
                .delete_object()
                .bucket(&staged.bucket)
                .key(&staged.key)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )?;
        self.delete_bucket(&staged.bucket).await
    }
}
