//! S3 Vectors vector bucket management

use super::api::VectorBucketApi;
use super::context::{AwsContext, FromAwsContext};
use super::error::{AwsError, ignore_not_found};
use async_trait::async_trait;
use aws_sdk_s3vectors::Client;
use tracing::{debug, info};

/// S3 Vectors client; accepts either a bucket name or its ARN
pub struct S3VectorsClient {
    client: Client,
}

impl FromAwsContext for S3VectorsClient {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.s3vectors_client(),
        }
    }
}

/// Split an identifier into the (name, arn) pair the API expects
fn bucket_ref(bucket: &str) -> (Option<String>, Option<String>) {
    if bucket.starts_with("arn:") {
        (None, Some(bucket.to_string()))
    } else {
        (Some(bucket.to_string()), None)
    }
}

#[async_trait]
impl VectorBucketApi for S3VectorsClient {
    async fn vector_bucket_exists(&self, bucket: &str) -> Result<bool, AwsError> {
        let (name, arn) = bucket_ref(bucket);
        let found = ignore_not_found(
            self.client
                .get_vector_bucket()
                .set_vector_bucket_name(name)
                .set_vector_bucket_arn(arn)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )?;
        Ok(found.is_some())
    }

    async fn list_indexes(&self, bucket: &str) -> Result<Vec<String>, AwsError> {
        let mut indexes = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let (name, arn) = bucket_ref(bucket);
            let response = self
                .client
                .list_indexes()
                .set_vector_bucket_name(name)
                .set_vector_bucket_arn(arn)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(AwsError::from_sdk)?;

            indexes.extend(response.indexes().iter().map(|i| i.index_name().to_string()));

            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(indexes)
    }

    async fn delete_index(&self, bucket: &str, index: &str) -> Result<(), AwsError> {
        let (name, arn) = bucket_ref(bucket);
        ignore_not_found(
            self.client
                .delete_index()
                .set_vector_bucket_name(name)
                .set_vector_bucket_arn(arn)
                .index_name(index)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )?;
        debug!(bucket = %bucket, index = %index, "Deleted vector index");
        Ok(())
    }

    async fn delete_vector_bucket(&self, bucket: &str) -> Result<(), AwsError> {
        let (name, arn) = bucket_ref(bucket);
        match ignore_not_found(
            self.client
                .delete_vector_bucket()
                .set_vector_bucket_name(name)
                .set_vector_bucket_arn(arn)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )? {
            Some(_) => info!(bucket = %bucket, "Vector bucket deleted"),
            None => debug!(bucket = %bucket, "Vector bucket already deleted"),
        }
        Ok(())
    }
}
