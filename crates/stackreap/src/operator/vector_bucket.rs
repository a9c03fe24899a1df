//! S3 Vectors vector bucket emptying

use super::ResourceOperator;
use crate::aws::api::VectorBucketApi;
use crate::error::ReapError;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use stackreap_common::ResourceClass;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Deletes every index; deleting an index deletes its vectors
pub struct VectorBucketOperator {
    api: Arc<dyn VectorBucketApi>,
    retry: RetryPolicy,
}

impl VectorBucketOperator {
    pub fn new(api: Arc<dyn VectorBucketApi>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }
}

#[async_trait]
impl ResourceOperator for VectorBucketOperator {
    fn class(&self) -> ResourceClass {
        ResourceClass::VectorBucket
    }

    async fn exists(&self, bucket: &str) -> Result<bool, ReapError> {
        self.retry
            .call("GetVectorBucket", || self.api.vector_bucket_exists(bucket))
            .await
    }

    async fn cleanup(&self, bucket: &str, _cancel: &CancellationToken) -> Result<(), ReapError> {
        let indexes = self
            .retry
            .call("ListIndexes", || self.api.list_indexes(bucket))
            .await?;

        for index in &indexes {
            self.retry
                .call("DeleteIndex", || self.api.delete_index(bucket, index))
                .await?;
        }

        info!(bucket = %bucket, indexes = indexes.len(), "Vector bucket emptied");
        Ok(())
    }

    async fn delete(&self, bucket: &str) -> Result<(), ReapError> {
        self.retry
            .call("DeleteVectorBucket", || {
                self.api.delete_vector_bucket(bucket)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::AwsError;
    use crate::aws::api::MockVectorBucketApi;
    use mockall::Sequence;
    use mockall::predicate::eq;
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn indexes_go_before_the_bucket() {
        let mut api = MockVectorBucketApi::new();
        let mut seq = Sequence::new();

        api.expect_list_indexes()
            .with(eq("embeddings"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec!["docs".to_string(), "images".to_string()]));
        api.expect_delete_index()
            .with(eq("embeddings"), eq("docs"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        api.expect_delete_index()
            .with(eq("embeddings"), eq("images"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        api.expect_delete_vector_bucket()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let op = VectorBucketOperator::new(Arc::new(api), fast_retry());
        op.cleanup("embeddings", &CancellationToken::new())
            .await
            .unwrap();
        op.delete("embeddings").await.unwrap();
    }

    #[tokio::test]
    async fn throttled_index_delete_is_retried() {
        let mut api = MockVectorBucketApi::new();
        let mut seq = Sequence::new();

        api.expect_list_indexes()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec!["docs".to_string()]));
        api.expect_delete_index()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Err(AwsError::Throttled {
                    message: "Slow down".to_string(),
                })
            });
        api.expect_delete_index()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let op = VectorBucketOperator::new(Arc::new(api), fast_retry());
        op.cleanup("embeddings", &CancellationToken::new())
            .await
            .unwrap();
    }
}
