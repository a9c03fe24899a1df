//! Versioned S3 bucket emptying

use super::ResourceOperator;
use crate::aws::api::{BucketApi, ObjectDeleteFailure, ObjectVersion, VersionMarker};
use crate::error::ReapError;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use stackreap_common::ResourceClass;
use stackreap_common::defaults::DELETE_OBJECTS_BATCH_LIMIT;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Empties every object version and delete marker, then removes the bucket
pub struct BucketOperator {
    api: Arc<dyn BucketApi>,
    retry: RetryPolicy,
    workers: usize,
}

impl BucketOperator {
    pub fn new(api: Arc<dyn BucketApi>, retry: RetryPolicy, workers: usize) -> Self {
        Self {
            api,
            retry,
            workers: workers.max(1),
        }
    }

    /// Delete one batch, re-submitting only the keys that failed with a
    /// retryable code until the retry budget runs out.
    async fn delete_batch(&self, bucket: &str, batch: Vec<ObjectVersion>) -> Result<(), ReapError> {
        let mut pending = batch;
        let mut delays = self.retry.backoff();
        let mut attempts = 0usize;

        loop {
            attempts += 1;
            let failures = self
                .retry
                .call("DeleteObjects", || self.api.delete_objects(bucket, &pending))
                .await?;

            // Keys another run already removed are done
            let (retryable, terminal): (Vec<ObjectDeleteFailure>, Vec<ObjectDeleteFailure>) =
                failures
                    .into_iter()
                    .filter(|f| !f.to_aws_error().is_not_found())
                    .partition(ObjectDeleteFailure::is_retryable);

            if let Some(failure) = terminal.into_iter().next() {
                return Err(ReapError::ObjectDelete {
                    bucket: bucket.to_string(),
                    key: failure.object.key,
                    code: failure.code,
                    message: failure.message,
                });
            }

            let Some(first) = retryable.first() else {
                debug!(bucket = %bucket, attempts, "Batch deleted");
                return Ok(());
            };

            let Some(delay) = delays.next() else {
                return Err(ReapError::RetryBudgetExceeded {
                    label: format!("DeleteObjects on {bucket}"),
                    attempts,
                    source: first.to_aws_error(),
                });
            };

            warn!(
                bucket = %bucket,
                failed = retryable.len(),
                delay = ?delay,
                "Some objects were throttled, re-submitting them"
            );
            tokio::time::sleep(delay).await;
            pending = retryable.into_iter().map(|f| f.object).collect();
        }
    }
}

#[async_trait]
impl ResourceOperator for BucketOperator {
    fn class(&self) -> ResourceClass {
        ResourceClass::ObjectBucket
    }

    async fn exists(&self, bucket: &str) -> Result<bool, ReapError> {
        self.retry
            .call("HeadBucket", || self.api.bucket_exists(bucket))
            .await
    }

    async fn cleanup(&self, bucket: &str, _cancel: &CancellationToken) -> Result<(), ReapError> {
        info!(bucket = %bucket, workers = self.workers, "Emptying bucket");

        // `Some(marker)` means another page is due; `None` ends the listing
        let pages = stream::try_unfold(Some(None::<VersionMarker>), |state| async move {
            let Some(marker) = state else {
                return Ok(None);
            };
            let page = self
                .retry
                .call("ListObjectVersions", || {
                    self.api.list_object_versions(bucket, marker.clone())
                })
                .await?;
            Ok::<_, ReapError>(Some((page.objects, page.next.map(Some))))
        });

        let batches = pages
            .map_ok(|objects| {
                let chunks: Vec<Result<Vec<ObjectVersion>, ReapError>> = objects
                    .chunks(DELETE_OBJECTS_BATCH_LIMIT)
                    .map(|chunk| Ok(chunk.to_vec()))
                    .collect();
                stream::iter(chunks)
            })
            .try_flatten()
            .try_filter(|batch| futures::future::ready(!batch.is_empty()))
            .boxed();

        batches
            .try_for_each_concurrent(self.workers, |batch| self.delete_batch(bucket, batch))
            .await?;

        info!(bucket = %bucket, "Bucket emptied");
        Ok(())
    }

    async fn delete(&self, bucket: &str) -> Result<(), ReapError> {
        self.retry
            .call("DeleteBucket", || self.api.delete_bucket(bucket))
            .await
    }
}
