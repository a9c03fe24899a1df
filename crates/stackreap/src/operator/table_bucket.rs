//! S3 Tables table bucket emptying

use super::ResourceOperator;
use crate::aws::api::TableBucketApi;
use crate::error::ReapError;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use stackreap_common::ResourceClass;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Deletes every table of every namespace, then the namespaces
pub struct TableBucketOperator {
    api: Arc<dyn TableBucketApi>,
    retry: RetryPolicy,
}

impl TableBucketOperator {
    pub fn new(api: Arc<dyn TableBucketApi>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }
}

#[async_trait]
impl ResourceOperator for TableBucketOperator {
    fn class(&self) -> ResourceClass {
        ResourceClass::TableBucket
    }

    async fn exists(&self, bucket_arn: &str) -> Result<bool, ReapError> {
        self.retry
            .call("GetTableBucket", || self.api.table_bucket_exists(bucket_arn))
            .await
    }

    async fn cleanup(
        &self,
        bucket_arn: &str,
        _cancel: &CancellationToken,
    ) -> Result<(), ReapError> {
        let namespaces = self
            .retry
            .call("ListNamespaces", || self.api.list_namespaces(bucket_arn))
            .await?;

        for namespace in &namespaces {
            let tables = self
                .retry
                .call("ListTables", || self.api.list_tables(bucket_arn, namespace))
                .await?;
            for table in &tables {
                self.retry
                    .call("DeleteTable", || {
                        self.api.delete_table(bucket_arn, namespace, table)
                    })
                    .await?;
            }
            debug!(bucket = %bucket_arn, namespace = %namespace, tables = tables.len(), "Namespace emptied");

            self.retry
                .call("DeleteNamespace", || {
                    self.api.delete_namespace(bucket_arn, namespace)
                })
                .await?;
        }

        info!(bucket = %bucket_arn, namespaces = namespaces.len(), "Table bucket emptied");
        Ok(())
    }

    async fn delete(&self, bucket_arn: &str) -> Result<(), ReapError> {
        self.retry
            .call("DeleteTableBucket", || {
                self.api.delete_table_bucket(bucket_arn)
            })
            .await
    }
}
