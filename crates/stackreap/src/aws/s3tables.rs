//! S3 Tables table bucket management

use super::api::TableBucketApi;
use super::context::{AwsContext, FromAwsContext};
use super::error::{AwsError, ignore_not_found};
use async_trait::async_trait;
use aws_sdk_s3tables::Client;
use tracing::{debug, info};

/// S3 Tables client; table buckets are addressed by ARN
pub struct S3TablesClient {
    client: Client,
}

impl FromAwsContext for S3TablesClient {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.s3tables_client(),
        }
    }
}

#[async_trait]
impl TableBucketApi for S3TablesClient {
    async fn table_bucket_exists(&self, bucket_arn: &str) -> Result<bool, AwsError> {
        let found = ignore_not_found(
            self.client
                .get_table_bucket()
                .table_bucket_arn(bucket_arn)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )?;
        Ok(found.is_some())
    }

    async fn list_namespaces(&self, bucket_arn: &str) -> Result<Vec<String>, AwsError> {
        let mut namespaces = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_namespaces()
                .table_bucket_arn(bucket_arn)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(AwsError::from_sdk)?;

            // Each summary holds the namespace as a single-element path
            namespaces.extend(
                response
                    .namespaces()
                    .iter()
                    .filter_map(|n| n.namespace().first().cloned()),
            );

            match response.continuation_token() {
                Some(t) => token = Some(t.to_string()),
                None => break,
            }
        }

        Ok(namespaces)
    }

    async fn list_tables(
        &self,
        bucket_arn: &str,
        namespace: &str,
    ) -> Result<Vec<String>, AwsError> {
        let mut tables = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_tables()
                .table_bucket_arn(bucket_arn)
                .namespace(namespace)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(AwsError::from_sdk)?;

            tables.extend(response.tables().iter().map(|t| t.name().to_string()));

            match response.continuation_token() {
                Some(t) => token = Some(t.to_string()),
                None => break,
            }
        }

        Ok(tables)
    }

    async fn delete_table(
        &self,
        bucket_arn: &str,
        namespace: &str,
        table: &str,
    ) -> Result<(), AwsError> {
        ignore_not_found(
            self.client
                .delete_table()
                .table_bucket_arn(bucket_arn)
                .namespace(namespace)
                .name(table)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )?;
        debug!(bucket = %bucket_arn, namespace = %namespace, table = %table, "Deleted table");
        Ok(())
    }

    async fn delete_namespace(&self, bucket_arn: &str, namespace: &str) -> Result<(), AwsError> {
        ignore_not_found(
            self.client
                .delete_namespace()
                .table_bucket_arn(bucket_arn)
                .namespace(namespace)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )?;
        debug!(bucket = %bucket_arn, namespace = %namespace, "Deleted namespace");
        Ok(())
    }

    async fn delete_table_bucket(&self, bucket_arn: &str) -> Result<(), AwsError> {
        match ignore_not_found(
            self.client
                .delete_table_bucket()
                .table_bucket_arn(bucket_arn)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )? {
            Some(_) => info!(bucket = %bucket_arn, "Table bucket deleted"),
            None => debug!(bucket = %bucket_arn, "Table bucket already deleted"),
        }
        Ok(())
    }
}
