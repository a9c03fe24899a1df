//! ECR repository emptying

use super::ResourceOperator;
use crate::aws::api::RepositoryApi;
use crate::error::ReapError;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use stackreap_common::ResourceClass;
use stackreap_common::defaults::BATCH_DELETE_IMAGE_LIMIT;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct RepositoryOperator {
    api: Arc<dyn RepositoryApi>,
    retry: RetryPolicy,
}

impl RepositoryOperator {
    pub fn new(api: Arc<dyn RepositoryApi>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }
}

#[async_trait]
impl ResourceOperator for RepositoryOperator {
    fn class(&self) -> ResourceClass {
        ResourceClass::ContainerRegistry
    }

    async fn exists(&self, repository: &str) -> Result<bool, ReapError> {
        self.retry
            .call("DescribeRepositories", || {
                self.api.repository_exists(repository)
            })
            .await
    }

    async fn cleanup(
        &self,
        repository: &str,
        _cancel: &CancellationToken,
    ) -> Result<(), ReapError> {
        let images = self
            .retry
            .call("ListImages", || self.api.list_images(repository))
            .await?;

        for batch in images.chunks(BATCH_DELETE_IMAGE_LIMIT) {
            self.retry
                .call("BatchDeleteImage", || {
                    self.api.batch_delete_images(repository, batch)
                })
                .await?;
        }

        info!(repository = %repository, images = images.len(), "Repository emptied");
        Ok(())
    }

    async fn delete(&self, repository: &str) -> Result<(), ReapError> {
        self.retry
            .call("DeleteRepository", || self.api.delete_repository(repository))
            .await
    }
}
