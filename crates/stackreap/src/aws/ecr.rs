//! ECR repository management

use super::api::{ImageId, RepositoryApi};
use super::context::{AwsContext, FromAwsContext};
use super::error::{AwsError, ignore_not_found};
use async_trait::async_trait;
use aws_sdk_ecr::Client;
use aws_sdk_ecr::types::{ImageFailureCode, ImageIdentifier};
use tracing::{debug, info};

/// ECR client for emptying and deleting repositories
pub struct EcrClient {
    client: Client,
}

impl FromAwsContext for EcrClient {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ecr_client(),
        }
    }
}

#[async_trait]
impl RepositoryApi for EcrClient {
    async fn repository_exists(&self, repository: &str) -> Result<bool, AwsError> {
        let found = ignore_not_found(
            self.client
                .describe_repositories()
                .repository_names(repository)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )?;
        Ok(found.is_some_and(|r| !r.repositories().is_empty()))
    }

    async fn list_images(&self, repository: &str) -> Result<Vec<ImageId>, AwsError> {
        let mut images = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_images()
                .repository_name(repository)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(AwsError::from_sdk)?;

            images.extend(response.image_ids().iter().map(|id| ImageId {
                digest: id.image_digest().map(str::to_string),
                tag: id.image_tag().map(str::to_string),
            }));

            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(images)
    }

    async fn batch_delete_images(
        &self,
        repository: &str,
        images: &[ImageId],
    ) -> Result<(), AwsError> {
        let ids = images
            .iter()
            .map(|i| {
                ImageIdentifier::builder()
                    .set_image_digest(i.digest.clone())
                    .set_image_tag(i.tag.clone())
                    .build()
            })
            .collect();

        let response = self
            .client
            .batch_delete_image()
            .repository_name(repository)
            .set_image_ids(Some(ids))
            .send()
            .await
            .map_err(AwsError::from_sdk)?;

        // A concurrent delete may already have removed some images
        let failure = response
            .failures()
            .iter()
            .find(|f| f.failure_code() != Some(&ImageFailureCode::ImageNotFound));
        if let Some(f) = failure {
            return Err(AwsError::Sdk {
                code: f.failure_code().map(|c| c.as_str().to_string()),
                message: f.failure_reason().unwrap_or("image delete failed").to_string(),
            });
        }

        debug!(repository = %repository, count = images.len(), "Deleted images");
        Ok(())
    }

    async fn delete_repository(&self, repository: &str) -> Result<(), AwsError> {
        match ignore_not_found(
            self.client
                .delete_repository()
                .repository_name(repository)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )? {
            Some(_) => info!(repository = %repository, "ECR repository deleted"),
            None => debug!(repository = %repository, "ECR repository already deleted"),
        }
        Ok(())
    }
}
