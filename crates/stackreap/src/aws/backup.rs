//! AWS Backup vault management

use super::api::VaultApi;
use super::context::{AwsContext, FromAwsContext};
use super::error::{AwsError, ignore_not_found};
use async_trait::async_trait;
use aws_sdk_backup::Client;
use tracing::{debug, info};

/// Backup client for draining and deleting vaults
pub struct BackupClient {
    client: Client,
}

impl FromAwsContext for BackupClient {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.backup_client(),
        }
    }
}

#[async_trait]
impl VaultApi for BackupClient {
    async fn vault_exists(&self, vault: &str) -> Result<bool, AwsError> {
        let found = ignore_not_found(
            self.client
                .describe_backup_vault()
                .backup_vault_name(vault)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )?;
        Ok(found.is_some())
    }

    async fn list_recovery_points(&self, vault: &str) -> Result<Vec<String>, AwsError> {
        let mut arns = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_recovery_points_by_backup_vault()
                .backup_vault_name(vault)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(AwsError::from_sdk)?;

            arns.extend(
                response
                    .recovery_points()
                    .iter()
                    .filter_map(|p| p.recovery_point_arn().map(str::to_string)),
            );

            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(arns)
    }

    async fn delete_recovery_point(&self, vault: &str, arn: &str) -> Result<(), AwsError> {
        ignore_not_found(
            self.client
                .delete_recovery_point()
                .backup_vault_name(vault)
                .recovery_point_arn(arn)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )?;
        debug!(vault = %vault, recovery_point = %arn, "Deleted recovery point");
        Ok(())
    }

    async fn delete_vault(&self, vault: &str) -> Result<(), AwsError> {
        match ignore_not_found(
            self.client
                .delete_backup_vault()
                .backup_vault_name(vault)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )? {
            Some(_) => info!(vault = %vault, "Backup vault deleted"),
            None => debug!(vault = %vault, "Backup vault already deleted"),
        }
        Ok(())
    }
}
