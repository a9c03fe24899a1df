//! Backup vault draining

use super::ResourceOperator;
use crate::aws::api::VaultApi;
use crate::error::ReapError;
use crate::retry::RetryPolicy;
use crate::wait::{WaitConfig, wait_for_resource};
use async_trait::async_trait;
use stackreap_common::ResourceClass;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Deletes every recovery point, then waits for the vault listing to empty.
///
/// `DeleteRecoveryPoint` only moves a point to `DELETING`; the vault rejects
/// `DeleteBackupVault` until none are listed.
pub struct VaultOperator {
    api: Arc<dyn VaultApi>,
    retry: RetryPolicy,
    drain: WaitConfig,
}

impl VaultOperator {
    pub fn new(api: Arc<dyn VaultApi>, retry: RetryPolicy, drain: WaitConfig) -> Self {
        Self { api, retry, drain }
    }

    async fn recovery_points(&self, vault: &str) -> Result<Vec<String>, ReapError> {
        self.retry
            .call("ListRecoveryPointsByBackupVault", || {
                self.api.list_recovery_points(vault)
            })
            .await
    }
}

#[async_trait]
impl ResourceOperator for VaultOperator {
    fn class(&self) -> ResourceClass {
        ResourceClass::BackupVault
    }

    async fn exists(&self, vault: &str) -> Result<bool, ReapError> {
        self.retry
            .call("DescribeBackupVault", || self.api.vault_exists(vault))
            .await
    }

    async fn cleanup(&self, vault: &str, cancel: &CancellationToken) -> Result<(), ReapError> {
        let points = self.recovery_points(vault).await?;

        for arn in &points {
            self.retry
                .call("DeleteRecoveryPoint", || {
                    self.api.delete_recovery_point(vault, arn)
                })
                .await?;
        }

        if !points.is_empty() {
            wait_for_resource(
                self.drain,
                cancel,
                || async {
                    let remaining = self.recovery_points(vault).await?;
                    debug!(vault = %vault, remaining = remaining.len(), "Recovery points still deleting");
                    Ok(remaining.is_empty().then_some(()))
                },
                vault,
            )
            .await?;
        }

        info!(vault = %vault, recovery_points = points.len(), "Vault drained");
        Ok(())
    }

    async fn delete(&self, vault: &str) -> Result<(), ReapError> {
        self.retry
            .call("DeleteBackupVault", || self.api.delete_vault(vault))
            .await
    }
}
