//! IAM role stripping

use super::ResourceOperator;
use crate::aws::api::RoleApi;
use crate::error::ReapError;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use stackreap_common::ResourceClass;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Detaches everything attached to a role from outside its stack
pub struct RoleOperator {
    api: Arc<dyn RoleApi>,
    retry: RetryPolicy,
}

impl RoleOperator {
    pub fn new(api: Arc<dyn RoleApi>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }
}

#[async_trait]
impl ResourceOperator for RoleOperator {
    fn class(&self) -> ResourceClass {
        ResourceClass::Role
    }

    async fn exists(&self, role: &str) -> Result<bool, ReapError> {
        self.retry.call("GetRole", || self.api.role_exists(role)).await
    }

    async fn cleanup(&self, role: &str, _cancel: &CancellationToken) -> Result<(), ReapError> {
        let attached = self
            .retry
            .call("ListAttachedRolePolicies", || {
                self.api.list_attached_policies(role)
            })
            .await?;
        for policy_arn in &attached {
            self.retry
                .call("DetachRolePolicy", || self.api.detach_policy(role, policy_arn))
                .await?;
        }

        let inline = self
            .retry
            .call("ListRolePolicies", || self.api.list_inline_policies(role))
            .await?;
        for policy_name in &inline {
            self.retry
                .call("DeleteRolePolicy", || {
                    self.api.delete_inline_policy(role, policy_name)
                })
                .await?;
        }

        let profiles = self
            .retry
            .call("ListInstanceProfilesForRole", || {
                self.api.list_instance_profiles(role)
            })
            .await?;
        for profile in &profiles {
            self.retry
                .call("RemoveRoleFromInstanceProfile", || {
                    self.api.remove_from_instance_profile(role, profile)
                })
                .await?;
        }

        info!(
            role = %role,
            managed = attached.len(),
            inline = inline.len(),
            profiles = profiles.len(),
            "Role stripped"
        );
        Ok(())
    }

    async fn delete(&self, role: &str) -> Result<(), ReapError> {
        debug!(role = %role, "Deleting role");
        self.retry
            .call("DeleteRole", || self.api.delete_role(role))
            .await
    }
}
