//! IAM role management

use super::api::RoleApi;
use super::context::{AwsContext, FromAwsContext};
use super::error::{AwsError, ignore_not_found};
use async_trait::async_trait;
use aws_sdk_iam::Client;
use tracing::{debug, info};

/// IAM client for stripping and deleting roles
pub struct IamClient {
    client: Client,
}

impl FromAwsContext for IamClient {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.iam_client(),
        }
    }
}

#[async_trait]
impl RoleApi for IamClient {
    async fn role_exists(&self, role: &str) -> Result<bool, AwsError> {
        let found = ignore_not_found(
            self.client
                .get_role()
                .role_name(role)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )?;
        Ok(found.is_some())
    }

    async fn list_attached_policies(&self, role: &str) -> Result<Vec<String>, AwsError> {
        let mut arns = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let response = self
                .client
                .list_attached_role_policies()
                .role_name(role)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(AwsError::from_sdk)?;

            arns.extend(
                response
                    .attached_policies()
                    .iter()
                    .filter_map(|p| p.policy_arn().map(str::to_string)),
            );

            match response.marker() {
                Some(m) => marker = Some(m.to_string()),
                None => break,
            }
        }

        Ok(arns)
    }

    async fn detach_policy(&self, role: &str, policy_arn: &str) -> Result<(), AwsError> {
        match ignore_not_found(
            self.client
                .detach_role_policy()
                .role_name(role)
                .policy_arn(policy_arn)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )? {
            Some(_) => debug!(role = %role, policy_arn = %policy_arn, "Detached managed policy"),
            None => debug!(role = %role, policy_arn = %policy_arn, "Managed policy already detached"),
        }
        Ok(())
    }

    async fn list_inline_policies(&self, role: &str) -> Result<Vec<String>, AwsError> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let response = self
                .client
                .list_role_policies()
                .role_name(role)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(AwsError::from_sdk)?;

            names.extend(response.policy_names().iter().cloned());

            match response.marker() {
                Some(m) => marker = Some(m.to_string()),
                None => break,
            }
        }

        Ok(names)
    }

    async fn delete_inline_policy(&self, role: &str, policy_name: &str) -> Result<(), AwsError> {
        ignore_not_found(
            self.client
                .delete_role_policy()
                .role_name(role)
                .policy_name(policy_name)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )?;
        debug!(role = %role, policy_name = %policy_name, "Deleted inline policy");
        Ok(())
    }

    async fn list_instance_profiles(&self, role: &str) -> Result<Vec<String>, AwsError> {
        let mut profiles = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let response = self
                .client
                .list_instance_profiles_for_role()
                .role_name(role)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(AwsError::from_sdk)?;

            profiles.extend(
                response
                    .instance_profiles()
                    .iter()
                    .map(|p| p.instance_profile_name().to_string()),
            );

            match response.marker() {
                Some(m) => marker = Some(m.to_string()),
                None => break,
            }
        }

        Ok(profiles)
    }

    async fn remove_from_instance_profile(
        &self,
        role: &str,
        profile: &str,
    ) -> Result<(), AwsError> {
        ignore_not_found(
            self.client
                .remove_role_from_instance_profile()
                .instance_profile_name(profile)
                .role_name(role)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )?;
        debug!(role = %role, profile = %profile, "Removed role from instance profile");
        Ok(())
    }

    async fn delete_role(&self, role: &str) -> Result<(), AwsError> {
        match ignore_not_found(
            self.client
                .delete_role()
                .role_name(role)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )? {
            Some(_) => info!(role = %role, "IAM role deleted"),
            None => debug!(role = %role, "IAM role already deleted"),
        }
        Ok(())
    }
}
