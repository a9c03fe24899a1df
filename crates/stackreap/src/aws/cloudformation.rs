//! CloudFormation stack operations

use super::api::{StackApi, StackSummary, TemplateSource};
use super::context::{AwsContext, FromAwsContext};
use super::error::{AwsError, ignore_not_found};
use async_trait::async_trait;
use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::types::{Capability, Parameter, StackStatus as CfnStackStatus, TemplateStage};
use stackreap_common::{
    ResourceStatus, ResourceSummary, StackExport, StackSnapshot, StackStatus, stack_name_from_arn,
};
use tracing::debug;

/// CloudFormation client for inspecting and deleting stacks
pub struct CloudFormationClient {
    client: Client,
}

impl FromAwsContext for CloudFormationClient {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.cloudformation_client(),
        }
    }
}

/// Statuses that `ListStacks` should return (everything except DELETE_COMPLETE)
fn live_stack_statuses() -> Vec<CfnStackStatus> {
    CfnStackStatus::values()
        .iter()
        .filter(|s| **s != "DELETE_COMPLETE")
        .map(|s| CfnStackStatus::from(*s))
        .collect()
}

#[async_trait]
impl StackApi for CloudFormationClient {
    async fn describe_stack(&self, stack: &str) -> Result<Option<StackSnapshot>, AwsError> {
        let response = ignore_not_found(
            self.client
                .describe_stacks()
                .stack_name(stack)
                .send()
                .await
                .map_err(AwsError::from_sdk),
        )?;

        let Some(found) = response.as_ref().and_then(|r| r.stacks().first()) else {
            return Ok(None);
        };

        let raw_status = found
            .stack_status()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();
        // Describing by ARN still returns deleted stacks
        if raw_status == "DELETE_COMPLETE" {
            return Ok(None);
        }

        let exports = found
            .outputs()
            .iter()
            .filter_map(|o| {
                Some(StackExport {
                    name: o.export_name()?.to_string(),
                    value: o.output_value().unwrap_or_default().to_string(),
                })
            })
            .collect();

        Ok(Some(StackSnapshot {
            name: found.stack_name().unwrap_or(stack).to_string(),
            status: StackStatus::from_raw(&raw_status),
            raw_status,
            termination_protection: found.enable_termination_protection().unwrap_or(false),
            exports,
            root_stack: found
                .root_id()
                .and_then(stack_name_from_arn)
                .map(str::to_string),
        }))
    }

    async fn delete_stack(&self, stack: &str, retain: &[String]) -> Result<(), AwsError> {
        debug!(stack = %stack, retain = ?retain, "DeleteStack");
        let mut request = self.client.delete_stack().stack_name(stack);
        if !retain.is_empty() {
            request = request.set_retain_resources(Some(retain.to_vec()));
        }
        request.send().await.map_err(AwsError::from_sdk)?;
        Ok(())
    }

    async fn list_stack_resources(&self, stack: &str) -> Result<Vec<ResourceSummary>, AwsError> {
        let mut resources = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_stack_resources()
                .stack_name(stack)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(AwsError::from_sdk)?;

            for summary in response.stack_resource_summaries() {
                resources.push(ResourceSummary {
                    logical_id: summary.logical_resource_id().unwrap_or_default().to_string(),
                    physical_id: summary.physical_resource_id().unwrap_or_default().to_string(),
                    resource_type: summary.resource_type().unwrap_or_default().to_string(),
                    status: ResourceStatus::from_raw(
                        summary.resource_status().map(|s| s.as_str()).unwrap_or_default(),
                    ),
                });
            }

            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(resources)
    }

    async fn list_stacks(&self) -> Result<Vec<StackSummary>, AwsError> {
        let mut stacks = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_stacks()
                .set_stack_status_filter(Some(live_stack_statuses()))
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(AwsError::from_sdk)?;

            for summary in response.stack_summaries() {
                stacks.push(StackSummary {
                    name: summary.stack_name().unwrap_or_default().to_string(),
                    raw_status: summary
                        .stack_status()
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_default(),
                });
            }

            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(stacks)
    }

    async fn list_imports(&self, export_name: &str) -> Result<Vec<String>, AwsError> {
        let mut importers = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let result = self
                .client
                .list_imports()
                .export_name(export_name)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(AwsError::from_sdk);

            let response = match result {
                Ok(response) => response,
                // "Export 'x' is not imported by any stack."
                Err(AwsError::Sdk { code: Some(code), message })
                    if code == "ValidationError" && message.contains("not imported") =>
                {
                    return Ok(importers);
                }
                Err(e) => return Err(e),
            };

            importers.extend(response.imports().iter().cloned());

            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(importers)
    }

    async fn get_template(&self, stack: &str) -> Result<String, AwsError> {
        let response = self
            .client
            .get_template()
            .stack_name(stack)
            .template_stage(TemplateStage::Original)
            .send()
            .await
            .map_err(AwsError::from_sdk)?;

        Ok(response.template_body().unwrap_or_default().to_string())
    }

    async fn update_template(
        &self,
        stack: &str,
        source: TemplateSource,
    ) -> Result<bool, AwsError> {
        // Reuse every existing parameter value
        let described = self
            .client
            .describe_stacks()
            .stack_name(stack)
            .send()
            .await
            .map_err(AwsError::from_sdk)?;
        let parameters: Vec<Parameter> = described
            .stacks()
            .first()
            .map(|s| s.parameters())
            .unwrap_or_default()
            .iter()
            .filter_map(|p| p.parameter_key())
            .map(|key| {
                Parameter::builder()
                    .parameter_key(key)
                    .use_previous_value(true)
                    .build()
            })
            .collect();

        let mut request = self
            .client
            .update_stack()
            .stack_name(stack)
            .set_parameters(Some(parameters))
            .capabilities(Capability::CapabilityIam)
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityAutoExpand);
        request = match source {
            TemplateSource::Body(body) => request.template_body(body),
            TemplateSource::Url(url) => request.template_url(url),
        };

        match request.send().await.map_err(AwsError::from_sdk) {
            Ok(_) => Ok(true),
            Err(AwsError::Sdk { code: Some(code), message })
                if code == "ValidationError" && message.contains("No updates are to be performed") =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
