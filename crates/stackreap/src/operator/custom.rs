//! Custom resources

use super::ResourceOperator;
use crate::error::ReapError;
use async_trait::async_trait;
use stackreap_common::ResourceClass;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Custom resources are opaque: nothing is cleaned, and the retried stack
/// delete simply retains them.
pub struct CustomResourceOperator;

#[async_trait]
impl ResourceOperator for CustomResourceOperator {
    fn class(&self) -> ResourceClass {
        ResourceClass::CustomResource
    }

    async fn exists(&self, _physical_id: &str) -> Result<bool, ReapError> {
        Ok(true)
    }

    async fn cleanup(
        &self,
        _physical_id: &str,
        _cancel: &CancellationToken,
    ) -> Result<(), ReapError> {
        Ok(())
    }

    async fn delete(&self, physical_id: &str) -> Result<(), ReapError> {
        warn!(physical_id = %physical_id, "Custom resource will be retained");
        Ok(())
    }
}
