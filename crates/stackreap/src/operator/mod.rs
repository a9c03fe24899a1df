//! Resource operators
//!
//! One operator per [`ResourceClass`] that needs emptying before
//! CloudFormation can delete it. Each operator answers three questions:
//! does the resource still exist, how is it emptied, and how is it removed.
//!
//! Every `delete` treats "not found" as success so a resumed or concurrent
//! run can repeat it safely.

mod bucket;
mod custom;
mod repository;
mod role;
mod table_bucket;
mod vault;
mod vector_bucket;

pub use bucket::BucketOperator;
pub use custom::CustomResourceOperator;
pub use repository::RepositoryOperator;
pub use role::RoleOperator;
pub use table_bucket::TableBucketOperator;
pub use vault::VaultOperator;
pub use vector_bucket::VectorBucketOperator;

use crate::aws::CloudClients;
use crate::error::ReapError;
use crate::retry::RetryPolicy;
use crate::wait::WaitConfig;
use async_trait::async_trait;
use stackreap_common::ResourceClass;
use stackreap_common::defaults::DEFAULT_OBJECT_DELETE_WORKERS;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Cleanup strategy for one resource class, keyed by physical id
#[async_trait]
pub trait ResourceOperator: Send + Sync {
    fn class(&self) -> ResourceClass;

    async fn exists(&self, physical_id: &str) -> Result<bool, ReapError>;

    /// Remove whatever keeps the resource from being deleted. Returns once
    /// the resource is ready for `delete`.
    async fn cleanup(&self, physical_id: &str, cancel: &CancellationToken)
    -> Result<(), ReapError>;

    async fn delete(&self, physical_id: &str) -> Result<(), ReapError>;
}

/// Tunables shared by the operators
#[derive(Debug, Clone, Copy)]
pub struct OperatorSettings {
    /// Policy for every service except S3 Tables and S3 Vectors
    pub retry: RetryPolicy,
    /// Policy for S3 Tables and S3 Vectors
    pub slow_retry: RetryPolicy,
    /// Concurrent `DeleteObjects` workers per bucket
    pub object_workers: usize,
    /// Polling for recovery points that are still being deleted
    pub drain_wait: WaitConfig,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            slow_retry: RetryPolicy::slow_service(),
            object_workers: DEFAULT_OBJECT_DELETE_WORKERS,
            drain_wait: WaitConfig::drain(),
        }
    }
}

/// Dispatch table from resource class to operator
#[derive(Clone, Default)]
pub struct OperatorRegistry {
    operators: HashMap<ResourceClass, Arc<dyn ResourceOperator>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the SDK-backed operator for every class that has one
    pub fn from_clients(clients: &CloudClients, settings: &OperatorSettings) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(BucketOperator::new(
            clients.buckets.clone(),
            settings.retry,
            settings.object_workers,
        )));
        registry.register(Arc::new(RoleOperator::new(
            clients.roles.clone(),
            settings.retry,
        )));
        registry.register(Arc::new(RepositoryOperator::new(
            clients.repositories.clone(),
            settings.retry,
        )));
        registry.register(Arc::new(VaultOperator::new(
            clients.vaults.clone(),
            settings.retry,
            settings.drain_wait,
        )));
        registry.register(Arc::new(TableBucketOperator::new(
            clients.table_buckets.clone(),
            settings.slow_retry,
        )));
        registry.register(Arc::new(VectorBucketOperator::new(
            clients.vector_buckets.clone(),
            settings.slow_retry,
        )));
        registry.register(Arc::new(CustomResourceOperator));
        registry
    }

    /// Add or replace the operator for its class
    pub fn register(&mut self, operator: Arc<dyn ResourceOperator>) {
        self.operators.insert(operator.class(), operator);
    }

    pub fn get(&self, class: ResourceClass) -> Option<&Arc<dyn ResourceOperator>> {
        self.operators.get(&class)
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

impl std::fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut classes: Vec<_> = self.operators.keys().collect();
        classes.sort();
        f.debug_struct("OperatorRegistry")
            .field("classes", &classes)
            .finish()
    }
}
