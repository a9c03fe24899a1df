//! Top-level entry point wiring clients, operators and the scheduler

use crate::aws::CloudClients;
use crate::config::{ReapConfig, validate_targets};
use crate::error::ReapError;
use crate::graph::{DeletionReport, GroupScheduler};
use crate::operator::OperatorRegistry;
use crate::orchestrator::StackDeleter;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Force-deletes sets of stacks against one set of cloud clients
pub struct Reaper {
    scheduler: GroupScheduler,
}

impl Reaper {
    pub fn new(clients: CloudClients, config: &ReapConfig) -> Self {
        let registry = OperatorRegistry::from_clients(&clients, &config.operator_settings());
        let deleter = StackDeleter::new(
            clients.stacks,
            clients.stager,
            registry,
            config.deleter_settings(),
        );
        Self {
            scheduler: GroupScheduler::new(Arc::new(deleter), config.concurrency),
        }
    }

    /// Delete `targets` and everything blocking them.
    ///
    /// Importers go before their exporters. Nothing is deleted when the
    /// targets form an import cycle or are imported from outside the set.
    pub async fn run(
        &self,
        targets: &[String],
        cancel: &CancellationToken,
    ) -> Result<DeletionReport, ReapError> {
        validate_targets(targets)?;
        info!(targets = ?targets, "Reaping stacks");
        self.scheduler.run(targets, cancel).await
    }
}
