//! Per-stack force-delete state machine

use super::classifier::{BlockingResource, Classification, classify};
use super::template::submit_without_retain;
use crate::aws::api::{StackApi, TemplateStager};
use crate::error::ReapError;
use crate::operator::OperatorRegistry;
use crate::retry::RetryPolicy;
use crate::wait::{WaitConfig, wait_for_resource};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt, TryStreamExt};
use stackreap_common::defaults::{DEFAULT_CLEANUP_CONCURRENCY, DEFAULT_MAX_DELETE_ATTEMPTS};
use stackreap_common::{ResourceClass, StackSnapshot, StackStatus};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DELETE_IN_PROGRESS: &str = "DELETE_IN_PROGRESS";
const UPDATE_COMPLETE: &str = "UPDATE_COMPLETE";

/// Statuses from which CloudFormation accepts `UpdateStack`
const UPDATABLE_STATUSES: &[&str] = &[
    "CREATE_COMPLETE",
    UPDATE_COMPLETE,
    "UPDATE_ROLLBACK_COMPLETE",
    "IMPORT_COMPLETE",
    "IMPORT_ROLLBACK_COMPLETE",
];

/// Tunables for a [`StackDeleter`]
#[derive(Debug, Clone)]
pub struct DeleterSettings {
    /// Strip `Retain` deletion policies from the root template first
    pub force: bool,
    /// Blocking resources cleaned concurrently within one stack
    pub cleanup_concurrency: usize,
    /// Delete calls issued per stack before giving up
    pub max_delete_attempts: usize,
    /// Polling profile while a stack settles
    pub wait: WaitConfig,
    /// Policy for CloudFormation calls
    pub retry: RetryPolicy,
}

impl Default for DeleterSettings {
    fn default() -> Self {
        Self {
            force: false,
            cleanup_concurrency: DEFAULT_CLEANUP_CONCURRENCY,
            max_delete_attempts: DEFAULT_MAX_DELETE_ATTEMPTS,
            wait: WaitConfig::stack(),
            retry: RetryPolicy::default(),
        }
    }
}

/// How a stack deletion ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The stack was deleted by this run
    Deleted {
        /// Delete calls issued for this stack
        delete_calls: usize,
        /// Blocking resources cleaned along the way
        cleaned: usize,
    },
    /// The stack did not exist
    AlreadyDeleted,
}

enum Phase {
    /// Issue the first, unconstrained delete
    Attempting { updatable: bool },
    /// Wait for the stack to settle and decide what it needs
    Diagnosing,
    /// Sort the delete-failed resources
    Classifying,
    /// Unblock every classified resource
    Cleaning(Classification),
    /// Delete again, retaining what was cleaned
    RetryingDelete(Vec<String>),
}

/// Drives one stack (and its nested stacks) to deletion
pub struct StackDeleter {
    stacks: Arc<dyn StackApi>,
    stager: Arc<dyn TemplateStager>,
    registry: OperatorRegistry,
    settings: DeleterSettings,
}

impl StackDeleter {
    pub fn new(
        stacks: Arc<dyn StackApi>,
        stager: Arc<dyn TemplateStager>,
        registry: OperatorRegistry,
        settings: DeleterSettings,
    ) -> Self {
        Self {
            stacks,
            stager,
            registry,
            settings,
        }
    }

    pub fn stacks(&self) -> &Arc<dyn StackApi> {
        &self.stacks
    }

    pub fn settings(&self) -> &DeleterSettings {
        &self.settings
    }

    /// Force-delete a root stack
    pub async fn delete(
        &self,
        stack: &str,
        cancel: &CancellationToken,
    ) -> Result<DeleteOutcome, ReapError> {
        self.delete_stack_tree(stack, true, cancel).await
    }

    fn delete_stack_tree<'a>(
        &'a self,
        stack: &'a str,
        is_root: bool,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<DeleteOutcome, ReapError>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(ReapError::cancelled(stack));
            }

            let Some(snapshot) = self.describe(stack).await? else {
                info!(stack = %stack, "Stack does not exist, nothing to delete");
                return Ok(DeleteOutcome::AlreadyDeleted);
            };
            if is_root && snapshot.termination_protection {
                return Err(ReapError::TerminationProtected {
                    stack: stack.to_string(),
                });
            }

            let mut phase = match snapshot.status {
                StackStatus::InProgress if snapshot.raw_status == DELETE_IN_PROGRESS => {
                    info!(stack = %stack, "Delete already in progress, waiting");
                    Phase::Diagnosing
                }
                StackStatus::InProgress => {
                    return Err(ReapError::UnexpectedStatus {
                        stack: stack.to_string(),
                        status: snapshot.raw_status,
                    });
                }
                _ => Phase::Attempting {
                    updatable: UPDATABLE_STATUSES.contains(&snapshot.raw_status.as_str()),
                },
            };

            let mut delete_calls = 0usize;
            let mut cleaned = 0usize;

            loop {
                phase = match phase {
                    Phase::Attempting { updatable } => {
                        if self.settings.force && is_root {
                            if updatable {
                                self.strip_retain_policies(stack, cancel).await?;
                            } else {
                                warn!(
                                    stack = %stack,
                                    status = %snapshot.raw_status,
                                    "Stack cannot be updated, deleting with Retain policies in place"
                                );
                            }
                        }
                        self.issue_delete(stack, &[], cancel).await?;
                        delete_calls += 1;
                        Phase::Diagnosing
                    }
                    Phase::Diagnosing => {
                        let Some(snapshot) = self.wait_until_settled(stack, cancel).await? else {
                            info!(stack = %stack, delete_calls, cleaned, "Stack deleted");
                            return Ok(DeleteOutcome::Deleted {
                                delete_calls,
                                cleaned,
                            });
                        };
                        self.diagnose(stack, is_root, &snapshot, delete_calls)?;
                        Phase::Classifying
                    }
                    Phase::Classifying => {
                        let resources = self
                            .settings
                            .retry
                            .call("ListStackResources", || {
                                self.stacks.list_stack_resources(stack)
                            })
                            .await?;
                        let classification = classify(&resources);

                        let unrecognized = classification.unrecognized();
                        if !unrecognized.is_empty() {
                            return Err(ReapError::UnrecognizedResources {
                                stack: stack.to_string(),
                                resources: unrecognized,
                            });
                        }
                        Phase::Cleaning(classification)
                    }
                    Phase::Cleaning(classification) => {
                        cleaned += self.clean(stack, &classification, cancel).await?;
                        Phase::RetryingDelete(classification.retain_set().to_vec())
                    }
                    Phase::RetryingDelete(retain) => {
                        self.issue_delete(stack, &retain, cancel).await?;
                        delete_calls += 1;
                        Phase::Diagnosing
                    }
                };
            }
        })
    }

    /// Decide whether a settled, still-present stack can go another round
    fn diagnose(
        &self,
        stack: &str,
        is_root: bool,
        snapshot: &StackSnapshot,
        delete_calls: usize,
    ) -> Result<(), ReapError> {
        if snapshot.status != StackStatus::DeleteFailed {
            return Err(ReapError::UnexpectedStatus {
                stack: stack.to_string(),
                status: snapshot.raw_status.clone(),
            });
        }
        if is_root && snapshot.termination_protection {
            return Err(ReapError::TerminationProtected {
                stack: stack.to_string(),
            });
        }
        if delete_calls >= self.settings.max_delete_attempts {
            return Err(ReapError::DeleteAttemptsExhausted {
                stack: stack.to_string(),
                attempts: delete_calls,
            });
        }
        warn!(stack = %stack, delete_calls, "Stack is DELETE_FAILED, cleaning blockers");
        Ok(())
    }

    async fn describe(&self, stack: &str) -> Result<Option<StackSnapshot>, ReapError> {
        self.settings
            .retry
            .call("DescribeStacks", || self.stacks.describe_stack(stack))
            .await
    }

    /// Poll until the stack is gone (`None`) or has stopped changing
    async fn wait_until_settled(
        &self,
        stack: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<StackSnapshot>, ReapError> {
        wait_for_resource(
            self.settings.wait,
            cancel,
            || async {
                Ok(match self.describe(stack).await? {
                    None => Some(None),
                    Some(s) if s.status.is_terminal() => Some(Some(s)),
                    Some(_) => None,
                })
            },
            stack,
        )
        .await
    }

    async fn issue_delete(
        &self,
        stack: &str,
        retain: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), ReapError> {
        if cancel.is_cancelled() {
            return Err(ReapError::cancelled(stack));
        }
        info!(stack = %stack, retain = ?retain, "Deleting stack");
        self.settings
            .retry
            .call("DeleteStack", || self.stacks.delete_stack(stack, retain))
            .await
    }

    async fn strip_retain_policies(
        &self,
        stack: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ReapError> {
        let updated = submit_without_retain(
            self.stacks.as_ref(),
            self.stager.as_ref(),
            &self.settings.retry,
            stack,
        )
        .await?;
        if !updated {
            return Ok(());
        }

        match self.wait_until_settled(stack, cancel).await? {
            Some(s) if s.raw_status == UPDATE_COMPLETE => {
                debug!(stack = %stack, "Retain policies removed");
                Ok(())
            }
            Some(s) => Err(ReapError::UnexpectedStatus {
                stack: stack.to_string(),
                status: s.raw_status,
            }),
            None => Ok(()),
        }
    }

    /// Clean every blocking resource; returns how many needed work
    async fn clean(
        &self,
        stack: &str,
        classification: &Classification,
        cancel: &CancellationToken,
    ) -> Result<usize, ReapError> {
        let count = classification.blocking().count();
        info!(
            stack = %stack,
            blocking = count,
            concurrency = self.settings.cleanup_concurrency,
            "Cleaning blocking resources"
        );

        stream::iter(classification.blocking())
            .map(Ok)
            .try_for_each_concurrent(self.settings.cleanup_concurrency.max(1), |resource| {
                async move {
                    self.clean_one(stack, resource, cancel)
                        .await
                        .map_err(|source| ReapError::Cleanup {
                            stack: stack.to_string(),
                            class: resource.class,
                            logical_id: resource.logical_id.clone(),
                            physical_id: resource.physical_id.clone(),
                            source: Box::new(source),
                        })
                }
            })
            .await?;

        Ok(count)
    }

    async fn clean_one(
        &self,
        stack: &str,
        resource: &BlockingResource,
        cancel: &CancellationToken,
    ) -> Result<(), ReapError> {
        if cancel.is_cancelled() {
            return Err(ReapError::cancelled(&resource.physical_id));
        }
        if resource.physical_id.is_empty() {
            debug!(stack = %stack, logical_id = %resource.logical_id, "Never created, nothing to clean");
            return Ok(());
        }

        if resource.class == ResourceClass::NestedStack {
            self.delete_stack_tree(&resource.physical_id, false, cancel)
                .await?;
            return Ok(());
        }

        let Some(operator) = self.registry.get(resource.class) else {
            return Err(ReapError::UnrecognizedResources {
                stack: stack.to_string(),
                resources: vec![crate::error::UnrecognizedResource {
                    logical_id: resource.logical_id.clone(),
                    resource_type: resource.resource_type.clone(),
                }],
            });
        };

        if !operator.exists(&resource.physical_id).await? {
            debug!(
                stack = %stack,
                class = %resource.class,
                physical_id = %resource.physical_id,
                "Already gone"
            );
            return Ok(());
        }

        operator.cleanup(&resource.physical_id, cancel).await?;
        operator.delete(&resource.physical_id).await?;
        info!(
            stack = %stack,
            class = %resource.class,
            physical_id = %resource.physical_id,
            "Resource cleaned"
        );
        Ok(())
    }
}
