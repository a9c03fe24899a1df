//! Group-by-group deletion of target stacks

use super::DependencyGraph;
use crate::error::{ReapError, StackFailure};
use crate::orchestrator::{DeleteOutcome, StackDeleter};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Result of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionReport {
    /// Deletion groups in the order they ran
    pub groups: Vec<Vec<String>>,
    /// Outcome per target stack
    pub outcomes: BTreeMap<String, DeleteOutcome>,
}

impl DeletionReport {
    /// Stacks this run actually deleted
    pub fn deleted(&self) -> impl Iterator<Item = &String> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, DeleteOutcome::Deleted { .. }))
            .map(|(name, _)| name)
    }
}

/// Runs deletion groups strictly in order, members of a group concurrently
pub struct GroupScheduler {
    deleter: Arc<StackDeleter>,
    concurrency: Option<usize>,
}

impl GroupScheduler {
    /// `concurrency` bounds members deleted at once; `None` runs a whole
    /// group together.
    pub fn new(deleter: Arc<StackDeleter>, concurrency: Option<usize>) -> Self {
        Self {
            deleter,
            concurrency,
        }
    }

    pub async fn run(
        &self,
        targets: &[String],
        cancel: &CancellationToken,
    ) -> Result<DeletionReport, ReapError> {
        let mut seen = BTreeSet::new();
        let targets: Vec<String> = targets
            .iter()
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect();

        let graph = DependencyGraph::build(
            self.deleter.stacks().as_ref(),
            &self.deleter.settings().retry,
            &targets,
        )
        .await?;
        if let Some(path) = graph.detect_circular_dependency() {
            return Err(ReapError::CircularDependency { path });
        }

        let groups = graph.deletion_groups();
        info!(
            targets = targets.len(),
            groups = groups.len(),
            "Deletion order resolved"
        );

        let mut report = DeletionReport {
            groups: groups.clone(),
            outcomes: BTreeMap::new(),
        };

        for (index, group) in groups.iter().enumerate() {
            info!(group = index + 1, stacks = ?group, "Starting deletion group");
            let (outcomes, failures) = self.run_group(group, cancel).await;
            report.outcomes.extend(outcomes);

            if !failures.is_empty() {
                let not_started = groups[index + 1..].iter().flatten().cloned().collect();
                return Err(ReapError::StackFailures {
                    failures,
                    deleted: report.deleted().cloned().collect(),
                    not_started,
                });
            }
        }

        Ok(report)
    }

    /// Delete one group; the first failure cancels the rest of it
    async fn run_group(
        &self,
        group: &[String],
        cancel: &CancellationToken,
    ) -> (Vec<(String, DeleteOutcome)>, Vec<StackFailure>) {
        let token = cancel.child_token();
        let limit = self.concurrency.unwrap_or(group.len()).max(1);
        let permits = Arc::new(Semaphore::new(limit));

        let mut tasks = JoinSet::new();
        let mut names = HashMap::new();
        for name in group {
            let deleter = Arc::clone(&self.deleter);
            let permits = Arc::clone(&permits);
            let token = token.clone();
            let stack = name.clone();

            let handle = tasks.spawn(async move {
                let _permit = tokio::select! {
                    permit = permits.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return Err(ReapError::cancelled(&stack)),
                    },
                    () = token.cancelled() => return Err(ReapError::cancelled(&stack)),
                };
                deleter.delete(&stack, &token).await
            });
            names.insert(handle.id(), name.clone());
        }

        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (stack, result) = match joined {
                Ok((id, result)) => (names.get(&id).cloned().unwrap_or_default(), result),
                Err(join_err) => {
                    let stack = names.get(&join_err.id()).cloned().unwrap_or_default();
                    (stack.clone(), Err(ReapError::TaskPanicked { stack }))
                }
            };

            match result {
                Ok(outcome) => outcomes.push((stack, outcome)),
                Err(err) => {
                    if err.is_cancelled() {
                        warn!(stack = %stack, "Stack deletion cancelled");
                    } else {
                        error!(stack = %stack, error = %err, "Stack deletion failed");
                        if !token.is_cancelled() {
                            token.cancel();
                        }
                    }
                    failures.push(StackFailure { stack, error: err });
                }
            }
        }

        failures.sort_by(|a, b| a.stack.cmp(&b.stack));
        (outcomes, failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::api::{MockStackApi, MockTemplateStager};
    use crate::operator::OperatorRegistry;
    use crate::orchestrator::DeleterSettings;
    use crate::retry::RetryPolicy;
    use crate::wait::WaitConfig;
    use stackreap_common::{StackExport, StackSnapshot, StackStatus};
    use std::time::Duration;

    fn snapshot(name: &str, raw_status: &str, exports: &[&str]) -> StackSnapshot {
        StackSnapshot {
            name: name.to_string(),
            status: StackStatus::from_raw(raw_status),
            raw_status: raw_status.to_string(),
            termination_protection: false,
            exports: exports
                .iter()
                .map(|e| StackExport {
                    name: e.to_string(),
                    value: "v".to_string(),
                })
                .collect(),
            root_stack: None,
        }
    }

    fn scheduler(stacks: MockStackApi) -> GroupScheduler {
        let settings = DeleterSettings {
            retry: RetryPolicy {
                max_retries: 0,
                base_delay: Duration::ZERO,
                max_jitter: Duration::ZERO,
            },
            wait: WaitConfig {
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(10),
                timeout: Duration::from_secs(60),
            },
            ..DeleterSettings::default()
        };
        let deleter = StackDeleter::new(
            Arc::new(stacks),
            Arc::new(MockTemplateStager::new()),
            OperatorRegistry::new(),
            settings,
        );
        GroupScheduler::new(Arc::new(deleter), None)
    }

    fn targets(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn cycle_is_rejected_before_any_delete() {
        let mut stacks = MockStackApi::new();
        stacks.expect_describe_stack().returning(|name| {
            Ok(Some(match name {
                "a" => snapshot("a", "CREATE_COMPLETE", &["FromA"]),
                _ => snapshot("b", "CREATE_COMPLETE", &["FromB"]),
            }))
        });
        stacks.expect_list_imports().returning(|export| {
            Ok(match export {
                "FromA" => vec!["b".to_string()],
                _ => vec!["a".to_string()],
            })
        });
        stacks.expect_delete_stack().never();

        let err = scheduler(stacks)
            .run(&targets(&["a", "b"]), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ReapError::CircularDependency { path } => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 3);
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn absent_targets_are_reported_once() {
        let mut stacks = MockStackApi::new();
        stacks.expect_describe_stack().returning(|_| Ok(None));
        stacks.expect_delete_stack().never();

        let report = scheduler(stacks)
            .run(&targets(&["a", "b", "a"]), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.groups, vec![targets(&["a", "b"])]);
        assert_eq!(report.outcomes.len(), 2);
        assert!(
            report
                .outcomes
                .values()
                .all(|o| *o == DeleteOutcome::AlreadyDeleted)
        );
        assert_eq!(report.deleted().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_group_stops_later_groups() {
        // "app" imports from "network"; "app" is busy and cannot be deleted
        let mut stacks = MockStackApi::new();
        stacks.expect_describe_stack().returning(|name| {
            Ok(Some(match name {
                "network" => snapshot("network", "CREATE_COMPLETE", &["VpcId"]),
                _ => snapshot("app", "UPDATE_IN_PROGRESS", &[]),
            }))
        });
        stacks
            .expect_list_imports()
            .returning(|_| Ok(vec!["app".to_string()]));
        stacks.expect_delete_stack().never();

        let err = scheduler(stacks)
            .run(&targets(&["network", "app"]), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ReapError::StackFailures {
                failures,
                deleted,
                not_started,
            } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].stack, "app");
                assert!(matches!(
                    failures[0].error,
                    ReapError::UnexpectedStatus { .. }
                ));
                assert!(deleted.is_empty());
                assert_eq!(not_started, vec!["network".to_string()]);
            }
            other => panic!("expected StackFailures, got {other:?}"),
        }
    }
}
