//! Shared test utilities for integration tests
//!
//! [`FakeCloud`] is an in-memory stand-in for every AWS collaborator. Stack
//! deletes settle synchronously: a resource blocks its stack when it still
//! holds something (a non-empty bucket or vault, a nested stack that failed,
//! an attached policy) or is marked stuck. Every mutating call is appended to an
//! event log so tests can assert ordering.

#![allow(dead_code)]

use async_trait::async_trait;
use stackreap::aws::api::{
    BucketApi, CloudClients, ImageId, ObjectDeleteFailure, ObjectVersion, ObjectVersionPage,
    RepositoryApi, RoleApi, StackApi, StackSummary, StagedTemplate, TableBucketApi, TemplateSource,
    TemplateStager, VaultApi, VectorBucketApi, VersionMarker,
};
use stackreap::aws::{AwsContext, AwsError};
use stackreap::config::ReapConfig;
use stackreap::retry::RetryPolicy;
use stackreap_common::{ResourceStatus, ResourceSummary, StackExport, StackSnapshot, StackStatus};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

/// One resource declared in a fake stack
#[derive(Debug, Clone)]
pub struct FakeResource {
    pub logical_id: String,
    pub physical_id: String,
    pub resource_type: String,
    /// Fails every delete regardless of its contents
    pub stuck: bool,
    pub status: String,
}

impl FakeResource {
    pub fn new(logical_id: &str, resource_type: &str, physical_id: &str) -> Self {
        Self {
            logical_id: logical_id.to_string(),
            physical_id: physical_id.to_string(),
            resource_type: resource_type.to_string(),
            stuck: false,
            status: "CREATE_COMPLETE".to_string(),
        }
    }

    pub fn stuck(mut self) -> Self {
        self.stuck = true;
        self
    }
}

/// A stack in the fake cloud
#[derive(Debug, Clone)]
pub struct FakeStack {
    pub status: String,
    pub termination_protection: bool,
    pub exports: Vec<String>,
    pub resources: Vec<FakeResource>,
    pub template: String,
    pub root_stack: Option<String>,
}

impl FakeStack {
    pub fn new() -> Self {
        Self {
            status: "CREATE_COMPLETE".to_string(),
            termination_protection: false,
            exports: vec![],
            resources: vec![],
            template: r#"{"Resources": {}}"#.to_string(),
            root_stack: None,
        }
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn protected(mut self) -> Self {
        self.termination_protection = true;
        self
    }

    pub fn export(mut self, name: &str) -> Self {
        self.exports.push(name.to_string());
        self
    }

    pub fn resource(mut self, resource: FakeResource) -> Self {
        self.resources.push(resource);
        self
    }

    /// Mark as nested under `root`
    pub fn nested_in(mut self, root: &str) -> Self {
        self.root_stack = Some(root.to_string());
        self
    }

    pub fn template(mut self, template: &str) -> Self {
        self.template = template.to_string();
        self
    }
}

#[derive(Default)]
struct State {
    stacks: BTreeMap<String, FakeStack>,
    /// export name -> importing stacks
    imports: HashMap<String, Vec<String>>,
    buckets: BTreeMap<String, Vec<ObjectVersion>>,
    /// role -> attached policy ARNs
    roles: BTreeMap<String, Vec<String>>,
    /// vault -> recovery point ARN -> listings left while DELETING
    vaults: BTreeMap<String, BTreeMap<String, Option<u32>>>,
    /// Listings a deleted recovery point keeps showing up in
    vault_drain_polls: u32,
    staged: BTreeSet<String>,
    events: Vec<String>,
}

/// In-memory implementation of every collaborator trait
#[derive(Clone, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<State>>,
    /// Stacks whose delete call waits on the barrier
    barrier: Arc<Mutex<Option<(BTreeSet<String>, Arc<Barrier>)>>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stack(&self, name: &str, stack: FakeStack) {
        self.state.lock().unwrap().stacks.insert(name.to_string(), stack);
    }

    pub fn add_import(&self, export: &str, importer: &str) {
        self.state
            .lock()
            .unwrap()
            .imports
            .entry(export.to_string())
            .or_default()
            .push(importer.to_string());
    }

    /// Create a bucket holding the given `(key, version_id)` entries
    pub fn add_bucket(&self, name: &str, objects: &[(&str, Option<&str>)]) {
        let objects = objects
            .iter()
            .map(|(key, version)| ObjectVersion {
                key: key.to_string(),
                version_id: version.map(str::to_string),
            })
            .collect();
        self.state
            .lock()
            .unwrap()
            .buckets
            .insert(name.to_string(), objects);
    }

    pub fn add_role(&self, name: &str, policies: &[&str]) {
        self.state.lock().unwrap().roles.insert(
            name.to_string(),
            policies.iter().map(|p| p.to_string()).collect(),
        );
    }

    /// Create a backup vault whose deleted recovery points stay listed for
    /// `drain_polls` more listings
    pub fn add_vault(&self, name: &str, recovery_points: &[&str], drain_polls: u32) {
        let mut state = self.state.lock().unwrap();
        state.vault_drain_polls = drain_polls;
        state.vaults.insert(
            name.to_string(),
            recovery_points.iter().map(|p| (p.to_string(), None)).collect(),
        );
    }

    pub fn vault_exists_now(&self, name: &str) -> bool {
        self.state.lock().unwrap().vaults.contains_key(name)
    }

    /// Make delete calls for `stacks` wait until all of them are in flight
    pub fn rendezvous(&self, stacks: &[&str]) {
        let names = stacks.iter().map(|s| s.to_string()).collect();
        *self.barrier.lock().unwrap() = Some((names, Arc::new(Barrier::new(stacks.len()))));
    }

    pub fn clients(&self) -> CloudClients {
        let fake = Arc::new(self.clone());
        CloudClients {
            stacks: fake.clone(),
            stager: fake.clone(),
            buckets: fake.clone(),
            roles: fake.clone(),
            repositories: fake.clone(),
            vaults: fake.clone(),
            table_buckets: fake.clone(),
            vector_buckets: fake,
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    /// Events starting with `prefix`
    pub fn events_matching(&self, prefix: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }

    pub fn stack_exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().stacks.contains_key(name)
    }

    pub fn stack_status(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .stacks
            .get(name)
            .map(|s| s.status.clone())
    }

    pub fn bucket_exists_now(&self, name: &str) -> bool {
        self.state.lock().unwrap().buckets.contains_key(name)
    }

    pub fn staged_templates(&self) -> usize {
        self.state.lock().unwrap().staged.len()
    }

    fn record(&self, event: String) {
        self.state.lock().unwrap().events.push(event);
    }

    fn barrier_for(&self, stack: &str) -> Option<Arc<Barrier>> {
        self.barrier
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(names, _)| names.contains(stack))
            .map(|(_, barrier)| barrier.clone())
    }
}

/// Delete a stack in place; returns whether it is gone
fn delete_in_place(state: &mut State, stack: &str, retain: &[String]) -> bool {
    let Some(mut current) = state.stacks.remove(stack) else {
        return true;
    };

    let mut remaining = Vec::new();
    for mut resource in std::mem::take(&mut current.resources) {
        if retain.contains(&resource.logical_id) {
            continue;
        }
        let deleted = !resource.stuck
            && match resource.resource_type.as_str() {
                "AWS::S3::Bucket" => {
                    let holds_objects = state
                        .buckets
                        .get(&resource.physical_id)
                        .is_some_and(|objects| !objects.is_empty());
                    if !holds_objects {
                        state.buckets.remove(&resource.physical_id);
                    }
                    !holds_objects
                }
                "AWS::IAM::Role" => {
                    let has_policies = state
                        .roles
                        .get(&resource.physical_id)
                        .is_some_and(|policies| !policies.is_empty());
                    if !has_policies {
                        state.roles.remove(&resource.physical_id);
                    }
                    !has_policies
                }
                "AWS::Backup::BackupVault" => {
                    let holds_points = state
                        .vaults
                        .get(&resource.physical_id)
                        .is_some_and(|points| !points.is_empty());
                    if !holds_points {
                        state.vaults.remove(&resource.physical_id);
                    }
                    !holds_points
                }
                "AWS::CloudFormation::Stack" => {
                    let child = resource.physical_id.clone();
                    state.events.push(format!("cascade_delete:{child}"));
                    delete_in_place(state, &child, &[])
                }
                _ => true,
            };
        if !deleted {
            resource.status = "DELETE_FAILED".to_string();
            remaining.push(resource);
        }
    }

    if remaining.is_empty() {
        for export in &current.exports {
            state.imports.remove(export);
        }
        return true;
    }
    current.status = "DELETE_FAILED".to_string();
    current.resources = remaining;
    state.stacks.insert(stack.to_string(), current);
    false
}

const UPDATABLE_STATUSES: &[&str] = &[
    "CREATE_COMPLETE",
    "UPDATE_COMPLETE",
    "UPDATE_ROLLBACK_COMPLETE",
    "IMPORT_COMPLETE",
    "IMPORT_ROLLBACK_COMPLETE",
];

fn not_found(what: &str) -> AwsError {
    AwsError::NotFound {
        message: format!("{what} does not exist"),
    }
}

#[async_trait]
impl StackApi for FakeCloud {
    async fn describe_stack(&self, stack: &str) -> Result<Option<StackSnapshot>, AwsError> {
        let state = self.state.lock().unwrap();
        Ok(state.stacks.get(stack).map(|s| StackSnapshot {
            name: stack.to_string(),
            status: StackStatus::from_raw(&s.status),
            raw_status: s.status.clone(),
            termination_protection: s.termination_protection,
            exports: s
                .exports
                .iter()
                .map(|e| StackExport {
                    name: e.clone(),
                    value: format!("{stack}-{e}"),
                })
                .collect(),
            root_stack: s.root_stack.clone(),
        }))
    }

    async fn delete_stack(&self, stack: &str, retain: &[String]) -> Result<(), AwsError> {
        self.record(format!("delete_stack:{stack}:[{}]", retain.join(",")));
        if let Some(barrier) = self.barrier_for(stack) {
            barrier.wait().await;
        }
        let mut state = self.state.lock().unwrap();
        delete_in_place(&mut state, stack, retain);
        Ok(())
    }

    async fn list_stack_resources(&self, stack: &str) -> Result<Vec<ResourceSummary>, AwsError> {
        let state = self.state.lock().unwrap();
        let current = state.stacks.get(stack).ok_or_else(|| not_found(stack))?;
        Ok(current
            .resources
            .iter()
            .map(|r| ResourceSummary {
                logical_id: r.logical_id.clone(),
                physical_id: r.physical_id.clone(),
                resource_type: r.resource_type.clone(),
                status: ResourceStatus::from_raw(&r.status),
            })
            .collect())
    }

    async fn list_stacks(&self) -> Result<Vec<StackSummary>, AwsError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .stacks
            .iter()
            .map(|(name, s)| StackSummary {
                name: name.clone(),
                raw_status: s.status.clone(),
            })
            .collect())
    }

    async fn list_imports(&self, export_name: &str) -> Result<Vec<String>, AwsError> {
        let state = self.state.lock().unwrap();
        Ok(state.imports.get(export_name).cloned().unwrap_or_default())
    }

    async fn get_template(&self, stack: &str) -> Result<String, AwsError> {
        let state = self.state.lock().unwrap();
        state
            .stacks
            .get(stack)
            .map(|s| s.template.clone())
            .ok_or_else(|| not_found(stack))
    }

    async fn update_template(
        &self,
        stack: &str,
        source: TemplateSource,
    ) -> Result<bool, AwsError> {
        let mut state = self.state.lock().unwrap();
        let status = state
            .stacks
            .get(stack)
            .map(|s| s.status.clone())
            .ok_or_else(|| not_found(stack))?;
        if !UPDATABLE_STATUSES.contains(&status.as_str()) {
            return Err(AwsError::Sdk {
                code: Some("ValidationError".to_string()),
                message: format!("Stack:{stack} is in {status} state and can not be updated."),
            });
        }
        let body = match &source {
            TemplateSource::Body(body) => {
                state.events.push(format!("update_template:{stack}:body"));
                body.clone()
            }
            TemplateSource::Url(url) => {
                state.events.push(format!("update_template:{stack}:url"));
                let staged = state.staged.iter().any(|s| url.contains(s.as_str()));
                if !staged {
                    return Err(AwsError::Sdk {
                        code: Some("ValidationError".to_string()),
                        message: format!("template URL {url} is not readable"),
                    });
                }
                // The fake keeps the URL; callers only check the status
                url.clone()
            }
        };
        let current = state.stacks.get_mut(stack).ok_or_else(|| not_found(stack))?;
        current.template = body;
        current.status = "UPDATE_COMPLETE".to_string();
        Ok(true)
    }
}

#[async_trait]
impl TemplateStager for FakeCloud {
    async fn stage(&self, stack: &str, _body: &str) -> Result<StagedTemplate, AwsError> {
        let bucket = format!("staging-{stack}");
        let key = format!("{stack}.template");
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("stage:{stack}"));
        state.staged.insert(bucket.clone());
        Ok(StagedTemplate {
            url: format!("https://{bucket}.s3.amazonaws.com/{key}"),
            bucket,
            key,
        })
    }

    async fn discard(&self, staged: &StagedTemplate) -> Result<(), AwsError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("discard:{}", staged.bucket));
        state.staged.remove(&staged.bucket);
        Ok(())
    }
}

#[async_trait]
impl BucketApi for FakeCloud {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, AwsError> {
        Ok(self.state.lock().unwrap().buckets.contains_key(bucket))
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        _marker: Option<VersionMarker>,
    ) -> Result<ObjectVersionPage, AwsError> {
        let state = self.state.lock().unwrap();
        let objects = state.buckets.get(bucket).ok_or_else(|| not_found(bucket))?;
        Ok(ObjectVersionPage {
            objects: objects.clone(),
            next: None,
        })
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        objects: &[ObjectVersion],
    ) -> Result<Vec<ObjectDeleteFailure>, AwsError> {
        let mut state = self.state.lock().unwrap();
        state
            .events
            .push(format!("delete_objects:{bucket}:{}", objects.len()));
        let stored = state.buckets.get_mut(bucket).ok_or_else(|| not_found(bucket))?;
        stored.retain(|o| !objects.contains(o));
        Ok(vec![])
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), AwsError> {
        let mut state = self.state.lock().unwrap();
        let empty = state
            .buckets
            .get(bucket)
            .map(Vec::is_empty)
            .ok_or_else(|| not_found(bucket))?;
        if !empty {
            return Err(AwsError::Sdk {
                code: Some("BucketNotEmpty".to_string()),
                message: format!("bucket {bucket} is not empty"),
            });
        }
        state.buckets.remove(bucket);
        state.events.push(format!("delete_bucket:{bucket}"));
        Ok(())
    }
}

#[async_trait]
impl RoleApi for FakeCloud {
    async fn role_exists(&self, role: &str) -> Result<bool, AwsError> {
        Ok(self.state.lock().unwrap().roles.contains_key(role))
    }

    async fn list_attached_policies(&self, role: &str) -> Result<Vec<String>, AwsError> {
        let state = self.state.lock().unwrap();
        state.roles.get(role).cloned().ok_or_else(|| not_found(role))
    }

    async fn detach_policy(&self, role: &str, policy_arn: &str) -> Result<(), AwsError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("detach_policy:{role}:{policy_arn}"));
        let policies = state.roles.get_mut(role).ok_or_else(|| not_found(role))?;
        policies.retain(|p| p != policy_arn);
        Ok(())
    }

    async fn list_inline_policies(&self, _role: &str) -> Result<Vec<String>, AwsError> {
        Ok(vec![])
    }

    async fn delete_inline_policy(&self, _role: &str, _policy_name: &str) -> Result<(), AwsError> {
        Ok(())
    }

    async fn list_instance_profiles(&self, _role: &str) -> Result<Vec<String>, AwsError> {
        Ok(vec![])
    }

    async fn remove_from_instance_profile(
        &self,
        _role: &str,
        _profile: &str,
    ) -> Result<(), AwsError> {
        Ok(())
    }

    async fn delete_role(&self, role: &str) -> Result<(), AwsError> {
        let mut state = self.state.lock().unwrap();
        state.roles.remove(role).ok_or_else(|| not_found(role))?;
        state.events.push(format!("delete_role:{role}"));
        Ok(())
    }
}

#[async_trait]
impl RepositoryApi for FakeCloud {
    async fn repository_exists(&self, _repository: &str) -> Result<bool, AwsError> {
        Ok(false)
    }

    async fn list_images(&self, _repository: &str) -> Result<Vec<ImageId>, AwsError> {
        Ok(vec![])
    }

    async fn batch_delete_images(
        &self,
        _repository: &str,
        _images: &[ImageId],
    ) -> Result<(), AwsError> {
        Ok(())
    }

    async fn delete_repository(&self, repository: &str) -> Result<(), AwsError> {
        Err(not_found(repository))
    }
}

#[async_trait]
impl VaultApi for FakeCloud {
    async fn vault_exists(&self, vault: &str) -> Result<bool, AwsError> {
        Ok(self.state.lock().unwrap().vaults.contains_key(vault))
    }

    /// Deleting points age by one listing; they vanish once their count is spent
    async fn list_recovery_points(&self, vault: &str) -> Result<Vec<String>, AwsError> {
        let mut state = self.state.lock().unwrap();
        let points = state.vaults.get_mut(vault).ok_or_else(|| not_found(vault))?;
        points.retain(|_, left| *left != Some(0));
        for left in points.values_mut().flatten() {
            *left -= 1;
        }
        Ok(points.keys().cloned().collect())
    }

    async fn delete_recovery_point(&self, vault: &str, arn: &str) -> Result<(), AwsError> {
        let mut state = self.state.lock().unwrap();
        state
            .events
            .push(format!("delete_recovery_point:{vault}:{arn}"));
        let drain_polls = state.vault_drain_polls;
        let points = state.vaults.get_mut(vault).ok_or_else(|| not_found(vault))?;
        let left = points.get_mut(arn).ok_or_else(|| not_found(arn))?;
        if left.is_none() {
            *left = Some(drain_polls);
        }
        Ok(())
    }

    async fn delete_vault(&self, vault: &str) -> Result<(), AwsError> {
        let mut state = self.state.lock().unwrap();
        let empty = state
            .vaults
            .get(vault)
            .map(BTreeMap::is_empty)
            .ok_or_else(|| not_found(vault))?;
        if !empty {
            return Err(AwsError::Sdk {
                code: Some("InvalidRequestException".to_string()),
                message: format!("backup vault {vault} still has recovery points"),
            });
        }
        state.vaults.remove(vault);
        state.events.push(format!("delete_vault:{vault}"));
        Ok(())
    }
}

#[async_trait]
impl TableBucketApi for FakeCloud {
    async fn table_bucket_exists(&self, _bucket_arn: &str) -> Result<bool, AwsError> {
        Ok(false)
    }

    async fn list_namespaces(&self, _bucket_arn: &str) -> Result<Vec<String>, AwsError> {
        Ok(vec![])
    }

    async fn list_tables(
        &self,
        _bucket_arn: &str,
        _namespace: &str,
    ) -> Result<Vec<String>, AwsError> {
        Ok(vec![])
    }

    async fn delete_table(
        &self,
        _bucket_arn: &str,
        _namespace: &str,
        _table: &str,
    ) -> Result<(), AwsError> {
        Ok(())
    }

    async fn delete_namespace(&self, _bucket_arn: &str, _namespace: &str) -> Result<(), AwsError> {
        Ok(())
    }

    async fn delete_table_bucket(&self, bucket_arn: &str) -> Result<(), AwsError> {
        Err(not_found(bucket_arn))
    }
}

#[async_trait]
impl VectorBucketApi for FakeCloud {
    async fn vector_bucket_exists(&self, _bucket: &str) -> Result<bool, AwsError> {
        Ok(false)
    }

    async fn list_indexes(&self, _bucket: &str) -> Result<Vec<String>, AwsError> {
        Ok(vec![])
    }

    async fn delete_index(&self, _bucket: &str, _index: &str) -> Result<(), AwsError> {
        Ok(())
    }

    async fn delete_vector_bucket(&self, bucket: &str) -> Result<(), AwsError> {
        Err(not_found(bucket))
    }
}

/// Run configuration with fast retries for tests
pub fn test_config() -> ReapConfig {
    let fast = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_jitter: Duration::ZERO,
    };
    ReapConfig {
        timeout: Duration::from_secs(300),
        retry: fast,
        slow_retry: fast,
        ..ReapConfig::default()
    }
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Context for the ignored live tests, resolved like the CLI resolves it
/// (`AWS_REGION`, `AWS_PROFILE`, then the SDK chain), defaulting to us-east-2
pub async fn live_context() -> AwsContext {
    let region = std::env::var("AWS_REGION").ok();
    let profile = std::env::var("AWS_PROFILE").ok();
    let ctx = AwsContext::with_profile(region.as_deref(), profile.as_deref()).await;
    if ctx.region().is_some() {
        return ctx;
    }
    AwsContext::with_profile(Some("us-east-2"), profile.as_deref()).await
}

/// Name for a throwaway live resource; the prefix makes leftovers easy to find
pub fn scratch_name(kind: &str) -> String {
    format!("stackreap-test-{kind}-{}", uuid::Uuid::new_v4().simple())
}
