//! In-memory provider for tests.
//!
//! [`FakeCloud`] serves every port from a single mutex-guarded state, records
//! each call (flagging the mutating ones), and can inject provider errors per
//! operation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use deploy_core::error::{DeployError, ErrorKind, ProviderError};
use deploy_core::handler::{BillingMode, HandlerSpec, StreamView};
use deploy_core::inventory::{synthesized_layer_resources, TaggedResource};
use deploy_core::naming::layer_name;
use deploy_core::resources::bucket::{bucket_arn, BucketLive, LambdaNotification};
use deploy_core::resources::distribution::{
    DistributionLive, DistributionSpec, EdgeFunctionLive, EdgeFunctionSpec, EdgeFunctionSummary,
    STATUS_DEPLOYED,
};
use deploy_core::resources::event_source::{EventSourceMapping, EventSourceSpec};
use deploy_core::resources::function::{
    CodeArtifact, FunctionConfig, FunctionLive, FunctionSpec, FunctionState, LastUpdateStatus,
};
use deploy_core::resources::layer::{LayerSpec, LayerVersion};
use deploy_core::resources::mail::MailIdentityLive;
use deploy_core::resources::queue::{QueueLive, ATTR_QUEUE_ARN};
use deploy_core::resources::role::RoleLive;
use deploy_core::resources::route::{ApiLive, IntegrationLive, RouteLive};
use deploy_core::resources::table::{TableLive, TableSpec, TableStatus};
use deploy_core::tags::{Tags, TAG_PROJECT, TAG_STAGE};

use crate::artifacts::ArtifactSource;
use crate::ports::{
    BucketApi, DistributionApi, EventSourceApi, FunctionApi, InvokePermission, LayerApi, MailApi,
    Provider, ProviderResult, QueueApi, RoleApi, RouteApi, TableApi, TaggingApi,
};

pub const FAKE_REGION: &str = "eu-west-1";
pub const FAKE_ACCOUNT: &str = "123456789012";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: &'static str,
    pub target: String,
    pub mutating: bool,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    operation: &'static str,
    target: Option<String>,
    error: ProviderError,
    remaining: Option<u32>,
}

#[derive(Debug, Clone, Default)]
struct FakeBucket {
    live: Option<BucketLive>,
    notifications: Vec<LambdaNotification>,
    policy: Option<String>,
    objects: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone)]
struct FakeDistribution {
    name: String,
    live: DistributionLive,
}

#[derive(Debug, Clone)]
struct FakeApi {
    live: ApiLive,
    routes: Vec<RouteLive>,
    integrations: Vec<IntegrationLive>,
}

#[derive(Debug, Default)]
struct State {
    functions: BTreeMap<String, FunctionLive>,
    /// Remaining polls before a mutated function reports settled.
    unsettled: BTreeMap<String, u32>,
    permissions: BTreeMap<String, Vec<InvokePermission>>,
    roles: BTreeMap<String, RoleLive>,
    tables: BTreeMap<String, TableLive>,
    queues: BTreeMap<String, QueueLive>,
    buckets: BTreeMap<String, FakeBucket>,
    distributions: BTreeMap<String, FakeDistribution>,
    origin_access_controls: BTreeMap<String, String>,
    edge_functions: BTreeMap<String, EdgeFunctionLive>,
    published_edge_functions: BTreeMap<String, String>,
    apis: BTreeMap<String, FakeApi>,
    layers: BTreeMap<String, Vec<LayerVersion>>,
    identities: BTreeMap<String, MailIdentityLive>,
    mappings: Vec<EventSourceMapping>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }
}

#[derive(Debug)]
pub struct FakeCloud {
    region: String,
    account_id: String,
    settle_polls: u32,
    create_latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    state: Mutex<State>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<Vec<InjectedFailure>>,
}

/// Counts one in-flight `CreateFunction` for as long as it lives.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(current)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn not_found(operation: &str, target: &str) -> ProviderError {
    ProviderError::not_found(operation, format!("{target} does not exist"))
}

fn already_exists(operation: &str, target: &str) -> ProviderError {
    ProviderError::new(ErrorKind::AlreadyExists, operation, format!("{target} already exists"))
}

fn merge_tags(target: &mut Tags, tags: &Tags) {
    target.extend(tags.iter().map(|(key, value)| (key.clone(), value.clone())));
}

impl FakeCloud {
    pub fn new() -> Self {
        Self {
            region: FAKE_REGION.to_string(),
            account_id: FAKE_ACCOUNT.to_string(),
            settle_polls: 0,
            create_latency: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            state: Mutex::new(State::default()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Mutated functions report `Pending`/`InProgress` for this many polls.
    pub fn with_settle_polls(mut self, polls: u32) -> Self {
        self.settle_polls = polls;
        self
    }

    /// `CreateFunction` takes this long, so overlapping handlers overlap here.
    pub fn with_create_latency(mut self, latency: Duration) -> Self {
        self.create_latency = Some(latency);
        self
    }

    /// Most `CreateFunction` calls ever in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn into_provider(self) -> (Arc<Self>, Provider) {
        let cloud = Arc::new(self);
        let provider = Provider::from_cloud(
            cloud.region.clone(),
            cloud.account_id.clone(),
            cloud.clone(),
        );
        (cloud, provider)
    }

    /// Every call to `operation` fails with `error`.
    pub fn fail_always(&self, operation: &'static str, error: ProviderError) {
        self.inject(operation, None, error, None);
    }

    /// The next call to `operation` fails with `error`.
    pub fn fail_once(&self, operation: &'static str, error: ProviderError) {
        self.inject(operation, None, error, Some(1));
    }

    /// Every call to `operation` on `target` fails with `error`.
    pub fn fail_for(&self, operation: &'static str, target: &str, error: ProviderError) {
        self.inject(operation, Some(target.to_string()), error, None);
    }

    fn inject(
        &self,
        operation: &'static str,
        target: Option<String>,
        error: ProviderError,
        remaining: Option<u32>,
    ) {
        lock(&self.failures).push(InjectedFailure {
            operation,
            target,
            error,
            remaining,
        });
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|call| call.mutating).collect()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.operation == operation)
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    pub fn function(&self, name: &str) -> Option<FunctionLive> {
        lock(&self.state).functions.get(name).cloned()
    }

    pub fn role(&self, name: &str) -> Option<RoleLive> {
        lock(&self.state).roles.get(name).cloned()
    }

    pub fn table(&self, name: &str) -> Option<TableLive> {
        lock(&self.state).tables.get(name).cloned()
    }

    pub fn queue(&self, name: &str) -> Option<QueueLive> {
        lock(&self.state).queues.get(name).cloned()
    }

    pub fn bucket_exists(&self, name: &str) -> bool {
        lock(&self.state)
            .buckets
            .get(name)
            .is_some_and(|bucket| bucket.live.is_some())
    }

    pub fn bucket_objects(&self, name: &str) -> Vec<String> {
        lock(&self.state)
            .buckets
            .get(name)
            .map(|bucket| bucket.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn route_keys(&self) -> Vec<String> {
        let state = lock(&self.state);
        let mut keys: Vec<String> = state
            .apis
            .values()
            .flat_map(|api| api.routes.iter().map(|route| route.route_key.clone()))
            .collect();
        keys.sort();
        keys
    }

    /// Function ARNs the API's integrations point at.
    pub fn integration_uris(&self) -> Vec<String> {
        let state = lock(&self.state);
        let mut uris: Vec<String> = state
            .apis
            .values()
            .flat_map(|api| {
                api.integrations
                    .iter()
                    .map(|integration| integration.integration_uri.clone())
            })
            .collect();
        uris.sort();
        uris
    }

    pub fn edge_function_names(&self) -> Vec<String> {
        lock(&self.state).edge_functions.keys().cloned().collect()
    }

    pub fn layer_versions(&self, name: &str) -> Vec<LayerVersion> {
        lock(&self.state).layers.get(name).cloned().unwrap_or_default()
    }

    pub fn event_source_mappings(&self) -> Vec<EventSourceMapping> {
        lock(&self.state).mappings.clone()
    }

    /// Drops every tag from the resource with this ARN, simulating drift.
    pub fn strip_tags(&self, arn: &str) {
        let mut state = lock(&self.state);
        for function in state.functions.values_mut().filter(|live| live.arn == arn) {
            function.tags.clear();
        }
        for role in state.roles.values_mut().filter(|live| live.arn == arn) {
            role.tags.clear();
        }
        for table in state.tables.values_mut().filter(|live| live.arn == arn) {
            table.tags.clear();
        }
    }

    /// Registers a role outside of any deploy, as an operator would.
    pub fn insert_role(&self, name: &str, tags: Tags) {
        let arn = self.role_arn(name);
        lock(&self.state).roles.insert(
            name.to_string(),
            RoleLive {
                name: name.to_string(),
                arn,
                inline_policy: None,
                tags,
            },
        );
    }

    fn record(&self, operation: &'static str, target: &str, mutating: bool) -> ProviderResult<()> {
        lock(&self.calls).push(Call {
            operation,
            target: target.to_string(),
            mutating,
        });

        let mut failures = lock(&self.failures);
        let Some(index) = failures.iter().position(|failure| {
            failure.operation == operation
                && failure
                    .target
                    .as_deref()
                    .map_or(true, |expected| expected == target)
        }) else {
            return Ok(());
        };
        let error = failures[index].error.clone();
        if let Some(remaining) = failures[index].remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                failures.remove(index);
            }
        }
        Err(error)
    }

    fn read(&self, operation: &'static str, target: &str) -> ProviderResult<()> {
        self.record(operation, target, false)
    }

    fn write(&self, operation: &'static str, target: &str) -> ProviderResult<()> {
        self.record(operation, target, true)
    }

    fn function_arn(&self, name: &str) -> String {
        format!("arn:aws:lambda:{}:{}:function:{name}", self.region, self.account_id)
    }

    fn role_arn(&self, name: &str) -> String {
        format!("arn:aws:iam::{}:role/{name}", self.account_id)
    }

    fn table_arn(&self, name: &str) -> String {
        format!("arn:aws:dynamodb:{}:{}:table/{name}", self.region, self.account_id)
    }

    fn queue_arn(&self, name: &str) -> String {
        format!("arn:aws:sqs:{}:{}:{name}", self.region, self.account_id)
    }

    fn queue_url(&self, name: &str) -> String {
        format!("https://sqs.{}.amazonaws.com/{}/{name}", self.region, self.account_id)
    }

    fn distribution_arn(&self, id: &str) -> String {
        format!("arn:aws:cloudfront::{}:distribution/{id}", self.account_id)
    }

    fn identity_arn(&self, domain: &str) -> String {
        format!("arn:aws:ses:{}:{}:identity/{domain}", self.region, self.account_id)
    }

    fn layer_arn(&self, name: &str, version: i64) -> String {
        format!("arn:aws:lambda:{}:{}:layer:{name}:{version}", self.region, self.account_id)
    }

    fn mark_unsettled(&self, state: &mut State, name: &str) {
        if self.settle_polls > 0 {
            state.unsettled.insert(name.to_string(), self.settle_polls);
        }
    }
}

#[async_trait]
impl FunctionApi for FakeCloud {
    async fn get_function(&self, name: &str) -> ProviderResult<Option<FunctionLive>> {
        self.read("GetFunction", name)?;
        let mut state = lock(&self.state);
        let pending = match state.unsettled.get_mut(name) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        Ok(state.functions.get(name).cloned().map(|mut live| {
            if pending {
                live.state = FunctionState::Pending;
                live.last_update_status = LastUpdateStatus::InProgress;
            }
            live
        }))
    }

    async fn create_function(
        &self,
        name: &str,
        spec: &FunctionSpec,
        tags: &Tags,
    ) -> ProviderResult<FunctionLive> {
        self.write("CreateFunction", name)?;
        if let Some(latency) = self.create_latency {
            let _in_flight = InFlight::enter(&self.in_flight, &self.peak_in_flight);
            tokio::time::sleep(latency).await;
        }
        let mut state = lock(&self.state);
        if state.functions.contains_key(name) {
            return Err(already_exists("CreateFunction", name));
        }
        let live = FunctionLive {
            arn: self.function_arn(name),
            code_sha256: spec.code.sha256.clone(),
            config: spec.config.clone(),
            state: FunctionState::Active,
            last_update_status: LastUpdateStatus::Successful,
            state_reason: None,
            tags: tags.clone(),
        };
        state.functions.insert(name.to_string(), live.clone());
        self.mark_unsettled(&mut state, name);
        Ok(live)
    }

    async fn update_function_code(&self, name: &str, code: &CodeArtifact) -> ProviderResult<()> {
        self.write("UpdateFunctionCode", name)?;
        let mut state = lock(&self.state);
        let live = state
            .functions
            .get_mut(name)
            .ok_or_else(|| not_found("UpdateFunctionCode", name))?;
        live.code_sha256 = code.sha256.clone();
        self.mark_unsettled(&mut state, name);
        Ok(())
    }

    async fn update_function_configuration(
        &self,
        name: &str,
        config: &FunctionConfig,
    ) -> ProviderResult<()> {
        self.write("UpdateFunctionConfiguration", name)?;
        let mut state = lock(&self.state);
        let live = state
            .functions
            .get_mut(name)
            .ok_or_else(|| not_found("UpdateFunctionConfiguration", name))?;
        live.config = config.clone();
        self.mark_unsettled(&mut state, name);
        Ok(())
    }

    async fn tag_function(&self, arn: &str, tags: &Tags) -> ProviderResult<()> {
        self.write("TagFunction", arn)?;
        let mut state = lock(&self.state);
        let live = state
            .functions
            .values_mut()
            .find(|live| live.arn == arn)
            .ok_or_else(|| not_found("TagFunction", arn))?;
        merge_tags(&mut live.tags, tags);
        Ok(())
    }

    async fn delete_function(&self, name: &str) -> ProviderResult<()> {
        self.write("DeleteFunction", name)?;
        let mut state = lock(&self.state);
        state
            .functions
            .remove(name)
            .ok_or_else(|| not_found("DeleteFunction", name))?;
        state.permissions.remove(name);
        Ok(())
    }

    async fn list_permission_ids(&self, name: &str) -> ProviderResult<Vec<String>> {
        self.read("GetPolicy", name)?;
        Ok(lock(&self.state)
            .permissions
            .get(name)
            .map(|grants| grants.iter().map(|grant| grant.statement_id.clone()).collect())
            .unwrap_or_default())
    }

    async fn add_permission(&self, name: &str, permission: &InvokePermission) -> ProviderResult<()> {
        self.write("AddPermission", name)?;
        let mut state = lock(&self.state);
        let grants = state.permissions.entry(name.to_string()).or_default();
        if grants
            .iter()
            .any(|grant| grant.statement_id == permission.statement_id)
        {
            return Err(already_exists("AddPermission", &permission.statement_id));
        }
        grants.push(permission.clone());
        Ok(())
    }
}

#[async_trait]
impl RoleApi for FakeCloud {
    async fn get_role(&self, name: &str, _policy_name: &str) -> ProviderResult<Option<RoleLive>> {
        self.read("GetRole", name)?;
        Ok(lock(&self.state).roles.get(name).cloned())
    }

    async fn create_role(
        &self,
        name: &str,
        _trust_policy: &str,
        tags: &Tags,
    ) -> ProviderResult<RoleLive> {
        self.write("CreateRole", name)?;
        let mut state = lock(&self.state);
        if state.roles.contains_key(name) {
            return Err(already_exists("CreateRole", name));
        }
        let live = RoleLive {
            name: name.to_string(),
            arn: self.role_arn(name),
            inline_policy: None,
            tags: tags.clone(),
        };
        state.roles.insert(name.to_string(), live.clone());
        Ok(live)
    }

    async fn put_role_policy(
        &self,
        role: &str,
        _policy_name: &str,
        document: &str,
    ) -> ProviderResult<()> {
        self.write("PutRolePolicy", role)?;
        let mut state = lock(&self.state);
        let live = state
            .roles
            .get_mut(role)
            .ok_or_else(|| not_found("PutRolePolicy", role))?;
        live.inline_policy = Some(document.to_string());
        Ok(())
    }

    async fn tag_role(&self, name: &str, tags: &Tags) -> ProviderResult<()> {
        self.write("TagRole", name)?;
        let mut state = lock(&self.state);
        let live = state
            .roles
            .get_mut(name)
            .ok_or_else(|| not_found("TagRole", name))?;
        merge_tags(&mut live.tags, tags);
        Ok(())
    }

    async fn delete_role(&self, name: &str) -> ProviderResult<()> {
        self.write("DeleteRole", name)?;
        lock(&self.state)
            .roles
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("DeleteRole", name))
    }
}

#[async_trait]
impl TableApi for FakeCloud {
    async fn describe_table(&self, name: &str) -> ProviderResult<Option<TableLive>> {
        self.read("DescribeTable", name)?;
        Ok(lock(&self.state).tables.get(name).cloned())
    }

    async fn create_table(
        &self,
        name: &str,
        spec: &TableSpec,
        tags: &Tags,
    ) -> ProviderResult<TableLive> {
        self.write("CreateTable", name)?;
        let mut state = lock(&self.state);
        if state.tables.contains_key(name) {
            return Err(already_exists("CreateTable", name));
        }
        let arn = self.table_arn(name);
        let live = TableLive {
            name: name.to_string(),
            stream_arn: spec.stream.map(|_| format!("{arn}/stream/1")),
            arn,
            status: TableStatus::Active,
            partition_key: spec.partition_key.clone(),
            sort_key: spec.sort_key.clone(),
            billing_mode: spec.billing_mode,
            stream: spec.stream,
            tags: tags.clone(),
        };
        state.tables.insert(name.to_string(), live.clone());
        Ok(live)
    }

    async fn update_billing_mode(&self, name: &str, mode: BillingMode) -> ProviderResult<()> {
        self.write("UpdateTableBilling", name)?;
        let mut state = lock(&self.state);
        let live = state
            .tables
            .get_mut(name)
            .ok_or_else(|| not_found("UpdateTableBilling", name))?;
        live.billing_mode = mode;
        Ok(())
    }

    async fn update_stream(&self, name: &str, view: Option<StreamView>) -> ProviderResult<()> {
        self.write("UpdateTableStream", name)?;
        let mut state = lock(&self.state);
        let next_id = state.next_id("");
        let live = state
            .tables
            .get_mut(name)
            .ok_or_else(|| not_found("UpdateTableStream", name))?;
        if live.stream.is_some() && view.is_some() {
            return Err(ProviderError::validation(
                "UpdateTableStream",
                "table already has a stream enabled",
            ));
        }
        live.stream = view;
        live.stream_arn = view.map(|_| format!("{}/stream/{next_id}", live.arn));
        Ok(())
    }

    async fn tag_table(&self, arn: &str, tags: &Tags) -> ProviderResult<()> {
        self.write("TagTable", arn)?;
        let mut state = lock(&self.state);
        let live = state
            .tables
            .values_mut()
            .find(|live| live.arn == arn)
            .ok_or_else(|| not_found("TagTable", arn))?;
        merge_tags(&mut live.tags, tags);
        Ok(())
    }

    async fn delete_table(&self, name: &str) -> ProviderResult<()> {
        self.write("DeleteTable", name)?;
        lock(&self.state)
            .tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("DeleteTable", name))
    }
}

#[async_trait]
impl QueueApi for FakeCloud {
    async fn get_queue(&self, name: &str) -> ProviderResult<Option<QueueLive>> {
        self.read("GetQueue", name)?;
        Ok(lock(&self.state).queues.get(name).cloned())
    }

    async fn create_queue(
        &self,
        name: &str,
        attributes: &BTreeMap<String, String>,
        tags: &Tags,
    ) -> ProviderResult<QueueLive> {
        self.write("CreateQueue", name)?;
        let mut state = lock(&self.state);
        if state.queues.contains_key(name) {
            return Err(already_exists("CreateQueue", name));
        }
        let arn = self.queue_arn(name);
        let mut attributes = attributes.clone();
        attributes.insert(ATTR_QUEUE_ARN.to_string(), arn.clone());
        let live = QueueLive {
            name: name.to_string(),
            url: self.queue_url(name),
            arn,
            attributes,
            tags: tags.clone(),
        };
        state.queues.insert(name.to_string(), live.clone());
        Ok(live)
    }

    async fn set_queue_attributes(
        &self,
        url: &str,
        attributes: &BTreeMap<String, String>,
    ) -> ProviderResult<()> {
        self.write("SetQueueAttributes", url)?;
        let mut state = lock(&self.state);
        let live = state
            .queues
            .values_mut()
            .find(|live| live.url == url)
            .ok_or_else(|| not_found("SetQueueAttributes", url))?;
        live.attributes.extend(attributes.clone());
        Ok(())
    }

    async fn tag_queue(&self, url: &str, tags: &Tags) -> ProviderResult<()> {
        self.write("TagQueue", url)?;
        let mut state = lock(&self.state);
        let live = state
            .queues
            .values_mut()
            .find(|live| live.url == url)
            .ok_or_else(|| not_found("TagQueue", url))?;
        merge_tags(&mut live.tags, tags);
        Ok(())
    }

    async fn delete_queue(&self, url: &str) -> ProviderResult<()> {
        self.write("DeleteQueue", url)?;
        let mut state = lock(&self.state);
        let name = state
            .queues
            .values()
            .find(|live| live.url == url)
            .map(|live| live.name.clone())
            .ok_or_else(|| not_found("DeleteQueue", url))?;
        state.queues.remove(&name);
        Ok(())
    }
}

#[async_trait]
impl BucketApi for FakeCloud {
    async fn head_bucket(&self, name: &str) -> ProviderResult<Option<BucketLive>> {
        self.read("HeadBucket", name)?;
        Ok(lock(&self.state)
            .buckets
            .get(name)
            .and_then(|bucket| bucket.live.clone()))
    }

    async fn create_bucket(
        &self,
        name: &str,
        _region: Option<&str>,
        tags: &Tags,
    ) -> ProviderResult<BucketLive> {
        self.write("CreateBucket", name)?;
        let mut state = lock(&self.state);
        let bucket = state.buckets.entry(name.to_string()).or_default();
        if bucket.live.is_some() {
            return Err(already_exists("CreateBucket", name));
        }
        let live = BucketLive {
            name: name.to_string(),
            arn: bucket_arn(name),
            tags: tags.clone(),
        };
        bucket.live = Some(live.clone());
        Ok(live)
    }

    async fn tag_bucket(&self, name: &str, tags: &Tags) -> ProviderResult<()> {
        self.write("TagBucket", name)?;
        let mut state = lock(&self.state);
        let live = state
            .buckets
            .get_mut(name)
            .and_then(|bucket| bucket.live.as_mut())
            .ok_or_else(|| not_found("TagBucket", name))?;
        merge_tags(&mut live.tags, tags);
        Ok(())
    }

    async fn get_notifications(&self, name: &str) -> ProviderResult<Vec<LambdaNotification>> {
        self.read("GetBucketNotification", name)?;
        Ok(lock(&self.state)
            .buckets
            .get(name)
            .map(|bucket| bucket.notifications.clone())
            .unwrap_or_default())
    }

    async fn put_notifications(
        &self,
        name: &str,
        notifications: &[LambdaNotification],
    ) -> ProviderResult<()> {
        self.write("PutBucketNotification", name)?;
        let mut state = lock(&self.state);
        let bucket = state
            .buckets
            .get_mut(name)
            .ok_or_else(|| not_found("PutBucketNotification", name))?;
        bucket.notifications = notifications.to_vec();
        Ok(())
    }

    async fn get_bucket_policy(&self, name: &str) -> ProviderResult<Option<String>> {
        self.read("GetBucketPolicy", name)?;
        Ok(lock(&self.state)
            .buckets
            .get(name)
            .and_then(|bucket| bucket.policy.clone()))
    }

    async fn put_bucket_policy(&self, name: &str, policy: &str) -> ProviderResult<()> {
        self.write("PutBucketPolicy", name)?;
        let mut state = lock(&self.state);
        let bucket = state
            .buckets
            .get_mut(name)
            .ok_or_else(|| not_found("PutBucketPolicy", name))?;
        bucket.policy = Some(policy.to_string());
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> ProviderResult<Option<Vec<u8>>> {
        self.read("GetObject", key)?;
        Ok(lock(&self.state)
            .buckets
            .get(bucket)
            .and_then(|stored| stored.objects.get(key).cloned()))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        _content_type: &str,
    ) -> ProviderResult<()> {
        self.write("PutObject", key)?;
        let mut state = lock(&self.state);
        let stored = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| not_found("PutObject", bucket))?;
        stored.objects.insert(key.to_string(), body.to_vec());
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> ProviderResult<()> {
        self.write("DeleteObjects", bucket)?;
        let mut state = lock(&self.state);
        if let Some(stored) = state.buckets.get_mut(bucket) {
            for key in keys {
                stored.objects.remove(key);
            }
        }
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> ProviderResult<()> {
        self.write("DeleteBucket", name)?;
        lock(&self.state)
            .buckets
            .remove(name)
            .filter(|bucket| bucket.live.is_some())
            .map(|_| ())
            .ok_or_else(|| not_found("DeleteBucket", name))
    }
}

impl FakeCloud {
    fn distribution_live(&self, id: &str, spec: &DistributionSpec, tags: Tags) -> DistributionLive {
        DistributionLive {
            id: id.to_string(),
            arn: self.distribution_arn(id),
            domain_name: format!("{}.cloudfront.net", id.to_ascii_lowercase()),
            etag: format!("{id}-E1"),
            enabled: true,
            status: STATUS_DEPLOYED.to_string(),
            origin_domain: spec.origin_domain.clone(),
            cache_policy_id: spec.cache_policy_id.clone(),
            function_associations: spec.function_associations.clone(),
            aliases: spec.aliases.clone(),
            certificate_arn: spec.certificate_arn.clone(),
            error_pages: spec.error_pages.clone(),
            api_origin: spec.api_origin.clone(),
            tags,
        }
    }
}

fn bump_etag(etag: &str) -> String {
    match etag.rsplit_once("-E") {
        Some((prefix, number)) => {
            let next = number.parse::<u64>().unwrap_or(0) + 1;
            format!("{prefix}-E{next}")
        }
        None => format!("{etag}-E2"),
    }
}

#[async_trait]
impl DistributionApi for FakeCloud {
    async fn find_distribution(&self, name: &str) -> ProviderResult<Option<DistributionLive>> {
        self.read("ListDistributions", name)?;
        Ok(lock(&self.state)
            .distributions
            .values()
            .find(|distribution| distribution.name == name)
            .map(|distribution| distribution.live.clone()))
    }

    /// A just-disabled distribution reports `InProgress` for the configured
    /// number of polls.
    async fn get_distribution(&self, id: &str) -> ProviderResult<Option<DistributionLive>> {
        self.read("GetDistribution", id)?;
        let mut state = lock(&self.state);
        let pending = match state.unsettled.get_mut(id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        Ok(state.distributions.get(id).map(|distribution| {
            let mut live = distribution.live.clone();
            if pending {
                live.status = "InProgress".to_string();
            }
            live
        }))
    }

    async fn create_distribution(
        &self,
        name: &str,
        spec: &DistributionSpec,
        tags: &Tags,
    ) -> ProviderResult<DistributionLive> {
        self.write("CreateDistribution", name)?;
        let mut state = lock(&self.state);
        let id = state.next_id("E");
        let live = self.distribution_live(&id, spec, tags.clone());
        state.distributions.insert(
            id,
            FakeDistribution {
                name: name.to_string(),
                live: live.clone(),
            },
        );
        Ok(live)
    }

    async fn update_distribution(
        &self,
        live: &DistributionLive,
        name: &str,
        spec: &DistributionSpec,
    ) -> ProviderResult<DistributionLive> {
        self.write("UpdateDistribution", &live.id)?;
        let mut state = lock(&self.state);
        let current = state
            .distributions
            .get(&live.id)
            .ok_or_else(|| not_found("UpdateDistribution", &live.id))?;
        if current.live.etag != live.etag {
            return Err(ProviderError::conflict("UpdateDistribution", "PreconditionFailed"));
        }
        let mut updated = self.distribution_live(&live.id, spec, current.live.tags.clone());
        updated.etag = bump_etag(&current.live.etag);
        state.distributions.insert(
            live.id.clone(),
            FakeDistribution {
                name: name.to_string(),
                live: updated.clone(),
            },
        );
        Ok(updated)
    }

    async fn tag_distribution(&self, arn: &str, tags: &Tags) -> ProviderResult<()> {
        self.write("TagDistribution", arn)?;
        let mut state = lock(&self.state);
        let distribution = state
            .distributions
            .values_mut()
            .find(|distribution| distribution.live.arn == arn)
            .ok_or_else(|| not_found("TagDistribution", arn))?;
        merge_tags(&mut distribution.live.tags, tags);
        Ok(())
    }

    async fn disable_distribution(&self, live: &DistributionLive) -> ProviderResult<()> {
        self.write("DisableDistribution", &live.id)?;
        let mut state = lock(&self.state);
        let distribution = state
            .distributions
            .get_mut(&live.id)
            .ok_or_else(|| not_found("DisableDistribution", &live.id))?;
        distribution.live.enabled = false;
        distribution.live.etag = bump_etag(&distribution.live.etag);
        self.mark_unsettled(&mut state, &live.id);
        Ok(())
    }

    async fn delete_distribution(&self, id: &str, etag: &str) -> ProviderResult<()> {
        self.write("DeleteDistribution", id)?;
        let mut state = lock(&self.state);
        let distribution = state
            .distributions
            .get(id)
            .ok_or_else(|| not_found("DeleteDistribution", id))?;
        if distribution.live.enabled {
            return Err(ProviderError::conflict("DeleteDistribution", "DistributionNotDisabled"));
        }
        if distribution.live.etag != etag {
            return Err(ProviderError::conflict("DeleteDistribution", "PreconditionFailed"));
        }
        state.distributions.remove(id);
        Ok(())
    }

    async fn find_origin_access_control(&self, name: &str) -> ProviderResult<Option<String>> {
        self.read("ListOriginAccessControls", name)?;
        Ok(lock(&self.state).origin_access_controls.get(name).cloned())
    }

    async fn create_origin_access_control(&self, name: &str) -> ProviderResult<String> {
        self.write("CreateOriginAccessControl", name)?;
        let mut state = lock(&self.state);
        let id = state.next_id("OAC");
        state
            .origin_access_controls
            .insert(name.to_string(), id.clone());
        Ok(id)
    }

    async fn describe_edge_function(&self, name: &str) -> ProviderResult<Option<EdgeFunctionLive>> {
        self.read("DescribeFunction", name)?;
        Ok(lock(&self.state).edge_functions.get(name).cloned())
    }

    async fn create_edge_function(
        &self,
        name: &str,
        spec: &EdgeFunctionSpec,
    ) -> ProviderResult<EdgeFunctionLive> {
        self.write("CreateEdgeFunction", name)?;
        let mut state = lock(&self.state);
        if state.edge_functions.contains_key(name) {
            return Err(already_exists("CreateEdgeFunction", name));
        }
        let live = EdgeFunctionLive {
            name: name.to_string(),
            arn: format!("arn:aws:cloudfront::{}:function/{name}", self.account_id),
            etag: format!("{name}-E1"),
            code: spec.code.clone(),
            comment: spec.comment.clone(),
        };
        state.edge_functions.insert(name.to_string(), live.clone());
        Ok(live)
    }

    async fn update_edge_function(
        &self,
        live: &EdgeFunctionLive,
        spec: &EdgeFunctionSpec,
    ) -> ProviderResult<EdgeFunctionLive> {
        self.write("UpdateEdgeFunction", &live.name)?;
        let mut state = lock(&self.state);
        let current = state
            .edge_functions
            .get_mut(&live.name)
            .ok_or_else(|| not_found("UpdateEdgeFunction", &live.name))?;
        current.code = spec.code.clone();
        current.comment = spec.comment.clone();
        current.etag = bump_etag(&current.etag);
        Ok(current.clone())
    }

    async fn publish_edge_function(&self, name: &str, etag: &str) -> ProviderResult<()> {
        self.write("PublishEdgeFunction", name)?;
        lock(&self.state)
            .published_edge_functions
            .insert(name.to_string(), etag.to_string());
        Ok(())
    }

    async fn list_edge_functions(&self, prefix: &str) -> ProviderResult<Vec<EdgeFunctionSummary>> {
        self.read("ListEdgeFunctions", prefix)?;
        Ok(lock(&self.state)
            .edge_functions
            .values()
            .filter(|live| live.name.starts_with(prefix))
            .map(|live| EdgeFunctionSummary {
                name: live.name.clone(),
                comment: live.comment.clone(),
            })
            .collect())
    }

    async fn delete_edge_function(&self, name: &str) -> ProviderResult<()> {
        self.write("DeleteEdgeFunction", name)?;
        let mut state = lock(&self.state);
        state.published_edge_functions.remove(name);
        state
            .edge_functions
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("DeleteEdgeFunction", name))
    }
}

#[async_trait]
impl RouteApi for FakeCloud {
    async fn find_api(&self, name: &str) -> ProviderResult<Option<ApiLive>> {
        self.read("GetApis", name)?;
        Ok(lock(&self.state)
            .apis
            .values()
            .find(|api| api.live.name == name)
            .map(|api| api.live.clone()))
    }

    async fn create_api(&self, name: &str, tags: &Tags) -> ProviderResult<ApiLive> {
        self.write("CreateApi", name)?;
        let mut state = lock(&self.state);
        let id = state.next_id("api");
        let live = ApiLive {
            endpoint: format!("https://{id}.execute-api.{}.amazonaws.com", self.region),
            id: id.clone(),
            name: name.to_string(),
            tags: tags.clone(),
        };
        state.apis.insert(
            id,
            FakeApi {
                live: live.clone(),
                routes: Vec::new(),
                integrations: Vec::new(),
            },
        );
        Ok(live)
    }

    async fn tag_api(&self, arn: &str, tags: &Tags) -> ProviderResult<()> {
        self.write("TagApi", arn)?;
        let mut state = lock(&self.state);
        let api = state
            .apis
            .values_mut()
            .find(|api| arn.ends_with(&format!("/apis/{}", api.live.id)))
            .ok_or_else(|| not_found("TagApi", arn))?;
        merge_tags(&mut api.live.tags, tags);
        Ok(())
    }

    async fn list_routes(&self, api_id: &str) -> ProviderResult<Vec<RouteLive>> {
        self.read("GetRoutes", api_id)?;
        lock(&self.state)
            .apis
            .get(api_id)
            .map(|api| api.routes.clone())
            .ok_or_else(|| not_found("GetRoutes", api_id))
    }

    async fn list_integrations(&self, api_id: &str) -> ProviderResult<Vec<IntegrationLive>> {
        self.read("GetIntegrations", api_id)?;
        lock(&self.state)
            .apis
            .get(api_id)
            .map(|api| api.integrations.clone())
            .ok_or_else(|| not_found("GetIntegrations", api_id))
    }

    async fn create_integration(&self, api_id: &str, function_arn: &str) -> ProviderResult<String> {
        self.write("CreateIntegration", function_arn)?;
        let mut state = lock(&self.state);
        let id = state.next_id("int");
        let api = state
            .apis
            .get_mut(api_id)
            .ok_or_else(|| not_found("CreateIntegration", api_id))?;
        api.integrations.push(IntegrationLive {
            integration_id: id.clone(),
            integration_uri: function_arn.to_string(),
        });
        Ok(id)
    }

    async fn create_route(
        &self,
        api_id: &str,
        route_key: &str,
        integration_id: &str,
    ) -> ProviderResult<String> {
        self.write("CreateRoute", route_key)?;
        let mut state = lock(&self.state);
        let id = state.next_id("route");
        let api = state
            .apis
            .get_mut(api_id)
            .ok_or_else(|| not_found("CreateRoute", api_id))?;
        if api.routes.iter().any(|route| route.route_key == route_key) {
            return Err(already_exists("CreateRoute", route_key));
        }
        api.routes.push(RouteLive {
            route_id: id.clone(),
            route_key: route_key.to_string(),
            integration_id: Some(integration_id.to_string()),
        });
        Ok(id)
    }

    async fn update_route(
        &self,
        api_id: &str,
        route_id: &str,
        integration_id: &str,
    ) -> ProviderResult<()> {
        self.write("UpdateRoute", route_id)?;
        let mut state = lock(&self.state);
        let route = state
            .apis
            .get_mut(api_id)
            .and_then(|api| api.routes.iter_mut().find(|route| route.route_id == route_id))
            .ok_or_else(|| not_found("UpdateRoute", route_id))?;
        route.integration_id = Some(integration_id.to_string());
        Ok(())
    }

    async fn delete_route(&self, api_id: &str, route_id: &str) -> ProviderResult<()> {
        self.write("DeleteRoute", route_id)?;
        let mut state = lock(&self.state);
        let api = state
            .apis
            .get_mut(api_id)
            .ok_or_else(|| not_found("DeleteRoute", api_id))?;
        api.routes.retain(|route| route.route_id != route_id);
        Ok(())
    }

    async fn delete_integration(&self, api_id: &str, integration_id: &str) -> ProviderResult<()> {
        self.write("DeleteIntegration", integration_id)?;
        let mut state = lock(&self.state);
        let api = state
            .apis
            .get_mut(api_id)
            .ok_or_else(|| not_found("DeleteIntegration", api_id))?;
        api.integrations
            .retain(|integration| integration.integration_id != integration_id);
        Ok(())
    }

    async fn delete_api(&self, api_id: &str) -> ProviderResult<()> {
        self.write("DeleteApi", api_id)?;
        lock(&self.state)
            .apis
            .remove(api_id)
            .map(|_| ())
            .ok_or_else(|| not_found("DeleteApi", api_id))
    }
}

#[async_trait]
impl LayerApi for FakeCloud {
    async fn list_layer_versions(&self, name: &str) -> ProviderResult<Vec<LayerVersion>> {
        self.read("ListLayerVersions", name)?;
        Ok(lock(&self.state).layers.get(name).cloned().unwrap_or_default())
    }

    async fn publish_layer_version(
        &self,
        name: &str,
        spec: &LayerSpec,
    ) -> ProviderResult<LayerVersion> {
        self.write("PublishLayerVersion", name)?;
        let mut state = lock(&self.state);
        let versions = state.layers.entry(name.to_string()).or_default();
        let version = versions.iter().map(|version| version.version).max().unwrap_or(0) + 1;
        let published = LayerVersion {
            layer_name: name.to_string(),
            version,
            version_arn: self.layer_arn(name, version),
            description: Some(spec.description()),
        };
        versions.push(published.clone());
        Ok(published)
    }

    async fn delete_layer_version(&self, name: &str, version: i64) -> ProviderResult<()> {
        self.write("DeleteLayerVersion", name)?;
        let mut state = lock(&self.state);
        let versions = state
            .layers
            .get_mut(name)
            .ok_or_else(|| not_found("DeleteLayerVersion", name))?;
        versions.retain(|candidate| candidate.version != version);
        Ok(())
    }
}

#[async_trait]
impl MailApi for FakeCloud {
    async fn get_email_identity(&self, domain: &str) -> ProviderResult<Option<MailIdentityLive>> {
        self.read("GetEmailIdentity", domain)?;
        Ok(lock(&self.state).identities.get(domain).cloned())
    }

    async fn create_email_identity(
        &self,
        domain: &str,
        tags: &Tags,
    ) -> ProviderResult<MailIdentityLive> {
        self.write("CreateEmailIdentity", domain)?;
        let mut state = lock(&self.state);
        if state.identities.contains_key(domain) {
            return Err(already_exists("CreateEmailIdentity", domain));
        }
        let live = MailIdentityLive {
            domain: domain.to_string(),
            arn: self.identity_arn(domain),
            verified: false,
            dkim_status: "PENDING".to_string(),
            dkim_tokens: (1..=3).map(|n| format!("{domain}-dkim{n}")).collect(),
            tags: tags.clone(),
        };
        state.identities.insert(domain.to_string(), live.clone());
        Ok(live)
    }

    async fn tag_email_identity(&self, arn: &str, tags: &Tags) -> ProviderResult<()> {
        self.write("TagEmailIdentity", arn)?;
        let mut state = lock(&self.state);
        let live = state
            .identities
            .values_mut()
            .find(|live| live.arn == arn)
            .ok_or_else(|| not_found("TagEmailIdentity", arn))?;
        merge_tags(&mut live.tags, tags);
        Ok(())
    }

    async fn delete_email_identity(&self, domain: &str) -> ProviderResult<()> {
        self.write("DeleteEmailIdentity", domain)?;
        lock(&self.state)
            .identities
            .remove(domain)
            .map(|_| ())
            .ok_or_else(|| not_found("DeleteEmailIdentity", domain))
    }
}

#[async_trait]
impl EventSourceApi for FakeCloud {
    async fn list_event_source_mappings(
        &self,
        function_name: &str,
    ) -> ProviderResult<Vec<EventSourceMapping>> {
        self.read("ListEventSourceMappings", function_name)?;
        let function_arn = self.function_arn(function_name);
        Ok(lock(&self.state)
            .mappings
            .iter()
            .filter(|mapping| mapping.function_arn == function_arn)
            .cloned()
            .collect())
    }

    async fn create_event_source_mapping(
        &self,
        spec: &EventSourceSpec,
    ) -> ProviderResult<EventSourceMapping> {
        self.write("CreateEventSourceMapping", &spec.function_name)?;
        let mut state = lock(&self.state);
        let mapping = EventSourceMapping {
            uuid: state.next_id("esm-"),
            source_arn: spec.source_arn.clone(),
            function_arn: self.function_arn(&spec.function_name),
            batch_size: spec.batch_size,
            state: "Enabled".to_string(),
        };
        state.mappings.push(mapping.clone());
        Ok(mapping)
    }

    async fn update_event_source_mapping(
        &self,
        uuid: &str,
        batch_size: u32,
        enabled: bool,
    ) -> ProviderResult<()> {
        self.write("UpdateEventSourceMapping", uuid)?;
        let mut state = lock(&self.state);
        let mapping = state
            .mappings
            .iter_mut()
            .find(|mapping| mapping.uuid == uuid)
            .ok_or_else(|| not_found("UpdateEventSourceMapping", uuid))?;
        mapping.batch_size = batch_size;
        mapping.state = if enabled { "Enabled" } else { "Disabled" }.to_string();
        Ok(())
    }

    async fn delete_event_source_mapping(&self, uuid: &str) -> ProviderResult<()> {
        self.write("DeleteEventSourceMapping", uuid)?;
        lock(&self.state).mappings.retain(|mapping| mapping.uuid != uuid);
        Ok(())
    }
}

#[async_trait]
impl TaggingApi for FakeCloud {
    async fn list_tagged_resources(
        &self,
        project: &str,
        stage: &str,
    ) -> ProviderResult<Vec<TaggedResource>> {
        self.read("GetResources", project)?;
        let state = lock(&self.state);
        let region = self.region.as_str();

        let mut tagged: Vec<TaggedResource> = Vec::new();
        tagged.extend(state.functions.values().map(|live| TaggedResource::new(live.arn.clone(), live.tags.clone())));
        tagged.extend(state.roles.values().map(|live| TaggedResource::new(live.arn.clone(), live.tags.clone())));
        tagged.extend(state.tables.values().map(|live| TaggedResource::new(live.arn.clone(), live.tags.clone())));
        tagged.extend(state.queues.values().map(|live| TaggedResource::new(live.arn.clone(), live.tags.clone())));
        tagged.extend(
            state
                .buckets
                .values()
                .filter_map(|bucket| bucket.live.as_ref())
                .map(|live| TaggedResource::new(live.arn.clone(), live.tags.clone())),
        );
        tagged.extend(
            state
                .distributions
                .values()
                .map(|distribution| TaggedResource::new(distribution.live.arn.clone(), distribution.live.tags.clone())),
        );
        tagged.extend(
            state
                .apis
                .values()
                .map(|api| TaggedResource::new(api.live.arn(region), api.live.tags.clone())),
        );
        tagged.extend(state.identities.values().map(|live| TaggedResource::new(live.arn.clone(), live.tags.clone())));

        let mut owned: Vec<TaggedResource> = tagged
            .into_iter()
            .filter(|resource| {
                resource.tags.get(TAG_PROJECT).map(String::as_str) == Some(project)
                    && resource.tags.get(TAG_STAGE).map(String::as_str) == Some(stage)
            })
            .collect();
        if let Some(versions) = state.layers.get(&layer_name(project, stage)) {
            owned.extend(synthesized_layer_resources(project, stage, versions));
        }
        Ok(owned)
    }
}

/// Fixed code per handler; handlers without an entry get a default body.
#[derive(Debug, Clone, Default)]
pub struct StaticArtifacts {
    artifacts: BTreeMap<String, Vec<u8>>,
}

impl StaticArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.artifacts.insert(handler.to_string(), bytes.into());
        self
    }
}

impl ArtifactSource for StaticArtifacts {
    fn load(&self, handler: &HandlerSpec) -> Result<CodeArtifact, DeployError> {
        let bytes = self
            .artifacts
            .get(&handler.name)
            .cloned()
            .unwrap_or_else(|| format!("bundle:{}", handler.name).into_bytes());
        Ok(CodeArtifact::new(bytes))
    }
}
