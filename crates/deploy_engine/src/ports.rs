//! Provider ports.
//!
//! One trait per service the engine drives. Lookups return `Ok(None)` when
//! the resource does not exist; every other failure is a classified
//! [`ProviderError`]. `deploy_aws` implements these against the AWS SDK and
//! [`crate::testing::FakeCloud`] implements them in memory.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use deploy_core::error::ProviderError;
use deploy_core::handler::{BillingMode, StreamView};
use deploy_core::inventory::TaggedResource;
use deploy_core::resources::bucket::{BucketLive, LambdaNotification};
use deploy_core::resources::distribution::{
    DistributionLive, DistributionSpec, EdgeFunctionLive, EdgeFunctionSpec, EdgeFunctionSummary,
};
use deploy_core::resources::event_source::{EventSourceMapping, EventSourceSpec};
use deploy_core::resources::function::{CodeArtifact, FunctionConfig, FunctionLive, FunctionSpec};
use deploy_core::resources::layer::{LayerSpec, LayerVersion};
use deploy_core::resources::mail::MailIdentityLive;
use deploy_core::resources::queue::QueueLive;
use deploy_core::resources::role::RoleLive;
use deploy_core::resources::route::{ApiLive, IntegrationLive, RouteLive};
use deploy_core::resources::table::{TableLive, TableSpec};
use deploy_core::tags::Tags;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Grant letting a service principal invoke a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokePermission {
    pub statement_id: String,
    pub principal: String,
    pub source_arn: String,
}

#[async_trait]
pub trait FunctionApi: Send + Sync {
    async fn get_function(&self, name: &str) -> ProviderResult<Option<FunctionLive>>;
    async fn create_function(
        &self,
        name: &str,
        spec: &FunctionSpec,
        tags: &Tags,
    ) -> ProviderResult<FunctionLive>;
    async fn update_function_code(&self, name: &str, code: &CodeArtifact) -> ProviderResult<()>;
    async fn update_function_configuration(
        &self,
        name: &str,
        config: &FunctionConfig,
    ) -> ProviderResult<()>;
    async fn tag_function(&self, arn: &str, tags: &Tags) -> ProviderResult<()>;
    async fn delete_function(&self, name: &str) -> ProviderResult<()>;
    /// Statement ids in the function's resource policy.
    async fn list_permission_ids(&self, name: &str) -> ProviderResult<Vec<String>>;
    async fn add_permission(&self, name: &str, permission: &InvokePermission) -> ProviderResult<()>;
}

#[async_trait]
pub trait RoleApi: Send + Sync {
    /// Role with its inline policy document, URL-decoded.
    async fn get_role(&self, name: &str, policy_name: &str) -> ProviderResult<Option<RoleLive>>;
    async fn create_role(
        &self,
        name: &str,
        trust_policy: &str,
        tags: &Tags,
    ) -> ProviderResult<RoleLive>;
    async fn put_role_policy(
        &self,
        role: &str,
        policy_name: &str,
        document: &str,
    ) -> ProviderResult<()>;
    async fn tag_role(&self, name: &str, tags: &Tags) -> ProviderResult<()>;
    /// Deletes inline policies first, then the role.
    async fn delete_role(&self, name: &str) -> ProviderResult<()>;
}

#[async_trait]
pub trait TableApi: Send + Sync {
    async fn describe_table(&self, name: &str) -> ProviderResult<Option<TableLive>>;
    async fn create_table(&self, name: &str, spec: &TableSpec, tags: &Tags)
        -> ProviderResult<TableLive>;
    async fn update_billing_mode(&self, name: &str, mode: BillingMode) -> ProviderResult<()>;
    /// `None` disables the stream.
    async fn update_stream(&self, name: &str, view: Option<StreamView>) -> ProviderResult<()>;
    async fn tag_table(&self, arn: &str, tags: &Tags) -> ProviderResult<()>;
    async fn delete_table(&self, name: &str) -> ProviderResult<()>;
}

#[async_trait]
pub trait QueueApi: Send + Sync {
    async fn get_queue(&self, name: &str) -> ProviderResult<Option<QueueLive>>;
    async fn create_queue(
        &self,
        name: &str,
        attributes: &BTreeMap<String, String>,
        tags: &Tags,
    ) -> ProviderResult<QueueLive>;
    async fn set_queue_attributes(
        &self,
        url: &str,
        attributes: &BTreeMap<String, String>,
    ) -> ProviderResult<()>;
    async fn tag_queue(&self, url: &str, tags: &Tags) -> ProviderResult<()>;
    async fn delete_queue(&self, url: &str) -> ProviderResult<()>;
}

#[async_trait]
pub trait BucketApi: Send + Sync {
    async fn head_bucket(&self, name: &str) -> ProviderResult<Option<BucketLive>>;
    async fn create_bucket(
        &self,
        name: &str,
        region: Option<&str>,
        tags: &Tags,
    ) -> ProviderResult<BucketLive>;
    async fn tag_bucket(&self, name: &str, tags: &Tags) -> ProviderResult<()>;
    async fn get_notifications(&self, name: &str) -> ProviderResult<Vec<LambdaNotification>>;
    /// Replaces the bucket's whole Lambda notification configuration.
    async fn put_notifications(
        &self,
        name: &str,
        notifications: &[LambdaNotification],
    ) -> ProviderResult<()>;
    async fn get_bucket_policy(&self, name: &str) -> ProviderResult<Option<String>>;
    async fn put_bucket_policy(&self, name: &str, policy: &str) -> ProviderResult<()>;
    async fn get_object(&self, bucket: &str, key: &str) -> ProviderResult<Option<Vec<u8>>>;
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> ProviderResult<()>;
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> ProviderResult<()>;
    /// Empties the bucket, then deletes it.
    async fn delete_bucket(&self, name: &str) -> ProviderResult<()>;
}

#[async_trait]
pub trait DistributionApi: Send + Sync {
    /// Looks a distribution up by the name recorded in its comment.
    async fn find_distribution(&self, name: &str) -> ProviderResult<Option<DistributionLive>>;
    async fn get_distribution(&self, id: &str) -> ProviderResult<Option<DistributionLive>>;
    async fn create_distribution(
        &self,
        name: &str,
        spec: &DistributionSpec,
        tags: &Tags,
    ) -> ProviderResult<DistributionLive>;
    async fn update_distribution(
        &self,
        live: &DistributionLive,
        name: &str,
        spec: &DistributionSpec,
    ) -> ProviderResult<DistributionLive>;
    async fn tag_distribution(&self, arn: &str, tags: &Tags) -> ProviderResult<()>;
    async fn disable_distribution(&self, live: &DistributionLive) -> ProviderResult<()>;
    async fn delete_distribution(&self, id: &str, etag: &str) -> ProviderResult<()>;
    async fn find_origin_access_control(&self, name: &str) -> ProviderResult<Option<String>>;
    async fn create_origin_access_control(&self, name: &str) -> ProviderResult<String>;
    async fn describe_edge_function(&self, name: &str) -> ProviderResult<Option<EdgeFunctionLive>>;
    async fn create_edge_function(
        &self,
        name: &str,
        spec: &EdgeFunctionSpec,
    ) -> ProviderResult<EdgeFunctionLive>;
    async fn update_edge_function(
        &self,
        live: &EdgeFunctionLive,
        spec: &EdgeFunctionSpec,
    ) -> ProviderResult<EdgeFunctionLive>;
    async fn publish_edge_function(&self, name: &str, etag: &str) -> ProviderResult<()>;
    async fn list_edge_functions(&self, prefix: &str) -> ProviderResult<Vec<EdgeFunctionSummary>>;
    async fn delete_edge_function(&self, name: &str) -> ProviderResult<()>;
}

#[async_trait]
pub trait RouteApi: Send + Sync {
    async fn find_api(&self, name: &str) -> ProviderResult<Option<ApiLive>>;
    async fn create_api(&self, name: &str, tags: &Tags) -> ProviderResult<ApiLive>;
    async fn tag_api(&self, arn: &str, tags: &Tags) -> ProviderResult<()>;
    async fn list_routes(&self, api_id: &str) -> ProviderResult<Vec<RouteLive>>;
    async fn list_integrations(&self, api_id: &str) -> ProviderResult<Vec<IntegrationLive>>;
    async fn create_integration(&self, api_id: &str, function_arn: &str) -> ProviderResult<String>;
    async fn create_route(
        &self,
        api_id: &str,
        route_key: &str,
        integration_id: &str,
    ) -> ProviderResult<String>;
    async fn update_route(
        &self,
        api_id: &str,
        route_id: &str,
        integration_id: &str,
    ) -> ProviderResult<()>;
    async fn delete_route(&self, api_id: &str, route_id: &str) -> ProviderResult<()>;
    async fn delete_integration(&self, api_id: &str, integration_id: &str) -> ProviderResult<()>;
    async fn delete_api(&self, api_id: &str) -> ProviderResult<()>;
}

#[async_trait]
pub trait LayerApi: Send + Sync {
    async fn list_layer_versions(&self, name: &str) -> ProviderResult<Vec<LayerVersion>>;
    async fn publish_layer_version(&self, name: &str, spec: &LayerSpec)
        -> ProviderResult<LayerVersion>;
    async fn delete_layer_version(&self, name: &str, version: i64) -> ProviderResult<()>;
}

#[async_trait]
pub trait MailApi: Send + Sync {
    async fn get_email_identity(&self, domain: &str) -> ProviderResult<Option<MailIdentityLive>>;
    async fn create_email_identity(
        &self,
        domain: &str,
        tags: &Tags,
    ) -> ProviderResult<MailIdentityLive>;
    async fn tag_email_identity(&self, arn: &str, tags: &Tags) -> ProviderResult<()>;
    async fn delete_email_identity(&self, domain: &str) -> ProviderResult<()>;
}

#[async_trait]
pub trait EventSourceApi: Send + Sync {
    async fn list_event_source_mappings(
        &self,
        function_name: &str,
    ) -> ProviderResult<Vec<EventSourceMapping>>;
    async fn create_event_source_mapping(
        &self,
        spec: &EventSourceSpec,
    ) -> ProviderResult<EventSourceMapping>;
    async fn update_event_source_mapping(
        &self,
        uuid: &str,
        batch_size: u32,
        enabled: bool,
    ) -> ProviderResult<()>;
    async fn delete_event_source_mapping(&self, uuid: &str) -> ProviderResult<()>;
}

#[async_trait]
pub trait TaggingApi: Send + Sync {
    /// Every resource tagged with this project and stage.
    async fn list_tagged_resources(
        &self,
        project: &str,
        stage: &str,
    ) -> ProviderResult<Vec<TaggedResource>>;
}

/// Implemented by any type that serves every port.
pub trait CloudApi:
    FunctionApi
    + RoleApi
    + TableApi
    + QueueApi
    + BucketApi
    + DistributionApi
    + RouteApi
    + LayerApi
    + MailApi
    + EventSourceApi
    + TaggingApi
{
}

impl<T> CloudApi for T where
    T: FunctionApi
        + RoleApi
        + TableApi
        + QueueApi
        + BucketApi
        + DistributionApi
        + RouteApi
        + LayerApi
        + MailApi
        + EventSourceApi
        + TaggingApi
{
}

/// Handles to every port plus the account coordinates some ARNs need.
#[derive(Clone)]
pub struct Provider {
    pub region: String,
    pub account_id: String,
    pub functions: Arc<dyn FunctionApi>,
    pub roles: Arc<dyn RoleApi>,
    pub tables: Arc<dyn TableApi>,
    pub queues: Arc<dyn QueueApi>,
    pub buckets: Arc<dyn BucketApi>,
    pub distributions: Arc<dyn DistributionApi>,
    pub routes: Arc<dyn RouteApi>,
    pub layers: Arc<dyn LayerApi>,
    pub mail: Arc<dyn MailApi>,
    pub event_sources: Arc<dyn EventSourceApi>,
    pub tagging: Arc<dyn TaggingApi>,
}

impl Provider {
    pub fn from_cloud<T: CloudApi + 'static>(
        region: impl Into<String>,
        account_id: impl Into<String>,
        cloud: Arc<T>,
    ) -> Self {
        Self {
            region: region.into(),
            account_id: account_id.into(),
            functions: cloud.clone(),
            roles: cloud.clone(),
            tables: cloud.clone(),
            queues: cloud.clone(),
            buckets: cloud.clone(),
            distributions: cloud.clone(),
            routes: cloud.clone(),
            layers: cloud.clone(),
            mail: cloud.clone(),
            event_sources: cloud.clone(),
            tagging: cloud,
        }
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("region", &self.region)
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}
