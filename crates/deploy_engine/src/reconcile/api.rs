use std::sync::Arc;

use async_trait::async_trait;
use deploy_core::error::{DeployError, ProviderResultExt};
use deploy_core::naming::api_name;
use deploy_core::resources::route::ApiLive;
use deploy_core::resources::NoChanges;
use deploy_core::tags::{ResourceType, TagContext, Tags};

use crate::ports::RouteApi;
use crate::reconcile::Reconciler;

const KIND: ResourceType = ResourceType::RouteCollection;

/// The project-wide HTTP API. Reconciled under the shared handler context.
pub struct ApiReconciler {
    api: Arc<dyn RouteApi>,
    region: String,
}

impl ApiReconciler {
    pub fn new(api: Arc<dyn RouteApi>, region: impl Into<String>) -> Self {
        Self {
            api,
            region: region.into(),
        }
    }
}

#[async_trait]
impl Reconciler for ApiReconciler {
    type Spec = ();
    type Live = ApiLive;
    type Diff = NoChanges;

    const KIND: ResourceType = KIND;

    fn name(&self, ctx: &TagContext, _spec: &()) -> String {
        api_name(&ctx.project, &ctx.stage)
    }

    async fn find(&self, name: &str) -> Result<Option<ApiLive>, DeployError> {
        self.api.find_api(name).await.for_resource(KIND, name)
    }

    fn diff(&self, _name: &str, _spec: &(), _live: &ApiLive) -> Result<NoChanges, DeployError> {
        Ok(NoChanges)
    }

    async fn create(&self, name: &str, _spec: &(), tags: &Tags) -> Result<ApiLive, DeployError> {
        self.api.create_api(name, tags).await.for_resource(KIND, name)
    }

    async fn update(
        &self,
        _name: &str,
        _spec: &(),
        live: &ApiLive,
        _diff: &NoChanges,
    ) -> Result<ApiLive, DeployError> {
        Ok(live.clone())
    }

    async fn tag(&self, name: &str, live: &ApiLive, tags: &Tags) -> Result<(), DeployError> {
        self.api
            .tag_api(&live.arn(&self.region), tags)
            .await
            .for_resource(KIND, name)
    }

    fn identifier(&self, live: &ApiLive) -> String {
        live.arn(&self.region)
    }

    fn live_tags<'a>(&self, live: &'a ApiLive) -> &'a Tags {
        &live.tags
    }
}
