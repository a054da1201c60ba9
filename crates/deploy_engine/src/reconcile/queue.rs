use std::sync::Arc;

use async_trait::async_trait;
use deploy_core::error::{DeployError, ProviderResultExt};
use deploy_core::naming::queue_name;
use deploy_core::resources::queue::{diff_queue, QueueDiff, QueueLive, QueueSpec};
use deploy_core::tags::{ResourceType, TagContext, Tags};

use crate::ports::QueueApi;
use crate::reconcile::Reconciler;

const KIND: ResourceType = ResourceType::Queue;

pub struct QueueReconciler {
    api: Arc<dyn QueueApi>,
}

impl QueueReconciler {
    pub fn new(api: Arc<dyn QueueApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Reconciler for QueueReconciler {
    type Spec = QueueSpec;
    type Live = QueueLive;
    type Diff = QueueDiff;

    const KIND: ResourceType = KIND;

    /// The FIFO flag is part of the name, so flipping it yields a new queue.
    fn name(&self, ctx: &TagContext, spec: &QueueSpec) -> String {
        queue_name(ctx, spec.fifo)
    }

    async fn find(&self, name: &str) -> Result<Option<QueueLive>, DeployError> {
        self.api.get_queue(name).await.for_resource(KIND, name)
    }

    fn diff(&self, _name: &str, spec: &QueueSpec, live: &QueueLive) -> Result<QueueDiff, DeployError> {
        Ok(diff_queue(spec, live))
    }

    async fn create(&self, name: &str, spec: &QueueSpec, tags: &Tags) -> Result<QueueLive, DeployError> {
        self.api
            .create_queue(name, &spec.create_attributes(), tags)
            .await
            .for_resource(KIND, name)
    }

    async fn update(
        &self,
        name: &str,
        _spec: &QueueSpec,
        live: &QueueLive,
        diff: &QueueDiff,
    ) -> Result<QueueLive, DeployError> {
        self.api
            .set_queue_attributes(&live.url, &diff.attributes)
            .await
            .for_resource(KIND, name)?;
        let mut updated = live.clone();
        updated.attributes.extend(diff.attributes.clone());
        Ok(updated)
    }

    async fn tag(&self, name: &str, live: &QueueLive, tags: &Tags) -> Result<(), DeployError> {
        self.api
            .tag_queue(&live.url, tags)
            .await
            .for_resource(KIND, name)
    }

    fn identifier(&self, live: &QueueLive) -> String {
        live.arn.clone()
    }

    fn live_tags<'a>(&self, live: &'a QueueLive) -> &'a Tags {
        &live.tags
    }
}
