use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deploy_core::error::{DeployError, ProviderResultExt};
use deploy_core::naming::{inline_policy_name, role_name};
use deploy_core::permissions::INLINE_POLICY_SIZE_LIMIT;
use deploy_core::resources::role::{diff_role, RoleLive, RoleSpec};
use deploy_core::resources::FieldChanges;
use deploy_core::tags::{ResourceType, TagContext, Tags};
use tracing::{debug, warn};

use crate::ports::RoleApi;
use crate::reconcile::Reconciler;

const KIND: ResourceType = ResourceType::Role;

pub struct RoleReconciler {
    api: Arc<dyn RoleApi>,
    settle_delay: Duration,
}

impl RoleReconciler {
    pub fn new(api: Arc<dyn RoleApi>, settle_delay: Duration) -> Self {
        Self { api, settle_delay }
    }

    async fn put_policy(&self, name: &str, spec: &RoleSpec) -> Result<String, DeployError> {
        let document = spec.policy_document();
        if spec.exceeds_inline_limit() {
            warn!(
                role = name,
                size = document.len(),
                limit = INLINE_POLICY_SIZE_LIMIT,
                "inline policy exceeds the provider size limit"
            );
        }
        self.api
            .put_role_policy(name, &inline_policy_name(name), &document)
            .await
            .for_resource(KIND, name)?;
        Ok(document)
    }
}

#[async_trait]
impl Reconciler for RoleReconciler {
    type Spec = RoleSpec;
    type Live = RoleLive;
    type Diff = FieldChanges;

    const KIND: ResourceType = KIND;

    fn name(&self, ctx: &TagContext, _spec: &RoleSpec) -> String {
        role_name(ctx)
    }

    async fn find(&self, name: &str) -> Result<Option<RoleLive>, DeployError> {
        self.api
            .get_role(name, &inline_policy_name(name))
            .await
            .for_resource(KIND, name)
    }

    fn diff(&self, _name: &str, spec: &RoleSpec, live: &RoleLive) -> Result<FieldChanges, DeployError> {
        Ok(diff_role(spec, live))
    }

    async fn create(&self, name: &str, spec: &RoleSpec, tags: &Tags) -> Result<RoleLive, DeployError> {
        let mut live = self
            .api
            .create_role(name, spec.trust_policy(), tags)
            .await
            .for_resource(KIND, name)?;
        live.inline_policy = Some(self.put_policy(name, spec).await?);
        // New roles take a while to become assumable by the function service.
        if !self.settle_delay.is_zero() {
            debug!(role = name, delay_ms = self.settle_delay.as_millis() as u64, "waiting for role to propagate");
            tokio::time::sleep(self.settle_delay).await;
        }
        Ok(live)
    }

    async fn update(
        &self,
        name: &str,
        spec: &RoleSpec,
        live: &RoleLive,
        _diff: &FieldChanges,
    ) -> Result<RoleLive, DeployError> {
        let document = self.put_policy(name, spec).await?;
        Ok(RoleLive {
            inline_policy: Some(document),
            ..live.clone()
        })
    }

    async fn tag(&self, name: &str, _live: &RoleLive, tags: &Tags) -> Result<(), DeployError> {
        self.api.tag_role(name, tags).await.for_resource(KIND, name)
    }

    fn identifier(&self, live: &RoleLive) -> String {
        live.arn.clone()
    }

    fn live_tags<'a>(&self, live: &'a RoleLive) -> &'a Tags {
        &live.tags
    }
}
