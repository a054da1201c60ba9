use std::sync::Arc;

use async_trait::async_trait;
use deploy_core::error::{DeployError, ProviderResultExt};
use deploy_core::resources::mail::{diff_mail_identity, MailIdentityLive, MailIdentitySpec};
use deploy_core::resources::NoChanges;
use deploy_core::tags::{ResourceType, TagContext, Tags};

use crate::ports::MailApi;
use crate::reconcile::Reconciler;

const KIND: ResourceType = ResourceType::MailIdentity;

pub struct MailReconciler {
    api: Arc<dyn MailApi>,
}

impl MailReconciler {
    pub fn new(api: Arc<dyn MailApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Reconciler for MailReconciler {
    type Spec = MailIdentitySpec;
    type Live = MailIdentityLive;
    type Diff = NoChanges;

    const KIND: ResourceType = KIND;

    /// Identities are named by the domain they send for.
    fn name(&self, _ctx: &TagContext, spec: &MailIdentitySpec) -> String {
        spec.domain.clone()
    }

    async fn find(&self, name: &str) -> Result<Option<MailIdentityLive>, DeployError> {
        self.api.get_email_identity(name).await.for_resource(KIND, name)
    }

    fn diff(
        &self,
        _name: &str,
        spec: &MailIdentitySpec,
        live: &MailIdentityLive,
    ) -> Result<NoChanges, DeployError> {
        Ok(diff_mail_identity(spec, live))
    }

    async fn create(
        &self,
        name: &str,
        _spec: &MailIdentitySpec,
        tags: &Tags,
    ) -> Result<MailIdentityLive, DeployError> {
        self.api
            .create_email_identity(name, tags)
            .await
            .for_resource(KIND, name)
    }

    async fn update(
        &self,
        _name: &str,
        _spec: &MailIdentitySpec,
        live: &MailIdentityLive,
        _diff: &NoChanges,
    ) -> Result<MailIdentityLive, DeployError> {
        Ok(live.clone())
    }

    async fn tag(&self, name: &str, live: &MailIdentityLive, tags: &Tags) -> Result<(), DeployError> {
        self.api
            .tag_email_identity(&live.arn, tags)
            .await
            .for_resource(KIND, name)
    }

    fn identifier(&self, live: &MailIdentityLive) -> String {
        live.arn.clone()
    }

    fn live_tags<'a>(&self, live: &'a MailIdentityLive) -> &'a Tags {
        &live.tags
    }
}
