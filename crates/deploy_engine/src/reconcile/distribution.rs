use std::sync::Arc;

use async_trait::async_trait;
use deploy_core::error::{DeployError, ProviderResultExt};
use deploy_core::naming::distribution_name;
use deploy_core::resources::distribution::{diff_distribution, DistributionLive, DistributionSpec};
use deploy_core::resources::FieldChanges;
use deploy_core::tags::{ResourceType, TagContext, Tags};
use tracing::info;

use crate::ports::DistributionApi;
use crate::reconcile::Reconciler;
use crate::retry::{poll_until, PollPolicy, Readiness};

const KIND: ResourceType = ResourceType::Distribution;

pub struct DistributionReconciler {
    api: Arc<dyn DistributionApi>,
}

impl DistributionReconciler {
    pub fn new(api: Arc<dyn DistributionApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Reconciler for DistributionReconciler {
    type Spec = DistributionSpec;
    type Live = DistributionLive;
    type Diff = FieldChanges;

    const KIND: ResourceType = KIND;

    fn name(&self, ctx: &TagContext, _spec: &DistributionSpec) -> String {
        distribution_name(ctx)
    }

    async fn find(&self, name: &str) -> Result<Option<DistributionLive>, DeployError> {
        self.api.find_distribution(name).await.for_resource(KIND, name)
    }

    fn diff(
        &self,
        _name: &str,
        spec: &DistributionSpec,
        live: &DistributionLive,
    ) -> Result<FieldChanges, DeployError> {
        Ok(diff_distribution(spec, live))
    }

    async fn create(
        &self,
        name: &str,
        spec: &DistributionSpec,
        tags: &Tags,
    ) -> Result<DistributionLive, DeployError> {
        self.api
            .create_distribution(name, spec, tags)
            .await
            .for_resource(KIND, name)
    }

    /// Distribution configs are replaced whole, guarded by the live ETag.
    async fn update(
        &self,
        name: &str,
        spec: &DistributionSpec,
        live: &DistributionLive,
        _diff: &FieldChanges,
    ) -> Result<DistributionLive, DeployError> {
        self.api
            .update_distribution(live, name, spec)
            .await
            .for_resource(KIND, name)
    }

    async fn tag(&self, name: &str, live: &DistributionLive, tags: &Tags) -> Result<(), DeployError> {
        self.api
            .tag_distribution(&live.arn, tags)
            .await
            .for_resource(KIND, name)
    }

    fn identifier(&self, live: &DistributionLive) -> String {
        live.arn.clone()
    }

    fn live_tags<'a>(&self, live: &'a DistributionLive) -> &'a Tags {
        &live.tags
    }
}

/// Origin access control shared by the site bucket and its distribution.
pub async fn ensure_origin_access_control(
    api: &dyn DistributionApi,
    name: &str,
) -> Result<String, DeployError> {
    if let Some(id) = api
        .find_origin_access_control(name)
        .await
        .for_resource(KIND, name)?
    {
        return Ok(id);
    }
    let id = api
        .create_origin_access_control(name)
        .await
        .for_resource(KIND, name)?;
    info!(name, id = %id, "origin access control created");
    Ok(id)
}

/// Disable, wait for the disabled config to deploy, then delete with the
/// fresh ETag. Returns `false` when the distribution was already gone.
pub async fn delete_distribution(
    api: &dyn DistributionApi,
    id: &str,
    policy: PollPolicy,
) -> Result<bool, DeployError> {
    let Some(live) = api.get_distribution(id).await.for_resource(KIND, id)? else {
        return Ok(false);
    };
    if live.enabled {
        api.disable_distribution(&live)
            .await
            .for_resource(KIND, id)?;
    }
    let settled = poll_until(policy, KIND, id, || async move {
        let current = api
            .get_distribution(id)
            .await
            .for_resource(KIND, id)?
            .ok_or_else(|| DeployError::Failed {
                kind: KIND,
                name: id.to_string(),
                reason: "distribution disappeared while disabling".to_string(),
            })?;
        Ok(if current.is_deployed() && !current.enabled {
            Readiness::Ready(current)
        } else {
            Readiness::Pending(format!("status={} enabled={}", current.status, current.enabled))
        })
    })
    .await?;
    api.delete_distribution(id, &settled.etag)
        .await
        .for_resource(KIND, id)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::FakeCloud;
    use deploy_core::resources::distribution::CACHE_POLICY_OPTIMIZED;

    fn site_spec() -> DistributionSpec {
        DistributionSpec {
            origin_domain: "acme-dev-web-site.s3.eu-west-1.amazonaws.com".to_string(),
            origin_access_control_id: "OAC1".to_string(),
            default_root_object: "index.html".to_string(),
            cache_policy_id: CACHE_POLICY_OPTIMIZED.to_string(),
            function_associations: Vec::new(),
            aliases: Vec::new(),
            certificate_arn: None,
            error_pages: Vec::new(),
            api_origin: None,
        }
    }

    #[tokio::test]
    async fn deletion_waits_for_the_disabled_config_to_deploy() {
        let cloud = FakeCloud::new().with_settle_polls(2);
        let live = cloud
            .create_distribution("acme-dev-web", &site_spec(), &Tags::new())
            .await
            .expect("creates");
        cloud.clear_calls();

        let deleted = delete_distribution(&cloud, &live.id, PollPolicy::new(Duration::from_millis(1), 5))
            .await
            .expect("deletes");

        assert!(deleted);
        let operations: Vec<&str> = cloud.calls().iter().map(|call| call.operation).collect();
        assert_eq!(
            operations,
            vec![
                "GetDistribution",
                "DisableDistribution",
                "GetDistribution",
                "GetDistribution",
                "GetDistribution",
                "DeleteDistribution",
            ]
        );
        assert!(cloud.get_distribution(&live.id).await.expect("reads").is_none());
    }

    #[tokio::test]
    async fn deletion_times_out_while_still_propagating() {
        let cloud = FakeCloud::new().with_settle_polls(10);
        let live = cloud
            .create_distribution("acme-dev-web", &site_spec(), &Tags::new())
            .await
            .expect("creates");

        let error = delete_distribution(&cloud, &live.id, PollPolicy::new(Duration::from_millis(1), 3))
            .await
            .expect_err("should time out");

        assert!(matches!(error, DeployError::Timeout { attempts: 3, .. }));
        assert!(cloud.calls_to("DeleteDistribution").is_empty());
    }

    #[tokio::test]
    async fn missing_distribution_is_reported_as_absent() {
        let cloud = FakeCloud::new();
        let deleted = delete_distribution(&cloud, "E404", PollPolicy::new(Duration::from_millis(1), 2))
            .await
            .expect("absent is fine");
        assert!(!deleted);
    }
}
