//! Viewer-request edge functions. These cannot carry tags; they are found by
//! their deterministic name, and their comment records the owning project,
//! stage and handler so pruning never reaches another stage that happens to
//! share the name prefix.

use deploy_core::error::{DeployError, ProviderResultExt};
use deploy_core::naming::{edge_function_prefix, EDGE_FUNCTION_SUFFIX};
use deploy_core::outcome::{DeploymentResult, DeploymentStatus};
use deploy_core::resources::distribution::{diff_edge_function, EdgeFunctionSpec};
use deploy_core::resources::ChangeSet;
use deploy_core::tags::ResourceType;
use tracing::{info, warn};

use crate::ports::DistributionApi;

const KIND: ResourceType = ResourceType::Distribution;

/// Create or update the function, publishing to LIVE after any change.
pub async fn ensure_edge_function(
    api: &dyn DistributionApi,
    name: &str,
    spec: &EdgeFunctionSpec,
) -> Result<DeploymentResult, DeployError> {
    let (live, status) = match api.describe_edge_function(name).await.for_resource(KIND, name)? {
        None => {
            let live = api
                .create_edge_function(name, spec)
                .await
                .for_resource(KIND, name)?;
            (live, DeploymentStatus::Created)
        }
        Some(live) if diff_edge_function(spec, &live).is_empty() => {
            return Ok(DeploymentResult::new(KIND, name, live.arn, DeploymentStatus::Unchanged));
        }
        Some(live) => {
            let live = api
                .update_edge_function(&live, spec)
                .await
                .for_resource(KIND, name)?;
            (live, DeploymentStatus::Updated)
        }
    };
    api.publish_edge_function(name, &live.etag)
        .await
        .for_resource(KIND, name)?;
    info!(name, status = %status, "edge function published");
    Ok(DeploymentResult::new(KIND, name, live.arn, status))
}

/// Delete the edge functions owned by this project and stage that no
/// declared site uses.
/// Failures are logged and skipped.
pub async fn prune_edge_functions(
    api: &dyn DistributionApi,
    project: &str,
    stage: &str,
    active: &[String],
) -> Result<Vec<String>, DeployError> {
    let prefix = edge_function_prefix(project, stage);
    let existing = api
        .list_edge_functions(&prefix)
        .await
        .for_resource(KIND, &prefix)?;

    let mut pruned = Vec::new();
    for summary in existing {
        let owned = summary
            .owner()
            .is_some_and(|owner| owner.project == project && owner.stage == stage);
        let name = summary.name;
        if !owned || !name.ends_with(EDGE_FUNCTION_SUFFIX) || active.contains(&name) {
            continue;
        }
        match api.delete_edge_function(&name).await {
            Ok(()) => {
                info!(name = %name, "pruned unused edge function");
                pruned.push(name);
            }
            Err(error) => warn!(name = %name, error = %error, "failed to prune edge function"),
        }
    }
    Ok(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCloud;
    use deploy_core::naming::edge_function_name;
    use deploy_core::resources::distribution::{edge_owner_comment, viewer_request_code};
    use deploy_core::tags::TagContext;

    async fn deploy_edge(cloud: &FakeCloud, ctx: &TagContext) -> String {
        let name = edge_function_name(ctx);
        let spec = EdgeFunctionSpec {
            code: viewer_request_code("index.html", false),
            comment: edge_owner_comment(ctx),
        };
        ensure_edge_function(cloud, &name, &spec)
            .await
            .expect("edge function deploys");
        name
    }

    #[tokio::test]
    async fn pruning_leaves_stages_that_share_the_name_prefix() {
        let cloud = FakeCloud::new();
        let neighbour = deploy_edge(&cloud, &TagContext::new("acme", "dev-eu", "web")).await;
        let other_project = deploy_edge(&cloud, &TagContext::new("acme-dev", "x", "web")).await;
        let stale = deploy_edge(&cloud, &TagContext::new("acme", "dev", "old")).await;

        let pruned = prune_edge_functions(&cloud, "acme", "dev", &[])
            .await
            .expect("lists");

        assert_eq!(pruned, vec![stale]);
        assert_eq!(cloud.edge_function_names(), vec![neighbour, other_project]);
    }

    #[tokio::test]
    async fn active_functions_are_kept() {
        let cloud = FakeCloud::new();
        let web = deploy_edge(&cloud, &TagContext::new("acme", "dev", "web")).await;

        let pruned = prune_edge_functions(&cloud, "acme", "dev", &[web.clone()])
            .await
            .expect("lists");

        assert!(pruned.is_empty());
        assert_eq!(cloud.edge_function_names(), vec![web]);
    }
}
