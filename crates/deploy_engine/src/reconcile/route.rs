//! Routes on the project API, keyed by `"{METHOD} {path}"`.

use std::collections::BTreeSet;

use deploy_core::error::{DeployError, ProviderResultExt};
use deploy_core::outcome::{DeploymentResult, DeploymentStatus};
use deploy_core::resources::route::{diff_route, ApiLive, IntegrationLive, RouteSpec};
use deploy_core::resources::ChangeSet;
use deploy_core::tags::ResourceType;
use tracing::{debug, info, warn};

use crate::ports::RouteApi;

const KIND: ResourceType = ResourceType::RouteCollection;

/// Integration for `function_arn`, reusing an existing one when present.
async fn integration_for(
    api: &dyn RouteApi,
    api_id: &str,
    integrations: &[IntegrationLive],
    function_arn: &str,
) -> Result<String, DeployError> {
    if let Some(existing) = integrations
        .iter()
        .find(|integration| integration.integration_uri == function_arn)
    {
        return Ok(existing.integration_id.clone());
    }
    api.create_integration(api_id, function_arn)
        .await
        .for_resource(KIND, function_arn)
}

pub async fn ensure_route(
    api: &dyn RouteApi,
    collection: &ApiLive,
    spec: &RouteSpec,
) -> Result<DeploymentResult, DeployError> {
    let key = spec.route_key.as_str();
    let routes = api.list_routes(&collection.id).await.for_resource(KIND, key)?;
    let integrations = api
        .list_integrations(&collection.id)
        .await
        .for_resource(KIND, key)?;

    let identifier = format!("{}:{key}", collection.id);
    match routes.iter().find(|route| route.route_key == spec.route_key) {
        None => {
            let integration_id =
                integration_for(api, &collection.id, &integrations, &spec.function_arn).await?;
            api.create_route(&collection.id, key, &integration_id)
                .await
                .for_resource(KIND, key)?;
            info!(route = key, status = "created", "route reconciled");
            Ok(DeploymentResult::new(KIND, key, identifier, DeploymentStatus::Created))
        }
        Some(route) if diff_route(spec, route, &integrations).is_empty() => Ok(
            DeploymentResult::new(KIND, key, identifier, DeploymentStatus::Unchanged),
        ),
        Some(route) => {
            let integration_id =
                integration_for(api, &collection.id, &integrations, &spec.function_arn).await?;
            api.update_route(&collection.id, &route.route_id, &integration_id)
                .await
                .for_resource(KIND, key)?;
            info!(route = key, status = "updated", "route target changed");
            Ok(DeploymentResult::new(KIND, key, identifier, DeploymentStatus::Updated))
        }
    }
}

/// Delete routes whose key is not declared by any handler, then the
/// integrations no remaining route targets. Failures are logged and skipped.
pub async fn prune_routes(
    api: &dyn RouteApi,
    collection: &ApiLive,
    active: &BTreeSet<String>,
) -> Result<Vec<String>, DeployError> {
    let routes = api
        .list_routes(&collection.id)
        .await
        .for_resource(KIND, &collection.name)?;

    let mut pruned = Vec::new();
    let mut referenced: BTreeSet<String> = BTreeSet::new();
    for route in routes {
        if active.contains(&route.route_key) {
            referenced.extend(route.integration_id);
            continue;
        }
        match api.delete_route(&collection.id, &route.route_id).await {
            Ok(()) => {
                info!(route = %route.route_key, "pruned stale route");
                pruned.push(route.route_key);
            }
            Err(error) => {
                warn!(route = %route.route_key, error = %error, "failed to prune route");
                referenced.extend(route.integration_id);
            }
        }
    }

    let integrations = api
        .list_integrations(&collection.id)
        .await
        .for_resource(KIND, &collection.name)?;
    for integration in integrations
        .iter()
        .filter(|integration| !referenced.contains(&integration.integration_id))
    {
        let id = integration.integration_id.as_str();
        match api.delete_integration(&collection.id, id).await {
            Ok(()) => debug!(integration = id, uri = %integration.integration_uri, "pruned unused integration"),
            Err(error) => warn!(integration = id, error = %error, "failed to prune integration"),
        }
    }
    Ok(pruned)
}
