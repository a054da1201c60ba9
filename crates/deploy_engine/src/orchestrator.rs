//! Project-level deployment: shared resources first, then every handler
//! through a bounded pool, then pruning of what no handler declares anymore.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use deploy_core::config::DeployConfig;
use deploy_core::error::DeployError;
use deploy_core::handler::{DeploymentManifest, HandlerKind, HandlerSpec};
use deploy_core::naming::edge_function_name;
use deploy_core::outcome::{DeploymentStatus, HandlerFailure, HandlerOutcome, ProjectSummary};
use deploy_core::resolver::NameMaps;
use deploy_core::resources::route::ApiLive;
use deploy_core::tags::{TagContext, SHARED_HANDLER};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::artifacts::ArtifactSource;
use crate::layer_builder::{ensure_layer, LayerSettings};
use crate::pipeline::{deploy_handler, DeployContext};
use crate::ports::Provider;
use crate::reconcile::api::ApiReconciler;
use crate::reconcile::edge_function::prune_edge_functions;
use crate::reconcile::ensure;
use crate::reconcile::route::prune_routes;

/// Whether any handler needs the project HTTP API.
pub fn needs_api(handlers: &[HandlerSpec]) -> bool {
    handlers.iter().any(|handler| match &handler.kind {
        HandlerKind::Http { .. } => true,
        HandlerKind::Site { api_proxy, .. } => *api_proxy,
        _ => false,
    })
}

/// Route keys declared by the manifest; anything else on the API is stale.
pub fn declared_route_keys(handlers: &[HandlerSpec]) -> BTreeSet<String> {
    handlers.iter().filter_map(HandlerSpec::route_key).collect()
}

pub fn declared_edge_functions(project: &str, stage: &str, handlers: &[HandlerSpec]) -> Vec<String> {
    handlers
        .iter()
        .filter(|handler| matches!(handler.kind, HandlerKind::Site { .. }))
        .map(|handler| edge_function_name(&TagContext::new(project, stage, &handler.name)))
        .collect()
}

/// Deploy a whole manifest.
///
/// Shared resources (dependency package, HTTP API) are preconditions: a
/// failure there aborts before any handler runs. Past that point a handler
/// failure is recorded in the summary and never cancels its siblings.
pub async fn deploy_project(
    provider: Provider,
    config: DeployConfig,
    manifest: &DeploymentManifest,
    artifacts: Arc<dyn ArtifactSource>,
) -> Result<ProjectSummary, DeployError> {
    config.validate()?;
    manifest.validate()?;
    let started = Instant::now();
    let project = manifest.project.as_str();
    let stage = manifest.stage.as_str();
    info!(project, stage, handlers = manifest.handlers.len(), concurrency = config.concurrency, "deployment started");

    let mut shared = HandlerOutcome::new(SHARED_HANDLER);

    let mut layer_arn = None;
    if let Some(dir) = &manifest.project_dir {
        let settings = LayerSettings {
            runtime: config.runtime.clone(),
            keep_versions: config.layer_keep_versions,
        };
        if let Some(layer) =
            ensure_layer(provider.layers.as_ref(), project, stage, dir, &settings).await?
        {
            layer_arn = Some(layer.manifest.arn.clone());
            shared.push(layer.result);
        }
    }

    let api: Option<ApiLive> = if needs_api(&manifest.handlers) {
        let reconciler = ApiReconciler::new(provider.routes.clone(), provider.region.clone());
        let reconciled = ensure(&reconciler, &TagContext::shared(project, stage), &()).await?;
        shared.endpoint = Some(reconciled.live.endpoint.clone());
        shared.push(reconciled.result);
        Some(reconciled.live)
    } else {
        None
    };

    let ctx = DeployContext {
        provider: provider.clone(),
        names: NameMaps::from_handlers(project, stage, &manifest.handlers),
        project: project.to_string(),
        stage: stage.to_string(),
        layer_arn,
        api: api.clone(),
        project_dir: manifest.project_dir.clone(),
        artifacts,
        config: config.clone(),
    };

    let mut results: Vec<(usize, Result<HandlerOutcome, HandlerFailure>)> =
        stream::iter(manifest.handlers.iter().enumerate())
            .map(|(index, handler)| {
                let ctx = &ctx;
                async move { (index, deploy_handler(ctx, handler).await) }
            })
            .buffer_unordered(config.concurrency)
            .collect()
            .await;
    results.sort_by_key(|(index, _)| *index);

    let mut summary = ProjectSummary {
        project: project.to_string(),
        stage: stage.to_string(),
        ..ProjectSummary::default()
    };
    if !shared.results.is_empty() {
        summary.outcomes.push(shared);
    }
    for (_, result) in results {
        match result {
            Ok(outcome) => summary.outcomes.push(outcome),
            Err(failure) => summary.failures.push(failure),
        }
    }

    if let Some(api) = &api {
        let active = declared_route_keys(&manifest.handlers);
        match prune_routes(provider.routes.as_ref(), api, &active).await {
            Ok(pruned) => summary.pruned_routes = pruned,
            Err(error) => warn!(project, stage, error = %error, "route pruning skipped"),
        }
    }
    let active = declared_edge_functions(project, stage, &manifest.handlers);
    match prune_edge_functions(provider.distributions.as_ref(), project, stage, &active).await {
        Ok(pruned) => summary.pruned_edge_functions = pruned,
        Err(error) => warn!(project, stage, error = %error, "edge function pruning skipped"),
    }

    summary.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let counts = summary.status_counts();
    info!(
        project,
        stage,
        created = counts.get(&DeploymentStatus::Created).copied().unwrap_or(0),
        updated = counts.get(&DeploymentStatus::Updated).copied().unwrap_or(0),
        unchanged = counts.get(&DeploymentStatus::Unchanged).copied().unwrap_or(0),
        failed = summary.failures.len(),
        elapsed_ms = summary.elapsed_ms,
        "deployment finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deploy_core::handler::FunctionSettings;

    fn handler(name: &str, kind: HandlerKind) -> HandlerSpec {
        HandlerSpec {
            name: name.to_string(),
            kind,
            deps: Vec::new(),
            params: Vec::new(),
            permissions: Vec::new(),
            function: FunctionSettings::default(),
        }
    }

    fn site(name: &str, api_proxy: bool) -> HandlerSpec {
        handler(
            name,
            HandlerKind::Site {
                dir: "public".into(),
                index: "index.html".to_string(),
                spa: false,
                aliases: Vec::new(),
                certificate_arn: None,
                api_proxy,
            },
        )
    }

    fn http(name: &str, method: &str, path: &str) -> HandlerSpec {
        handler(
            name,
            HandlerKind::Http {
                method: method.to_string(),
                path: path.to_string(),
            },
        )
    }

    #[test]
    fn api_is_needed_for_http_handlers_and_proxying_sites() {
        assert!(!needs_api(&[site("web", false)]));
        assert!(needs_api(&[site("web", true)]));
        assert!(needs_api(&[http("a", "get", "/a")]));
    }

    #[test]
    fn declared_sets_come_from_the_manifest() {
        let handlers = [
            http("a", "get", "/a"),
            http("b", "POST", "/b"),
            site("web", false),
        ];

        let routes = declared_route_keys(&handlers);
        assert_eq!(
            routes.into_iter().collect::<Vec<_>>(),
            vec!["GET /a".to_string(), "POST /b".to_string()]
        );
        assert_eq!(
            declared_edge_functions("acme", "dev", &handlers),
            vec!["acme-dev-web-viewer-req".to_string()]
        );
    }
}
