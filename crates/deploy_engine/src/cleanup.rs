//! Tag-driven teardown.
//!
//! Resources are discovered through their ownership tags, ordered so that
//! consumers go before what they consume and roles go last, and deleted one
//! at a time. A failed deletion is recorded and the pass continues.

use std::collections::BTreeSet;

use deploy_core::arn::split_layer_version;
use deploy_core::config::DeployConfig;
use deploy_core::error::{DeployError, ErrorKind, ProviderError, ProviderResultExt};
use deploy_core::inventory::{
    deletion_order, find_orphans, resources_for_handler, summarize, HandlerInventory,
    TaggedResource,
};
use deploy_core::naming::{edge_function_name, role_name_for_function};
use deploy_core::outcome::{CleanupFailure, CleanupReport};
use deploy_core::tags::{ResourceType, TagContext, SHARED_HANDLER, TAG_PROJECT, TAG_STAGE};
use tracing::{debug, info, warn};

use crate::ports::Provider;
use crate::reconcile::distribution::delete_distribution;
use crate::reconcile::event_source::delete_event_sources;
use crate::retry::{is_transient, retry_while, PollPolicy};

/// Which owned resources a cleanup run targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupScope {
    /// Everything tagged with the project and stage.
    All,
    /// Resources of one handler.
    Handler(String),
    /// Resources whose handler is not among the declared ones.
    Orphaned { declared: Vec<String> },
}

/// Poll budgets for teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupPolicy {
    /// Retries of throttled or conflicting deletions.
    pub retry: PollPolicy,
    /// Disabling a distribution before deleting it.
    pub distribution: PollPolicy,
}

impl CleanupPolicy {
    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            retry: PollPolicy::from_config(config),
            distribution: PollPolicy::for_distributions(config),
        }
    }

    pub fn uniform(policy: PollPolicy) -> Self {
        Self {
            retry: policy,
            distribution: policy,
        }
    }
}

enum Deletion {
    Deleted,
    Absent,
}

/// Inventory filtered to `scope`, in deletion order.
pub async fn plan_cleanup(
    provider: &Provider,
    project: &str,
    stage: &str,
    scope: &CleanupScope,
) -> Result<Vec<TaggedResource>, DeployError> {
    let inventory = provider
        .tagging
        .list_tagged_resources(project, stage)
        .await
        .for_resource(ResourceType::RouteCollection, project)?;

    let selected = match scope {
        CleanupScope::All => inventory,
        CleanupScope::Handler(handler) => resources_for_handler(&inventory, handler),
        CleanupScope::Orphaned { declared } => {
            let mut keep = declared.clone();
            keep.push(SHARED_HANDLER.to_string());
            find_orphans(&inventory, &keep)
                .into_iter()
                .map(|candidate| candidate.resource)
                .collect()
        }
    };
    Ok(deletion_order(&selected))
}

/// Plan and, unless `dry_run`, delete.
pub async fn cleanup(
    provider: &Provider,
    policy: CleanupPolicy,
    project: &str,
    stage: &str,
    scope: &CleanupScope,
    dry_run: bool,
) -> Result<CleanupReport, DeployError> {
    let plan = plan_cleanup(provider, project, stage, scope).await?;
    info!(project, stage, scope = ?scope, resources = plan.len(), dry_run, "cleanup planned");
    if dry_run {
        return Ok(CleanupReport {
            deleted: plan.into_iter().map(|resource| resource.arn).collect(),
            dry_run: true,
            ..CleanupReport::default()
        });
    }
    Ok(delete_resources(provider, policy, &plan).await)
}

/// Delete `resources` in type order, then the derived resources that tags
/// cannot reach: the role of every deleted function and the edge function of
/// every deleted distribution.
pub async fn delete_resources(
    provider: &Provider,
    policy: CleanupPolicy,
    resources: &[TaggedResource],
) -> CleanupReport {
    let mut report = CleanupReport::default();
    let mut deleted_functions: Vec<String> = Vec::new();
    let mut deleted_roles: BTreeSet<String> = BTreeSet::new();
    let mut deleted_sites: Vec<TagContext> = Vec::new();

    for resource in deletion_order(resources) {
        let (Some(kind), Some(id)) = (resource.resource_type(), resource.resource_id()) else {
            warn!(arn = %resource.arn, "unknown resource kind; skipping");
            report.skipped.push(resource.arn.clone());
            continue;
        };

        let attempt = retry_while(policy.retry, is_transient, || {
            delete_one(provider, policy.distribution, kind, &id)
        });
        match attempt.await {
            Ok(Deletion::Deleted) => {
                info!(kind = %kind, arn = %resource.arn, "deleted");
                match kind {
                    ResourceType::Function => deleted_functions.push(id),
                    ResourceType::Role => {
                        deleted_roles.insert(id);
                    }
                    ResourceType::Distribution => {
                        if let Some(site) = owner_context(&resource) {
                            deleted_sites.push(site);
                        }
                    }
                    _ => {}
                }
                report.deleted.push(resource.arn);
            }
            Ok(Deletion::Absent) => {
                debug!(kind = %kind, arn = %resource.arn, "already gone");
                report.skipped.push(resource.arn);
            }
            Err(error) => {
                warn!(kind = %kind, arn = %resource.arn, error = %error, "deletion failed");
                report.failed.push(CleanupFailure {
                    arn: resource.arn,
                    message: error.to_string(),
                });
            }
        }
    }

    for function in &deleted_functions {
        let role = role_name_for_function(function);
        if deleted_roles.contains(&role) {
            continue;
        }
        let arn = format!("arn:aws:iam::{}:role/{role}", provider.account_id);
        match absent_is_ok(provider.roles.delete_role(&role).await) {
            Ok(Deletion::Deleted) => {
                info!(role = %role, "deleted derived role");
                report.deleted.push(arn);
            }
            Ok(Deletion::Absent) => report.skipped.push(arn),
            Err(error) => {
                warn!(role = %role, error = %error, "derived role deletion failed");
                report.failed.push(CleanupFailure {
                    arn,
                    message: error.to_string(),
                });
            }
        }
    }

    for site in &deleted_sites {
        let name = edge_function_name(site);
        let arn = format!("arn:aws:cloudfront::{}:function/{name}", provider.account_id);
        match absent_is_ok(provider.distributions.delete_edge_function(&name).await) {
            Ok(Deletion::Deleted) => {
                info!(name = %name, "deleted edge function");
                report.deleted.push(arn);
            }
            Ok(Deletion::Absent) => report.skipped.push(arn),
            Err(error) => {
                warn!(name = %name, error = %error, "edge function deletion failed");
                report.failed.push(CleanupFailure {
                    arn,
                    message: error.to_string(),
                });
            }
        }
    }

    info!(
        deleted = report.deleted.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "cleanup finished"
    );
    report
}

fn owner_context(resource: &TaggedResource) -> Option<TagContext> {
    Some(TagContext::new(
        resource.tags.get(TAG_PROJECT)?,
        resource.tags.get(TAG_STAGE)?,
        resource.handler()?,
    ))
}

fn absent_is_ok(result: Result<(), ProviderError>) -> Result<Deletion, ProviderError> {
    match result {
        Ok(()) => Ok(Deletion::Deleted),
        Err(error) if error.is_not_found() => Ok(Deletion::Absent),
        Err(error) => Err(error),
    }
}

async fn delete_one(
    provider: &Provider,
    distribution_policy: PollPolicy,
    kind: ResourceType,
    id: &str,
) -> Result<Deletion, DeployError> {
    let deletion = match kind {
        ResourceType::Function => {
            match delete_event_sources(provider.event_sources.as_ref(), id).await {
                Ok(0) => {}
                Ok(unbound) => debug!(function = id, mappings = unbound, "event sources removed"),
                Err(error) if error.provider_kind() == Some(ErrorKind::NotFound) => {}
                Err(error) => return Err(error),
            }
            absent_is_ok(provider.functions.delete_function(id).await)
        }
        ResourceType::RouteCollection => absent_is_ok(provider.routes.delete_api(id).await),
        ResourceType::Distribution => {
            let deleted =
                delete_distribution(provider.distributions.as_ref(), id, distribution_policy)
                    .await?;
            return Ok(if deleted {
                Deletion::Deleted
            } else {
                Deletion::Absent
            });
        }
        ResourceType::Queue => {
            let Some(queue) = provider.queues.get_queue(id).await.for_resource(kind, id)? else {
                return Ok(Deletion::Absent);
            };
            absent_is_ok(provider.queues.delete_queue(&queue.url).await)
        }
        ResourceType::MailIdentity => {
            absent_is_ok(provider.mail.delete_email_identity(id).await)
        }
        ResourceType::Table => absent_is_ok(provider.tables.delete_table(id).await),
        ResourceType::Bucket => absent_is_ok(provider.buckets.delete_bucket(id).await),
        ResourceType::DependencyPackage => {
            let Some((name, version)) = split_layer_version(id) else {
                return Err(DeployError::validation(format!(
                    "'{id}' is not a layer version"
                )));
            };
            absent_is_ok(provider.layers.delete_layer_version(name, version).await)
        }
        ResourceType::Role => absent_is_ok(provider.roles.delete_role(id).await),
    };
    deletion.for_resource(kind, id)
}

/// Per-handler inventory with orphan flags, for status output.
pub async fn status(
    provider: &Provider,
    project: &str,
    stage: &str,
    declared: &[String],
) -> Result<Vec<HandlerInventory>, DeployError> {
    let inventory = provider
        .tagging
        .list_tagged_resources(project, stage)
        .await
        .for_resource(ResourceType::RouteCollection, project)?;
    let mut current = declared.to_vec();
    current.push(SHARED_HANDLER.to_string());
    Ok(summarize(&inventory, &current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCloud;
    use deploy_core::tags::Tags;
    use std::time::Duration;

    fn policy() -> CleanupPolicy {
        CleanupPolicy::uniform(PollPolicy::new(Duration::from_millis(1), 5))
    }

    #[tokio::test]
    async fn unknown_kinds_are_skipped() {
        let (_cloud, provider) = FakeCloud::new().into_provider();
        let stray = TaggedResource::new(
            "arn:aws:sns:eu-west-1:1:topic",
            Tags::from([("type".to_string(), "topic".to_string())]),
        );

        let report = delete_resources(&provider, policy(), &[stray]).await;

        assert_eq!(report.skipped, vec!["arn:aws:sns:eu-west-1:1:topic".to_string()]);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn failure_is_recorded_and_the_pass_continues() {
        let cloud = FakeCloud::new();
        cloud.insert_role(
            "acme-dev-a-role",
            TagContext::new("acme", "dev", "a").tags(ResourceType::Role),
        );
        cloud.insert_role(
            "acme-dev-b-role",
            TagContext::new("acme", "dev", "b").tags(ResourceType::Role),
        );
        cloud.fail_for(
            "DeleteRole",
            "acme-dev-a-role",
            ProviderError::new(ErrorKind::PermissionDenied, "DeleteRole", "denied"),
        );
        let (cloud, provider) = cloud.into_provider();

        let report = cleanup(&provider, policy(), "acme", "dev", &CleanupScope::All, false)
            .await
            .expect("inventory lists");

        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].arn.ends_with("role/acme-dev-a-role"));
        assert_eq!(report.deleted.len(), 1);
        assert!(cloud.role("acme-dev-b-role").is_none());
    }

    #[tokio::test]
    async fn throttled_deletions_are_retried() {
        let cloud = FakeCloud::new();
        cloud.insert_role(
            "acme-dev-a-role",
            TagContext::new("acme", "dev", "a").tags(ResourceType::Role),
        );
        cloud.fail_once(
            "DeleteRole",
            ProviderError::new(ErrorKind::Throttled, "DeleteRole", "rate exceeded"),
        );
        let (cloud, provider) = cloud.into_provider();

        let report = cleanup(&provider, policy(), "acme", "dev", &CleanupScope::All, false)
            .await
            .expect("inventory lists");

        assert!(report.is_success());
        assert_eq!(cloud.calls_to("DeleteRole").len(), 2);
        assert!(cloud.role("acme-dev-a-role").is_none());
    }

    #[tokio::test]
    async fn dry_run_plans_without_deleting() {
        let cloud = FakeCloud::new();
        cloud.insert_role(
            "acme-dev-a-role",
            TagContext::new("acme", "dev", "a").tags(ResourceType::Role),
        );
        let (cloud, provider) = cloud.into_provider();

        let report = cleanup(&provider, policy(), "acme", "dev", &CleanupScope::All, true)
            .await
            .expect("plans");

        assert!(report.dry_run);
        assert_eq!(report.deleted.len(), 1);
        assert!(cloud.role("acme-dev-a-role").is_some());
        assert!(cloud.mutating_calls().is_empty());
    }
}
