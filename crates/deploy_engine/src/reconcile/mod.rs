//! Per-kind reconcilers and the generic `ensure` driver.
//!
//! Every taggable kind implements [`Reconciler`]; [`ensure`] walks the same
//! steps for all of them: derive the name, look the resource up, create it
//! when absent, otherwise diff and apply the minimal update. Kinds that
//! cannot carry tags (routes, edge functions, event-source mappings, bucket
//! notifications) have their own `ensure_*` functions in their modules.

pub mod api;
pub mod bucket;
pub mod distribution;
pub mod edge_function;
pub mod event_source;
pub mod function;
pub mod mail;
pub mod notification;
pub mod queue;
pub mod role;
pub mod route;
pub mod table;

use async_trait::async_trait;
use deploy_core::error::{DeployError, ErrorKind};
use deploy_core::outcome::{DeploymentResult, DeploymentStatus};
use deploy_core::resources::ChangeSet;
use deploy_core::tags::{tags_satisfied, ResourceType, TagContext, Tags};
use tracing::{debug, info};

#[async_trait]
pub trait Reconciler: Send + Sync {
    type Spec: Send + Sync;
    type Live: Send + Sync;
    type Diff: ChangeSet + Send + Sync;

    const KIND: ResourceType;

    fn name(&self, ctx: &TagContext, spec: &Self::Spec) -> String;

    async fn find(&self, name: &str) -> Result<Option<Self::Live>, DeployError>;

    fn diff(&self, name: &str, spec: &Self::Spec, live: &Self::Live)
        -> Result<Self::Diff, DeployError>;

    async fn create(
        &self,
        name: &str,
        spec: &Self::Spec,
        tags: &Tags,
    ) -> Result<Self::Live, DeployError>;

    async fn update(
        &self,
        name: &str,
        spec: &Self::Spec,
        live: &Self::Live,
        diff: &Self::Diff,
    ) -> Result<Self::Live, DeployError>;

    async fn tag(&self, name: &str, live: &Self::Live, tags: &Tags) -> Result<(), DeployError>;

    /// ARN or provider id reported in the result.
    fn identifier(&self, live: &Self::Live) -> String;

    fn live_tags<'a>(&self, live: &'a Self::Live) -> &'a Tags;
}

/// A reconciled resource: what happened, and its state afterwards.
#[derive(Debug, Clone)]
pub struct Reconciled<L> {
    pub result: DeploymentResult,
    pub live: L,
}

pub async fn ensure<R: Reconciler>(
    reconciler: &R,
    ctx: &TagContext,
    spec: &R::Spec,
) -> Result<Reconciled<R::Live>, DeployError> {
    let name = reconciler.name(ctx, spec);
    let tags = ctx.tags(R::KIND);

    let live = match reconciler.find(&name).await? {
        Some(live) => live,
        None => match reconciler.create(&name, spec, &tags).await {
            Ok(live) => {
                info!(kind = %R::KIND, name = %name, handler = %ctx.handler, status = "created", "resource reconciled");
                return Ok(Reconciled {
                    result: DeploymentResult::new(
                        R::KIND,
                        &name,
                        reconciler.identifier(&live),
                        DeploymentStatus::Created,
                    ),
                    live,
                });
            }
            Err(error) if error.provider_kind() == Some(ErrorKind::AlreadyExists) => {
                debug!(kind = %R::KIND, name = %name, "create raced an existing resource");
                match reconciler.find(&name).await? {
                    Some(live) => live,
                    None => return Err(error),
                }
            }
            Err(error) => return Err(error),
        },
    };

    let diff = reconciler.diff(&name, spec, &live)?;
    if diff.is_empty() {
        sync_tags(reconciler, &name, &live, &tags).await?;
        debug!(kind = %R::KIND, name = %name, handler = %ctx.handler, status = "unchanged", "resource reconciled");
        return Ok(Reconciled {
            result: DeploymentResult::new(
                R::KIND,
                &name,
                reconciler.identifier(&live),
                DeploymentStatus::Unchanged,
            ),
            live,
        });
    }

    let changed = diff.changed_fields().join(",");
    let live = reconciler.update(&name, spec, &live, &diff).await?;
    sync_tags(reconciler, &name, &live, &tags).await?;
    info!(kind = %R::KIND, name = %name, handler = %ctx.handler, status = "updated", changed = %changed, "resource reconciled");
    Ok(Reconciled {
        result: DeploymentResult::new(
            R::KIND,
            &name,
            reconciler.identifier(&live),
            DeploymentStatus::Updated,
        ),
        live,
    })
}

/// Re-apply ownership tags only when the live set lacks one of them.
async fn sync_tags<R: Reconciler>(
    reconciler: &R,
    name: &str,
    live: &R::Live,
    tags: &Tags,
) -> Result<(), DeployError> {
    if tags_satisfied(tags, reconciler.live_tags(live)) {
        return Ok(());
    }
    debug!(kind = %R::KIND, name, "re-syncing ownership tags");
    reconciler.tag(name, live, tags).await
}
