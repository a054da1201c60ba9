use std::sync::Arc;

use async_trait::async_trait;
use deploy_core::error::{DeployError, ProviderResultExt};
use deploy_core::naming::{bucket_name, site_bucket_name};
use deploy_core::resources::bucket::{diff_bucket, BucketLive, BucketSpec};
use deploy_core::resources::site::{plan_sync, SiteFile, SiteManifest, SITE_MANIFEST_KEY};
use deploy_core::resources::NoChanges;
use deploy_core::tags::{ResourceType, TagContext, Tags};
use tracing::info;

use crate::ports::BucketApi;
use crate::reconcile::Reconciler;

const KIND: ResourceType = ResourceType::Bucket;

pub struct BucketReconciler {
    api: Arc<dyn BucketApi>,
}

impl BucketReconciler {
    pub fn new(api: Arc<dyn BucketApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Reconciler for BucketReconciler {
    type Spec = BucketSpec;
    type Live = BucketLive;
    type Diff = NoChanges;

    const KIND: ResourceType = KIND;

    fn name(&self, ctx: &TagContext, spec: &BucketSpec) -> String {
        if spec.site {
            site_bucket_name(ctx)
        } else {
            bucket_name(ctx)
        }
    }

    async fn find(&self, name: &str) -> Result<Option<BucketLive>, DeployError> {
        self.api.head_bucket(name).await.for_resource(KIND, name)
    }

    fn diff(&self, _name: &str, spec: &BucketSpec, live: &BucketLive) -> Result<NoChanges, DeployError> {
        Ok(diff_bucket(spec, live))
    }

    async fn create(&self, name: &str, spec: &BucketSpec, tags: &Tags) -> Result<BucketLive, DeployError> {
        self.api
            .create_bucket(name, spec.region.as_deref(), tags)
            .await
            .for_resource(KIND, name)
    }

    async fn update(
        &self,
        _name: &str,
        _spec: &BucketSpec,
        live: &BucketLive,
        _diff: &NoChanges,
    ) -> Result<BucketLive, DeployError> {
        Ok(live.clone())
    }

    async fn tag(&self, name: &str, _live: &BucketLive, tags: &Tags) -> Result<(), DeployError> {
        self.api.tag_bucket(name, tags).await.for_resource(KIND, name)
    }

    fn identifier(&self, live: &BucketLive) -> String {
        live.arn.clone()
    }

    fn live_tags<'a>(&self, live: &'a BucketLive) -> &'a Tags {
        &live.tags
    }
}

/// Counts from one site upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub uploaded: usize,
    pub deleted: usize,
}

impl SyncStats {
    pub fn changed(&self) -> bool {
        self.uploaded > 0 || self.deleted > 0
    }
}

/// Upload changed files, delete removed ones, and record the new manifest.
pub async fn sync_site_files(
    api: &dyn BucketApi,
    bucket: &str,
    files: &[SiteFile],
) -> Result<SyncStats, DeployError> {
    let local = SiteManifest::from_files(files);
    let remote = api
        .get_object(bucket, SITE_MANIFEST_KEY)
        .await
        .for_resource(KIND, bucket)?
        .and_then(|raw| SiteManifest::parse(&raw));
    let plan = plan_sync(&local, remote.as_ref());
    if plan.is_empty() {
        return Ok(SyncStats::default());
    }

    for file in files.iter().filter(|file| plan.upload.contains(&file.key)) {
        api.put_object(bucket, &file.key, &file.body, file.content_type)
            .await
            .for_resource(KIND, bucket)?;
    }
    if !plan.delete.is_empty() {
        api.delete_objects(bucket, &plan.delete)
            .await
            .for_resource(KIND, bucket)?;
    }
    api.put_object(bucket, SITE_MANIFEST_KEY, &local.to_bytes()?, "application/json")
        .await
        .for_resource(KIND, bucket)?;

    let stats = SyncStats {
        uploaded: plan.upload.len(),
        deleted: plan.delete.len(),
    };
    info!(bucket, uploaded = stats.uploaded, deleted = stats.deleted, "site files synced");
    Ok(stats)
}
