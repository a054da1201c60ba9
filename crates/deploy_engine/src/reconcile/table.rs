use std::sync::Arc;

use async_trait::async_trait;
use deploy_core::error::{DeployError, ProviderResultExt};
use deploy_core::naming::table_name;
use deploy_core::resources::table::{
    diff_table, StreamChange, TableDiff, TableLive, TableSpec, TableStatus,
};
use deploy_core::tags::{ResourceType, TagContext, Tags};

use crate::ports::TableApi;
use crate::reconcile::Reconciler;
use crate::retry::{poll_until, PollPolicy, Readiness};

const KIND: ResourceType = ResourceType::Table;

pub struct TableReconciler {
    api: Arc<dyn TableApi>,
    policy: PollPolicy,
}

impl TableReconciler {
    pub fn new(api: Arc<dyn TableApi>, policy: PollPolicy) -> Self {
        Self { api, policy }
    }

    pub async fn wait_until_active(&self, name: &str) -> Result<TableLive, DeployError> {
        poll_until(self.policy, KIND, name, || async move {
            let live = self
                .api
                .describe_table(name)
                .await
                .for_resource(KIND, name)?
                .ok_or_else(|| DeployError::Failed {
                    kind: KIND,
                    name: name.to_string(),
                    reason: "table disappeared while settling".to_string(),
                })?;
            Ok(match live.status {
                TableStatus::Active => Readiness::Ready(live),
                status => Readiness::Pending(format!("{status:?}")),
            })
        })
        .await
    }
}

#[async_trait]
impl Reconciler for TableReconciler {
    type Spec = TableSpec;
    type Live = TableLive;
    type Diff = TableDiff;

    const KIND: ResourceType = KIND;

    fn name(&self, ctx: &TagContext, _spec: &TableSpec) -> String {
        table_name(ctx)
    }

    async fn find(&self, name: &str) -> Result<Option<TableLive>, DeployError> {
        self.api.describe_table(name).await.for_resource(KIND, name)
    }

    /// Tables cannot be re-keyed, so a key schema change is rejected.
    fn diff(&self, name: &str, spec: &TableSpec, live: &TableLive) -> Result<TableDiff, DeployError> {
        let diff = diff_table(spec, live);
        if diff.key_schema_mismatch {
            return Err(DeployError::validation(format!(
                "Table '{name}' key schema differs from the deployed table; tables cannot be re-keyed"
            )));
        }
        Ok(diff)
    }

    async fn create(&self, name: &str, spec: &TableSpec, tags: &Tags) -> Result<TableLive, DeployError> {
        self.api
            .create_table(name, spec, tags)
            .await
            .for_resource(KIND, name)?;
        self.wait_until_active(name).await
    }

    async fn update(
        &self,
        name: &str,
        _spec: &TableSpec,
        _live: &TableLive,
        diff: &TableDiff,
    ) -> Result<TableLive, DeployError> {
        if let Some(mode) = diff.billing {
            self.api
                .update_billing_mode(name, mode)
                .await
                .for_resource(KIND, name)?;
            self.wait_until_active(name).await?;
        }
        match diff.stream {
            StreamChange::Unchanged => {}
            StreamChange::Enable(view) => {
                self.api
                    .update_stream(name, Some(view))
                    .await
                    .for_resource(KIND, name)?;
            }
            StreamChange::Disable => {
                self.api
                    .update_stream(name, None)
                    .await
                    .for_resource(KIND, name)?;
            }
            StreamChange::Replace(view) => {
                self.api
                    .update_stream(name, None)
                    .await
                    .for_resource(KIND, name)?;
                self.wait_until_active(name).await?;
                self.api
                    .update_stream(name, Some(view))
                    .await
                    .for_resource(KIND, name)?;
            }
        }
        self.wait_until_active(name).await
    }

    async fn tag(&self, name: &str, live: &TableLive, tags: &Tags) -> Result<(), DeployError> {
        self.api
            .tag_table(&live.arn, tags)
            .await
            .for_resource(KIND, name)
    }

    fn identifier(&self, live: &TableLive) -> String {
        live.arn.clone()
    }

    fn live_tags<'a>(&self, live: &'a TableLive) -> &'a Tags {
        &live.tags
    }
}
