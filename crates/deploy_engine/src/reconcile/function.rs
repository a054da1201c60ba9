use std::sync::Arc;

use async_trait::async_trait;
use deploy_core::error::{DeployError, ErrorKind, ProviderResultExt};
use deploy_core::naming::function_name;
use deploy_core::resources::function::{diff_function, FunctionDiff, FunctionLive, FunctionSpec};
use deploy_core::tags::{ResourceType, TagContext, Tags};
use tracing::debug;

use crate::ports::{FunctionApi, InvokePermission};
use crate::reconcile::Reconciler;
use crate::retry::{is_role_not_ready, is_transient, poll_until, retry_while, PollPolicy, Readiness};

const KIND: ResourceType = ResourceType::Function;

pub struct FunctionReconciler {
    api: Arc<dyn FunctionApi>,
    policy: PollPolicy,
}

impl FunctionReconciler {
    pub fn new(api: Arc<dyn FunctionApi>, policy: PollPolicy) -> Self {
        Self { api, policy }
    }

    /// Wait until the function is active and no update is in flight. A
    /// failed state is fatal.
    pub async fn wait_until_settled(&self, name: &str) -> Result<FunctionLive, DeployError> {
        poll_until(self.policy, KIND, name, || async move {
            let live = self
                .api
                .get_function(name)
                .await
                .for_resource(KIND, name)?
                .ok_or_else(|| DeployError::Failed {
                    kind: KIND,
                    name: name.to_string(),
                    reason: "function disappeared while settling".to_string(),
                })?;
            if live.is_failed() {
                return Err(DeployError::Failed {
                    kind: KIND,
                    name: name.to_string(),
                    reason: live
                        .state_reason
                        .clone()
                        .unwrap_or_else(|| live.describe_state()),
                });
            }
            Ok(if live.is_settled() {
                Readiness::Ready(live)
            } else {
                Readiness::Pending(live.describe_state())
            })
        })
        .await
    }

    async fn update_configuration(&self, name: &str, spec: &FunctionSpec) -> Result<(), DeployError> {
        match self
            .api
            .update_function_configuration(name, &spec.config)
            .await
        {
            Err(error) if error.kind == ErrorKind::Conflict => {
                debug!(name, "configuration update conflicted; waiting for prior update");
                self.wait_until_settled(name).await?;
                self.api
                    .update_function_configuration(name, &spec.config)
                    .await
                    .for_resource(KIND, name)
            }
            other => other.for_resource(KIND, name),
        }
    }
}

#[async_trait]
impl Reconciler for FunctionReconciler {
    type Spec = FunctionSpec;
    type Live = FunctionLive;
    type Diff = FunctionDiff;

    const KIND: ResourceType = KIND;

    fn name(&self, ctx: &TagContext, _spec: &FunctionSpec) -> String {
        function_name(ctx)
    }

    async fn find(&self, name: &str) -> Result<Option<FunctionLive>, DeployError> {
        self.api.get_function(name).await.for_resource(KIND, name)
    }

    fn diff(
        &self,
        _name: &str,
        spec: &FunctionSpec,
        live: &FunctionLive,
    ) -> Result<FunctionDiff, DeployError> {
        Ok(diff_function(spec, live))
    }

    async fn create(
        &self,
        name: &str,
        spec: &FunctionSpec,
        tags: &Tags,
    ) -> Result<FunctionLive, DeployError> {
        let retryable = |error: &DeployError| is_role_not_ready(error) || is_transient(error);
        retry_while(self.policy, retryable, || async move {
            self.api
                .create_function(name, spec, tags)
                .await
                .for_resource(KIND, name)
        })
        .await?;
        self.wait_until_settled(name).await
    }

    async fn update(
        &self,
        name: &str,
        spec: &FunctionSpec,
        _live: &FunctionLive,
        diff: &FunctionDiff,
    ) -> Result<FunctionLive, DeployError> {
        if diff.code {
            self.api
                .update_function_code(name, &spec.code)
                .await
                .for_resource(KIND, name)?;
            if diff.config_changed() {
                self.wait_until_settled(name).await?;
            }
        }
        if diff.config_changed() {
            self.update_configuration(name, spec).await?;
        }
        self.wait_until_settled(name).await
    }

    async fn tag(&self, name: &str, live: &FunctionLive, tags: &Tags) -> Result<(), DeployError> {
        self.api
            .tag_function(&live.arn, tags)
            .await
            .for_resource(KIND, name)
    }

    fn identifier(&self, live: &FunctionLive) -> String {
        live.arn.clone()
    }

    fn live_tags<'a>(&self, live: &'a FunctionLive) -> &'a Tags {
        &live.tags
    }
}

/// Grant a service principal invoke rights unless the statement is already
/// present. Returns whether a grant was added.
pub async fn ensure_invoke_permission(
    api: &dyn FunctionApi,
    function_name: &str,
    permission: &InvokePermission,
) -> Result<bool, DeployError> {
    let existing = api
        .list_permission_ids(function_name)
        .await
        .for_resource(KIND, function_name)?;
    if existing.iter().any(|id| *id == permission.statement_id) {
        return Ok(false);
    }
    match api.add_permission(function_name, permission).await {
        Ok(()) => Ok(true),
        Err(error) if error.is_already_exists() => {
            debug!(function = function_name, statement = %permission.statement_id, "invoke permission already present");
            Ok(false)
        }
        Err(error) => Err(DeployError::provider(KIND, function_name, error)),
    }
}
