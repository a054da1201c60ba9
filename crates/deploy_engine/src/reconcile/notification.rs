use deploy_core::error::{DeployError, ProviderResultExt};
use deploy_core::outcome::DeploymentStatus;
use deploy_core::resources::bucket::{bucket_arn, diff_notification, LambdaNotification};
use deploy_core::resources::ChangeSet;
use deploy_core::tags::ResourceType;
use tracing::info;

use crate::ports::{BucketApi, FunctionApi, InvokePermission};
use crate::reconcile::function::ensure_invoke_permission;

const KIND: ResourceType = ResourceType::Bucket;
pub const S3_PRINCIPAL: &str = "s3.amazonaws.com";

/// Let the bucket invoke the function, then wire the notification. Other
/// notifications on the bucket are preserved.
pub async fn ensure_bucket_notification(
    buckets: &dyn BucketApi,
    functions: &dyn FunctionApi,
    bucket: &str,
    function_name: &str,
    desired: &LambdaNotification,
) -> Result<DeploymentStatus, DeployError> {
    let granted = ensure_invoke_permission(
        functions,
        function_name,
        &InvokePermission {
            statement_id: format!("{bucket}-s3-invoke"),
            principal: S3_PRINCIPAL.to_string(),
            source_arn: bucket_arn(bucket),
        },
    )
    .await?;

    let current = buckets
        .get_notifications(bucket)
        .await
        .for_resource(KIND, bucket)?;
    let changes = diff_notification(desired, &current);
    if changes.is_empty() {
        return Ok(if granted {
            DeploymentStatus::Updated
        } else {
            DeploymentStatus::Unchanged
        });
    }

    let existed = current.iter().any(|notification| notification.id == desired.id);
    let mut merged: Vec<LambdaNotification> = current
        .into_iter()
        .filter(|notification| notification.id != desired.id)
        .collect();
    merged.push(desired.clone());
    buckets
        .put_notifications(bucket, &merged)
        .await
        .for_resource(KIND, bucket)?;

    let status = if existed {
        DeploymentStatus::Updated
    } else {
        DeploymentStatus::Created
    };
    info!(bucket, function = function_name, status = %status, changed = %changes.changed_fields().join(","), "bucket notification reconciled");
    Ok(status)
}
