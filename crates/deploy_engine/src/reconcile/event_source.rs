use deploy_core::error::{DeployError, ProviderResultExt};
use deploy_core::outcome::DeploymentStatus;
use deploy_core::resources::event_source::{diff_event_source, EventSourceSpec};
use deploy_core::resources::ChangeSet;
use deploy_core::tags::ResourceType;
use tracing::info;

use crate::ports::EventSourceApi;

const KIND: ResourceType = ResourceType::Function;

/// Bind a stream or queue to its consumer function.
pub async fn ensure_event_source(
    api: &dyn EventSourceApi,
    spec: &EventSourceSpec,
) -> Result<DeploymentStatus, DeployError> {
    let name = spec.function_name.as_str();
    let mappings = api
        .list_event_source_mappings(name)
        .await
        .for_resource(KIND, name)?;

    let Some(mapping) = mappings
        .iter()
        .find(|mapping| mapping.source_arn == spec.source_arn)
    else {
        api.create_event_source_mapping(spec)
            .await
            .for_resource(KIND, name)?;
        info!(function = name, source = %spec.source_arn, status = "created", "event source bound");
        return Ok(DeploymentStatus::Created);
    };

    if diff_event_source(spec, mapping).is_empty() {
        return Ok(DeploymentStatus::Unchanged);
    }
    api.update_event_source_mapping(&mapping.uuid, spec.batch_size, true)
        .await
        .for_resource(KIND, name)?;
    info!(function = name, source = %spec.source_arn, status = "updated", "event source bound");
    Ok(DeploymentStatus::Updated)
}

/// Remove every mapping feeding `function_name`.
pub async fn delete_event_sources(
    api: &dyn EventSourceApi,
    function_name: &str,
) -> Result<usize, DeployError> {
    let mappings = api
        .list_event_source_mappings(function_name)
        .await
        .for_resource(KIND, function_name)?;
    for mapping in &mappings {
        api.delete_event_source_mapping(&mapping.uuid)
            .await
            .for_resource(KIND, function_name)?;
    }
    Ok(mappings.len())
}
