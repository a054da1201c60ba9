//! Functions, layers, and event-source mappings.

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{
    Environment, EventSourcePosition, FunctionCode, FunctionConfiguration, LayerVersionContentInput,
    Runtime,
};
use deploy_core::resources::event_source::{EventSourceMapping, EventSourceSpec};
use deploy_core::resources::function::{
    CodeArtifact, FunctionConfig, FunctionLive, FunctionSpec, FunctionState, LastUpdateStatus,
};
use deploy_core::resources::layer::{LayerSpec, LayerVersion};
use deploy_core::tags::Tags;
use deploy_engine::ports::{EventSourceApi, FunctionApi, InvokePermission, LayerApi, ProviderResult};
use serde_json::Value;
use tracing::debug;

use crate::error::{absent, classify, missing_field};
use crate::provider::{as_i32, as_u32, from_hash_map, to_hash_map, AwsCloud};

const INVOKE_ACTION: &str = "lambda:InvokeFunction";

fn function_config(configuration: &FunctionConfiguration) -> FunctionConfig {
    FunctionConfig {
        entry: configuration.handler().unwrap_or_default().to_string(),
        runtime: configuration
            .runtime()
            .map(|runtime| runtime.as_str().to_string())
            .unwrap_or_default(),
        memory_mb: as_u32(configuration.memory_size()),
        timeout_secs: as_u32(configuration.timeout()),
        role_arn: configuration.role().unwrap_or_default().to_string(),
        layers: configuration
            .layers()
            .iter()
            .filter_map(|layer| layer.arn().map(ToString::to_string))
            .collect(),
        environment: configuration
            .environment()
            .and_then(|environment| environment.variables())
            .map(|variables| {
                variables
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect::<BTreeMap<_, _>>()
            })
            .unwrap_or_default(),
    }
}

fn function_live(configuration: &FunctionConfiguration, tags: Tags) -> FunctionLive {
    FunctionLive {
        arn: configuration.function_arn().unwrap_or_default().to_string(),
        code_sha256: configuration.code_sha256().unwrap_or_default().to_string(),
        config: function_config(configuration),
        state: configuration
            .state()
            .map_or(FunctionState::Pending, |state| FunctionState::parse(state.as_str())),
        last_update_status: configuration
            .last_update_status()
            .map_or(LastUpdateStatus::Successful, |status| {
                LastUpdateStatus::parse(status.as_str())
            }),
        state_reason: configuration
            .state_reason()
            .or(configuration.last_update_status_reason())
            .map(ToString::to_string),
        tags,
    }
}

fn environment(config: &FunctionConfig) -> Environment {
    Environment::builder()
        .set_variables(Some(
            config
                .environment
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ))
        .build()
}

/// Statement ids from a resource policy document.
pub fn statement_ids(policy: &str) -> Vec<String> {
    let Ok(document) = serde_json::from_str::<Value>(policy) else {
        return Vec::new();
    };
    document
        .get("Statement")
        .and_then(Value::as_array)
        .map(|statements| {
            statements
                .iter()
                .filter_map(|statement| statement.get("Sid").and_then(Value::as_str))
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl FunctionApi for AwsCloud {
    async fn get_function(&self, name: &str) -> ProviderResult<Option<FunctionLive>> {
        let output = match self.lambda.get_function().function_name(name).send().await {
            Ok(output) => output,
            Err(error) => return absent("GetFunction", error),
        };
        let Some(configuration) = output.configuration() else {
            return Err(missing_field("GetFunction", "Configuration"));
        };
        Ok(Some(function_live(configuration, from_hash_map(output.tags()))))
    }

    async fn create_function(
        &self,
        name: &str,
        spec: &FunctionSpec,
        tags: &Tags,
    ) -> ProviderResult<FunctionLive> {
        let config = &spec.config;
        let output = self
            .lambda
            .create_function()
            .function_name(name)
            .runtime(Runtime::from(config.runtime.as_str()))
            .role(&config.role_arn)
            .handler(&config.entry)
            .code(
                FunctionCode::builder()
                    .zip_file(Blob::new(spec.code.bytes.clone()))
                    .build(),
            )
            .memory_size(as_i32(config.memory_mb))
            .timeout(as_i32(config.timeout_secs))
            .set_layers(Some(config.layers.clone()))
            .environment(environment(config))
            .set_tags(Some(to_hash_map(tags)))
            .send()
            .await
            .map_err(|error| classify("CreateFunction", error))?;

        Ok(FunctionLive {
            arn: output.function_arn().unwrap_or_default().to_string(),
            code_sha256: output.code_sha256().unwrap_or_default().to_string(),
            config: config.clone(),
            state: output
                .state()
                .map_or(FunctionState::Pending, |state| FunctionState::parse(state.as_str())),
            last_update_status: LastUpdateStatus::Successful,
            state_reason: output.state_reason().map(ToString::to_string),
            tags: tags.clone(),
        })
    }

    async fn update_function_code(&self, name: &str, code: &CodeArtifact) -> ProviderResult<()> {
        self.lambda
            .update_function_code()
            .function_name(name)
            .zip_file(Blob::new(code.bytes.clone()))
            .send()
            .await
            .map_err(|error| classify("UpdateFunctionCode", error))?;
        Ok(())
    }

    async fn update_function_configuration(
        &self,
        name: &str,
        config: &FunctionConfig,
    ) -> ProviderResult<()> {
        self.lambda
            .update_function_configuration()
            .function_name(name)
            .runtime(Runtime::from(config.runtime.as_str()))
            .role(&config.role_arn)
            .handler(&config.entry)
            .memory_size(as_i32(config.memory_mb))
            .timeout(as_i32(config.timeout_secs))
            .set_layers(Some(config.layers.clone()))
            .environment(environment(config))
            .send()
            .await
            .map_err(|error| classify("UpdateFunctionConfiguration", error))?;
        Ok(())
    }

    async fn tag_function(&self, arn: &str, tags: &Tags) -> ProviderResult<()> {
        self.lambda
            .tag_resource()
            .resource(arn)
            .set_tags(Some(to_hash_map(tags)))
            .send()
            .await
            .map_err(|error| classify("TagResource", error))?;
        Ok(())
    }

    async fn delete_function(&self, name: &str) -> ProviderResult<()> {
        self.lambda
            .delete_function()
            .function_name(name)
            .send()
            .await
            .map_err(|error| classify("DeleteFunction", error))?;
        Ok(())
    }

    async fn list_permission_ids(&self, name: &str) -> ProviderResult<Vec<String>> {
        match self.lambda.get_policy().function_name(name).send().await {
            Ok(output) => Ok(output.policy().map(statement_ids).unwrap_or_default()),
            Err(error) => match classify("GetPolicy", error) {
                error if error.is_not_found() => Ok(Vec::new()),
                error => Err(error),
            },
        }
    }

    async fn add_permission(&self, name: &str, permission: &InvokePermission) -> ProviderResult<()> {
        self.lambda
            .add_permission()
            .function_name(name)
            .statement_id(&permission.statement_id)
            .action(INVOKE_ACTION)
            .principal(&permission.principal)
            .source_arn(&permission.source_arn)
            .send()
            .await
            .map_err(|error| classify("AddPermission", error))?;
        Ok(())
    }
}

#[async_trait]
impl LayerApi for AwsCloud {
    async fn list_layer_versions(&self, name: &str) -> ProviderResult<Vec<LayerVersion>> {
        let mut versions = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = match self
                .lambda
                .list_layer_versions()
                .layer_name(name)
                .set_marker(marker.take())
                .send()
                .await
            {
                Ok(output) => output,
                Err(error) => match classify("ListLayerVersions", error) {
                    error if error.is_not_found() => break,
                    error => return Err(error),
                },
            };
            versions.extend(output.layer_versions().iter().map(|item| LayerVersion {
                layer_name: name.to_string(),
                version: item.version(),
                version_arn: item.layer_version_arn().unwrap_or_default().to_string(),
                description: item.description().map(ToString::to_string),
            }));
            match output.next_marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(versions)
    }

    async fn publish_layer_version(
        &self,
        name: &str,
        spec: &LayerSpec,
    ) -> ProviderResult<LayerVersion> {
        let output = self
            .lambda
            .publish_layer_version()
            .layer_name(name)
            .description(spec.description())
            .content(
                LayerVersionContentInput::builder()
                    .zip_file(Blob::new(spec.archive.clone()))
                    .build(),
            )
            .set_compatible_runtimes(Some(
                spec.compatible_runtimes
                    .iter()
                    .map(|runtime| Runtime::from(runtime.as_str()))
                    .collect(),
            ))
            .send()
            .await
            .map_err(|error| classify("PublishLayerVersion", error))?;

        let version_arn = output
            .layer_version_arn()
            .ok_or_else(|| missing_field("PublishLayerVersion", "LayerVersionArn"))?;
        Ok(LayerVersion {
            layer_name: name.to_string(),
            version: output.version(),
            version_arn: version_arn.to_string(),
            description: output.description().map(ToString::to_string),
        })
    }

    async fn delete_layer_version(&self, name: &str, version: i64) -> ProviderResult<()> {
        self.lambda
            .delete_layer_version()
            .layer_name(name)
            .version_number(version)
            .send()
            .await
            .map_err(|error| classify("DeleteLayerVersion", error))?;
        Ok(())
    }
}

#[async_trait]
impl EventSourceApi for AwsCloud {
    async fn list_event_source_mappings(
        &self,
        function_name: &str,
    ) -> ProviderResult<Vec<EventSourceMapping>> {
        let mut mappings = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .lambda
                .list_event_source_mappings()
                .function_name(function_name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|error| classify("ListEventSourceMappings", error))?;
            mappings.extend(output.event_source_mappings().iter().map(|mapping| {
                EventSourceMapping {
                    uuid: mapping.uuid().unwrap_or_default().to_string(),
                    source_arn: mapping.event_source_arn().unwrap_or_default().to_string(),
                    function_arn: mapping.function_arn().unwrap_or_default().to_string(),
                    batch_size: as_u32(mapping.batch_size()),
                    state: mapping.state().unwrap_or_default().to_string(),
                }
            }));
            match output.next_marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(mappings)
    }

    async fn create_event_source_mapping(
        &self,
        spec: &EventSourceSpec,
    ) -> ProviderResult<EventSourceMapping> {
        let output = self
            .lambda
            .create_event_source_mapping()
            .event_source_arn(&spec.source_arn)
            .function_name(&spec.function_name)
            .batch_size(as_i32(spec.batch_size))
            .set_starting_position(
                spec.starting_position
                    .map(|position| EventSourcePosition::from(position.as_str())),
            )
            .enabled(true)
            .send()
            .await
            .map_err(|error| classify("CreateEventSourceMapping", error))?;
        let uuid = output
            .uuid()
            .ok_or_else(|| missing_field("CreateEventSourceMapping", "UUID"))?;
        debug!(uuid, source = %spec.source_arn, "event source mapping created");
        Ok(EventSourceMapping {
            uuid: uuid.to_string(),
            source_arn: spec.source_arn.clone(),
            function_arn: output.function_arn().unwrap_or_default().to_string(),
            batch_size: spec.batch_size,
            state: output.state().unwrap_or("Creating").to_string(),
        })
    }

    async fn update_event_source_mapping(
        &self,
        uuid: &str,
        batch_size: u32,
        enabled: bool,
    ) -> ProviderResult<()> {
        self.lambda
            .update_event_source_mapping()
            .uuid(uuid)
            .batch_size(as_i32(batch_size))
            .enabled(enabled)
            .send()
            .await
            .map_err(|error| classify("UpdateEventSourceMapping", error))?;
        Ok(())
    }

    async fn delete_event_source_mapping(&self, uuid: &str) -> ProviderResult<()> {
        self.lambda
            .delete_event_source_mapping()
            .uuid(uuid)
            .send()
            .await
            .map_err(|error| classify("DeleteEventSourceMapping", error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_ids_come_from_the_resource_policy() {
        let policy = r#"{"Version":"2012-10-17","Statement":[
            {"Sid":"abc123-api-invoke","Effect":"Allow"},
            {"Sid":"orders-s3-invoke","Effect":"Allow"}
        ]}"#;
        assert_eq!(
            statement_ids(policy),
            vec!["abc123-api-invoke".to_string(), "orders-s3-invoke".to_string()]
        );
        assert!(statement_ids("not json").is_empty());
    }
}
