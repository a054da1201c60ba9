//! Inventory by ownership tags.
//!
//! The tagging API covers most services but not IAM, and only sees
//! CloudFront from `us-east-1`. Roles are listed by name prefix and filtered
//! on their own tags; layer versions cannot be tagged and are synthesized.

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_resourcegroupstagging::types::TagFilter;
use aws_sdk_resourcegroupstagging::Client as TaggingClient;
use deploy_core::inventory::{synthesized_layer_resources, TaggedResource};
use deploy_core::naming::layer_name;
use deploy_core::tags::{Tags, TAG_PROJECT, TAG_STAGE};
use deploy_engine::ports::{LayerApi, ProviderResult, TaggingApi};
use tracing::debug;

use crate::error::classify;
use crate::provider::{AwsCloud, GLOBAL_REGION};

const CLOUDFRONT_ARN_PREFIX: &str = "arn:aws:cloudfront::";

fn owned_by(tags: &Tags, project: &str, stage: &str) -> bool {
    tags.get(TAG_PROJECT).map(String::as_str) == Some(project)
        && tags.get(TAG_STAGE).map(String::as_str) == Some(stage)
}

async fn tagged_in(
    client: &TaggingClient,
    project: &str,
    stage: &str,
) -> ProviderResult<Vec<TaggedResource>> {
    let mut found = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let output = client
            .get_resources()
            .tag_filters(TagFilter::builder().key(TAG_PROJECT).values(project).build())
            .tag_filters(TagFilter::builder().key(TAG_STAGE).values(stage).build())
            .set_pagination_token(token.take())
            .send()
            .await
            .map_err(|error| classify("GetResources", error))?;
        found.extend(output.resource_tag_mapping_list().iter().filter_map(|mapping| {
            let arn = mapping.resource_arn()?;
            let tags = mapping
                .tags()
                .iter()
                .map(|tag| (tag.key().to_string(), tag.value().to_string()))
                .collect();
            Some(TaggedResource::new(arn, tags))
        }));
        match output.pagination_token() {
            Some(next) if !next.is_empty() => token = Some(next.to_string()),
            _ => break,
        }
    }
    Ok(found)
}

impl AwsCloud {
    async fn tagged_roles(&self, project: &str, stage: &str) -> ProviderResult<Vec<TaggedResource>> {
        let mut roles = Vec::new();
        for (name, arn) in self
            .role_names_with_prefix(&format!("{project}-{stage}-"))
            .await?
        {
            let tags = self.role_tags(&name).await?;
            if owned_by(&tags, project, stage) {
                roles.push(TaggedResource::new(arn, tags));
            }
        }
        Ok(roles)
    }
}

#[async_trait]
impl TaggingApi for AwsCloud {
    async fn list_tagged_resources(
        &self,
        project: &str,
        stage: &str,
    ) -> ProviderResult<Vec<TaggedResource>> {
        let mut found = tagged_in(&self.tagging, project, stage).await?;
        if self.region != GLOBAL_REGION {
            // Only the global services; anything else there belongs to a
            // deployment in another region.
            let global = tagged_in(&self.global_tagging, project, stage).await?;
            found.extend(
                global
                    .into_iter()
                    .filter(|resource| resource.arn.starts_with(CLOUDFRONT_ARN_PREFIX)),
            );
        }
        found.extend(self.tagged_roles(project, stage).await?);

        let versions = self.list_layer_versions(&layer_name(project, stage)).await?;
        found.extend(synthesized_layer_resources(project, stage, &versions));

        // One entry per ARN.
        let unique: BTreeMap<String, TaggedResource> = found
            .into_iter()
            .map(|resource| (resource.arn.clone(), resource))
            .collect();
        debug!(project, stage, resources = unique.len(), "tag inventory");
        Ok(unique.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_requires_project_and_stage() {
        let tags: Tags = [
            (TAG_PROJECT.to_string(), "acme".to_string()),
            (TAG_STAGE.to_string(), "dev".to_string()),
        ]
        .into_iter()
        .collect();
        assert!(owned_by(&tags, "acme", "dev"));
        assert!(!owned_by(&tags, "acme", "prod"));
        assert!(!owned_by(&Tags::new(), "acme", "dev"));
    }
}
