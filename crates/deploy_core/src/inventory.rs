//! Tag-based inventory: grouping, orphan detection, and deletion ordering.
//!
//! The provider is the only source of truth. Everything here works on the
//! `(arn, tags)` pairs a tag query returns; resources without the ownership
//! tags never reach these functions.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::arn::resource_id;
use crate::resources::layer::LayerVersion;
use crate::tags::{resource_type_of, ResourceType, TagContext, Tags, TAG_HANDLER};

pub const UNKNOWN_HANDLER: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedResource {
    pub arn: String,
    pub tags: Tags,
}

impl TaggedResource {
    pub fn new(arn: impl Into<String>, tags: Tags) -> Self {
        Self {
            arn: arn.into(),
            tags,
        }
    }

    pub fn handler(&self) -> Option<&str> {
        self.tags.get(TAG_HANDLER).map(String::as_str)
    }

    pub fn resource_type(&self) -> Option<ResourceType> {
        resource_type_of(&self.tags)
    }

    /// Provider id for the delete call, when kind and ARN agree.
    pub fn resource_id(&self) -> Option<String> {
        self.resource_type()
            .and_then(|kind| resource_id(kind, &self.arn))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanCandidate {
    pub handler: Option<String>,
    pub resource: TaggedResource,
}

pub fn group_by_handler(resources: &[TaggedResource]) -> BTreeMap<String, Vec<TaggedResource>> {
    let mut groups: BTreeMap<String, Vec<TaggedResource>> = BTreeMap::new();
    for resource in resources {
        let handler = resource.handler().unwrap_or(UNKNOWN_HANDLER).to_string();
        groups.entry(handler).or_default().push(resource.clone());
    }
    groups
}

/// Resources whose `handler` tag is not among `current_handlers`. A resource
/// missing the tag cannot belong to any declared handler and is included.
pub fn find_orphans(
    resources: &[TaggedResource],
    current_handlers: &[String],
) -> Vec<OrphanCandidate> {
    let current: BTreeSet<&str> = current_handlers.iter().map(String::as_str).collect();
    resources
        .iter()
        .filter(|resource| {
            resource
                .handler()
                .map_or(true, |handler| !current.contains(handler))
        })
        .map(|resource| OrphanCandidate {
            handler: resource.handler().map(ToString::to_string),
            resource: resource.clone(),
        })
        .collect()
}

pub fn resources_for_handler(resources: &[TaggedResource], handler: &str) -> Vec<TaggedResource> {
    resources
        .iter()
        .filter(|resource| resource.handler() == Some(handler))
        .cloned()
        .collect()
}

/// Layer versions cannot carry tags. Versions of the project's deterministic
/// layer are reported with the tags they would carry as a shared resource.
pub fn synthesized_layer_resources(
    project: &str,
    stage: &str,
    versions: &[LayerVersion],
) -> Vec<TaggedResource> {
    let tags = TagContext::shared(project, stage).tags(ResourceType::DependencyPackage);
    versions
        .iter()
        .map(|version| TaggedResource::new(version.version_arn.clone(), tags.clone()))
        .collect()
}

/// Consumers first, IAM roles last.
pub fn deletion_rank(kind: Option<ResourceType>) -> u8 {
    match kind {
        Some(ResourceType::Function | ResourceType::RouteCollection) => 0,
        Some(ResourceType::Distribution) => 1,
        Some(ResourceType::Queue | ResourceType::MailIdentity) => 2,
        Some(ResourceType::Table | ResourceType::Bucket) => 3,
        Some(ResourceType::DependencyPackage) => 4,
        Some(ResourceType::Role) => 5,
        None => 6,
    }
}

/// Stable, type-ranked deletion order independent of input order within
/// different ranks; ties keep ARN order so the sequence is deterministic.
pub fn deletion_order(resources: &[TaggedResource]) -> Vec<TaggedResource> {
    let mut ordered = resources.to_vec();
    ordered.sort_by(|a, b| {
        deletion_rank(a.resource_type())
            .cmp(&deletion_rank(b.resource_type()))
            .then_with(|| a.arn.cmp(&b.arn))
    });
    ordered
}

/// Per-handler counts by resource type, for status output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerInventory {
    pub handler: String,
    pub counts: BTreeMap<String, usize>,
    pub orphaned: bool,
}

pub fn summarize(
    resources: &[TaggedResource],
    current_handlers: &[String],
) -> Vec<HandlerInventory> {
    group_by_handler(resources)
        .into_iter()
        .map(|(handler, group)| {
            let mut counts = BTreeMap::new();
            for resource in &group {
                let kind = resource
                    .resource_type()
                    .map_or(UNKNOWN_HANDLER, ResourceType::as_str);
                *counts.entry(kind.to_string()).or_insert(0) += 1;
            }
            let orphaned = !current_handlers.contains(&handler);
            HandlerInventory {
                handler,
                counts,
                orphaned,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(handler: &str, kind: ResourceType, arn: &str) -> TaggedResource {
        TaggedResource::new(arn, TagContext::new("acme", "dev", handler).tags(kind))
    }

    fn sample() -> Vec<TaggedResource> {
        vec![
            resource("a", ResourceType::Function, "arn:aws:lambda:r:1:function:acme-dev-a"),
            resource("a", ResourceType::Role, "arn:aws:iam::1:role/acme-dev-a-role"),
            resource("b", ResourceType::Table, "arn:aws:dynamodb:r:1:table/acme-dev-b"),
            resource("c", ResourceType::Queue, "arn:aws:sqs:r:1:acme-dev-c"),
            TaggedResource::new(
                "arn:aws:s3:::stray",
                Tags::from([("project".to_string(), "acme".to_string())]),
            ),
        ]
    }

    #[test]
    fn groups_partition_by_handler_tag() {
        let groups = group_by_handler(&sample());

        assert_eq!(groups.len(), 4);
        assert_eq!(groups["a"].len(), 2);
        for (handler, group) in &groups {
            for resource in group {
                assert_eq!(resource.handler().unwrap_or(UNKNOWN_HANDLER), handler);
            }
        }
        assert_eq!(groups[UNKNOWN_HANDLER][0].arn, "arn:aws:s3:::stray");
    }

    #[test]
    fn orphans_are_exactly_undeclared_handlers() {
        let orphans = find_orphans(&sample(), &["a".to_string(), "b".to_string()]);
        let arns: Vec<&str> = orphans
            .iter()
            .map(|orphan| orphan.resource.arn.as_str())
            .collect();

        assert_eq!(arns, vec!["arn:aws:sqs:r:1:acme-dev-c", "arn:aws:s3:::stray"]);
    }

    #[test]
    fn functions_delete_before_roles_regardless_of_input_order() {
        let role = resource("a", ResourceType::Role, "arn:aws:iam::1:role/acme-dev-a-role");
        let function = resource("a", ResourceType::Function, "arn:aws:lambda:r:1:function:acme-dev-a");

        for input in [vec![role.clone(), function.clone()], vec![function.clone(), role.clone()]] {
            let ordered = deletion_order(&input);
            assert_eq!(ordered[0].resource_type(), Some(ResourceType::Function));
            assert_eq!(ordered[1].resource_type(), Some(ResourceType::Role));
        }
    }

    #[test]
    fn full_rank_order_is_respected() {
        let ordered = deletion_order(&[
            resource("x", ResourceType::Role, "arn:aws:iam::1:role/r"),
            resource("x", ResourceType::DependencyPackage, "arn:aws:lambda:r:1:layer:l:1"),
            resource("x", ResourceType::Bucket, "arn:aws:s3:::b"),
            resource("x", ResourceType::MailIdentity, "arn:aws:ses:r:1:identity/x.example"),
            resource("x", ResourceType::Distribution, "arn:aws:cloudfront::1:distribution/E1"),
            resource("x", ResourceType::RouteCollection, "arn:aws:apigateway:r::/apis/a"),
        ]);
        let ranks: Vec<u8> = ordered
            .iter()
            .map(|resource| deletion_rank(resource.resource_type()))
            .collect();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn layer_versions_are_reported_as_shared() {
        let versions = vec![LayerVersion {
            layer_name: "acme-dev-deps".to_string(),
            version: 4,
            version_arn: "arn:aws:lambda:r:1:layer:acme-dev-deps:4".to_string(),
            description: None,
        }];
        let resources = synthesized_layer_resources("acme", "dev", &versions);

        assert_eq!(resources[0].handler(), Some(crate::tags::SHARED_HANDLER));
        assert_eq!(resources[0].resource_type(), Some(ResourceType::DependencyPackage));
        assert_eq!(resources[0].resource_id().as_deref(), Some("acme-dev-deps:4"));
    }

    #[test]
    fn summary_marks_orphaned_handlers() {
        let summary = summarize(&sample(), &["a".to_string()]);
        let a = summary.iter().find(|entry| entry.handler == "a").expect("a present");
        assert!(!a.orphaned);
        assert_eq!(a.counts["function"], 1);
        assert!(summary.iter().find(|entry| entry.handler == "c").expect("c").orphaned);
    }
}
