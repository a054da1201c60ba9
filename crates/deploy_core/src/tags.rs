use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const TAG_PROJECT: &str = "project";
pub const TAG_STAGE: &str = "stage";
pub const TAG_HANDLER: &str = "handler";
pub const TAG_TYPE: &str = "type";

/// Handler tag value carried by project-wide resources (the HTTP API and the
/// dependency layer) that no single handler owns.
pub const SHARED_HANDLER: &str = "_shared";

pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    Function,
    Role,
    Table,
    RouteCollection,
    DependencyPackage,
    Bucket,
    Distribution,
    Queue,
    MailIdentity,
}

impl ResourceType {
    pub const ALL: [ResourceType; 9] = [
        Self::Function,
        Self::Role,
        Self::Table,
        Self::RouteCollection,
        Self::DependencyPackage,
        Self::Bucket,
        Self::Distribution,
        Self::Queue,
        Self::MailIdentity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Role => "role",
            Self::Table => "table",
            Self::RouteCollection => "route-collection",
            Self::DependencyPackage => "dependency-package",
            Self::Bucket => "bucket",
            Self::Distribution => "distribution",
            Self::Queue => "queue",
            Self::MailIdentity => "mail-identity",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ownership identity of one deployment unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagContext {
    pub project: String,
    pub stage: String,
    pub handler: String,
}

impl TagContext {
    pub fn new(
        project: impl Into<String>,
        stage: impl Into<String>,
        handler: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            stage: stage.into(),
            handler: handler.into(),
        }
    }

    /// Context for resources shared by every handler of a project/stage.
    pub fn shared(project: impl Into<String>, stage: impl Into<String>) -> Self {
        Self::new(project, stage, SHARED_HANDLER)
    }

    pub fn for_handler(&self, handler: impl Into<String>) -> Self {
        Self::new(self.project.clone(), self.stage.clone(), handler)
    }

    pub fn tags(&self, kind: ResourceType) -> Tags {
        Tags::from([
            (TAG_PROJECT.to_string(), self.project.clone()),
            (TAG_STAGE.to_string(), self.stage.clone()),
            (TAG_HANDLER.to_string(), self.handler.clone()),
            (TAG_TYPE.to_string(), kind.as_str().to_string()),
        ])
    }
}

/// True when every desired tag is present on the live resource with the same
/// value. Extra live tags are ignored.
pub fn tags_satisfied(desired: &Tags, live: &Tags) -> bool {
    desired
        .iter()
        .all(|(key, value)| live.get(key).is_some_and(|live_value| live_value == value))
}

pub fn has_ownership_tags(tags: &Tags) -> bool {
    [TAG_PROJECT, TAG_STAGE, TAG_HANDLER, TAG_TYPE]
        .iter()
        .all(|key| tags.contains_key(*key))
}

pub fn resource_type_of(tags: &Tags) -> Option<ResourceType> {
    tags.get(TAG_TYPE).and_then(|value| ResourceType::parse(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_set_carries_all_four_keys() {
        let ctx = TagContext::new("acme", "dev", "createOrder");
        let tags = ctx.tags(ResourceType::Function);

        assert_eq!(tags.len(), 4);
        assert_eq!(tags[TAG_PROJECT], "acme");
        assert_eq!(tags[TAG_STAGE], "dev");
        assert_eq!(tags[TAG_HANDLER], "createOrder");
        assert_eq!(tags[TAG_TYPE], "function");
        assert!(has_ownership_tags(&tags));
    }

    #[test]
    fn resource_type_round_trips_through_tag_value() {
        for kind in ResourceType::ALL {
            assert_eq!(ResourceType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ResourceType::parse("topic"), None);
    }

    #[test]
    fn extra_live_tags_do_not_break_satisfaction() {
        let desired = TagContext::new("acme", "dev", "orders").tags(ResourceType::Table);
        let mut live = desired.clone();
        live.insert("owner".to_string(), "ops".to_string());
        assert!(tags_satisfied(&desired, &live));

        live.insert(TAG_STAGE.to_string(), "prod".to_string());
        assert!(!tags_satisfied(&desired, &live));
    }
}
