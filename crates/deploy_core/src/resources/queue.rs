use std::collections::BTreeMap;

use crate::resources::ChangeSet;
use crate::tags::Tags;

pub const ATTR_VISIBILITY_TIMEOUT: &str = "VisibilityTimeout";
pub const ATTR_RETENTION: &str = "MessageRetentionPeriod";
pub const ATTR_DELAY: &str = "DelaySeconds";
pub const ATTR_FIFO: &str = "FifoQueue";
pub const ATTR_CONTENT_DEDUP: &str = "ContentBasedDeduplication";
pub const ATTR_QUEUE_ARN: &str = "QueueArn";

pub const DEFAULT_RETENTION_SECS: u32 = 345_600;
pub const MAX_VISIBILITY_TIMEOUT_SECS: u32 = 43_200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub fifo: bool,
    pub content_based_deduplication: bool,
    pub visibility_timeout_secs: u32,
    pub retention_secs: u32,
    pub delay_secs: u32,
}

impl QueueSpec {
    /// Visibility must cover the consumer's timeout; six times the function
    /// timeout is the provider's recommendation when none is declared.
    pub fn default_visibility_for(function_timeout_secs: u32) -> u32 {
        function_timeout_secs
            .saturating_mul(6)
            .min(MAX_VISIBILITY_TIMEOUT_SECS)
    }

    /// Mutable attributes, the ones compared and set on update.
    pub fn mutable_attributes(&self) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::from([
            (
                ATTR_VISIBILITY_TIMEOUT.to_string(),
                self.visibility_timeout_secs.to_string(),
            ),
            (ATTR_RETENTION.to_string(), self.retention_secs.to_string()),
            (ATTR_DELAY.to_string(), self.delay_secs.to_string()),
        ]);
        if self.fifo {
            attributes.insert(
                ATTR_CONTENT_DEDUP.to_string(),
                self.content_based_deduplication.to_string(),
            );
        }
        attributes
    }

    /// Attributes sent on create, including the immutable FIFO flag.
    pub fn create_attributes(&self) -> BTreeMap<String, String> {
        let mut attributes = self.mutable_attributes();
        if self.fifo {
            attributes.insert(ATTR_FIFO.to_string(), "true".to_string());
        }
        attributes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueLive {
    pub name: String,
    pub url: String,
    pub arn: String,
    pub attributes: BTreeMap<String, String>,
    pub tags: Tags,
}

/// Attributes to set, keyed by attribute name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueDiff {
    pub attributes: BTreeMap<String, String>,
}

impl ChangeSet for QueueDiff {
    fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    fn changed_fields(&self) -> Vec<&'static str> {
        [
            ATTR_VISIBILITY_TIMEOUT,
            ATTR_RETENTION,
            ATTR_DELAY,
            ATTR_CONTENT_DEDUP,
        ]
        .into_iter()
        .filter(|name| self.attributes.contains_key(*name))
        .collect()
    }
}

pub fn diff_queue(spec: &QueueSpec, live: &QueueLive) -> QueueDiff {
    let attributes = spec
        .mutable_attributes()
        .into_iter()
        .filter(|(name, desired)| live.attributes.get(name) != Some(desired))
        .collect();
    QueueDiff { attributes }
}
