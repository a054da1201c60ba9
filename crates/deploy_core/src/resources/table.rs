use crate::handler::{BillingMode, KeyAttribute, StreamView};
use crate::resources::{ChangeSet, FieldChanges};
use crate::tags::Tags;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub partition_key: KeyAttribute,
    pub sort_key: Option<KeyAttribute>,
    pub billing_mode: BillingMode,
    pub stream: Option<StreamView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    Creating,
    Updating,
    Active,
    Deleting,
    Other,
}

impl TableStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "CREATING" => Self::Creating,
            "UPDATING" => Self::Updating,
            "ACTIVE" => Self::Active,
            "DELETING" => Self::Deleting,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLive {
    pub name: String,
    pub arn: String,
    pub status: TableStatus,
    pub partition_key: KeyAttribute,
    pub sort_key: Option<KeyAttribute>,
    pub billing_mode: BillingMode,
    pub stream: Option<StreamView>,
    pub stream_arn: Option<String>,
    pub tags: Tags,
}

/// The stream setting a table update should apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamChange {
    Unchanged,
    Enable(StreamView),
    Disable,
    /// DynamoDB cannot switch view types in place; disable first, then
    /// re-enable once the table is active again.
    Replace(StreamView),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDiff {
    pub billing: Option<BillingMode>,
    pub stream: StreamChange,
    pub key_schema_mismatch: bool,
}

impl ChangeSet for TableDiff {
    fn is_empty(&self) -> bool {
        self.billing.is_none() && self.stream == StreamChange::Unchanged
    }

    fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = FieldChanges::default();
        fields.mark("billing_mode", self.billing.is_some());
        fields.mark("stream", self.stream != StreamChange::Unchanged);
        fields.mark("key_schema", self.key_schema_mismatch);
        fields.fields
    }
}

pub fn diff_table(spec: &TableSpec, live: &TableLive) -> TableDiff {
    let billing = (spec.billing_mode != live.billing_mode).then_some(spec.billing_mode);
    let stream = match (live.stream, spec.stream) {
        (current, desired) if current == desired => StreamChange::Unchanged,
        (None, Some(view)) => StreamChange::Enable(view),
        (Some(_), None) => StreamChange::Disable,
        (Some(_), Some(view)) => StreamChange::Replace(view),
        (None, None) => StreamChange::Unchanged,
    };
    let key_schema_mismatch =
        spec.partition_key != live.partition_key || spec.sort_key != live.sort_key;

    TableDiff {
        billing,
        stream,
        key_schema_mismatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::AttributeType;

    fn spec() -> TableSpec {
        TableSpec {
            partition_key: KeyAttribute {
                name: "id".to_string(),
                attribute_type: AttributeType::S,
            },
            sort_key: None,
            billing_mode: BillingMode::PayPerRequest,
            stream: Some(StreamView::NewImage),
        }
    }

    fn live() -> TableLive {
        let spec = spec();
        TableLive {
            name: "acme-dev-orders".to_string(),
            arn: "arn:aws:dynamodb:eu-west-1:1:table/acme-dev-orders".to_string(),
            status: TableStatus::Active,
            partition_key: spec.partition_key,
            sort_key: None,
            billing_mode: BillingMode::PayPerRequest,
            stream: Some(StreamView::NewImage),
            stream_arn: Some("arn:stream".to_string()),
            tags: Tags::new(),
        }
    }

    #[test]
    fn switching_stream_view_requires_replace() {
        let mut desired = spec();
        desired.stream = Some(StreamView::KeysOnly);

        let diff = diff_table(&desired, &live());
        assert_eq!(diff.stream, StreamChange::Replace(StreamView::KeysOnly));
        assert!(!diff.is_empty());
    }

    #[test]
    fn key_schema_mismatch_is_flagged_but_not_an_update() {
        let mut desired = spec();
        desired.sort_key = Some(KeyAttribute {
            name: "createdAt".to_string(),
            attribute_type: AttributeType::N,
        });

        let diff = diff_table(&desired, &live());
        assert!(diff.key_schema_mismatch);
        assert!(diff.is_empty());
    }
}
