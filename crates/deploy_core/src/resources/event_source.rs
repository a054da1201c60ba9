use crate::resources::FieldChanges;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartingPosition {
    Latest,
    TrimHorizon,
}

impl StartingPosition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Latest => "LATEST",
            Self::TrimHorizon => "TRIM_HORIZON",
        }
    }
}

/// Binding from a stream or queue to the function that consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSourceSpec {
    pub source_arn: String,
    pub function_name: String,
    pub batch_size: u32,
    /// Streams need a starting position; queues must not send one.
    pub starting_position: Option<StartingPosition>,
}

impl EventSourceSpec {
    pub const DEFAULT_BATCH_SIZE: u32 = 10;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSourceMapping {
    pub uuid: String,
    pub source_arn: String,
    pub function_arn: String,
    pub batch_size: u32,
    pub state: String,
}

impl EventSourceMapping {
    pub fn is_enabled(&self) -> bool {
        matches!(self.state.as_str(), "Enabled" | "Enabling" | "Creating" | "Updating")
    }
}

pub fn diff_event_source(spec: &EventSourceSpec, live: &EventSourceMapping) -> FieldChanges {
    let mut changes = FieldChanges::default();
    changes.mark("batch_size", spec.batch_size != live.batch_size);
    changes.mark("enabled", !live.is_enabled());
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ChangeSet;

    #[test]
    fn disabled_mapping_is_re_enabled() {
        let spec = EventSourceSpec {
            source_arn: "arn:aws:sqs:eu-west-1:1:acme-dev-jobs".to_string(),
            function_name: "acme-dev-jobs".to_string(),
            batch_size: 10,
            starting_position: None,
        };
        let live = EventSourceMapping {
            uuid: "u1".to_string(),
            source_arn: spec.source_arn.clone(),
            function_arn: "arn:aws:lambda:eu-west-1:1:function:acme-dev-jobs".to_string(),
            batch_size: 10,
            state: "Disabled".to_string(),
        };

        assert_eq!(diff_event_source(&spec, &live).changed_fields(), vec!["enabled"]);
    }
}
