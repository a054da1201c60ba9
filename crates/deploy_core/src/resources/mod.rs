//! Desired specs, live state, and diff predicates per resource kind.
//!
//! Live state structs hold only the provider-reported fields a diff needs,
//! plus identifiers and current tags.

pub mod bucket;
pub mod distribution;
pub mod event_source;
pub mod function;
pub mod layer;
pub mod mail;
pub mod queue;
pub mod role;
pub mod route;
pub mod site;
pub mod table;

/// Outcome of comparing a desired spec against live state.
pub trait ChangeSet {
    fn is_empty(&self) -> bool;

    /// Names of the fields that differ, for logging.
    fn changed_fields(&self) -> Vec<&'static str>;
}

/// Diff for kinds whose only reconcilable state is their existence and tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoChanges;

impl ChangeSet for NoChanges {
    fn is_empty(&self) -> bool {
        true
    }

    fn changed_fields(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

/// Diff expressed as the list of differing field names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldChanges {
    pub fields: Vec<&'static str>,
}

impl FieldChanges {
    pub fn mark(&mut self, field: &'static str, differs: bool) {
        if differs {
            self.fields.push(field);
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|candidate| *candidate == field)
    }
}

impl ChangeSet for FieldChanges {
    fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn changed_fields(&self) -> Vec<&'static str> {
        self.fields.clone()
    }
}

pub(crate) fn sorted<T: Ord + Clone>(values: &[T]) -> Vec<T> {
    let mut values = values.to_vec();
    values.sort();
    values
}
