//! Results reported by reconcilers, handler pipelines, and cleanup.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resources::mail::DnsRecord;
use crate::tags::ResourceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Created,
    Updated,
    Unchanged,
}

impl DeploymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub kind: ResourceType,
    pub name: String,
    /// ARN, or provider id where the resource has no ARN in hand.
    pub identifier: String,
    pub status: DeploymentStatus,
}

impl DeploymentResult {
    pub fn new(
        kind: ResourceType,
        name: impl Into<String>,
        identifier: impl Into<String>,
        status: DeploymentStatus,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            identifier: identifier.into(),
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerOutcome {
    pub handler: String,
    pub results: Vec<DeploymentResult>,
    /// Public URL for HTTP handlers and sites.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// DNS records the domain owner still has to publish.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_records: Vec<DnsRecord>,
}

impl HandlerOutcome {
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            results: Vec::new(),
            endpoint: None,
            dns_records: Vec::new(),
        }
    }

    pub fn push(&mut self, result: DeploymentResult) {
        self.results.push(result);
    }

    pub fn result_for(&self, kind: ResourceType) -> Option<&DeploymentResult> {
        self.results.iter().find(|result| result.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerFailure {
    pub handler: String,
    /// Resource kind that failed, when the failure is attributable to one.
    pub kind: Option<ResourceType>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project: String,
    pub stage: String,
    pub outcomes: Vec<HandlerOutcome>,
    pub failures: Vec<HandlerFailure>,
    pub pruned_routes: Vec<String>,
    pub pruned_edge_functions: Vec<String>,
    pub elapsed_ms: u64,
}

impl ProjectSummary {
    pub fn status_counts(&self) -> BTreeMap<DeploymentStatus, usize> {
        let mut counts = BTreeMap::new();
        for result in self.outcomes.iter().flat_map(|outcome| &outcome.results) {
            *counts.entry(result.status).or_insert(0) += 1;
        }
        counts
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn outcome(&self, handler: &str) -> Option<&HandlerOutcome> {
        self.outcomes.iter().find(|outcome| outcome.handler == handler)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupFailure {
    pub arn: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// ARNs deleted, or planned for deletion on a dry run.
    pub deleted: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<CleanupFailure>,
    pub dry_run: bool,
}

impl CleanupReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}
