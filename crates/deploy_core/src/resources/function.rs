use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::resources::{ChangeSet, FieldChanges};
use crate::tags::Tags;

/// Deployable code produced by the bundler, with the digest Lambda reports as
/// `CodeSha256` (base64 of the SHA-256 of the zip).
#[derive(Clone, PartialEq, Eq)]
pub struct CodeArtifact {
    pub bytes: Vec<u8>,
    pub sha256: String,
}

impl CodeArtifact {
    pub fn new(bytes: Vec<u8>) -> Self {
        let sha256 = code_sha256(&bytes);
        Self { bytes, sha256 }
    }
}

impl std::fmt::Debug for CodeArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeArtifact")
            .field("len", &self.bytes.len())
            .field("sha256", &self.sha256)
            .finish()
    }
}

pub fn code_sha256(bytes: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(bytes))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub entry: String,
    pub runtime: String,
    pub memory_mb: u32,
    pub timeout_secs: u32,
    pub role_arn: String,
    pub layers: Vec<String>,
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    pub code: CodeArtifact,
    pub config: FunctionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionState {
    Pending,
    Active,
    Inactive,
    Failed,
}

impl FunctionState {
    pub fn parse(value: &str) -> Self {
        match value {
            "Active" => Self::Active,
            "Inactive" => Self::Inactive,
            "Failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastUpdateStatus {
    Successful,
    InProgress,
    Failed,
}

impl LastUpdateStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "InProgress" => Self::InProgress,
            "Failed" => Self::Failed,
            _ => Self::Successful,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionLive {
    pub arn: String,
    pub code_sha256: String,
    pub config: FunctionConfig,
    pub state: FunctionState,
    pub last_update_status: LastUpdateStatus,
    pub state_reason: Option<String>,
    pub tags: Tags,
}

impl FunctionLive {
    /// Active and not in the middle of applying an update.
    pub fn is_settled(&self) -> bool {
        self.state == FunctionState::Active
            && self.last_update_status != LastUpdateStatus::InProgress
    }

    pub fn is_failed(&self) -> bool {
        self.state == FunctionState::Failed || self.last_update_status == LastUpdateStatus::Failed
    }

    pub fn describe_state(&self) -> String {
        format!("state={:?} last_update={:?}", self.state, self.last_update_status)
    }
}

/// Code and configuration are updated through independent calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionDiff {
    pub code: bool,
    pub config: FieldChanges,
}

impl FunctionDiff {
    pub fn config_changed(&self) -> bool {
        !self.config.is_empty()
    }
}

impl ChangeSet for FunctionDiff {
    fn is_empty(&self) -> bool {
        !self.code && self.config.is_empty()
    }

    fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.code {
            fields.push("code");
        }
        fields.extend(self.config.fields.iter().copied());
        fields
    }
}

pub fn diff_function(spec: &FunctionSpec, live: &FunctionLive) -> FunctionDiff {
    let desired = &spec.config;
    let current = &live.config;
    let mut config = FieldChanges::default();
    config.mark("entry", desired.entry != current.entry);
    config.mark("runtime", desired.runtime != current.runtime);
    config.mark("memory", desired.memory_mb != current.memory_mb);
    config.mark("timeout", desired.timeout_secs != current.timeout_secs);
    config.mark("role", desired.role_arn != current.role_arn);
    config.mark("layers", desired.layers != current.layers);
    config.mark("environment", desired.environment != current.environment);

    FunctionDiff {
        code: spec.code.sha256 != live.code_sha256,
        config,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> FunctionSpec {
        FunctionSpec {
            code: CodeArtifact::new(b"bundle".to_vec()),
            config: FunctionConfig {
                entry: "index.handler".to_string(),
                runtime: "nodejs20.x".to_string(),
                memory_mb: 256,
                timeout_secs: 30,
                role_arn: "arn:aws:iam::1:role/acme-dev-a-role".to_string(),
                layers: vec!["arn:aws:lambda:eu-west-1:1:layer:acme-dev-deps:3".to_string()],
                environment: BTreeMap::from([("DEPLOY_STAGE".to_string(), "dev".to_string())]),
            },
        }
    }

    fn live_from(spec: &FunctionSpec) -> FunctionLive {
        FunctionLive {
            arn: "arn:aws:lambda:eu-west-1:1:function:acme-dev-a".to_string(),
            code_sha256: spec.code.sha256.clone(),
            config: spec.config.clone(),
            state: FunctionState::Active,
            last_update_status: LastUpdateStatus::Successful,
            state_reason: None,
            tags: Tags::new(),
        }
    }

    #[test]
    fn matching_live_state_has_no_diff() {
        let spec = spec();
        assert!(diff_function(&spec, &live_from(&spec)).is_empty());
    }

    #[test]
    fn memory_change_is_configuration_only() {
        let spec = spec();
        let mut live = live_from(&spec);
        live.config.memory_mb = 512;

        let diff = diff_function(&spec, &live);
        assert!(!diff.code);
        assert!(diff.config_changed());
        assert_eq!(diff.changed_fields(), vec!["memory"]);
    }

    #[test]
    fn code_hash_mismatch_is_code_only() {
        let spec = spec();
        let mut live = live_from(&spec);
        live.code_sha256 = code_sha256(b"older bundle");

        let diff = diff_function(&spec, &live);
        assert!(diff.code);
        assert!(!diff.config_changed());
    }

    #[test]
    fn code_digest_is_base64_sha256() {
        assert_eq!(
            code_sha256(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }
}
