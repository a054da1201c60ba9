//! Handler definitions as produced by the source extraction step.
//!
//! The extraction step itself lives outside this workspace; it hands over a
//! [`DeploymentManifest`] whose handlers are validated here before any
//! provider call is made.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::naming::route_key;
use crate::resolver::{env_key, SELF_DEP_KEY};

pub const HTTP_METHODS: [&str; 8] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "ANY"];
pub const MIN_MEMORY_MB: u32 = 128;
pub const MAX_MEMORY_MB: u32 = 10_240;
pub const MAX_TIMEOUT_SECS: u32 = 900;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentManifest {
    pub project: String,
    pub stage: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Directory holding `package.json` and `node_modules` for the shared
    /// dependency layer.
    #[serde(default)]
    pub project_dir: Option<PathBuf>,
    pub handlers: Vec<HandlerSpec>,
}

impl DeploymentManifest {
    pub fn from_json(raw: &str) -> Result<Self, ValidationError> {
        let manifest: Self = serde_json::from_str(raw)
            .map_err(|error| ValidationError::new(format!("Malformed manifest: {error}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_identifier("project", &self.project)?;
        validate_identifier("stage", &self.stage)?;

        let mut seen = BTreeSet::new();
        let mut route_keys = BTreeSet::new();
        for handler in &self.handlers {
            handler.validate()?;
            if !seen.insert(handler.name.as_str()) {
                return Err(ValidationError::new(format!(
                    "Handler '{}' is declared more than once",
                    handler.name
                )));
            }
            if let Some(key) = handler.route_key() {
                if !route_keys.insert(key.clone()) {
                    return Err(ValidationError::new(format!(
                        "Route '{key}' is declared by more than one handler"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.handlers.iter().map(|handler| handler.name.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: HandlerKind,
    /// Names of other handlers (tables, buckets, mailers) this one reads or
    /// writes at runtime.
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default)]
    pub params: Vec<ParamEntry>,
    /// Extra IAM actions granted on `*`, e.g. `"s3:GetObject"`.
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub function: FunctionSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandlerKind {
    Http {
        method: String,
        path: String,
    },
    Table {
        partition_key: KeyAttribute,
        #[serde(default)]
        sort_key: Option<KeyAttribute>,
        #[serde(default)]
        billing_mode: BillingMode,
        /// Present when the table has a stream consumer function.
        #[serde(default)]
        stream: Option<StreamSettings>,
    },
    Queue {
        #[serde(default)]
        fifo: bool,
        #[serde(default)]
        content_based_deduplication: bool,
        #[serde(default)]
        visibility_timeout_secs: Option<u32>,
        #[serde(default)]
        retention_secs: Option<u32>,
        #[serde(default)]
        delay_secs: Option<u32>,
        #[serde(default)]
        batch_size: Option<u32>,
    },
    Bucket {
        /// Present when the bucket has an event consumer function.
        #[serde(default)]
        notifications: Option<BucketNotificationSettings>,
    },
    Mailer {
        domain: String,
    },
    Site {
        dir: PathBuf,
        #[serde(default = "default_index_document")]
        index: String,
        #[serde(default)]
        spa: bool,
        #[serde(default)]
        aliases: Vec<String>,
        #[serde(default)]
        certificate_arn: Option<String>,
        /// Proxy `/api/*` to the project's HTTP API.
        #[serde(default)]
        api_proxy: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAttribute {
    pub name: String,
    #[serde(rename = "type", default)]
    pub attribute_type: AttributeType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeType {
    #[default]
    S,
    N,
    B,
}

impl AttributeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::S => "S",
            Self::N => "N",
            Self::B => "B",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingMode {
    #[default]
    PayPerRequest,
    Provisioned,
}

impl BillingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PayPerRequest => "PAY_PER_REQUEST",
            Self::Provisioned => "PROVISIONED",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamView {
    NewImage,
    OldImage,
    #[default]
    NewAndOldImages,
    KeysOnly,
}

impl StreamView {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewImage => "NEW_IMAGE",
            Self::OldImage => "OLD_IMAGE",
            Self::NewAndOldImages => "NEW_AND_OLD_IMAGES",
            Self::KeysOnly => "KEYS_ONLY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [Self::NewImage, Self::OldImage, Self::NewAndOldImages, Self::KeysOnly]
            .into_iter()
            .find(|view| view.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSettings {
    #[serde(default)]
    pub view: StreamView,
    #[serde(default)]
    pub batch_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketNotificationSettings {
    #[serde(default = "default_bucket_events")]
    pub events: Vec<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamEntry {
    /// Property name the runtime exposes the value under.
    pub property: String,
    /// Key under `/{project}/{stage}/`.
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSettings {
    #[serde(default)]
    pub memory_mb: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u32>,
    #[serde(default)]
    pub runtime: Option<String>,
    /// Entry point inside the artifact, e.g. `index.handler`.
    #[serde(default)]
    pub entry: Option<String>,
    /// Zip produced by the bundler for this handler.
    #[serde(default)]
    pub artifact: Option<PathBuf>,
}

fn default_index_document() -> String {
    "index.html".to_string()
}

fn default_bucket_events() -> Vec<String> {
    vec!["s3:ObjectCreated:*".to_string()]
}

impl HandlerSpec {
    /// Whether this handler deploys a Lambda function.
    pub fn has_function(&self) -> bool {
        match &self.kind {
            HandlerKind::Http { .. } | HandlerKind::Queue { .. } => true,
            HandlerKind::Table { stream, .. } => stream.is_some(),
            HandlerKind::Bucket { notifications } => notifications.is_some(),
            HandlerKind::Mailer { .. } | HandlerKind::Site { .. } => false,
        }
    }

    pub fn route_key(&self) -> Option<String> {
        match &self.kind {
            HandlerKind::Http { method, path } => Some(route_key(method, path)),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            HandlerKind::Http { .. } => "http",
            HandlerKind::Table { .. } => "table",
            HandlerKind::Queue { .. } => "queue",
            HandlerKind::Bucket { .. } => "bucket",
            HandlerKind::Mailer { .. } => "mailer",
            HandlerKind::Site { .. } => "site",
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_identifier("handler name", &self.name)?;

        match &self.kind {
            HandlerKind::Http { method, path } => {
                let upper = method.to_ascii_uppercase();
                if !HTTP_METHODS.contains(&upper.as_str()) {
                    return Err(ValidationError::new(format!(
                        "Handler '{}' uses unsupported HTTP method '{method}'",
                        self.name
                    )));
                }
                if !path.starts_with('/') {
                    return Err(ValidationError::new(format!(
                        "Handler '{}' path must start with '/'",
                        self.name
                    )));
                }
            }
            HandlerKind::Table { partition_key, sort_key, stream, .. } => {
                if partition_key.name.trim().is_empty() {
                    return Err(ValidationError::new(format!(
                        "Table '{}' requires a partition key name",
                        self.name
                    )));
                }
                if let Some(sort) = sort_key {
                    if sort.name == partition_key.name {
                        return Err(ValidationError::new(format!(
                            "Table '{}' sort key must differ from the partition key",
                            self.name
                        )));
                    }
                }
                if let Some(batch) = stream.and_then(|settings| settings.batch_size) {
                    validate_range(&self.name, "stream batch_size", batch, 1, 10_000)?;
                }
            }
            HandlerKind::Queue {
                fifo,
                content_based_deduplication,
                batch_size,
                visibility_timeout_secs,
                ..
            } => {
                if *content_based_deduplication && !fifo {
                    return Err(ValidationError::new(format!(
                        "Queue '{}' enables content-based deduplication without fifo",
                        self.name
                    )));
                }
                if let Some(batch) = batch_size {
                    let max = if *fifo { 10 } else { 10_000 };
                    validate_range(&self.name, "batch_size", *batch, 1, max)?;
                }
                if let Some(visibility) = visibility_timeout_secs {
                    validate_range(&self.name, "visibility_timeout_secs", *visibility, 0, 43_200)?;
                }
            }
            HandlerKind::Bucket { notifications } => {
                if let Some(settings) = notifications {
                    if settings.events.is_empty() {
                        return Err(ValidationError::new(format!(
                            "Bucket '{}' notifications require at least one event",
                            self.name
                        )));
                    }
                }
            }
            HandlerKind::Mailer { domain } => {
                if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
                    return Err(ValidationError::new(format!(
                        "Mailer '{}' domain '{domain}' is not a valid domain",
                        self.name
                    )));
                }
            }
            HandlerKind::Site {
                index,
                aliases,
                certificate_arn,
                ..
            } => {
                if index.trim().is_empty() {
                    return Err(ValidationError::new(format!(
                        "Site '{}' requires an index document",
                        self.name
                    )));
                }
                if !aliases.is_empty() && certificate_arn.is_none() {
                    return Err(ValidationError::new(format!(
                        "Site '{}' declares aliases without a certificate_arn",
                        self.name
                    )));
                }
            }
        }

        if let Some(memory) = self.function.memory_mb {
            validate_range(&self.name, "memory_mb", memory, MIN_MEMORY_MB, MAX_MEMORY_MB)?;
        }
        if let Some(timeout) = self.function.timeout_secs {
            validate_range(&self.name, "timeout_secs", timeout, 1, MAX_TIMEOUT_SECS)?;
        }

        for param in &self.params {
            if param.property.trim().is_empty() || param.key.trim().is_empty() {
                return Err(ValidationError::new(format!(
                    "Handler '{}' declares a parameter with an empty property or key",
                    self.name
                )));
            }
        }
        self.validate_env_keys()
    }

    /// Dependency keys and parameter properties become environment variable
    /// names; two entries must not map to the same one.
    fn validate_env_keys(&self) -> Result<(), ValidationError> {
        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        for dep in &self.deps {
            let key = env_key(dep);
            if key == SELF_DEP_KEY {
                return Err(ValidationError::new(format!(
                    "Handler '{}' cannot depend on '{dep}': the name is reserved",
                    self.name
                )));
            }
            if let Some(previous) = seen.insert(key, dep.as_str()) {
                if previous != dep.as_str() {
                    return Err(ValidationError::new(format!(
                        "Handler '{}' dependencies '{previous}' and '{dep}' share an environment name",
                        self.name
                    )));
                }
            }
        }

        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        for param in &self.params {
            let property = param.property.as_str();
            if let Some(previous) = seen.insert(env_key(property), property) {
                return Err(ValidationError::new(format!(
                    "Handler '{}' parameters '{previous}' and '{property}' share an environment name",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

fn validate_range(
    handler: &str,
    field: &str,
    value: u32,
    min: u32,
    max: u32,
) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::new(format!(
            "Handler '{handler}' {field}={value} is outside {min}..={max}"
        )));
    }
    Ok(())
}

fn validate_identifier(label: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(format!("{label} cannot be empty")));
    }
    if !value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(ValidationError::new(format!(
            "{label} '{value}' may only contain letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "project": "acme",
        "stage": "dev",
        "handlers": [
            {"name": "createOrder", "kind": "http", "method": "post", "path": "/orders",
             "deps": ["orders"], "function": {"memory_mb": 256}},
            {"name": "orders", "kind": "table",
             "partition_key": {"name": "id"},
             "stream": {"view": "NEW_IMAGE", "batch_size": 10}},
            {"name": "jobs", "kind": "queue", "fifo": true},
            {"name": "mail", "kind": "mailer", "domain": "acme.example"}
        ]
    }"#;

    #[test]
    fn parses_tagged_handler_kinds() {
        let manifest = DeploymentManifest::from_json(MANIFEST).expect("manifest should parse");

        assert_eq!(manifest.handlers.len(), 4);
        assert_eq!(manifest.handlers[0].route_key().as_deref(), Some("POST /orders"));
        assert!(manifest.handlers[1].has_function());
        assert!(!manifest.handlers[3].has_function());
        match &manifest.handlers[1].kind {
            HandlerKind::Table { billing_mode, stream, .. } => {
                assert_eq!(*billing_mode, BillingMode::PayPerRequest);
                assert_eq!(stream.map(|settings| settings.view), Some(StreamView::NewImage));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicate_handler_names() {
        let mut manifest = DeploymentManifest::from_json(MANIFEST).expect("manifest should parse");
        let duplicate = manifest.handlers[2].clone();
        manifest.handlers.push(duplicate);

        let error = manifest.validate().expect_err("duplicate should fail");
        assert_eq!(error.message(), "Handler 'jobs' is declared more than once");
    }

    #[test]
    fn rejects_out_of_range_memory() {
        let mut manifest = DeploymentManifest::from_json(MANIFEST).expect("manifest should parse");
        manifest.handlers[0].function.memory_mb = Some(64);

        let error = manifest.validate().expect_err("memory should fail");
        assert!(error.message().contains("memory_mb=64"));
    }

    #[test]
    fn rejects_dedup_on_standard_queue() {
        let handler = HandlerSpec {
            name: "jobs".to_string(),
            kind: HandlerKind::Queue {
                fifo: false,
                content_based_deduplication: true,
                visibility_timeout_secs: None,
                retention_secs: None,
                delay_secs: None,
                batch_size: None,
            },
            deps: Vec::new(),
            params: Vec::new(),
            permissions: Vec::new(),
            function: FunctionSettings::default(),
        };

        assert!(handler.validate().is_err());
    }

    #[test]
    fn rejects_dependencies_that_share_an_environment_name() {
        let mut manifest = DeploymentManifest::from_json(MANIFEST).expect("manifest should parse");
        manifest.handlers[0].deps = vec!["order-table".to_string(), "order_table".to_string()];

        let error = manifest.validate().expect_err("collision should fail");
        assert!(error.message().contains("share an environment name"));

        manifest.handlers[0].deps = vec!["order-table".to_string()];
        manifest.handlers[0].params = vec![
            ParamEntry {
                property: "api-key".to_string(),
                key: "a".to_string(),
            },
            ParamEntry {
                property: "api_key".to_string(),
                key: "b".to_string(),
            },
        ];
        assert!(manifest.validate().is_err());
    }
}
