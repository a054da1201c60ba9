//! Cross-handler dependency and parameter resolution.
//!
//! Bindings stay typed all the way into the pipeline; they are flattened into
//! the function's environment map only at the provider boundary
//! ([`RuntimeBindings::to_env`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::handler::{HandlerKind, HandlerSpec, ParamEntry};
use crate::naming::{bucket_name, queue_name, table_name};
use crate::permissions::{
    bucket_access, mailer_access, parameter_access, parameter_arn_pattern, table_access,
    table_arn_pattern, Permission,
};
use crate::tags::{ResourceType, TagContext};

pub const ENV_PREFIX: &str = "DEPLOY";
pub const SELF_DEP_KEY: &str = "SELF";

/// Environment-safe form of a dependency key or parameter property: every
/// character outside `[A-Za-z0-9_]` becomes `_`, so `order-table` is exposed
/// as `DEPLOY_DEP_order_table`.
pub fn env_key(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    Table,
    Bucket,
    Mailer,
}

impl BindingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Bucket => "bucket",
            Self::Mailer => "mailer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyBinding {
    pub key: String,
    pub kind: BindingKind,
    pub resource_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamBinding {
    pub property: String,
    pub path: String,
}

/// Identity of the resource an event-triggered handler consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfBinding {
    pub kind: ResourceType,
    pub resource_name: String,
}

/// Handler name to resource name, per dependency kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameMaps {
    pub tables: BTreeMap<String, String>,
    pub buckets: BTreeMap<String, String>,
    pub mailers: BTreeMap<String, String>,
}

impl NameMaps {
    pub fn from_handlers(project: &str, stage: &str, handlers: &[HandlerSpec]) -> Self {
        let mut maps = Self::default();
        for handler in handlers {
            let ctx = TagContext::new(project, stage, handler.name.clone());
            match &handler.kind {
                HandlerKind::Table { .. } => {
                    maps.tables.insert(handler.name.clone(), table_name(&ctx));
                }
                HandlerKind::Bucket { .. } => {
                    maps.buckets.insert(handler.name.clone(), bucket_name(&ctx));
                }
                HandlerKind::Mailer { domain } => {
                    maps.mailers.insert(handler.name.clone(), domain.clone());
                }
                HandlerKind::Http { .. } | HandlerKind::Queue { .. } | HandlerKind::Site { .. } => {}
            }
        }
        maps
    }

    /// Table first, then bucket, then mailer; the first match wins.
    pub fn lookup(&self, key: &str) -> Option<(BindingKind, &str)> {
        self.tables
            .get(key)
            .map(|name| (BindingKind::Table, name.as_str()))
            .or_else(|| {
                self.buckets
                    .get(key)
                    .map(|name| (BindingKind::Bucket, name.as_str()))
            })
            .or_else(|| {
                self.mailers
                    .get(key)
                    .map(|name| (BindingKind::Mailer, name.as_str()))
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeBindings {
    pub deps: Vec<DependencyBinding>,
    pub params: Vec<ParamBinding>,
    pub self_ref: Option<SelfBinding>,
    /// Extra raw variables, shallow-merged last.
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub bindings: RuntimeBindings,
    pub permissions: Vec<Permission>,
}

pub fn resolve_deps(keys: &[String], maps: &NameMaps) -> Result<Resolution, ValidationError> {
    let mut resolution = Resolution::default();
    for key in keys {
        let Some((kind, resource_name)) = maps.lookup(key) else {
            return Err(ValidationError::new(format!(
                "Dependency '{key}' does not match any declared table, bucket, or mailer"
            )));
        };
        resolution.permissions.extend(match kind {
            BindingKind::Table => table_access(&table_arn_pattern(resource_name)),
            BindingKind::Bucket => bucket_access(resource_name),
            BindingKind::Mailer => mailer_access(),
        });
        resolution.bindings.deps.push(DependencyBinding {
            key: key.clone(),
            kind,
            resource_name: resource_name.to_string(),
        });
    }
    Ok(resolution)
}

pub fn parameter_path(project: &str, stage: &str, key: &str) -> String {
    format!("/{project}/{stage}/{key}")
}

pub fn resolve_params(entries: &[ParamEntry], project: &str, stage: &str) -> Resolution {
    let mut resolution = Resolution::default();
    for entry in entries {
        let path = parameter_path(project, stage, &entry.key);
        resolution
            .permissions
            .extend(parameter_access(&parameter_arn_pattern(&path)));
        resolution.bindings.params.push(ParamBinding {
            property: entry.property.clone(),
            path,
        });
    }
    resolution
}

/// Structural union: binding lists and permissions concatenate, raw env maps
/// shallow-merge with `right` winning, and `right`'s self reference wins when
/// both sides carry one.
pub fn merge(left: Resolution, right: Resolution) -> Resolution {
    let mut bindings = left.bindings;
    bindings.deps.extend(right.bindings.deps);
    bindings.params.extend(right.bindings.params);
    if right.bindings.self_ref.is_some() {
        bindings.self_ref = right.bindings.self_ref;
    }
    bindings.extra.extend(right.bindings.extra);

    let mut permissions = left.permissions;
    permissions.extend(right.permissions);

    Resolution {
        bindings,
        permissions,
    }
}

/// Full resolution for one handler: declared deps, parameters, and the
/// handler's own upstream resource when it is event-triggered.
pub fn resolve_handler(
    handler: &HandlerSpec,
    maps: &NameMaps,
    project: &str,
    stage: &str,
) -> Result<Resolution, ValidationError> {
    let deps = resolve_deps(&handler.deps, maps)?;
    let params = resolve_params(&handler.params, project, stage);
    let mut resolution = merge(deps, params);

    let ctx = TagContext::new(project, stage, handler.name.clone());
    resolution.bindings.self_ref = match &handler.kind {
        HandlerKind::Table { stream: Some(_), .. } => Some(SelfBinding {
            kind: ResourceType::Table,
            resource_name: table_name(&ctx),
        }),
        HandlerKind::Queue { fifo, .. } => Some(SelfBinding {
            kind: ResourceType::Queue,
            resource_name: queue_name(&ctx, *fifo),
        }),
        HandlerKind::Bucket {
            notifications: Some(_),
        } => Some(SelfBinding {
            kind: ResourceType::Bucket,
            resource_name: bucket_name(&ctx),
        }),
        _ => None,
    };

    Ok(resolution)
}

impl RuntimeBindings {
    /// Flatten to the environment contract consumed by the runtime wrapper.
    pub fn to_env(&self, ctx: &TagContext) -> BTreeMap<String, String> {
        let mut env = BTreeMap::from([
            (format!("{ENV_PREFIX}_PROJECT"), ctx.project.clone()),
            (format!("{ENV_PREFIX}_STAGE"), ctx.stage.clone()),
            (format!("{ENV_PREFIX}_HANDLER"), ctx.handler.clone()),
        ]);
        for dep in &self.deps {
            env.insert(
                format!("{ENV_PREFIX}_DEP_{}", env_key(&dep.key)),
                format!("{}:{}", dep.kind.as_str(), dep.resource_name),
            );
        }
        for param in &self.params {
            env.insert(
                format!("{ENV_PREFIX}_PARAM_{}", env_key(&param.property)),
                param.path.clone(),
            );
        }
        if let Some(self_ref) = &self.self_ref {
            env.insert(
                format!("{ENV_PREFIX}_DEP_{SELF_DEP_KEY}"),
                format!("{}:{}", self_ref.kind.as_str(), self_ref.resource_name),
            );
        }
        env.extend(self.extra.clone());
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maps() -> NameMaps {
        NameMaps {
            tables: BTreeMap::from([("orders".to_string(), "acme-dev-orders".to_string())]),
            buckets: BTreeMap::from([
                ("uploads".to_string(), "acme-dev-uploads".to_string()),
                ("orders".to_string(), "acme-dev-orders-bucket".to_string()),
            ]),
            mailers: BTreeMap::from([("mail".to_string(), "acme.example".to_string())]),
        }
    }

    #[test]
    fn table_match_wins_over_bucket_with_same_key() {
        let resolution =
            resolve_deps(&["orders".to_string()], &maps()).expect("dependency should resolve");

        assert_eq!(resolution.bindings.deps[0].kind, BindingKind::Table);
        assert_eq!(resolution.bindings.deps[0].resource_name, "acme-dev-orders");
        assert!(resolution
            .permissions
            .iter()
            .all(|permission| permission.action.starts_with("dynamodb:")));
    }

    #[test]
    fn each_kind_contributes_its_template() {
        let resolution = resolve_deps(
            &["uploads".to_string(), "mail".to_string()],
            &maps(),
        )
        .expect("dependencies should resolve");

        let actions: Vec<&str> = resolution
            .permissions
            .iter()
            .map(|permission| permission.action.as_str())
            .collect();
        assert!(actions.contains(&"s3:ListBucket"));
        assert!(actions.contains(&"ses:SendEmail"));
    }

    #[test]
    fn unknown_dependency_is_a_validation_error() {
        let error = resolve_deps(&["ghost".to_string()], &maps()).expect_err("should fail");
        assert!(error.message().contains("'ghost'"));
    }

    #[test]
    fn params_use_project_stage_path_convention() {
        let resolution = resolve_params(
            &[ParamEntry {
                property: "apiKey".to_string(),
                key: "stripe-key".to_string(),
            }],
            "acme",
            "dev",
        );

        assert_eq!(resolution.bindings.params[0].path, "/acme/dev/stripe-key");
        assert_eq!(resolution.permissions[0].action, "ssm:GetParameter");
        assert_eq!(
            resolution.permissions[0].resource,
            "arn:aws:ssm:*:*:parameter/acme/dev/stripe-key"
        );
    }

    #[test]
    fn merge_concatenates_without_deduplicating() {
        let left = resolve_deps(&["mail".to_string()], &maps()).expect("resolves");
        let right = resolve_deps(&["mail".to_string()], &maps()).expect("resolves");
        let merged = merge(left, right);

        assert_eq!(merged.bindings.deps.len(), 2);
        assert_eq!(merged.permissions.len(), 4);
    }

    #[test]
    fn env_flattening_follows_runtime_contract() {
        let mut resolution = merge(
            resolve_deps(&["orders".to_string()], &maps()).expect("resolves"),
            resolve_params(
                &[ParamEntry {
                    property: "apiKey".to_string(),
                    key: "stripe-key".to_string(),
                }],
                "acme",
                "dev",
            ),
        );
        resolution.bindings.self_ref = Some(SelfBinding {
            kind: ResourceType::Queue,
            resource_name: "acme-dev-jobs".to_string(),
        });

        let env = resolution
            .bindings
            .to_env(&TagContext::new("acme", "dev", "worker"));

        assert_eq!(env["DEPLOY_PROJECT"], "acme");
        assert_eq!(env["DEPLOY_HANDLER"], "worker");
        assert_eq!(env["DEPLOY_DEP_orders"], "table:acme-dev-orders");
        assert_eq!(env["DEPLOY_PARAM_apiKey"], "/acme/dev/stripe-key");
        assert_eq!(env["DEPLOY_DEP_SELF"], "queue:acme-dev-jobs");
    }

    #[test]
    fn hyphenated_keys_become_valid_environment_names() {
        let maps = NameMaps {
            tables: BTreeMap::from([(
                "order-table".to_string(),
                "acme-dev-order-table".to_string(),
            )]),
            ..NameMaps::default()
        };
        let resolution = resolve_deps(&["order-table".to_string()], &maps).expect("resolves");

        let env = resolution
            .bindings
            .to_env(&TagContext::new("acme", "dev", "api"));

        assert_eq!(env["DEPLOY_DEP_order_table"], "table:acme-dev-order-table");
        assert!(env.keys().all(|key| key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')));
    }
}
