//! Per-handler deployment pipeline.
//!
//! Each handler kind walks a fixed sequence of reconcile steps. Functions
//! always follow their role; event-triggered kinds reconcile their upstream
//! resource between the two and bind it to the function last.

use std::path::PathBuf;
use std::sync::Arc;

use deploy_core::config::DeployConfig;
use deploy_core::error::{DeployError, ProviderResultExt};
use deploy_core::handler::{
    BillingMode, BucketNotificationSettings, HandlerKind, HandlerSpec, KeyAttribute,
    StreamSettings,
};
use deploy_core::naming::{
    bucket_name, distribution_name, edge_function_name, function_name, queue_name, route_key,
    table_name,
};
use deploy_core::outcome::{HandlerFailure, HandlerOutcome};
use deploy_core::permissions::{
    bucket_consumer, declared, function_defaults, policies_equivalent, queue_arn_pattern,
    queue_consumer, table_arn_pattern, table_stream_consumer, Permission,
};
use deploy_core::resolver::{resolve_handler, NameMaps, RuntimeBindings};
use deploy_core::resources::bucket::{
    bucket_origin_domain, notification_id, site_bucket_policy, BucketSpec, LambdaNotification,
};
use deploy_core::resources::distribution::{
    edge_owner_comment, viewer_request_code, ApiOrigin, DistributionSpec, EdgeFunctionSpec,
    FunctionAssociation, API_PATH_PATTERN, CACHE_POLICY_OPTIMIZED, VIEWER_REQUEST,
};
use deploy_core::resources::event_source::{EventSourceSpec, StartingPosition};
use deploy_core::resources::function::{FunctionConfig, FunctionLive, FunctionSpec};
use deploy_core::resources::mail::{dkim_records, MailIdentitySpec};
use deploy_core::resources::queue::{QueueSpec, DEFAULT_RETENTION_SECS};
use deploy_core::resources::role::RoleSpec;
use deploy_core::resources::route::{ApiLive, RouteSpec};
use deploy_core::resources::site::collect_site_files;
use deploy_core::resources::table::TableSpec;
use deploy_core::tags::{ResourceType, TagContext};
use tracing::{debug, info, warn};

use crate::artifacts::ArtifactSource;
use crate::ports::{InvokePermission, Provider};
use crate::reconcile::bucket::{sync_site_files, BucketReconciler};
use crate::reconcile::distribution::{ensure_origin_access_control, DistributionReconciler};
use crate::reconcile::edge_function::ensure_edge_function;
use crate::reconcile::event_source::ensure_event_source;
use crate::reconcile::function::{ensure_invoke_permission, FunctionReconciler};
use crate::reconcile::mail::MailReconciler;
use crate::reconcile::notification::ensure_bucket_notification;
use crate::reconcile::queue::QueueReconciler;
use crate::reconcile::role::RoleReconciler;
use crate::reconcile::route::ensure_route;
use crate::reconcile::table::TableReconciler;
use crate::reconcile::{ensure, Reconciled};
use crate::retry::PollPolicy;

pub const API_GATEWAY_PRINCIPAL: &str = "apigateway.amazonaws.com";

/// Everything a handler pipeline needs that is shared across handlers.
#[derive(Clone)]
pub struct DeployContext {
    pub provider: Provider,
    pub config: DeployConfig,
    pub project: String,
    pub stage: String,
    pub names: NameMaps,
    /// Dependency package attached to every function, when published.
    pub layer_arn: Option<String>,
    pub api: Option<ApiLive>,
    /// Base for relative site directories.
    pub project_dir: Option<PathBuf>,
    pub artifacts: Arc<dyn ArtifactSource>,
}

impl std::fmt::Debug for DeployContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployContext")
            .field("project", &self.project)
            .field("stage", &self.stage)
            .field("layer_arn", &self.layer_arn)
            .field("api", &self.api.as_ref().map(|api| &api.id))
            .finish_non_exhaustive()
    }
}

impl DeployContext {
    fn poll_policy(&self) -> PollPolicy {
        PollPolicy::from_config(&self.config)
    }
}

/// Deploy one handler. Errors are captured into a [`HandlerFailure`] so a
/// failing handler never affects its siblings.
pub async fn deploy_handler(
    ctx: &DeployContext,
    handler: &HandlerSpec,
) -> Result<HandlerOutcome, HandlerFailure> {
    let mut run = HandlerRun::new(ctx, handler);
    match run.execute().await {
        Ok(()) => Ok(run.outcome),
        Err(error) => {
            warn!(
                project = %ctx.project,
                stage = %ctx.stage,
                handler = %handler.name,
                kind = ?error.resource_kind(),
                error = %error,
                "handler deployment failed"
            );
            Err(HandlerFailure {
                handler: handler.name.clone(),
                kind: error.resource_kind(),
                message: error.to_string(),
            })
        }
    }
}

struct HandlerRun<'a> {
    ctx: &'a DeployContext,
    handler: &'a HandlerSpec,
    tags: TagContext,
    outcome: HandlerOutcome,
}

impl<'a> HandlerRun<'a> {
    fn new(ctx: &'a DeployContext, handler: &'a HandlerSpec) -> Self {
        Self {
            ctx,
            handler,
            tags: TagContext::new(&ctx.project, &ctx.stage, &handler.name),
            outcome: HandlerOutcome::new(&handler.name),
        }
    }

    async fn execute(&mut self) -> Result<(), DeployError> {
        let handler = self.handler;
        debug!(handler = %handler.name, kind = handler.kind_name(), "deploying handler");
        match &handler.kind {
            HandlerKind::Http { method, path } => self.deploy_http(method, path).await,
            HandlerKind::Table {
                partition_key,
                sort_key,
                billing_mode,
                stream,
            } => {
                self.deploy_table(partition_key, sort_key.as_ref(), *billing_mode, *stream)
                    .await
            }
            HandlerKind::Queue {
                fifo,
                content_based_deduplication,
                visibility_timeout_secs,
                retention_secs,
                delay_secs,
                batch_size,
            } => {
                let timeout = self.timeout_secs();
                let spec = QueueSpec {
                    fifo: *fifo,
                    content_based_deduplication: *content_based_deduplication,
                    visibility_timeout_secs: visibility_timeout_secs
                        .unwrap_or_else(|| QueueSpec::default_visibility_for(timeout)),
                    retention_secs: retention_secs.unwrap_or(DEFAULT_RETENTION_SECS),
                    delay_secs: delay_secs.unwrap_or(0),
                };
                self.deploy_queue(&spec, *batch_size).await
            }
            HandlerKind::Bucket { notifications } => {
                self.deploy_bucket(notifications.as_ref()).await
            }
            HandlerKind::Mailer { domain } => self.deploy_mailer(domain).await,
            HandlerKind::Site {
                dir,
                index,
                spa,
                aliases,
                certificate_arn,
                api_proxy,
            } => {
                self.deploy_site(SiteSettings {
                    dir,
                    index,
                    spa: *spa,
                    aliases,
                    certificate_arn: certificate_arn.as_deref(),
                    api_proxy: *api_proxy,
                })
                .await
            }
        }
    }

    fn timeout_secs(&self) -> u32 {
        self.handler
            .function
            .timeout_secs
            .unwrap_or(self.ctx.config.default_timeout_secs)
    }

    fn function_name(&self) -> String {
        function_name(&self.tags)
    }

    /// Logging defaults, then the kind's consumer grants, then declared
    /// actions, then whatever the handler's deps and params resolve to.
    fn role_spec(&self, consumer: Vec<Permission>, resolved: Vec<Permission>) -> RoleSpec {
        let mut permissions = function_defaults();
        permissions.extend(consumer);
        permissions.extend(declared(&self.handler.permissions));
        permissions.extend(resolved);
        RoleSpec::new(permissions)
    }

    fn resolve(&self) -> Result<(RuntimeBindings, Vec<Permission>), DeployError> {
        let resolution = resolve_handler(
            self.handler,
            &self.ctx.names,
            &self.ctx.project,
            &self.ctx.stage,
        )?;
        Ok((resolution.bindings, resolution.permissions))
    }

    async fn ensure_role(
        &mut self,
        consumer: Vec<Permission>,
        resolved: Vec<Permission>,
    ) -> Result<String, DeployError> {
        let spec = self.role_spec(consumer, resolved);
        let reconciler = RoleReconciler::new(
            self.ctx.provider.roles.clone(),
            self.ctx.config.role_settle_delay(),
        );
        let Reconciled { result, live } = ensure(&reconciler, &self.tags, &spec).await?;
        self.outcome.push(result);
        Ok(live.arn)
    }

    async fn ensure_function(
        &mut self,
        role_arn: String,
        bindings: &RuntimeBindings,
    ) -> Result<FunctionLive, DeployError> {
        let config = &self.ctx.config;
        let settings = &self.handler.function;
        let spec = FunctionSpec {
            code: self.ctx.artifacts.load(self.handler)?,
            config: FunctionConfig {
                entry: settings
                    .entry
                    .clone()
                    .unwrap_or_else(|| config.default_entry.clone()),
                runtime: settings
                    .runtime
                    .clone()
                    .unwrap_or_else(|| config.runtime.clone()),
                memory_mb: settings.memory_mb.unwrap_or(config.default_memory_mb),
                timeout_secs: self.timeout_secs(),
                role_arn,
                layers: self.ctx.layer_arn.iter().cloned().collect(),
                environment: bindings.to_env(&self.tags),
            },
        };
        let reconciler =
            FunctionReconciler::new(self.ctx.provider.functions.clone(), self.ctx.poll_policy());
        let Reconciled { result, live } = ensure(&reconciler, &self.tags, &spec).await?;
        self.outcome.push(result);
        Ok(live)
    }

    async fn deploy_http(&mut self, method: &str, path: &str) -> Result<(), DeployError> {
        let Some(api) = self.ctx.api.clone() else {
            return Err(DeployError::validation(format!(
                "Handler '{}' needs the project HTTP API, which was not reconciled",
                self.handler.name
            )));
        };
        let (bindings, resolved) = self.resolve()?;
        let role_arn = self.ensure_role(Vec::new(), resolved).await?;
        let function = self.ensure_function(role_arn, &bindings).await?;

        let route = ensure_route(
            self.ctx.provider.routes.as_ref(),
            &api,
            &RouteSpec {
                route_key: route_key(method, path),
                function_arn: function.arn.clone(),
            },
        )
        .await?;
        self.outcome.push(route);

        ensure_invoke_permission(
            self.ctx.provider.functions.as_ref(),
            &self.function_name(),
            &InvokePermission {
                statement_id: format!("{}-api-invoke", api.id),
                principal: API_GATEWAY_PRINCIPAL.to_string(),
                source_arn: api.execute_arn(&self.ctx.provider.region, &self.ctx.provider.account_id),
            },
        )
        .await?;

        self.outcome.endpoint = Some(format!("{}{path}", api.endpoint.trim_end_matches('/')));
        Ok(())
    }

    async fn deploy_table(
        &mut self,
        partition_key: &KeyAttribute,
        sort_key: Option<&KeyAttribute>,
        billing_mode: BillingMode,
        stream: Option<StreamSettings>,
    ) -> Result<(), DeployError> {
        let table = table_name(&self.tags);
        let consumer = match stream {
            Some(_) => {
                let (bindings, resolved) = self.resolve()?;
                let consumer = table_stream_consumer(&table_arn_pattern(&table));
                Some((bindings, self.ensure_role(consumer, resolved).await?))
            }
            None => None,
        };

        let spec = TableSpec {
            partition_key: partition_key.clone(),
            sort_key: sort_key.cloned(),
            billing_mode,
            stream: stream.map(|settings| settings.view),
        };
        let reconciler =
            TableReconciler::new(self.ctx.provider.tables.clone(), self.ctx.poll_policy());
        let Reconciled { result, live } = ensure(&reconciler, &self.tags, &spec).await?;
        self.outcome.push(result);

        let (Some(settings), Some((bindings, role_arn))) = (stream, consumer) else {
            return Ok(());
        };
        let stream_arn = live.stream_arn.clone().ok_or_else(|| DeployError::Failed {
            kind: ResourceType::Table,
            name: table.clone(),
            reason: "stream enabled but no stream ARN reported".to_string(),
        })?;
        self.ensure_function(role_arn, &bindings).await?;
        self.bind_event_source(EventSourceSpec {
            source_arn: stream_arn,
            function_name: self.function_name(),
            batch_size: settings
                .batch_size
                .unwrap_or(EventSourceSpec::DEFAULT_BATCH_SIZE),
            starting_position: Some(StartingPosition::Latest),
        })
        .await
    }

    async fn deploy_queue(
        &mut self,
        spec: &QueueSpec,
        batch_size: Option<u32>,
    ) -> Result<(), DeployError> {
        let (bindings, resolved) = self.resolve()?;
        let consumer = queue_consumer(&queue_arn_pattern(&queue_name(&self.tags, spec.fifo)));
        let role_arn = self.ensure_role(consumer, resolved).await?;

        let reconciler = QueueReconciler::new(self.ctx.provider.queues.clone());
        let Reconciled { result, live } = ensure(&reconciler, &self.tags, spec).await?;
        self.outcome.push(result);

        self.ensure_function(role_arn, &bindings).await?;
        self.bind_event_source(EventSourceSpec {
            source_arn: live.arn,
            function_name: self.function_name(),
            batch_size: batch_size.unwrap_or(EventSourceSpec::DEFAULT_BATCH_SIZE),
            starting_position: None,
        })
        .await
    }

    async fn bind_event_source(&self, spec: EventSourceSpec) -> Result<(), DeployError> {
        let status = ensure_event_source(self.ctx.provider.event_sources.as_ref(), &spec).await?;
        debug!(handler = %self.handler.name, source = %spec.source_arn, status = %status, "event source reconciled");
        Ok(())
    }

    async fn deploy_bucket(
        &mut self,
        notifications: Option<&BucketNotificationSettings>,
    ) -> Result<(), DeployError> {
        let spec = BucketSpec {
            region: Some(self.ctx.provider.region.clone()),
            site: false,
        };
        let reconciler = BucketReconciler::new(self.ctx.provider.buckets.clone());
        let bucket = bucket_name(&self.tags);

        let consumer = match notifications {
            Some(_) => {
                let (bindings, resolved) = self.resolve()?;
                let role_arn = self
                    .ensure_role(bucket_consumer(&bucket), resolved)
                    .await?;
                Some((bindings, role_arn))
            }
            None => None,
        };

        let Reconciled { result, .. } = ensure(&reconciler, &self.tags, &spec).await?;
        self.outcome.push(result);

        let (Some(settings), Some((bindings, role_arn))) = (notifications, consumer) else {
            return Ok(());
        };
        let function = self.ensure_function(role_arn, &bindings).await?;
        let status = ensure_bucket_notification(
            self.ctx.provider.buckets.as_ref(),
            self.ctx.provider.functions.as_ref(),
            &bucket,
            &self.function_name(),
            &LambdaNotification {
                id: notification_id(&bucket),
                function_arn: function.arn,
                events: settings.events.clone(),
                prefix: settings.prefix.clone(),
                suffix: settings.suffix.clone(),
            },
        )
        .await?;
        debug!(handler = %self.handler.name, bucket = %bucket, status = %status, "bucket notification reconciled");
        Ok(())
    }

    async fn deploy_mailer(&mut self, domain: &str) -> Result<(), DeployError> {
        let reconciler = MailReconciler::new(self.ctx.provider.mail.clone());
        let spec = MailIdentitySpec {
            domain: domain.to_string(),
        };
        let Reconciled { result, live } = ensure(&reconciler, &self.tags, &spec).await?;
        self.outcome.push(result);
        if !live.verified {
            info!(handler = %self.handler.name, domain, dkim = %live.dkim_status, "mail identity awaiting DNS verification");
        }
        self.outcome.dns_records = dkim_records(domain, &live.dkim_tokens);
        Ok(())
    }

    async fn deploy_site(&mut self, site: SiteSettings<'_>) -> Result<(), DeployError> {
        let region = self.ctx.provider.region.clone();
        let buckets = self.ctx.provider.buckets.clone();
        let distributions = self.ctx.provider.distributions.clone();

        let reconciler = BucketReconciler::new(buckets.clone());
        let Reconciled { result, live: bucket } = ensure(
            &reconciler,
            &self.tags,
            &BucketSpec {
                region: Some(region.clone()),
                site: true,
            },
        )
        .await?;
        self.outcome.push(result);

        let root = match &self.ctx.project_dir {
            Some(base) if site.dir.is_relative() => base.join(site.dir),
            _ => site.dir.to_path_buf(),
        };
        let files = tokio::task::spawn_blocking(move || collect_site_files(&root))
            .await
            .map_err(|error| DeployError::Package(error.to_string()))??;
        let stats = sync_site_files(buckets.as_ref(), &bucket.name, &files).await?;
        debug!(handler = %self.handler.name, uploaded = stats.uploaded, deleted = stats.deleted, "site content reconciled");

        let distribution = distribution_name(&self.tags);
        let origin_access_control =
            ensure_origin_access_control(distributions.as_ref(), &distribution).await?;
        let edge = ensure_edge_function(
            distributions.as_ref(),
            &edge_function_name(&self.tags),
            &EdgeFunctionSpec {
                code: viewer_request_code(site.index, site.spa),
                comment: edge_owner_comment(&self.tags),
            },
        )
        .await?;

        let api_origin = if site.api_proxy {
            let api = self.ctx.api.as_ref().ok_or_else(|| {
                DeployError::validation(format!(
                    "Site '{}' proxies /api but the project has no HTTP API",
                    self.handler.name
                ))
            })?;
            Some(ApiOrigin {
                domain: api.domain(),
                path_pattern: API_PATH_PATTERN.to_string(),
            })
        } else {
            None
        };
        let spec = DistributionSpec {
            origin_domain: bucket_origin_domain(&bucket.name, &region),
            origin_access_control_id: origin_access_control,
            default_root_object: site.index.to_string(),
            cache_policy_id: CACHE_POLICY_OPTIMIZED.to_string(),
            function_associations: vec![FunctionAssociation {
                event_type: VIEWER_REQUEST.to_string(),
                function_arn: edge.identifier.clone(),
            }],
            aliases: site.aliases.to_vec(),
            certificate_arn: site.certificate_arn.map(ToString::to_string),
            error_pages: if site.spa {
                DistributionSpec::spa_error_pages(site.index)
            } else {
                Vec::new()
            },
            api_origin,
        };
        let reconciler = DistributionReconciler::new(distributions.clone());
        let Reconciled { result, live } = ensure(&reconciler, &self.tags, &spec).await?;
        self.outcome.push(result);
        self.outcome.push(edge);

        let policy = site_bucket_policy(&bucket.name, &live.arn);
        let current = buckets
            .get_bucket_policy(&bucket.name)
            .await
            .for_resource(ResourceType::Bucket, &bucket.name)?;
        if !current.is_some_and(|current| policies_equivalent(&current, &policy)) {
            buckets
                .put_bucket_policy(&bucket.name, &policy)
                .await
                .for_resource(ResourceType::Bucket, &bucket.name)?;
            debug!(bucket = %bucket.name, "site bucket policy applied");
        }

        self.outcome.endpoint = Some(format!("https://{}", live.domain_name));
        Ok(())
    }
}

struct SiteSettings<'s> {
    dir: &'s std::path::Path,
    index: &'s str,
    spa: bool,
    aliases: &'s [String],
    certificate_arn: Option<&'s str>,
    api_proxy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCloud, StaticArtifacts};
    use deploy_core::handler::{AttributeType, FunctionSettings};
    use deploy_core::outcome::DeploymentStatus;
    use deploy_core::resolver::ENV_PREFIX;

    fn handler(name: &str, kind: HandlerKind) -> HandlerSpec {
        HandlerSpec {
            name: name.to_string(),
            kind,
            deps: Vec::new(),
            params: Vec::new(),
            permissions: Vec::new(),
            function: FunctionSettings::default(),
        }
    }

    fn context(provider: Provider, handlers: &[HandlerSpec]) -> DeployContext {
        DeployContext {
            provider,
            config: DeployConfig {
                poll_interval_ms: 1,
                role_settle_delay_ms: 0,
                ..DeployConfig::default()
            },
            project: "acme".to_string(),
            stage: "dev".to_string(),
            names: NameMaps::from_handlers("acme", "dev", handlers),
            layer_arn: None,
            api: None,
            project_dir: None,
            artifacts: Arc::new(StaticArtifacts::new()),
        }
    }

    #[tokio::test]
    async fn queue_handler_binds_queue_to_consumer() {
        let (cloud, provider) = FakeCloud::new().into_provider();
        let jobs = handler(
            "jobs",
            HandlerKind::Queue {
                fifo: false,
                content_based_deduplication: false,
                visibility_timeout_secs: None,
                retention_secs: None,
                delay_secs: None,
                batch_size: Some(5),
            },
        );
        let ctx = context(provider, std::slice::from_ref(&jobs));

        let outcome = deploy_handler(&ctx, &jobs).await.expect("deploys");

        let kinds: Vec<ResourceType> = outcome.results.iter().map(|result| result.kind).collect();
        assert_eq!(
            kinds,
            vec![ResourceType::Role, ResourceType::Queue, ResourceType::Function]
        );
        let queue = cloud.queue("acme-dev-jobs").expect("queue exists");
        assert_eq!(queue.attributes["VisibilityTimeout"], "180");

        let mappings = cloud.event_source_mappings();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].source_arn, queue.arn);
        assert_eq!(mappings[0].batch_size, 5);

        let function = cloud.function("acme-dev-jobs").expect("function exists");
        assert_eq!(
            function.config.environment[&format!("{ENV_PREFIX}_DEP_SELF")],
            "queue:acme-dev-jobs"
        );
    }

    #[tokio::test]
    async fn table_without_stream_deploys_no_function() {
        let (cloud, provider) = FakeCloud::new().into_provider();
        let orders = handler(
            "orders",
            HandlerKind::Table {
                partition_key: KeyAttribute {
                    name: "id".to_string(),
                    attribute_type: AttributeType::S,
                },
                sort_key: None,
                billing_mode: BillingMode::PayPerRequest,
                stream: None,
            },
        );
        let ctx = context(provider, std::slice::from_ref(&orders));

        let outcome = deploy_handler(&ctx, &orders).await.expect("deploys");

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].kind, ResourceType::Table);
        assert!(cloud.table("acme-dev-orders").is_some());
        assert!(cloud.function("acme-dev-orders").is_none());
        assert!(cloud.role("acme-dev-orders-role").is_none());
    }

    #[tokio::test]
    async fn mailer_reports_dkim_records() {
        let (_cloud, provider) = FakeCloud::new().into_provider();
        let mail = handler(
            "mail",
            HandlerKind::Mailer {
                domain: "acme.example".to_string(),
            },
        );
        let ctx = context(provider, std::slice::from_ref(&mail));

        let outcome = deploy_handler(&ctx, &mail).await.expect("deploys");

        assert_eq!(outcome.results[0].status, DeploymentStatus::Created);
        assert_eq!(outcome.dns_records.len(), 3);
        assert!(outcome.dns_records[0].name.ends_with("._domainkey.acme.example"));
    }

    #[tokio::test]
    async fn http_handler_without_api_fails_as_validation() {
        let (_cloud, provider) = FakeCloud::new().into_provider();
        let get = handler(
            "getOrder",
            HandlerKind::Http {
                method: "GET".to_string(),
                path: "/orders/{id}".to_string(),
            },
        );
        let ctx = context(provider, std::slice::from_ref(&get));

        let failure = deploy_handler(&ctx, &get).await.expect_err("needs api");
        assert_eq!(failure.handler, "getOrder");
        assert_eq!(failure.kind, None);
    }

    #[tokio::test]
    async fn unresolved_dependency_fails_before_any_call() {
        let (cloud, provider) = FakeCloud::new().into_provider();
        let mut jobs = handler(
            "jobs",
            HandlerKind::Queue {
                fifo: true,
                content_based_deduplication: true,
                visibility_timeout_secs: None,
                retention_secs: None,
                delay_secs: None,
                batch_size: None,
            },
        );
        jobs.deps = vec!["missing".to_string()];
        let ctx = context(provider, std::slice::from_ref(&jobs));

        let failure = deploy_handler(&ctx, &jobs).await.expect_err("unresolved");
        assert!(failure.message.contains("missing"));
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn site_uploads_files_and_grants_distribution_read() {
        let (cloud, provider) = FakeCloud::new().into_provider();
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("index.html"), "<h1>acme</h1>").expect("write index");
        std::fs::create_dir_all(dir.path().join("assets")).expect("mkdir");
        std::fs::write(dir.path().join("assets/app.js"), "console.log(1)").expect("write js");

        let web = handler(
            "web",
            HandlerKind::Site {
                dir: dir.path().to_path_buf(),
                index: "index.html".to_string(),
                spa: true,
                aliases: Vec::new(),
                certificate_arn: None,
                api_proxy: false,
            },
        );
        let ctx = context(provider, std::slice::from_ref(&web));

        let outcome = deploy_handler(&ctx, &web).await.expect("deploys");

        assert!(outcome
            .endpoint
            .as_deref()
            .is_some_and(|endpoint| endpoint.ends_with(".cloudfront.net")));
        let objects = cloud.bucket_objects("acme-dev-web-site");
        assert!(objects.contains(&"index.html".to_string()));
        assert!(objects.contains(&"assets/app.js".to_string()));
        assert_eq!(cloud.edge_function_names(), vec!["acme-dev-web-viewer-req".to_string()]);
        assert_eq!(cloud.calls_to("PutBucketPolicy").len(), 1);

        cloud.clear_calls();
        let again = deploy_handler(&ctx, &web).await.expect("redeploys");
        assert!(again
            .results
            .iter()
            .all(|result| result.status == DeploymentStatus::Unchanged));
        assert!(cloud.mutating_calls().is_empty(), "{:?}", cloud.mutating_calls());
    }
}
