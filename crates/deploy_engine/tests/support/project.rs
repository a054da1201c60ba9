use std::sync::Arc;

use deploy_core::config::DeployConfig;
use deploy_core::handler::{
    AttributeType, BillingMode, DeploymentManifest, FunctionSettings, HandlerKind, HandlerSpec,
    KeyAttribute, StreamSettings,
};
use deploy_core::outcome::ProjectSummary;
use deploy_engine::orchestrator::deploy_project;
use deploy_engine::ports::Provider;
use deploy_engine::testing::{FakeCloud, StaticArtifacts};

/// Engine settings that never sleep for long in tests.
pub fn fast_config() -> DeployConfig {
    DeployConfig {
        poll_interval_ms: 1,
        max_poll_attempts: 10,
        role_settle_delay_ms: 0,
        ..DeployConfig::default()
    }
}

pub fn handler(name: &str, kind: HandlerKind) -> HandlerSpec {
    HandlerSpec {
        name: name.to_string(),
        kind,
        deps: Vec::new(),
        params: Vec::new(),
        permissions: Vec::new(),
        function: FunctionSettings::default(),
    }
}

pub fn http(name: &str, method: &str, path: &str) -> HandlerSpec {
    handler(
        name,
        HandlerKind::Http {
            method: method.to_string(),
            path: path.to_string(),
        },
    )
}

pub fn table(name: &str, stream: bool) -> HandlerSpec {
    handler(
        name,
        HandlerKind::Table {
            partition_key: KeyAttribute {
                name: "id".to_string(),
                attribute_type: AttributeType::S,
            },
            sort_key: None,
            billing_mode: BillingMode::PayPerRequest,
            stream: stream.then(StreamSettings::default),
        },
    )
}

/// Builder for a manifest plus the fake cloud it deploys into.
#[derive(Debug)]
pub struct TestProject {
    pub manifest: DeploymentManifest,
    pub config: DeployConfig,
    pub artifacts: StaticArtifacts,
}

impl TestProject {
    pub fn new(project: &str, stage: &str) -> Self {
        Self {
            manifest: DeploymentManifest {
                project: project.to_string(),
                stage: stage.to_string(),
                region: None,
                project_dir: None,
                handlers: Vec::new(),
            },
            config: fast_config(),
            artifacts: StaticArtifacts::new(),
        }
    }

    pub fn with_handler(mut self, handler: HandlerSpec) -> Self {
        self.manifest.handlers.push(handler);
        self
    }

    pub fn handler_mut(&mut self, name: &str) -> &mut HandlerSpec {
        self.manifest
            .handlers
            .iter_mut()
            .find(|handler| handler.name == name)
            .expect("handler declared")
    }

    pub async fn deploy(&self, provider: &Provider) -> ProjectSummary {
        deploy_project(
            provider.clone(),
            self.config.clone(),
            &self.manifest,
            Arc::new(self.artifacts.clone()),
        )
        .await
        .expect("deployment runs")
    }
}

pub fn fake_cloud() -> (Arc<FakeCloud>, Provider) {
    FakeCloud::new().into_provider()
}
