mod support;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use deploy_core::error::DeployError;
use deploy_core::outcome::DeploymentStatus;
use deploy_core::tags::{ResourceType, SHARED_HANDLER};
use deploy_engine::layer_builder::{ensure_layer, LayerSettings};
use deploy_engine::orchestrator::deploy_project;
use serde_json::json;
use support::project::{fake_cloud, http, TestProject};

fn write_package(root: &Path, name: &str, version: &str) {
    let dir = root.join("node_modules").join(name);
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(
        dir.join("package.json"),
        json!({ "name": name, "version": version }).to_string(),
    )
    .expect("write package manifest");
    fs::write(dir.join("index.js"), format!("module.exports = '{name}@{version}';"))
        .expect("write index");
}

fn node_project(deps: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let dependencies: serde_json::Map<String, serde_json::Value> = deps
        .iter()
        .map(|(name, version)| (name.to_string(), json!(format!("^{version}"))))
        .collect();
    fs::write(
        dir.path().join("package.json"),
        json!({ "name": "acme", "dependencies": dependencies }).to_string(),
    )
    .expect("write package.json");
    for (name, version) in deps {
        write_package(dir.path(), name, version);
    }
    dir
}

fn layer_status(summary: &deploy_core::outcome::ProjectSummary) -> Option<DeploymentStatus> {
    summary
        .outcome(SHARED_HANDLER)
        .and_then(|outcome| outcome.result_for(ResourceType::DependencyPackage))
        .map(|result| result.status)
}

#[tokio::test]
async fn unchanged_dependencies_reuse_the_published_package() {
    let dir = node_project(&[("left-pad", "1.3.0")]);
    let (cloud, provider) = fake_cloud();
    let mut project = TestProject::new("acme", "dev").with_handler(http("createOrder", "POST", "/orders"));
    project.manifest.project_dir = Some(dir.path().to_path_buf());

    let first = project.deploy(&provider).await;
    assert_eq!(layer_status(&first), Some(DeploymentStatus::Created));
    let function = cloud.function("acme-dev-createOrder").expect("function exists");
    assert_eq!(function.config.layers.len(), 1);

    cloud.clear_calls();
    let second = project.deploy(&provider).await;

    assert_eq!(layer_status(&second), Some(DeploymentStatus::Unchanged));
    assert!(cloud.calls_to("PublishLayerVersion").is_empty());
    assert!(cloud.mutating_calls().is_empty(), "writes: {:?}", cloud.mutating_calls());
}

#[tokio::test]
async fn changed_dependencies_publish_and_rebind() {
    let dir = node_project(&[("left-pad", "1.3.0")]);
    let (cloud, provider) = fake_cloud();
    let mut project = TestProject::new("acme", "dev").with_handler(http("createOrder", "POST", "/orders"));
    project.manifest.project_dir = Some(dir.path().to_path_buf());
    project.deploy(&provider).await;
    let before = cloud
        .function("acme-dev-createOrder")
        .map(|function| function.config.layers)
        .expect("function exists");

    write_package(dir.path(), "left-pad", "1.3.1");
    cloud.clear_calls();
    let summary = project.deploy(&provider).await;

    assert_eq!(layer_status(&summary), Some(DeploymentStatus::Updated));
    assert_eq!(cloud.calls_to("PublishLayerVersion").len(), 1);
    let after = cloud
        .function("acme-dev-createOrder")
        .map(|function| function.config.layers)
        .expect("function exists");
    assert_ne!(before, after);
    assert_eq!(cloud.layer_versions("acme-dev-deps").len(), 2);
}

#[tokio::test]
async fn project_without_dependencies_skips_the_package() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("package.json"), json!({ "name": "acme" }).to_string())
        .expect("write package.json");
    let (cloud, provider) = fake_cloud();
    let mut project = TestProject::new("acme", "dev").with_handler(http("createOrder", "POST", "/orders"));
    project.manifest.project_dir = Some(dir.path().to_path_buf());

    let summary = project.deploy(&provider).await;

    assert_eq!(layer_status(&summary), None);
    assert!(cloud.calls_to("ListLayerVersions").is_empty());
}

#[tokio::test]
async fn dev_dependencies_do_not_change_the_package() {
    let dir = node_project(&[("left-pad", "1.3.0")]);
    let (cloud, provider) = fake_cloud();
    let mut project = TestProject::new("acme", "dev").with_handler(http("createOrder", "POST", "/orders"));
    project.manifest.project_dir = Some(dir.path().to_path_buf());
    let first = project.deploy(&provider).await;

    fs::write(
        dir.path().join("package.json"),
        json!({
            "name": "acme",
            "dependencies": { "left-pad": "^1.3.0" },
            "devDependencies": { "jest": "^29.0.0" },
        })
        .to_string(),
    )
    .expect("rewrite package.json");
    write_package(dir.path(), "jest", "29.7.0");
    cloud.clear_calls();
    let second = project.deploy(&provider).await;

    assert_eq!(layer_status(&second), Some(DeploymentStatus::Unchanged));
    assert!(cloud.calls_to("PublishLayerVersion").is_empty());
    let arn = |summary: &deploy_core::outcome::ProjectSummary| {
        summary
            .outcome(SHARED_HANDLER)
            .and_then(|outcome| outcome.result_for(ResourceType::DependencyPackage))
            .map(|result| result.identifier.clone())
    };
    assert_eq!(arn(&first), arn(&second));
}

#[tokio::test]
async fn keeping_zero_versions_is_rejected_before_anything_deploys() {
    let dir = node_project(&[("left-pad", "1.3.0")]);
    let (cloud, provider) = fake_cloud();
    let mut project = TestProject::new("acme", "dev").with_handler(http("createOrder", "POST", "/orders"));
    project.manifest.project_dir = Some(dir.path().to_path_buf());
    project.config.layer_keep_versions = 0;

    let error = deploy_project(
        provider.clone(),
        project.config.clone(),
        &project.manifest,
        Arc::new(project.artifacts.clone()),
    )
    .await
    .expect_err("should reject");

    assert!(matches!(error, DeployError::Config(_)));
    assert!(cloud.mutating_calls().is_empty());
}

#[tokio::test]
async fn the_published_version_survives_pruning() {
    let dir = node_project(&[("left-pad", "1.3.0")]);
    let (cloud, provider) = fake_cloud();
    let settings = LayerSettings {
        runtime: "nodejs20.x".to_string(),
        keep_versions: 0,
    };

    let first = ensure_layer(provider.layers.as_ref(), "acme", "dev", dir.path(), &settings)
        .await
        .expect("publishes")
        .expect("has dependencies");
    write_package(dir.path(), "left-pad", "1.3.1");
    let second = ensure_layer(provider.layers.as_ref(), "acme", "dev", dir.path(), &settings)
        .await
        .expect("publishes")
        .expect("has dependencies");

    let remaining: Vec<String> = cloud
        .layer_versions("acme-dev-deps")
        .into_iter()
        .map(|version| version.version_arn)
        .collect();
    assert_eq!(remaining, vec![second.manifest.arn.clone()]);
    assert_ne!(first.manifest.arn, second.manifest.arn);
}
