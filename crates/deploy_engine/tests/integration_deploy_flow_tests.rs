mod support;

use deploy_core::error::{ErrorKind, ProviderError};
use deploy_core::outcome::DeploymentStatus;
use deploy_core::tags::{ResourceType, SHARED_HANDLER, TAG_HANDLER};
use deploy_engine::testing::StaticArtifacts;
use support::project::{fake_cloud, http, table, TestProject};

fn orders_project() -> TestProject {
    let mut project = TestProject::new("acme", "dev").with_handler(http("createOrder", "POST", "/orders"));
    project.handler_mut("createOrder").function.memory_mb = Some(256);
    project
}

#[tokio::test]
async fn first_deploy_creates_role_function_and_route() {
    let (cloud, provider) = fake_cloud();
    let project = orders_project();

    let summary = project.deploy(&provider).await;

    assert!(summary.is_success(), "failures: {:?}", summary.failures);
    let outcome = summary.outcome("createOrder").expect("handler outcome");
    for kind in [ResourceType::Role, ResourceType::Function, ResourceType::RouteCollection] {
        let result = outcome.result_for(kind).expect("result per kind");
        assert_eq!(result.status, DeploymentStatus::Created, "{kind}");
    }
    assert!(outcome
        .endpoint
        .as_deref()
        .is_some_and(|endpoint| endpoint.ends_with("/orders")));

    let shared = summary.outcome(SHARED_HANDLER).expect("shared outcome");
    assert_eq!(
        shared.result_for(ResourceType::RouteCollection).map(|r| r.status),
        Some(DeploymentStatus::Created)
    );

    let function = cloud.function("acme-dev-createOrder").expect("function exists");
    assert_eq!(function.config.memory_mb, 256);
    assert_eq!(function.tags.get(TAG_HANDLER).map(String::as_str), Some("createOrder"));
    assert!(cloud.role("acme-dev-createOrder-role").is_some());
    assert_eq!(cloud.route_keys(), vec!["POST /orders".to_string()]);
    assert_eq!(cloud.calls_to("AddPermission").len(), 1);
}

#[tokio::test]
async fn redeploying_an_unchanged_manifest_mutates_nothing() {
    let (cloud, provider) = fake_cloud();
    let project = orders_project().with_handler(table("orders", true));
    project.deploy(&provider).await;
    cloud.clear_calls();

    let summary = project.deploy(&provider).await;

    assert!(summary.is_success());
    assert!(
        cloud.mutating_calls().is_empty(),
        "unexpected writes: {:?}",
        cloud.mutating_calls()
    );
    let counts = summary.status_counts();
    assert_eq!(counts.get(&DeploymentStatus::Created), None);
    assert_eq!(counts.get(&DeploymentStatus::Updated), None);
    assert!(counts.get(&DeploymentStatus::Unchanged).copied().unwrap_or(0) >= 5);
}

#[tokio::test]
async fn memory_change_updates_configuration_only() {
    let (cloud, provider) = fake_cloud();
    let mut project = orders_project();
    project.deploy(&provider).await;
    cloud.clear_calls();

    project.handler_mut("createOrder").function.memory_mb = Some(512);
    let summary = project.deploy(&provider).await;

    let outcome = summary.outcome("createOrder").expect("handler outcome");
    assert_eq!(
        outcome.result_for(ResourceType::Function).map(|r| r.status),
        Some(DeploymentStatus::Updated)
    );
    assert_eq!(
        outcome.result_for(ResourceType::RouteCollection).map(|r| r.status),
        Some(DeploymentStatus::Unchanged)
    );
    assert_eq!(cloud.calls_to("UpdateFunctionConfiguration").len(), 1);
    assert!(cloud.calls_to("UpdateFunctionCode").is_empty());
    assert_eq!(
        cloud.function("acme-dev-createOrder").map(|f| f.config.memory_mb),
        Some(512)
    );
}

#[tokio::test]
async fn new_bundle_updates_code_only() {
    let (cloud, provider) = fake_cloud();
    let mut project = orders_project();
    project.deploy(&provider).await;
    cloud.clear_calls();

    project.artifacts = StaticArtifacts::new().with("createOrder", "exports.handler = async () => 201;");
    let summary = project.deploy(&provider).await;

    assert_eq!(
        summary
            .outcome("createOrder")
            .and_then(|outcome| outcome.result_for(ResourceType::Function))
            .map(|r| r.status),
        Some(DeploymentStatus::Updated)
    );
    assert_eq!(cloud.calls_to("UpdateFunctionCode").len(), 1);
    assert!(cloud.calls_to("UpdateFunctionConfiguration").is_empty());
}

#[tokio::test]
async fn one_failing_handler_does_not_stop_its_siblings() {
    let cloud = deploy_engine::testing::FakeCloud::new();
    cloud.fail_for(
        "CreateFunction",
        "acme-dev-broken",
        ProviderError::new(ErrorKind::QuotaExceeded, "CreateFunction", "too many functions"),
    );
    let (cloud, provider) = cloud.into_provider();
    let project = orders_project().with_handler(http("broken", "GET", "/broken"));

    let summary = project.deploy(&provider).await;

    assert!(!summary.is_success());
    assert_eq!(summary.failures.len(), 1);
    let failure = &summary.failures[0];
    assert_eq!(failure.handler, "broken");
    assert_eq!(failure.kind, Some(ResourceType::Function));
    assert!(failure.message.contains("too many functions"));

    assert!(summary.outcome("createOrder").is_some());
    assert!(cloud.function("acme-dev-createOrder").is_some());
    assert!(cloud.function("acme-dev-broken").is_none());
}

#[tokio::test]
async fn stripped_tags_are_restored_without_changing_status() {
    let (cloud, provider) = fake_cloud();
    let project = orders_project();
    project.deploy(&provider).await;
    let arn = cloud
        .function("acme-dev-createOrder")
        .map(|function| function.arn)
        .expect("function exists");
    cloud.strip_tags(&arn);
    cloud.clear_calls();

    let summary = project.deploy(&provider).await;

    assert_eq!(cloud.calls_to("TagFunction").len(), 1);
    assert_eq!(
        summary
            .outcome("createOrder")
            .and_then(|outcome| outcome.result_for(ResourceType::Function))
            .map(|r| r.status),
        Some(DeploymentStatus::Unchanged)
    );
    let function = cloud.function("acme-dev-createOrder").expect("function exists");
    assert_eq!(function.tags.get(TAG_HANDLER).map(String::as_str), Some("createOrder"));
}

#[tokio::test]
async fn routes_no_handler_declares_are_pruned() {
    let (cloud, provider) = fake_cloud();
    let project = orders_project().with_handler(http("listOrders", "GET", "/orders"));
    project.deploy(&provider).await;
    assert_eq!(cloud.route_keys().len(), 2);

    let trimmed = orders_project();
    let summary = trimmed.deploy(&provider).await;

    assert_eq!(summary.pruned_routes, vec!["GET /orders".to_string()]);
    assert_eq!(cloud.route_keys(), vec!["POST /orders".to_string()]);
}

#[tokio::test]
async fn stream_table_wires_an_event_source() {
    let (cloud, provider) = fake_cloud();
    let project = TestProject::new("acme", "dev").with_handler(table("orders", true));

    let summary = project.deploy(&provider).await;

    assert!(summary.is_success(), "failures: {:?}", summary.failures);
    let table = cloud.table("acme-dev-orders").expect("table exists");
    assert!(table.stream_arn.is_some());
    let mappings = cloud.event_source_mappings();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].source_arn, table.stream_arn.unwrap_or_default());
    assert!(summary.outcome(SHARED_HANDLER).is_none());
}

#[tokio::test]
async fn configuration_conflict_waits_and_retries_once() {
    let cloud = deploy_engine::testing::FakeCloud::new().with_settle_polls(1);
    let (cloud, provider) = cloud.into_provider();
    let mut project = orders_project();
    project.deploy(&provider).await;

    project.handler_mut("createOrder").function.memory_mb = Some(1024);
    cloud.fail_once(
        "UpdateFunctionConfiguration",
        ProviderError::conflict("UpdateFunctionConfiguration", "An update is in progress"),
    );
    cloud.clear_calls();
    let summary = project.deploy(&provider).await;

    assert!(summary.is_success(), "failures: {:?}", summary.failures);
    assert_eq!(cloud.calls_to("UpdateFunctionConfiguration").len(), 2);
    assert_eq!(
        cloud.function("acme-dev-createOrder").map(|f| f.config.memory_mb),
        Some(1024)
    );
}

#[tokio::test]
async fn handlers_never_exceed_the_concurrency_cap() {
    let cloud = deploy_engine::testing::FakeCloud::new()
        .with_create_latency(std::time::Duration::from_millis(20));
    let (cloud, provider) = cloud.into_provider();
    let mut project = TestProject::new("acme", "dev");
    for index in 0..6 {
        project = project.with_handler(http(&format!("route{index}"), "GET", &format!("/r{index}")));
    }
    project.config.concurrency = 2;

    let summary = project.deploy(&provider).await;

    assert!(summary.is_success(), "failures: {:?}", summary.failures);
    assert_eq!(cloud.calls_to("CreateFunction").len(), 6);
    assert_eq!(cloud.peak_in_flight(), 2);
}

#[tokio::test]
async fn retargeted_routes_leave_no_unused_integration() {
    let (cloud, provider) = fake_cloud();
    orders_project().deploy(&provider).await;

    let retargeted = TestProject::new("acme", "dev").with_handler(http("placeOrder", "POST", "/orders"));
    let summary = retargeted.deploy(&provider).await;

    assert!(summary.is_success(), "failures: {:?}", summary.failures);
    assert_eq!(cloud.route_keys(), vec!["POST /orders".to_string()]);
    let arn = cloud
        .function("acme-dev-placeOrder")
        .map(|function| function.arn)
        .expect("function exists");
    assert_eq!(cloud.integration_uris(), vec![arn]);
    assert_eq!(cloud.calls_to("DeleteIntegration").len(), 1);
}
