mod support;

use std::time::Duration;

use deploy_core::inventory::deletion_rank;
use deploy_engine::cleanup::{cleanup, delete_resources, status, CleanupPolicy, CleanupScope};
use deploy_engine::retry::PollPolicy;
use support::project::{fake_cloud, http, table, TestProject};

fn policy() -> CleanupPolicy {
    CleanupPolicy::uniform(PollPolicy::new(Duration::from_millis(1), 10))
}

fn position(operations: &[&str], operation: &str) -> usize {
    operations
        .iter()
        .position(|candidate| *candidate == operation)
        .unwrap_or_else(|| panic!("{operation} was never called"))
}

#[tokio::test]
async fn functions_are_deleted_before_their_roles_whatever_the_input_order() {
    let (cloud, provider) = fake_cloud();
    TestProject::new("acme", "dev")
        .with_handler(http("createOrder", "POST", "/orders"))
        .deploy(&provider)
        .await;

    let mut inventory = provider
        .tagging
        .list_tagged_resources("acme", "dev")
        .await
        .expect("inventory lists");
    inventory.sort_by_key(|resource| std::cmp::Reverse(deletion_rank(resource.resource_type())));
    cloud.clear_calls();

    let report = delete_resources(&provider, policy(), &inventory).await;

    assert!(report.is_success(), "failures: {:?}", report.failed);
    let calls = cloud.mutating_calls();
    let operations: Vec<&str> = calls.iter().map(|call| call.operation).collect();
    assert!(position(&operations, "DeleteFunction") < position(&operations, "DeleteRole"));
    assert!(position(&operations, "DeleteApi") < position(&operations, "DeleteRole"));
    assert!(cloud.function("acme-dev-createOrder").is_none());
    assert!(cloud.role("acme-dev-createOrder-role").is_none());
    assert_eq!(cloud.calls_to("DeleteRole").len(), 1);
}

#[tokio::test]
async fn orphan_cleanup_keeps_declared_and_shared_resources() {
    let (cloud, provider) = fake_cloud();
    TestProject::new("acme", "dev")
        .with_handler(http("createOrder", "POST", "/orders"))
        .with_handler(http("legacy", "GET", "/legacy"))
        .deploy(&provider)
        .await;

    let scope = CleanupScope::Orphaned {
        declared: vec!["createOrder".to_string()],
    };
    let report = cleanup(&provider, policy(), "acme", "dev", &scope, false)
        .await
        .expect("cleanup runs");

    assert!(report.is_success());
    assert!(cloud.function("acme-dev-legacy").is_none());
    assert!(cloud.role("acme-dev-legacy-role").is_none());
    assert!(cloud.function("acme-dev-createOrder").is_some());
    assert!(cloud.role("acme-dev-createOrder-role").is_some());
    assert!(cloud.calls_to("DeleteApi").is_empty());
}

#[tokio::test]
async fn handler_scope_tears_down_a_table_and_its_consumer() {
    let (cloud, provider) = fake_cloud();
    TestProject::new("acme", "dev")
        .with_handler(table("orders", true))
        .with_handler(table("audit", false))
        .deploy(&provider)
        .await;
    assert_eq!(cloud.event_source_mappings().len(), 1);

    let scope = CleanupScope::Handler("orders".to_string());
    let report = cleanup(&provider, policy(), "acme", "dev", &scope, false)
        .await
        .expect("cleanup runs");

    assert!(report.is_success(), "failures: {:?}", report.failed);
    assert!(cloud.table("acme-dev-orders").is_none());
    assert!(cloud.function("acme-dev-orders").is_none());
    assert!(cloud.event_source_mappings().is_empty());
    assert!(cloud.table("acme-dev-audit").is_some());
}

#[tokio::test]
async fn untagged_role_is_found_through_its_function() {
    let (cloud, provider) = fake_cloud();
    TestProject::new("acme", "dev")
        .with_handler(http("createOrder", "POST", "/orders"))
        .deploy(&provider)
        .await;
    let role_arn = cloud
        .role("acme-dev-createOrder-role")
        .map(|role| role.arn)
        .expect("role exists");
    cloud.strip_tags(&role_arn);

    let scope = CleanupScope::Handler("createOrder".to_string());
    let report = cleanup(&provider, policy(), "acme", "dev", &scope, false)
        .await
        .expect("cleanup runs");

    assert!(report.deleted.contains(&role_arn));
    assert!(cloud.role("acme-dev-createOrder-role").is_none());
}

#[tokio::test]
async fn status_flags_undeclared_handlers() {
    let (_cloud, provider) = fake_cloud();
    TestProject::new("acme", "dev")
        .with_handler(http("createOrder", "POST", "/orders"))
        .with_handler(http("legacy", "GET", "/legacy"))
        .deploy(&provider)
        .await;

    let inventory = status(&provider, "acme", "dev", &["createOrder".to_string()])
        .await
        .expect("inventory lists");

    let legacy = inventory
        .iter()
        .find(|entry| entry.handler == "legacy")
        .expect("legacy listed");
    assert!(legacy.orphaned);
    let declared = inventory
        .iter()
        .find(|entry| entry.handler == "createOrder")
        .expect("declared listed");
    assert!(!declared.orphaned);
    assert_eq!(declared.counts.values().sum::<usize>(), 2);
}
