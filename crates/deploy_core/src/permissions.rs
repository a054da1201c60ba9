//! IAM permission templates and policy rendering.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Rendered inline policies above this size are rejected by IAM.
pub const INLINE_POLICY_SIZE_LIMIT: usize = 10_240;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub action: String,
    pub resource: String,
}

impl Permission {
    pub fn new(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource: resource.into(),
        }
    }
}

fn grant(actions: &[&str], resource: &str) -> Vec<Permission> {
    actions
        .iter()
        .map(|action| Permission::new(*action, resource))
        .collect()
}

/// Every function writes its own logs.
pub fn function_defaults() -> Vec<Permission> {
    grant(
        &["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"],
        "*",
    )
}

pub fn table_stream_consumer(table_arn_pattern: &str) -> Vec<Permission> {
    let stream = format!("{table_arn_pattern}/stream/*");
    grant(
        &[
            "dynamodb:DescribeStream",
            "dynamodb:GetRecords",
            "dynamodb:GetShardIterator",
            "dynamodb:ListStreams",
        ],
        &stream,
    )
}

pub fn queue_consumer(queue_arn_pattern: &str) -> Vec<Permission> {
    grant(
        &[
            "sqs:ReceiveMessage",
            "sqs:DeleteMessage",
            "sqs:GetQueueAttributes",
            "sqs:ChangeMessageVisibility",
        ],
        queue_arn_pattern,
    )
}

pub fn bucket_consumer(bucket_name: &str) -> Vec<Permission> {
    bucket_access(bucket_name)
}

pub fn table_access(table_arn_pattern: &str) -> Vec<Permission> {
    let actions = [
        "dynamodb:GetItem",
        "dynamodb:PutItem",
        "dynamodb:UpdateItem",
        "dynamodb:DeleteItem",
        "dynamodb:Query",
        "dynamodb:Scan",
        "dynamodb:BatchGetItem",
        "dynamodb:BatchWriteItem",
    ];
    let mut permissions = grant(&actions, table_arn_pattern);
    permissions.extend(grant(&actions, &format!("{table_arn_pattern}/index/*")));
    permissions
}

pub fn bucket_access(bucket_name: &str) -> Vec<Permission> {
    let mut permissions = grant(
        &["s3:GetObject", "s3:PutObject", "s3:DeleteObject"],
        &format!("arn:aws:s3:::{bucket_name}/*"),
    );
    permissions.push(Permission::new(
        "s3:ListBucket",
        format!("arn:aws:s3:::{bucket_name}"),
    ));
    permissions
}

pub fn mailer_access() -> Vec<Permission> {
    grant(&["ses:SendEmail", "ses:SendRawEmail"], "*")
}

pub fn parameter_access(parameter_arn_pattern: &str) -> Vec<Permission> {
    grant(
        &["ssm:GetParameter", "ssm:GetParameters"],
        parameter_arn_pattern,
    )
}

pub fn declared(actions: &[String]) -> Vec<Permission> {
    actions
        .iter()
        .map(|action| Permission::new(action.clone(), "*"))
        .collect()
}

pub fn table_arn_pattern(table_name: &str) -> String {
    format!("arn:aws:dynamodb:*:*:table/{table_name}")
}

pub fn queue_arn_pattern(queue_name: &str) -> String {
    format!("arn:aws:sqs:*:*:{queue_name}")
}

pub fn parameter_arn_pattern(path: &str) -> String {
    format!("arn:aws:ssm:*:*:parameter{path}")
}

pub const LAMBDA_TRUST_POLICY: &str = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":{"Service":"lambda.amazonaws.com"},"Action":"sts:AssumeRole"}]}"#;

/// Render a permission list as an IAM policy document.
///
/// Consecutive permissions on the same resource collapse into one statement;
/// order is otherwise preserved and repeated entries are kept as given.
pub fn render_policy(permissions: &[Permission]) -> String {
    let mut statements: Vec<(String, Vec<String>)> = Vec::new();
    for permission in permissions {
        match statements.last_mut() {
            Some((resource, actions)) if *resource == permission.resource => {
                actions.push(permission.action.clone());
            }
            _ => statements.push((permission.resource.clone(), vec![permission.action.clone()])),
        }
    }

    let statements: Vec<Value> = statements
        .into_iter()
        .map(|(resource, actions)| {
            json!({
                "Effect": "Allow",
                "Action": actions,
                "Resource": resource,
            })
        })
        .collect();

    json!({
        "Version": "2012-10-17",
        "Statement": statements,
    })
    .to_string()
}

/// Compare two policy documents structurally so whitespace or URL encoding
/// returned by the provider does not register as drift.
pub fn policies_equivalent(left: &str, right: &str) -> bool {
    match (
        serde_json::from_str::<Value>(left),
        serde_json::from_str::<Value>(right),
    ) {
        (Ok(left), Ok(right)) => left == right,
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_groups_consecutive_actions_by_resource() {
        let mut permissions = function_defaults();
        permissions.extend(mailer_access());
        permissions.extend(bucket_access("acme-dev-uploads"));

        let document: Value =
            serde_json::from_str(&render_policy(&permissions)).expect("valid json");
        let statements = document["Statement"].as_array().expect("statements");

        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0]["Action"].as_array().map(Vec::len), Some(5));
        assert_eq!(statements[1]["Resource"], "arn:aws:s3:::acme-dev-uploads/*");
        assert_eq!(statements[2]["Action"][0], "s3:ListBucket");
    }

    #[test]
    fn repeated_permissions_are_not_deduplicated() {
        let mut permissions = mailer_access();
        permissions.extend(mailer_access());

        let document: Value =
            serde_json::from_str(&render_policy(&permissions)).expect("valid json");
        assert_eq!(document["Statement"][0]["Action"].as_array().map(Vec::len), Some(4));
    }

    #[test]
    fn equivalent_policies_ignore_formatting() {
        let compact = render_policy(&mailer_access());
        let pretty = serde_json::to_string_pretty(
            &serde_json::from_str::<Value>(&compact).expect("valid json"),
        )
        .expect("serializes");
        assert!(policies_equivalent(&compact, &pretty));
    }
}
