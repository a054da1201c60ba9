use serde_json::json;

use crate::resources::{sorted, FieldChanges, NoChanges};
use crate::tags::Tags;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketSpec {
    pub region: Option<String>,
    /// Static-site buckets take the `-site` name and stay private behind the
    /// distribution.
    pub site: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketLive {
    pub name: String,
    pub arn: String,
    pub tags: Tags,
}

pub fn diff_bucket(_spec: &BucketSpec, _live: &BucketLive) -> NoChanges {
    NoChanges
}

pub fn bucket_arn(name: &str) -> String {
    format!("arn:aws:s3:::{name}")
}

/// Regional REST endpoint used as a distribution origin.
pub fn bucket_origin_domain(name: &str, region: &str) -> String {
    format!("{name}.s3.{region}.amazonaws.com")
}

/// Lambda notification wired from a bucket to its consumer function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaNotification {
    pub id: String,
    pub function_arn: String,
    pub events: Vec<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

pub fn notification_id(bucket: &str) -> String {
    format!("{bucket}-notify")
}

pub fn diff_notification(
    desired: &LambdaNotification,
    live: &[LambdaNotification],
) -> FieldChanges {
    let mut changes = FieldChanges::default();
    match live.iter().find(|current| current.id == desired.id) {
        None => changes.mark("notification", true),
        Some(current) => {
            changes.mark("function", current.function_arn != desired.function_arn);
            changes.mark("events", sorted(&current.events) != sorted(&desired.events));
            changes.mark(
                "filter",
                current.prefix != desired.prefix || current.suffix != desired.suffix,
            );
        }
    }
    changes
}

/// Bucket policy letting one distribution read objects through origin access
/// control.
pub fn site_bucket_policy(bucket: &str, distribution_arn: &str) -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "AllowCloudFrontRead",
            "Effect": "Allow",
            "Principal": {"Service": "cloudfront.amazonaws.com"},
            "Action": "s3:GetObject",
            "Resource": format!("arn:aws:s3:::{bucket}/*"),
            "Condition": {"StringEquals": {"AWS:SourceArn": distribution_arn}},
        }],
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ChangeSet;

    fn desired() -> LambdaNotification {
        LambdaNotification {
            id: notification_id("acme-dev-uploads"),
            function_arn: "arn:aws:lambda:eu-west-1:1:function:acme-dev-uploads".to_string(),
            events: vec!["s3:ObjectCreated:*".to_string()],
            prefix: Some("incoming/".to_string()),
            suffix: None,
        }
    }

    #[test]
    fn absent_notification_is_a_change() {
        assert_eq!(diff_notification(&desired(), &[]).fields, vec!["notification"]);
    }

    #[test]
    fn event_order_does_not_matter() {
        let mut desired = desired();
        desired.events.push("s3:ObjectRemoved:*".to_string());
        let mut live = desired.clone();
        live.events.reverse();

        assert!(diff_notification(&desired, &[live]).is_empty());
    }

    #[test]
    fn site_policy_scopes_to_distribution() {
        let policy: serde_json::Value = serde_json::from_str(&site_bucket_policy(
            "acme-dev-web-site",
            "arn:aws:cloudfront::1:distribution/E1",
        ))
        .expect("valid json");

        assert_eq!(
            policy["Statement"][0]["Condition"]["StringEquals"]["AWS:SourceArn"],
            "arn:aws:cloudfront::1:distribution/E1"
        );
    }
}
