//! Extracting provider-facing names from ARNs found through tag inventory.

use crate::tags::ResourceType;

/// Name (or id) the delete call for `kind` expects, parsed from an ARN.
///
/// Layer version ARNs yield `name:version`.
pub fn resource_id(kind: ResourceType, arn: &str) -> Option<String> {
    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    let resource = *parts.get(5)?;
    let id = match kind {
        ResourceType::Function => resource.strip_prefix("function:")?.split(':').next()?,
        ResourceType::DependencyPackage => resource.strip_prefix("layer:")?,
        ResourceType::Role => resource.strip_prefix("role/")?.rsplit('/').next()?,
        ResourceType::Table => resource.strip_prefix("table/")?.split('/').next()?,
        ResourceType::Queue | ResourceType::Bucket => resource,
        ResourceType::Distribution => resource.strip_prefix("distribution/")?,
        ResourceType::RouteCollection => resource.strip_prefix("/apis/")?.split('/').next()?,
        ResourceType::MailIdentity => resource.strip_prefix("identity/")?,
    };
    (!id.is_empty()).then(|| id.to_string())
}

/// Splits `name:version` from a layer version id.
pub fn split_layer_version(id: &str) -> Option<(&str, i64)> {
    let (name, version) = id.rsplit_once(':')?;
    Some((name, version.parse().ok()?))
}

pub fn region(arn: &str) -> Option<&str> {
    arn.split(':').nth(3).filter(|value| !value.is_empty())
}

pub fn account_id(arn: &str) -> Option<&str> {
    arn.split(':').nth(4).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids_for_each_kind() {
        let cases = [
            (ResourceType::Function, "arn:aws:lambda:eu-west-1:1:function:acme-dev-a", "acme-dev-a"),
            (ResourceType::Role, "arn:aws:iam::1:role/acme-dev-a-role", "acme-dev-a-role"),
            (ResourceType::Table, "arn:aws:dynamodb:eu-west-1:1:table/acme-dev-orders", "acme-dev-orders"),
            (ResourceType::Queue, "arn:aws:sqs:eu-west-1:1:acme-dev-jobs.fifo", "acme-dev-jobs.fifo"),
            (ResourceType::Bucket, "arn:aws:s3:::acme-dev-uploads", "acme-dev-uploads"),
            (ResourceType::Distribution, "arn:aws:cloudfront::1:distribution/E1ABC", "E1ABC"),
            (ResourceType::RouteCollection, "arn:aws:apigateway:eu-west-1::/apis/abc123", "abc123"),
            (ResourceType::MailIdentity, "arn:aws:ses:eu-west-1:1:identity/acme.example", "acme.example"),
            (ResourceType::DependencyPackage, "arn:aws:lambda:eu-west-1:1:layer:acme-dev-deps:7", "acme-dev-deps:7"),
        ];

        for (kind, arn, expected) in cases {
            assert_eq!(resource_id(kind, arn).as_deref(), Some(expected), "{kind}");
        }
    }

    #[test]
    fn mismatched_arn_yields_none() {
        assert_eq!(resource_id(ResourceType::Function, "arn:aws:s3:::bucket"), None);
        assert_eq!(resource_id(ResourceType::Table, "not-an-arn"), None);
    }

    #[test]
    fn layer_version_splits() {
        assert_eq!(split_layer_version("acme-dev-deps:7"), Some(("acme-dev-deps", 7)));
        assert_eq!(split_layer_version("acme-dev-deps"), None);
        assert_eq!(region("arn:aws:lambda:eu-west-1:1:function:a"), Some("eu-west-1"));
        assert_eq!(account_id("arn:aws:lambda:eu-west-1:123:function:a"), Some("123"));
    }
}
