//! CDN distribution and viewer-request edge function for static sites.

use crate::resources::{sorted, FieldChanges};
use crate::tags::{TagContext, Tags};

/// Managed `CachingOptimized` policy.
pub const CACHE_POLICY_OPTIMIZED: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";
/// Managed `CachingDisabled` policy, used for proxied API routes.
pub const CACHE_POLICY_DISABLED: &str = "4135ea2d-6df8-44a3-9df3-4b5a84be39ad";
/// Managed `AllViewerExceptHostHeader` origin request policy.
pub const ORIGIN_REQUEST_ALL_VIEWER_EXCEPT_HOST: &str = "b689b0a8-53d0-40ab-baf2-68738e2966ac";

pub const SITE_ORIGIN_ID: &str = "site";
pub const API_ORIGIN_ID: &str = "api";
pub const API_PATH_PATTERN: &str = "/api/*";
pub const VIEWER_REQUEST: &str = "viewer-request";
pub const STATUS_DEPLOYED: &str = "Deployed";
/// Edge functions cannot be tagged; their comment records the owner instead.
pub const EDGE_OWNER_PREFIX: &str = "owner:";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FunctionAssociation {
    pub event_type: String,
    pub function_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ErrorPage {
    pub error_code: u16,
    pub response_code: u16,
    pub response_page_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiOrigin {
    pub domain: String,
    pub path_pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionSpec {
    pub origin_domain: String,
    pub origin_access_control_id: String,
    pub default_root_object: String,
    pub cache_policy_id: String,
    pub function_associations: Vec<FunctionAssociation>,
    pub aliases: Vec<String>,
    pub certificate_arn: Option<String>,
    pub error_pages: Vec<ErrorPage>,
    pub api_origin: Option<ApiOrigin>,
}

impl DistributionSpec {
    /// SPA sites answer every unknown path with the index document.
    pub fn spa_error_pages(index: &str) -> Vec<ErrorPage> {
        let path = format!("/{}", index.trim_start_matches('/'));
        [403, 404]
            .into_iter()
            .map(|code| ErrorPage {
                error_code: code,
                response_code: 200,
                response_page_path: path.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionLive {
    pub id: String,
    pub arn: String,
    pub domain_name: String,
    pub etag: String,
    pub enabled: bool,
    pub status: String,
    pub origin_domain: String,
    pub cache_policy_id: String,
    pub function_associations: Vec<FunctionAssociation>,
    pub aliases: Vec<String>,
    pub certificate_arn: Option<String>,
    pub error_pages: Vec<ErrorPage>,
    pub api_origin: Option<ApiOrigin>,
    pub tags: Tags,
}

impl DistributionLive {
    pub fn is_deployed(&self) -> bool {
        self.status == STATUS_DEPLOYED
    }
}

pub fn diff_distribution(spec: &DistributionSpec, live: &DistributionLive) -> FieldChanges {
    let mut changes = FieldChanges::default();
    changes.mark("origin_domain", spec.origin_domain != live.origin_domain);
    changes.mark("cache_policy", spec.cache_policy_id != live.cache_policy_id);
    changes.mark(
        "function_associations",
        sorted(&spec.function_associations) != sorted(&live.function_associations),
    );
    changes.mark("aliases", sorted(&spec.aliases) != sorted(&live.aliases));
    changes.mark("certificate", spec.certificate_arn != live.certificate_arn);
    changes.mark(
        "error_pages",
        sorted(&spec.error_pages) != sorted(&live.error_pages),
    );
    changes.mark("api_origin", spec.api_origin != live.api_origin);
    changes.mark("enabled", !live.enabled);
    changes
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeFunctionSpec {
    pub code: String,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeFunctionLive {
    pub name: String,
    pub arn: String,
    pub etag: String,
    pub code: String,
    pub comment: String,
}

/// Name and comment of a listed edge function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeFunctionSummary {
    pub name: String,
    pub comment: String,
}

impl EdgeFunctionSummary {
    pub fn owner(&self) -> Option<TagContext> {
        parse_edge_owner(&self.comment)
    }
}

pub fn diff_edge_function(spec: &EdgeFunctionSpec, live: &EdgeFunctionLive) -> FieldChanges {
    let mut changes = FieldChanges::default();
    changes.mark("code", spec.code.trim() != live.code.trim());
    changes.mark("comment", spec.comment != live.comment);
    changes
}

/// `owner:{project}/{stage}/{handler}`. Identifiers never contain `/`.
pub fn edge_owner_comment(ctx: &TagContext) -> String {
    format!("{EDGE_OWNER_PREFIX}{}/{}/{}", ctx.project, ctx.stage, ctx.handler)
}

pub fn parse_edge_owner(comment: &str) -> Option<TagContext> {
    let mut parts = comment.strip_prefix(EDGE_OWNER_PREFIX)?.split('/');
    let (project, stage, handler) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || [project, stage, handler].iter().any(|part| part.is_empty()) {
        return None;
    }
    Some(TagContext::new(project, stage, handler))
}

/// Viewer-request function mapping directory paths to their index document,
/// and extension-less paths to the SPA index when `spa` is set.
pub fn viewer_request_code(index: &str, spa: bool) -> String {
    let index = index.trim_start_matches('/');
    let fallback = if spa {
        format!("    if (!uri.includes('.')) {{\n        request.uri = '/{index}';\n    }}\n")
    } else {
        format!("    if (!uri.includes('.')) {{\n        request.uri = uri + '/{index}';\n    }}\n")
    };
    format!(
        "function handler(event) {{\n    var request = event.request;\n    var uri = request.uri;\n    if (uri.endsWith('/')) {{\n        request.uri = uri + '{index}';\n        return request;\n    }}\n{fallback}    return request;\n}}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ChangeSet;

    fn spec() -> DistributionSpec {
        DistributionSpec {
            origin_domain: "acme-dev-web-site.s3.eu-west-1.amazonaws.com".to_string(),
            origin_access_control_id: "OAC1".to_string(),
            default_root_object: "index.html".to_string(),
            cache_policy_id: CACHE_POLICY_OPTIMIZED.to_string(),
            function_associations: vec![FunctionAssociation {
                event_type: VIEWER_REQUEST.to_string(),
                function_arn: "arn:aws:cloudfront::1:function/acme-dev-web-viewer-req".to_string(),
            }],
            aliases: vec!["www.acme.example".to_string(), "acme.example".to_string()],
            certificate_arn: Some("arn:aws:acm:us-east-1:1:certificate/abc".to_string()),
            error_pages: DistributionSpec::spa_error_pages("index.html"),
            api_origin: None,
        }
    }

    fn live_from(spec: &DistributionSpec) -> DistributionLive {
        DistributionLive {
            id: "E1".to_string(),
            arn: "arn:aws:cloudfront::1:distribution/E1".to_string(),
            domain_name: "d1.cloudfront.net".to_string(),
            etag: "ETAG1".to_string(),
            enabled: true,
            status: STATUS_DEPLOYED.to_string(),
            origin_domain: spec.origin_domain.clone(),
            cache_policy_id: spec.cache_policy_id.clone(),
            function_associations: spec.function_associations.clone(),
            aliases: spec.aliases.iter().rev().cloned().collect(),
            certificate_arn: spec.certificate_arn.clone(),
            error_pages: spec.error_pages.clone(),
            api_origin: None,
            tags: Tags::new(),
        }
    }

    #[test]
    fn alias_order_is_not_drift() {
        let spec = spec();
        assert!(diff_distribution(&spec, &live_from(&spec)).is_empty());
    }

    #[test]
    fn api_proxy_origin_is_diffed() {
        let mut spec = spec();
        let live = live_from(&spec);
        spec.api_origin = Some(ApiOrigin {
            domain: "abc.execute-api.eu-west-1.amazonaws.com".to_string(),
            path_pattern: API_PATH_PATTERN.to_string(),
        });

        assert_eq!(diff_distribution(&spec, &live).fields, vec!["api_origin"]);
    }

    #[test]
    fn owner_comment_names_the_exact_stage() {
        let owner = TagContext::new("acme", "dev-eu", "web");
        let comment = edge_owner_comment(&owner);

        assert_eq!(comment, "owner:acme/dev-eu/web");
        assert_eq!(parse_edge_owner(&comment), Some(owner));
        assert_eq!(parse_edge_owner("web index rewrite"), None);
        assert_eq!(parse_edge_owner("owner:acme/dev"), None);
        assert_eq!(parse_edge_owner("owner:acme//web"), None);
    }

    #[test]
    fn spa_rewrite_targets_root_index() {
        let code = viewer_request_code("index.html", true);
        assert!(code.contains("request.uri = '/index.html'"));
        assert!(code.starts_with("function handler(event)"));
    }
}
