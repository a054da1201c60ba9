//! Deterministic resource names.
//!
//! Every name is a pure function of `(project, stage, handler, kind)`, which is
//! what makes lookup-by-name idempotent across repeated deploys.

use crate::tags::{ResourceType, TagContext};

pub const ROLE_SUFFIX: &str = "-role";
pub const FIFO_SUFFIX: &str = ".fifo";
pub const SITE_SUFFIX: &str = "-site";
pub const DEPS_SUFFIX: &str = "-deps";
pub const EDGE_FUNCTION_SUFFIX: &str = "-viewer-req";

pub fn base_name(ctx: &TagContext) -> String {
    format!("{}-{}-{}", ctx.project, ctx.stage, ctx.handler)
}

/// Name for the given kind. Queues resolve to the standard (non-FIFO) name;
/// use [`queue_name`] when the FIFO flag is known.
pub fn resource_name(ctx: &TagContext, kind: ResourceType) -> String {
    match kind {
        ResourceType::Function | ResourceType::Table => base_name(ctx),
        ResourceType::Role => role_name(ctx),
        ResourceType::Queue => queue_name(ctx, false),
        ResourceType::Bucket => bucket_name(ctx),
        ResourceType::Distribution => distribution_name(ctx),
        ResourceType::RouteCollection => api_name(&ctx.project, &ctx.stage),
        ResourceType::DependencyPackage => layer_name(&ctx.project, &ctx.stage),
        ResourceType::MailIdentity => base_name(ctx),
    }
}

pub fn function_name(ctx: &TagContext) -> String {
    base_name(ctx)
}

pub fn role_name(ctx: &TagContext) -> String {
    role_name_for_function(&function_name(ctx))
}

/// The role a function's naming convention implies, used by cleanup to find
/// roles that were not discovered through tags.
pub fn role_name_for_function(function_name: &str) -> String {
    format!("{function_name}{ROLE_SUFFIX}")
}

pub fn table_name(ctx: &TagContext) -> String {
    base_name(ctx)
}

pub fn queue_name(ctx: &TagContext, fifo: bool) -> String {
    if fifo {
        format!("{}{FIFO_SUFFIX}", base_name(ctx))
    } else {
        base_name(ctx)
    }
}

/// S3 bucket names must be lower case.
pub fn bucket_name(ctx: &TagContext) -> String {
    base_name(ctx).to_ascii_lowercase()
}

pub fn site_bucket_name(ctx: &TagContext) -> String {
    format!("{}{SITE_SUFFIX}", base_name(ctx)).to_ascii_lowercase()
}

pub fn distribution_name(ctx: &TagContext) -> String {
    format!("{}{SITE_SUFFIX}", base_name(ctx))
}

pub fn edge_function_name(ctx: &TagContext) -> String {
    format!("{}{EDGE_FUNCTION_SUFFIX}", base_name(ctx))
}

pub fn edge_function_prefix(project: &str, stage: &str) -> String {
    format!("{project}-{stage}-")
}

pub fn layer_name(project: &str, stage: &str) -> String {
    format!("{project}-{stage}{DEPS_SUFFIX}")
}

pub fn api_name(project: &str, stage: &str) -> String {
    format!("{project}-{stage}")
}

pub fn route_key(method: &str, path: &str) -> String {
    format!("{} {path}", method.to_ascii_uppercase())
}

pub fn inline_policy_name(role_name: &str) -> String {
    format!("{role_name}-policy")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TagContext {
        TagContext::new("acme", "dev", "createOrder")
    }

    #[test]
    fn names_are_stable_for_identical_inputs() {
        assert_eq!(
            resource_name(&ctx(), ResourceType::Function),
            resource_name(&ctx(), ResourceType::Function)
        );
        assert_eq!(function_name(&ctx()), "acme-dev-createOrder");
    }

    #[test]
    fn type_specific_suffixes_are_applied() {
        assert_eq!(role_name(&ctx()), "acme-dev-createOrder-role");
        assert_eq!(queue_name(&ctx(), true), "acme-dev-createOrder.fifo");
        assert_eq!(queue_name(&ctx(), false), "acme-dev-createOrder");
        assert_eq!(site_bucket_name(&ctx()), "acme-dev-createorder-site");
        assert_eq!(layer_name("acme", "dev"), "acme-dev-deps");
        assert_eq!(
            resource_name(&ctx(), ResourceType::DependencyPackage),
            "acme-dev-deps"
        );
    }

    #[test]
    fn route_keys_upper_case_the_method() {
        assert_eq!(route_key("post", "/orders"), "POST /orders");
    }

    #[test]
    fn derived_role_matches_role_name() {
        assert_eq!(
            role_name_for_function(&function_name(&ctx())),
            role_name(&ctx())
        );
    }
}
