use crate::resources::FieldChanges;
use crate::tags::Tags;

/// Project-wide HTTP API that every route hangs off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiLive {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    pub tags: Tags,
}

impl ApiLive {
    pub fn arn(&self, region: &str) -> String {
        format!("arn:aws:apigateway:{region}::/apis/{}", self.id)
    }

    /// Source ARN pattern granting the API permission to invoke a function.
    pub fn execute_arn(&self, region: &str, account_id: &str) -> String {
        format!("arn:aws:execute-api:{region}:{account_id}:{}/*/*", self.id)
    }

    pub fn domain(&self) -> String {
        self.endpoint
            .trim_start_matches("https://")
            .trim_end_matches('/')
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub route_key: String,
    pub function_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteLive {
    pub route_id: String,
    pub route_key: String,
    /// Integration id parsed from the route target `integrations/{id}`.
    pub integration_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationLive {
    pub integration_id: String,
    pub integration_uri: String,
}

pub fn route_target(integration_id: &str) -> String {
    format!("integrations/{integration_id}")
}

pub fn parse_route_target(target: &str) -> Option<String> {
    target
        .strip_prefix("integrations/")
        .map(ToString::to_string)
}

/// A route differs when its target does not point at the integration for the
/// desired function.
pub fn diff_route(
    spec: &RouteSpec,
    live: &RouteLive,
    integrations: &[IntegrationLive],
) -> FieldChanges {
    let target_uri = live.integration_id.as_ref().and_then(|id| {
        integrations
            .iter()
            .find(|integration| &integration.integration_id == id)
            .map(|integration| integration.integration_uri.as_str())
    });
    let mut changes = FieldChanges::default();
    changes.mark("target", target_uri != Some(spec.function_arn.as_str()));
    changes
}
