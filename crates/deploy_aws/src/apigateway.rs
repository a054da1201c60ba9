//! The shared HTTP API, its Lambda proxy integrations, and routes.

use async_trait::async_trait;
use aws_sdk_apigatewayv2::types::{IntegrationType, ProtocolType};
use deploy_core::resources::route::{
    parse_route_target, route_target, ApiLive, IntegrationLive, RouteLive,
};
use deploy_core::tags::Tags;
use deploy_engine::ports::{ProviderResult, RouteApi};
use tracing::debug;

use crate::error::{classify, missing_field};
use crate::provider::{from_hash_map, to_hash_map, AwsCloud};

const DEFAULT_STAGE: &str = "$default";
const PAYLOAD_FORMAT: &str = "2.0";

#[async_trait]
impl RouteApi for AwsCloud {
    async fn find_api(&self, name: &str) -> ProviderResult<Option<ApiLive>> {
        let mut next: Option<String> = None;
        loop {
            let output = self
                .apigateway
                .get_apis()
                .set_next_token(next.take())
                .send()
                .await
                .map_err(|error| classify("GetApis", error))?;
            if let Some(api) = output.items().iter().find(|api| api.name() == Some(name)) {
                return Ok(Some(ApiLive {
                    id: api.api_id().unwrap_or_default().to_string(),
                    name: name.to_string(),
                    endpoint: api.api_endpoint().unwrap_or_default().to_string(),
                    tags: from_hash_map(api.tags()),
                }));
            }
            match output.next_token() {
                Some(token) => next = Some(token.to_string()),
                None => return Ok(None),
            }
        }
    }

    async fn create_api(&self, name: &str, tags: &Tags) -> ProviderResult<ApiLive> {
        let output = self
            .apigateway
            .create_api()
            .name(name)
            .protocol_type(ProtocolType::Http)
            .set_tags(Some(to_hash_map(tags)))
            .send()
            .await
            .map_err(|error| classify("CreateApi", error))?;
        let id = output
            .api_id()
            .ok_or_else(|| missing_field("CreateApi", "ApiId"))?
            .to_string();

        debug!(api = %id, "creating auto-deploying default stage");
        self.apigateway
            .create_stage()
            .api_id(&id)
            .stage_name(DEFAULT_STAGE)
            .auto_deploy(true)
            .send()
            .await
            .map_err(|error| classify("CreateStage", error))?;

        Ok(ApiLive {
            id,
            name: name.to_string(),
            endpoint: output.api_endpoint().unwrap_or_default().to_string(),
            tags: tags.clone(),
        })
    }

    async fn tag_api(&self, arn: &str, tags: &Tags) -> ProviderResult<()> {
        self.apigateway
            .tag_resource()
            .resource_arn(arn)
            .set_tags(Some(to_hash_map(tags)))
            .send()
            .await
            .map_err(|error| classify("TagResource", error))?;
        Ok(())
    }

    async fn list_routes(&self, api_id: &str) -> ProviderResult<Vec<RouteLive>> {
        let mut routes = Vec::new();
        let mut next: Option<String> = None;
        loop {
            let output = self
                .apigateway
                .get_routes()
                .api_id(api_id)
                .set_next_token(next.take())
                .send()
                .await
                .map_err(|error| classify("GetRoutes", error))?;
            routes.extend(output.items().iter().map(|route| RouteLive {
                route_id: route.route_id().unwrap_or_default().to_string(),
                route_key: route.route_key().unwrap_or_default().to_string(),
                integration_id: route.target().and_then(parse_route_target),
            }));
            match output.next_token() {
                Some(token) => next = Some(token.to_string()),
                None => break,
            }
        }
        Ok(routes)
    }

    async fn list_integrations(&self, api_id: &str) -> ProviderResult<Vec<IntegrationLive>> {
        let mut integrations = Vec::new();
        let mut next: Option<String> = None;
        loop {
            let output = self
                .apigateway
                .get_integrations()
                .api_id(api_id)
                .set_next_token(next.take())
                .send()
                .await
                .map_err(|error| classify("GetIntegrations", error))?;
            integrations.extend(output.items().iter().map(|integration| IntegrationLive {
                integration_id: integration.integration_id().unwrap_or_default().to_string(),
                integration_uri: integration.integration_uri().unwrap_or_default().to_string(),
            }));
            match output.next_token() {
                Some(token) => next = Some(token.to_string()),
                None => break,
            }
        }
        Ok(integrations)
    }

    async fn create_integration(&self, api_id: &str, function_arn: &str) -> ProviderResult<String> {
        let output = self
            .apigateway
            .create_integration()
            .api_id(api_id)
            .integration_type(IntegrationType::AwsProxy)
            .integration_uri(function_arn)
            .payload_format_version(PAYLOAD_FORMAT)
            .send()
            .await
            .map_err(|error| classify("CreateIntegration", error))?;
        output
            .integration_id()
            .map(ToString::to_string)
            .ok_or_else(|| missing_field("CreateIntegration", "IntegrationId"))
    }

    async fn create_route(
        &self,
        api_id: &str,
        route_key: &str,
        integration_id: &str,
    ) -> ProviderResult<String> {
        let output = self
            .apigateway
            .create_route()
            .api_id(api_id)
            .route_key(route_key)
            .target(route_target(integration_id))
            .send()
            .await
            .map_err(|error| classify("CreateRoute", error))?;
        output
            .route_id()
            .map(ToString::to_string)
            .ok_or_else(|| missing_field("CreateRoute", "RouteId"))
    }

    async fn update_route(
        &self,
        api_id: &str,
        route_id: &str,
        integration_id: &str,
    ) -> ProviderResult<()> {
        self.apigateway
            .update_route()
            .api_id(api_id)
            .route_id(route_id)
            .target(route_target(integration_id))
            .send()
            .await
            .map_err(|error| classify("UpdateRoute", error))?;
        Ok(())
    }

    async fn delete_route(&self, api_id: &str, route_id: &str) -> ProviderResult<()> {
        self.apigateway
            .delete_route()
            .api_id(api_id)
            .route_id(route_id)
            .send()
            .await
            .map_err(|error| classify("DeleteRoute", error))?;
        Ok(())
    }

    async fn delete_integration(&self, api_id: &str, integration_id: &str) -> ProviderResult<()> {
        self.apigateway
            .delete_integration()
            .api_id(api_id)
            .integration_id(integration_id)
            .send()
            .await
            .map_err(|error| classify("DeleteIntegration", error))?;
        Ok(())
    }

    async fn delete_api(&self, api_id: &str) -> ProviderResult<()> {
        self.apigateway
            .delete_api()
            .api_id(api_id)
            .send()
            .await
            .map_err(|error| classify("DeleteApi", error))?;
        Ok(())
    }
}
