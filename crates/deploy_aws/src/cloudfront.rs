//! Distributions, origin access controls, and viewer-request functions.
//!
//! CloudFront is global; the client is built against `us-east-1`.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use aws_sdk_cloudfront::error::BuildError;
use aws_sdk_cloudfront::primitives::Blob;
use aws_sdk_cloudfront::types::{
    Aliases, AllowedMethods, CacheBehavior, CacheBehaviors, CachedMethods, CustomErrorResponse,
    CustomErrorResponses, CustomOriginConfig, DefaultCacheBehavior, Distribution,
    DistributionConfig, DistributionConfigWithTags, EventType, FunctionAssociation as SdkAssociation,
    FunctionAssociations, FunctionConfig, FunctionRuntime, FunctionStage, HttpVersion, Method,
    MinimumProtocolVersion, OriginAccessControlConfig, OriginAccessControlOriginTypes,
    OriginAccessControlSigningBehaviors, OriginAccessControlSigningProtocols, OriginProtocolPolicy,
    OriginSslProtocols, Origin, Origins, S3OriginConfig, SslProtocol, SslSupportMethod, Tag,
    Tags as SdkTags, ViewerCertificate, ViewerProtocolPolicy,
};
use deploy_core::error::ProviderError;
use deploy_core::resources::distribution::{
    ApiOrigin, DistributionLive, DistributionSpec, EdgeFunctionLive, EdgeFunctionSpec,
    EdgeFunctionSummary, ErrorPage, FunctionAssociation, API_ORIGIN_ID, CACHE_POLICY_DISABLED,
    ORIGIN_REQUEST_ALL_VIEWER_EXCEPT_HOST, SITE_ORIGIN_ID,
};
use deploy_core::tags::Tags;
use deploy_engine::ports::{DistributionApi, ProviderResult};

use crate::error::{absent, classify, invalid_request, missing_field};
use crate::provider::AwsCloud;

const ERROR_CACHING_MIN_TTL: i64 = 10;

fn built(error: BuildError) -> ProviderError {
    invalid_request("DistributionConfig", error)
}

fn sdk_tags(tags: &Tags) -> ProviderResult<SdkTags> {
    let items = tags
        .iter()
        .map(|(key, value)| Tag::builder().key(key).value(value).build().map_err(built))
        .collect::<ProviderResult<Vec<_>>>()?;
    Ok(SdkTags::builder().set_items(Some(items)).build())
}

fn count<T>(items: &[T]) -> i32 {
    i32::try_from(items.len()).unwrap_or(i32::MAX)
}

fn site_origin(spec: &DistributionSpec) -> ProviderResult<Origin> {
    Origin::builder()
        .id(SITE_ORIGIN_ID)
        .domain_name(&spec.origin_domain)
        .origin_access_control_id(&spec.origin_access_control_id)
        .s3_origin_config(
            S3OriginConfig::builder()
                .origin_access_identity("")
                .build(),
        )
        .build()
        .map_err(built)
}

fn api_origin(api: &ApiOrigin) -> ProviderResult<Origin> {
    let protocols = OriginSslProtocols::builder()
        .quantity(1)
        .items(SslProtocol::TlSv12)
        .build()
        .map_err(built)?;
    Origin::builder()
        .id(API_ORIGIN_ID)
        .domain_name(&api.domain)
        .custom_origin_config(
            CustomOriginConfig::builder()
                .http_port(80)
                .https_port(443)
                .origin_protocol_policy(OriginProtocolPolicy::HttpsOnly)
                .origin_ssl_protocols(protocols)
                .build()
                .map_err(built)?,
        )
        .build()
        .map_err(built)
}

fn api_behavior(api: &ApiOrigin) -> ProviderResult<CacheBehavior> {
    let methods = vec![
        Method::Get,
        Method::Head,
        Method::Options,
        Method::Put,
        Method::Post,
        Method::Patch,
        Method::Delete,
    ];
    let allowed = AllowedMethods::builder()
        .quantity(count(&methods))
        .set_items(Some(methods))
        .cached_methods(
            CachedMethods::builder()
                .quantity(2)
                .items(Method::Get)
                .items(Method::Head)
                .build()
                .map_err(built)?,
        )
        .build()
        .map_err(built)?;
    CacheBehavior::builder()
        .path_pattern(&api.path_pattern)
        .target_origin_id(API_ORIGIN_ID)
        .viewer_protocol_policy(ViewerProtocolPolicy::HttpsOnly)
        .cache_policy_id(CACHE_POLICY_DISABLED)
        .origin_request_policy_id(ORIGIN_REQUEST_ALL_VIEWER_EXCEPT_HOST)
        .allowed_methods(allowed)
        .build()
        .map_err(built)
}

fn default_behavior(spec: &DistributionSpec) -> ProviderResult<DefaultCacheBehavior> {
    let associations = spec
        .function_associations
        .iter()
        .map(|association| {
            SdkAssociation::builder()
                .function_arn(&association.function_arn)
                .event_type(EventType::from(association.event_type.as_str()))
                .build()
                .map_err(built)
        })
        .collect::<ProviderResult<Vec<_>>>()?;
    DefaultCacheBehavior::builder()
        .target_origin_id(SITE_ORIGIN_ID)
        .viewer_protocol_policy(ViewerProtocolPolicy::RedirectToHttps)
        .cache_policy_id(&spec.cache_policy_id)
        .compress(true)
        .function_associations(
            FunctionAssociations::builder()
                .quantity(count(&associations))
                .set_items(Some(associations))
                .build()
                .map_err(built)?,
        )
        .build()
        .map_err(built)
}

fn viewer_certificate(spec: &DistributionSpec) -> ViewerCertificate {
    match &spec.certificate_arn {
        Some(arn) => ViewerCertificate::builder()
            .acm_certificate_arn(arn)
            .ssl_support_method(SslSupportMethod::SniOnly)
            .minimum_protocol_version(MinimumProtocolVersion::TlSv122021)
            .build(),
        None => ViewerCertificate::builder()
            .cloud_front_default_certificate(true)
            .build(),
    }
}

fn error_responses(spec: &DistributionSpec) -> ProviderResult<CustomErrorResponses> {
    let items = spec
        .error_pages
        .iter()
        .map(|page| {
            CustomErrorResponse::builder()
                .error_code(i32::from(page.error_code))
                .response_code(page.response_code.to_string())
                .response_page_path(&page.response_page_path)
                .error_caching_min_ttl(ERROR_CACHING_MIN_TTL)
                .build()
                .map_err(built)
        })
        .collect::<ProviderResult<Vec<_>>>()?;
    CustomErrorResponses::builder()
        .quantity(count(&items))
        .set_items(Some(items))
        .build()
        .map_err(built)
}

/// Full distribution document for `spec`. The name doubles as the comment,
/// which is how [`DistributionApi::find_distribution`] locates it again.
pub fn distribution_config(
    name: &str,
    caller_reference: &str,
    spec: &DistributionSpec,
) -> ProviderResult<DistributionConfig> {
    let mut origins = vec![site_origin(spec)?];
    let mut behaviors = Vec::new();
    if let Some(api) = &spec.api_origin {
        origins.push(api_origin(api)?);
        behaviors.push(api_behavior(api)?);
    }

    DistributionConfig::builder()
        .caller_reference(caller_reference)
        .comment(name)
        .enabled(true)
        .default_root_object(&spec.default_root_object)
        .http_version(HttpVersion::Http2and3)
        .origins(
            Origins::builder()
                .quantity(count(&origins))
                .set_items(Some(origins))
                .build()
                .map_err(built)?,
        )
        .default_cache_behavior(default_behavior(spec)?)
        .cache_behaviors(
            CacheBehaviors::builder()
                .quantity(count(&behaviors))
                .set_items(Some(behaviors))
                .build()
                .map_err(built)?,
        )
        .aliases(
            Aliases::builder()
                .quantity(count(&spec.aliases))
                .set_items(Some(spec.aliases.clone()))
                .build()
                .map_err(built)?,
        )
        .viewer_certificate(viewer_certificate(spec))
        .custom_error_responses(error_responses(spec)?)
        .build()
        .map_err(built)
}

fn live_from(distribution: &Distribution, etag: &str, tags: Tags) -> DistributionLive {
    let config = distribution.distribution_config();
    let origins = config
        .and_then(|config| config.origins())
        .map(|origins| origins.items())
        .unwrap_or_default();
    let origin_domain = |id: &str| {
        origins
            .iter()
            .find(|origin| origin.id() == id)
            .map(|origin| origin.domain_name().to_string())
    };
    let default_behavior = config.and_then(|config| config.default_cache_behavior());

    let api_origin = origin_domain(API_ORIGIN_ID).map(|domain| ApiOrigin {
        domain,
        path_pattern: config
            .and_then(|config| config.cache_behaviors())
            .and_then(|behaviors| {
                behaviors
                    .items()
                    .iter()
                    .find(|behavior| behavior.target_origin_id() == API_ORIGIN_ID)
            })
            .map(|behavior| behavior.path_pattern().to_string())
            .unwrap_or_default(),
    });

    DistributionLive {
        id: distribution.id().to_string(),
        arn: distribution.arn().to_string(),
        domain_name: distribution.domain_name().to_string(),
        etag: etag.to_string(),
        enabled: config.is_some_and(|config| config.enabled()),
        status: distribution.status().to_string(),
        origin_domain: origin_domain(SITE_ORIGIN_ID).unwrap_or_default(),
        cache_policy_id: default_behavior
            .and_then(|behavior| behavior.cache_policy_id())
            .unwrap_or_default()
            .to_string(),
        function_associations: default_behavior
            .and_then(|behavior| behavior.function_associations())
            .map(|associations| {
                associations
                    .items()
                    .iter()
                    .map(|association| FunctionAssociation {
                        event_type: association.event_type().as_str().to_string(),
                        function_arn: association.function_arn().to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default(),
        aliases: config
            .and_then(|config| config.aliases())
            .map(|aliases| aliases.items().to_vec())
            .unwrap_or_default(),
        certificate_arn: config
            .and_then(|config| config.viewer_certificate())
            .and_then(|certificate| certificate.acm_certificate_arn())
            .map(ToString::to_string),
        error_pages: config
            .and_then(|config| config.custom_error_responses())
            .map(|responses| {
                responses
                    .items()
                    .iter()
                    .map(|response| ErrorPage {
                        error_code: u16::try_from(response.error_code()).unwrap_or_default(),
                        response_code: response
                            .response_code()
                            .and_then(|code| code.parse().ok())
                            .unwrap_or_default(),
                        response_page_path: response
                            .response_page_path()
                            .unwrap_or_default()
                            .to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default(),
        api_origin,
        tags,
    }
}

fn caller_reference(name: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("{name}-{millis}")
}

impl AwsCloud {
    async fn distribution_tags(&self, arn: &str) -> ProviderResult<Tags> {
        let output = self
            .cloudfront
            .list_tags_for_resource()
            .resource(arn)
            .send()
            .await
            .map_err(|error| classify("ListTagsForResource", error))?;
        Ok(output
            .tags()
            .map(|tags| {
                tags.items()
                    .iter()
                    .map(|tag| {
                        (
                            tag.key().to_string(),
                            tag.value().unwrap_or_default().to_string(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn current_config(&self, id: &str) -> ProviderResult<(DistributionConfig, String)> {
        let output = self
            .cloudfront
            .get_distribution_config()
            .id(id)
            .send()
            .await
            .map_err(|error| classify("GetDistributionConfig", error))?;
        let config = output
            .distribution_config()
            .cloned()
            .ok_or_else(|| missing_field("GetDistributionConfig", "DistributionConfig"))?;
        let etag = output
            .e_tag()
            .ok_or_else(|| missing_field("GetDistributionConfig", "ETag"))?;
        Ok((config, etag.to_string()))
    }

    /// Development-stage code and ETag of an edge function.
    async fn edge_function_code(&self, name: &str) -> ProviderResult<Option<(String, String)>> {
        let output = match self
            .cloudfront
            .get_function()
            .name(name)
            .stage(FunctionStage::Development)
            .send()
            .await
        {
            Ok(output) => output,
            Err(error) => return absent("GetFunction", error),
        };
        let code = output
            .function_code()
            .map(|blob| String::from_utf8_lossy(blob.as_ref()).into_owned())
            .unwrap_or_default();
        let etag = output.e_tag().unwrap_or_default().to_string();
        Ok(Some((code, etag)))
    }
}

#[async_trait]
impl DistributionApi for AwsCloud {
    async fn find_distribution(&self, name: &str) -> ProviderResult<Option<DistributionLive>> {
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .cloudfront
                .list_distributions()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|error| classify("ListDistributions", error))?;
            let Some(list) = output.distribution_list() else {
                return Ok(None);
            };
            if let Some(summary) = list.items().iter().find(|summary| summary.comment() == name) {
                return self.get_distribution(summary.id()).await;
            }
            match list.next_marker() {
                Some(next) if list.is_truncated() => marker = Some(next.to_string()),
                _ => return Ok(None),
            }
        }
    }

    async fn get_distribution(&self, id: &str) -> ProviderResult<Option<DistributionLive>> {
        let output = match self.cloudfront.get_distribution().id(id).send().await {
            Ok(output) => output,
            Err(error) => return absent("GetDistribution", error),
        };
        let distribution = output
            .distribution()
            .ok_or_else(|| missing_field("GetDistribution", "Distribution"))?;
        let tags = self.distribution_tags(distribution.arn()).await?;
        Ok(Some(live_from(
            distribution,
            output.e_tag().unwrap_or_default(),
            tags,
        )))
    }

    async fn create_distribution(
        &self,
        name: &str,
        spec: &DistributionSpec,
        tags: &Tags,
    ) -> ProviderResult<DistributionLive> {
        let config = distribution_config(name, &caller_reference(name), spec)?;
        let with_tags = DistributionConfigWithTags::builder()
            .distribution_config(config)
            .tags(sdk_tags(tags)?)
            .build();
        let output = self
            .cloudfront
            .create_distribution_with_tags()
            .distribution_config_with_tags(with_tags)
            .send()
            .await
            .map_err(|error| classify("CreateDistributionWithTags", error))?;
        let distribution = output
            .distribution()
            .ok_or_else(|| missing_field("CreateDistributionWithTags", "Distribution"))?;
        Ok(live_from(
            distribution,
            output.e_tag().unwrap_or_default(),
            tags.clone(),
        ))
    }

    async fn update_distribution(
        &self,
        live: &DistributionLive,
        name: &str,
        spec: &DistributionSpec,
    ) -> ProviderResult<DistributionLive> {
        let (current, etag) = self.current_config(&live.id).await?;
        let config = distribution_config(name, current.caller_reference(), spec)?;
        let output = self
            .cloudfront
            .update_distribution()
            .id(&live.id)
            .if_match(etag)
            .distribution_config(config)
            .send()
            .await
            .map_err(|error| classify("UpdateDistribution", error))?;
        let distribution = output
            .distribution()
            .ok_or_else(|| missing_field("UpdateDistribution", "Distribution"))?;
        Ok(live_from(
            distribution,
            output.e_tag().unwrap_or_default(),
            live.tags.clone(),
        ))
    }

    async fn tag_distribution(&self, arn: &str, tags: &Tags) -> ProviderResult<()> {
        self.cloudfront
            .tag_resource()
            .resource(arn)
            .tags(sdk_tags(tags)?)
            .send()
            .await
            .map_err(|error| classify("TagResource", error))?;
        Ok(())
    }

    async fn disable_distribution(&self, live: &DistributionLive) -> ProviderResult<()> {
        let (mut config, etag) = self.current_config(&live.id).await?;
        config.enabled = false;
        self.cloudfront
            .update_distribution()
            .id(&live.id)
            .if_match(etag)
            .distribution_config(config)
            .send()
            .await
            .map_err(|error| classify("UpdateDistribution", error))?;
        Ok(())
    }

    async fn delete_distribution(&self, id: &str, etag: &str) -> ProviderResult<()> {
        self.cloudfront
            .delete_distribution()
            .id(id)
            .if_match(etag)
            .send()
            .await
            .map_err(|error| classify("DeleteDistribution", error))?;
        Ok(())
    }

    async fn find_origin_access_control(&self, name: &str) -> ProviderResult<Option<String>> {
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .cloudfront
                .list_origin_access_controls()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|error| classify("ListOriginAccessControls", error))?;
            let Some(list) = output.origin_access_control_list() else {
                return Ok(None);
            };
            if let Some(found) = list.items().iter().find(|summary| summary.name() == name) {
                return Ok(Some(found.id().to_string()));
            }
            match list.next_marker() {
                Some(next) if list.is_truncated() => marker = Some(next.to_string()),
                _ => return Ok(None),
            }
        }
    }

    async fn create_origin_access_control(&self, name: &str) -> ProviderResult<String> {
        let config = OriginAccessControlConfig::builder()
            .name(name)
            .signing_protocol(OriginAccessControlSigningProtocols::Sigv4)
            .signing_behavior(OriginAccessControlSigningBehaviors::Always)
            .origin_access_control_origin_type(OriginAccessControlOriginTypes::S3)
            .build()
            .map_err(built)?;
        let output = self
            .cloudfront
            .create_origin_access_control()
            .origin_access_control_config(config)
            .send()
            .await
            .map_err(|error| classify("CreateOriginAccessControl", error))?;
        output
            .origin_access_control()
            .map(|control| control.id().to_string())
            .ok_or_else(|| missing_field("CreateOriginAccessControl", "OriginAccessControl"))
    }

    async fn describe_edge_function(&self, name: &str) -> ProviderResult<Option<EdgeFunctionLive>> {
        let output = match self
            .cloudfront
            .describe_function()
            .name(name)
            .stage(FunctionStage::Development)
            .send()
            .await
        {
            Ok(output) => output,
            Err(error) => return absent("DescribeFunction", error),
        };
        let summary = output.function_summary();
        let arn = summary
            .and_then(|summary| summary.function_metadata())
            .map(|metadata| metadata.function_arn().to_string())
            .unwrap_or_default();
        let comment = summary
            .and_then(|summary| summary.function_config())
            .map(|config| config.comment().to_string())
            .unwrap_or_default();
        let Some((code, etag)) = self.edge_function_code(name).await? else {
            return Ok(None);
        };
        Ok(Some(EdgeFunctionLive {
            name: name.to_string(),
            arn,
            etag,
            code,
            comment,
        }))
    }

    async fn create_edge_function(
        &self,
        name: &str,
        spec: &EdgeFunctionSpec,
    ) -> ProviderResult<EdgeFunctionLive> {
        let output = self
            .cloudfront
            .create_function()
            .name(name)
            .function_config(
                FunctionConfig::builder()
                    .comment(&spec.comment)
                    .runtime(FunctionRuntime::CloudfrontJs20)
                    .build()
                    .map_err(built)?,
            )
            .function_code(Blob::new(spec.code.as_bytes()))
            .send()
            .await
            .map_err(|error| classify("CreateFunction", error))?;
        Ok(EdgeFunctionLive {
            name: name.to_string(),
            arn: output
                .function_summary()
                .and_then(|summary| summary.function_metadata())
                .map(|metadata| metadata.function_arn().to_string())
                .unwrap_or_default(),
            etag: output.e_tag().unwrap_or_default().to_string(),
            code: spec.code.clone(),
            comment: spec.comment.clone(),
        })
    }

    async fn update_edge_function(
        &self,
        live: &EdgeFunctionLive,
        spec: &EdgeFunctionSpec,
    ) -> ProviderResult<EdgeFunctionLive> {
        let output = self
            .cloudfront
            .update_function()
            .name(&live.name)
            .if_match(&live.etag)
            .function_config(
                FunctionConfig::builder()
                    .comment(&spec.comment)
                    .runtime(FunctionRuntime::CloudfrontJs20)
                    .build()
                    .map_err(built)?,
            )
            .function_code(Blob::new(spec.code.as_bytes()))
            .send()
            .await
            .map_err(|error| classify("UpdateFunction", error))?;
        Ok(EdgeFunctionLive {
            name: live.name.clone(),
            arn: live.arn.clone(),
            etag: output.e_tag().unwrap_or_default().to_string(),
            code: spec.code.clone(),
            comment: spec.comment.clone(),
        })
    }

    async fn publish_edge_function(&self, name: &str, etag: &str) -> ProviderResult<()> {
        self.cloudfront
            .publish_function()
            .name(name)
            .if_match(etag)
            .send()
            .await
            .map_err(|error| classify("PublishFunction", error))?;
        Ok(())
    }

    async fn list_edge_functions(&self, prefix: &str) -> ProviderResult<Vec<EdgeFunctionSummary>> {
        let mut functions = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .cloudfront
                .list_functions()
                .stage(FunctionStage::Development)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|error| classify("ListFunctions", error))?;
            let Some(list) = output.function_list() else {
                break;
            };
            functions.extend(
                list.items()
                    .iter()
                    .filter(|summary| summary.name().starts_with(prefix))
                    .map(|summary| EdgeFunctionSummary {
                        name: summary.name().to_string(),
                        comment: summary
                            .function_config()
                            .map(|config| config.comment().to_string())
                            .unwrap_or_default(),
                    }),
            );
            match list.next_marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(functions)
    }

    async fn delete_edge_function(&self, name: &str) -> ProviderResult<()> {
        let described = self
            .cloudfront
            .describe_function()
            .name(name)
            .send()
            .await
            .map_err(|error| classify("DescribeFunction", error))?;
        let etag = described
            .e_tag()
            .ok_or_else(|| missing_field("DescribeFunction", "ETag"))?;
        self.cloudfront
            .delete_function()
            .name(name)
            .if_match(etag)
            .send()
            .await
            .map_err(|error| classify("DeleteFunction", error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deploy_core::resources::distribution::{CACHE_POLICY_OPTIMIZED, VIEWER_REQUEST};

    fn spec() -> DistributionSpec {
        DistributionSpec {
            origin_domain: "acme-dev-web-site.s3.eu-west-1.amazonaws.com".to_string(),
            origin_access_control_id: "OAC1".to_string(),
            default_root_object: "index.html".to_string(),
            cache_policy_id: CACHE_POLICY_OPTIMIZED.to_string(),
            function_associations: vec![FunctionAssociation {
                event_type: VIEWER_REQUEST.to_string(),
                function_arn: "arn:aws:cloudfront::123456789012:function/acme-dev-web-viewer-req"
                    .to_string(),
            }],
            aliases: vec!["www.acme.test".to_string()],
            certificate_arn: Some("arn:aws:acm:us-east-1:123456789012:certificate/abc".to_string()),
            error_pages: DistributionSpec::spa_error_pages("index.html"),
            api_origin: Some(ApiOrigin {
                domain: "abc123.execute-api.eu-west-1.amazonaws.com".to_string(),
                path_pattern: "/api/*".to_string(),
            }),
        }
    }

    #[test]
    fn config_reads_back_as_the_same_live_shape() {
        let spec = spec();
        let config = distribution_config("acme-dev-web", "acme-dev-web-1", &spec)
            .expect("config builds");
        let distribution = Distribution::builder()
            .id("E1")
            .arn("arn:aws:cloudfront::123456789012:distribution/E1")
            .status("Deployed")
            .domain_name("d1.cloudfront.net")
            .last_modified_time(aws_sdk_cloudfront::primitives::DateTime::from_secs(0))
            .in_progress_invalidation_batches(0)
            .distribution_config(config)
            .build()
            .expect("distribution builds");

        let live = live_from(&distribution, "E1-ETAG", Tags::new());

        assert!(live.enabled);
        assert!(live.is_deployed());
        assert_eq!(live.origin_domain, spec.origin_domain);
        assert_eq!(live.cache_policy_id, spec.cache_policy_id);
        assert_eq!(live.function_associations, spec.function_associations);
        assert_eq!(live.aliases, spec.aliases);
        assert_eq!(live.certificate_arn, spec.certificate_arn);
        assert_eq!(live.error_pages, spec.error_pages);
        assert_eq!(live.api_origin, spec.api_origin);
        assert!(deploy_core::resources::distribution::diff_distribution(&spec, &live)
            .fields
            .is_empty());
    }
}
