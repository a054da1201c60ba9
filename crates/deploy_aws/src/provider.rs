use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use deploy_core::error::{DeployError, ProviderResultExt};
use deploy_core::tags::{ResourceType, Tags};
use deploy_engine::ports::Provider;
use tracing::info;

use crate::error::{classify, missing_field};

/// CloudFront, its functions, and the tags on both live in this region.
pub const GLOBAL_REGION: &str = "us-east-1";

#[derive(Debug, Clone)]
pub struct AwsCloud {
    pub(crate) region: String,
    pub(crate) account_id: String,
    pub(crate) lambda: aws_sdk_lambda::Client,
    pub(crate) iam: aws_sdk_iam::Client,
    pub(crate) dynamodb: aws_sdk_dynamodb::Client,
    pub(crate) sqs: aws_sdk_sqs::Client,
    pub(crate) s3: aws_sdk_s3::Client,
    pub(crate) cloudfront: aws_sdk_cloudfront::Client,
    pub(crate) apigateway: aws_sdk_apigatewayv2::Client,
    pub(crate) ses: aws_sdk_sesv2::Client,
    pub(crate) tagging: aws_sdk_resourcegroupstagging::Client,
    /// Tagging client pinned to [`GLOBAL_REGION`] for distributions.
    pub(crate) global_tagging: aws_sdk_resourcegroupstagging::Client,
}

impl AwsCloud {
    /// Resolve credentials and region through the default provider chain,
    /// with `region` taking precedence when given, then look up the account.
    pub async fn load(region: Option<String>) -> Result<Self, DeployError> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let sdk = loader.load().await;
        let region = sdk
            .region()
            .map(ToString::to_string)
            .ok_or_else(|| DeployError::Config("no AWS region configured".to_string()))?;

        let identity = aws_sdk_sts::Client::new(&sdk)
            .get_caller_identity()
            .send()
            .await
            .map_err(|error| classify("GetCallerIdentity", error))
            .for_resource(ResourceType::Role, "caller")?;
        let account_id = identity
            .account()
            .map(ToString::to_string)
            .ok_or_else(|| missing_field("GetCallerIdentity", "Account"))
            .for_resource(ResourceType::Role, "caller")?;
        info!(region = %region, account = %account_id, "resolved AWS identity");

        let global = sdk
            .to_builder()
            .region(Region::new(GLOBAL_REGION))
            .build();
        Ok(Self {
            lambda: aws_sdk_lambda::Client::new(&sdk),
            iam: aws_sdk_iam::Client::new(&sdk),
            dynamodb: aws_sdk_dynamodb::Client::new(&sdk),
            sqs: aws_sdk_sqs::Client::new(&sdk),
            s3: aws_sdk_s3::Client::new(&sdk),
            cloudfront: aws_sdk_cloudfront::Client::new(&global),
            apigateway: aws_sdk_apigatewayv2::Client::new(&sdk),
            ses: aws_sdk_sesv2::Client::new(&sdk),
            tagging: aws_sdk_resourcegroupstagging::Client::new(&sdk),
            global_tagging: aws_sdk_resourcegroupstagging::Client::new(&global),
            region,
            account_id,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn into_provider(self) -> Provider {
        let region = self.region.clone();
        let account_id = self.account_id.clone();
        Provider::from_cloud(region, account_id, Arc::new(self))
    }
}

pub(crate) fn to_hash_map(tags: &Tags) -> HashMap<String, String> {
    tags.iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

pub(crate) fn from_hash_map(tags: Option<&HashMap<String, String>>) -> Tags {
    tags.map(|tags| {
        tags.iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect::<BTreeMap<_, _>>()
    })
    .unwrap_or_default()
}

/// `i32` fields in SDK requests; values past `i32::MAX` are clamped.
pub(crate) fn as_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

pub(crate) fn as_u32(value: Option<i32>) -> u32 {
    value.and_then(|value| u32::try_from(value).ok()).unwrap_or(0)
}
