//! Buckets, their Lambda notifications and policy, and site objects.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Delete, Event, FilterRule, FilterRuleName,
    LambdaFunctionConfiguration, NotificationConfiguration, NotificationConfigurationFilter,
    ObjectIdentifier, S3KeyFilter, Tag, Tagging,
};
use deploy_core::error::ProviderError;
use deploy_core::resources::bucket::{bucket_arn, BucketLive, LambdaNotification};
use deploy_core::tags::Tags;
use deploy_engine::ports::{BucketApi, ProviderResult};
use tracing::debug;

use crate::error::{absent, classify, invalid_request};
use crate::provider::AwsCloud;

/// `DeleteObjects` accepts at most this many keys per request.
const DELETE_BATCH: usize = 1000;

/// `us-east-1` is the default location and must not be named explicitly.
const DEFAULT_LOCATION: &str = "us-east-1";

fn s3_tags(tags: &Tags) -> ProviderResult<Tagging> {
    let tag_set = tags
        .iter()
        .map(|(key, value)| {
            Tag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|error| invalid_request("PutBucketTagging", error))
        })
        .collect::<ProviderResult<Vec<_>>>()?;
    Tagging::builder()
        .set_tag_set(Some(tag_set))
        .build()
        .map_err(|error| invalid_request("PutBucketTagging", error))
}

fn filter_value(configuration: &LambdaFunctionConfiguration, name: &FilterRuleName) -> Option<String> {
    configuration
        .filter()?
        .key()?
        .filter_rules()
        .iter()
        .find(|rule| rule.name() == Some(name))
        .and_then(|rule| rule.value())
        .map(ToString::to_string)
}

fn notification(configuration: &LambdaFunctionConfiguration) -> LambdaNotification {
    LambdaNotification {
        id: configuration.id().unwrap_or_default().to_string(),
        function_arn: configuration.lambda_function_arn().to_string(),
        events: configuration
            .events()
            .iter()
            .map(|event| event.as_str().to_string())
            .collect(),
        prefix: filter_value(configuration, &FilterRuleName::Prefix),
        suffix: filter_value(configuration, &FilterRuleName::Suffix),
    }
}

fn lambda_configuration(
    notification: &LambdaNotification,
) -> ProviderResult<LambdaFunctionConfiguration> {
    let mut rules = Vec::new();
    if let Some(prefix) = &notification.prefix {
        rules.push(FilterRule::builder().name(FilterRuleName::Prefix).value(prefix).build());
    }
    if let Some(suffix) = &notification.suffix {
        rules.push(FilterRule::builder().name(FilterRuleName::Suffix).value(suffix).build());
    }
    let mut builder = LambdaFunctionConfiguration::builder()
        .id(&notification.id)
        .lambda_function_arn(&notification.function_arn)
        .set_events(Some(
            notification
                .events
                .iter()
                .map(|event| Event::from(event.as_str()))
                .collect(),
        ));
    if !rules.is_empty() {
        builder = builder.filter(
            NotificationConfigurationFilter::builder()
                .key(S3KeyFilter::builder().set_filter_rules(Some(rules)).build())
                .build(),
        );
    }
    builder
        .build()
        .map_err(|error| invalid_request("PutBucketNotificationConfiguration", error))
}

impl AwsCloud {
    async fn bucket_tags(&self, name: &str) -> ProviderResult<Tags> {
        match self.s3.get_bucket_tagging().bucket(name).send().await {
            Ok(output) => Ok(output
                .tag_set()
                .iter()
                .map(|tag| (tag.key().to_string(), tag.value().to_string()))
                .collect()),
            // A bucket without tags answers NoSuchTagSet.
            Err(error) => match classify("GetBucketTagging", error) {
                error if error.is_not_found() => Ok(Tags::new()),
                error => Err(error),
            },
        }
    }

    async fn list_keys(&self, bucket: &str) -> ProviderResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let output = self
                .s3
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|error| classify("ListObjectsV2", error))?;
            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(ToString::to_string)),
            );
            match output.next_continuation_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl BucketApi for AwsCloud {
    async fn head_bucket(&self, name: &str) -> ProviderResult<Option<BucketLive>> {
        if let Err(error) = self.s3.head_bucket().bucket(name).send().await {
            // HEAD responses carry no error body, only the status.
            if error
                .as_service_error()
                .is_some_and(|service| service.is_not_found())
            {
                return Ok(None);
            }
            return absent("HeadBucket", error);
        }
        Ok(Some(BucketLive {
            name: name.to_string(),
            arn: bucket_arn(name),
            tags: self.bucket_tags(name).await?,
        }))
    }

    async fn create_bucket(
        &self,
        name: &str,
        region: Option<&str>,
        tags: &Tags,
    ) -> ProviderResult<BucketLive> {
        let location = region.unwrap_or(self.region.as_str());
        let mut request = self.s3.create_bucket().bucket(name);
        if location != DEFAULT_LOCATION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(location))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map_err(|error| classify("CreateBucket", error))?;
        self.tag_bucket(name, tags).await?;
        Ok(BucketLive {
            name: name.to_string(),
            arn: bucket_arn(name),
            tags: tags.clone(),
        })
    }

    async fn tag_bucket(&self, name: &str, tags: &Tags) -> ProviderResult<()> {
        // PutBucketTagging replaces the whole set; keep foreign tags.
        let mut merged = self.bucket_tags(name).await?;
        merged.extend(tags.iter().map(|(key, value)| (key.clone(), value.clone())));
        self.s3
            .put_bucket_tagging()
            .bucket(name)
            .tagging(s3_tags(&merged)?)
            .send()
            .await
            .map_err(|error| classify("PutBucketTagging", error))?;
        Ok(())
    }

    async fn get_notifications(&self, name: &str) -> ProviderResult<Vec<LambdaNotification>> {
        let output = self
            .s3
            .get_bucket_notification_configuration()
            .bucket(name)
            .send()
            .await
            .map_err(|error| classify("GetBucketNotificationConfiguration", error))?;
        Ok(output
            .lambda_function_configurations()
            .iter()
            .map(notification)
            .collect())
    }

    async fn put_notifications(
        &self,
        name: &str,
        notifications: &[LambdaNotification],
    ) -> ProviderResult<()> {
        // Queue and topic targets share the document; carry them over.
        let current = self
            .s3
            .get_bucket_notification_configuration()
            .bucket(name)
            .send()
            .await
            .map_err(|error| classify("GetBucketNotificationConfiguration", error))?;
        let lambdas = notifications
            .iter()
            .map(lambda_configuration)
            .collect::<ProviderResult<Vec<_>>>()?;
        let configuration = NotificationConfiguration::builder()
            .set_topic_configurations(Some(current.topic_configurations().to_vec()))
            .set_queue_configurations(Some(current.queue_configurations().to_vec()))
            .set_lambda_function_configurations(Some(lambdas))
            .build();
        self.s3
            .put_bucket_notification_configuration()
            .bucket(name)
            .notification_configuration(configuration)
            .send()
            .await
            .map_err(|error| classify("PutBucketNotificationConfiguration", error))?;
        Ok(())
    }

    async fn get_bucket_policy(&self, name: &str) -> ProviderResult<Option<String>> {
        match self.s3.get_bucket_policy().bucket(name).send().await {
            Ok(output) => Ok(output.policy().map(ToString::to_string)),
            Err(error) => absent("GetBucketPolicy", error),
        }
    }

    async fn put_bucket_policy(&self, name: &str, policy: &str) -> ProviderResult<()> {
        self.s3
            .put_bucket_policy()
            .bucket(name)
            .policy(policy)
            .send()
            .await
            .map_err(|error| classify("PutBucketPolicy", error))?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> ProviderResult<Option<Vec<u8>>> {
        let output = match self.s3.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(error) => return absent("GetObject", error),
        };
        let body = output
            .body
            .collect()
            .await
            .map_err(|error| ProviderError::other("GetObject", format!("reading body failed: {error}")))?;
        Ok(Some(body.into_bytes().to_vec()))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> ProviderResult<()> {
        self.s3
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body.to_vec()))
            .send()
            .await
            .map_err(|error| classify("PutObject", error))?;
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> ProviderResult<()> {
        for chunk in keys.chunks(DELETE_BATCH) {
            let objects = chunk
                .iter()
                .map(|key| {
                    ObjectIdentifier::builder()
                        .key(key)
                        .build()
                        .map_err(|error| invalid_request("DeleteObjects", error))
                })
                .collect::<ProviderResult<Vec<_>>>()?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|error| invalid_request("DeleteObjects", error))?;
            self.s3
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|error| classify("DeleteObjects", error))?;
        }
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> ProviderResult<()> {
        let keys = self.list_keys(name).await?;
        if !keys.is_empty() {
            debug!(bucket = name, objects = keys.len(), "emptying bucket");
            self.delete_objects(name, &keys).await?;
        }
        self.s3
            .delete_bucket()
            .bucket(name)
            .send()
            .await
            .map_err(|error| classify("DeleteBucket", error))?;
        Ok(())
    }
}

