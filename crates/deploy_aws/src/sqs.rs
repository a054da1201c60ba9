use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use aws_sdk_sqs::types::QueueAttributeName;
use deploy_core::resources::queue::{QueueLive, ATTR_QUEUE_ARN};
use deploy_core::tags::Tags;
use deploy_engine::ports::{ProviderResult, QueueApi};

use crate::error::{absent, classify, missing_field};
use crate::provider::{from_hash_map, to_hash_map, AwsCloud};

fn sdk_attributes(attributes: &BTreeMap<String, String>) -> HashMap<QueueAttributeName, String> {
    attributes
        .iter()
        .map(|(name, value)| (QueueAttributeName::from(name.as_str()), value.clone()))
        .collect()
}

#[async_trait]
impl QueueApi for AwsCloud {
    async fn get_queue(&self, name: &str) -> ProviderResult<Option<QueueLive>> {
        let url = match self.sqs.get_queue_url().queue_name(name).send().await {
            Ok(output) => output
                .queue_url()
                .ok_or_else(|| missing_field("GetQueueUrl", "QueueUrl"))?
                .to_string(),
            Err(error) => return absent("GetQueueUrl", error),
        };

        let attributes: BTreeMap<String, String> = self
            .sqs
            .get_queue_attributes()
            .queue_url(&url)
            .attribute_names(QueueAttributeName::All)
            .send()
            .await
            .map_err(|error| classify("GetQueueAttributes", error))?
            .attributes()
            .map(|attributes| {
                attributes
                    .iter()
                    .map(|(name, value)| (name.as_str().to_string(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let tags = self
            .sqs
            .list_queue_tags()
            .queue_url(&url)
            .send()
            .await
            .map_err(|error| classify("ListQueueTags", error))?;

        Ok(Some(QueueLive {
            name: name.to_string(),
            arn: attributes.get(ATTR_QUEUE_ARN).cloned().unwrap_or_default(),
            url,
            attributes,
            tags: from_hash_map(tags.tags()),
        }))
    }

    async fn create_queue(
        &self,
        name: &str,
        attributes: &BTreeMap<String, String>,
        tags: &Tags,
    ) -> ProviderResult<QueueLive> {
        let output = self
            .sqs
            .create_queue()
            .queue_name(name)
            .set_attributes(Some(sdk_attributes(attributes)))
            .set_tags(Some(to_hash_map(tags)))
            .send()
            .await
            .map_err(|error| classify("CreateQueue", error))?;
        output
            .queue_url()
            .ok_or_else(|| missing_field("CreateQueue", "QueueUrl"))?;

        // The create response carries only the URL; read back the ARN.
        self.get_queue(name)
            .await?
            .ok_or_else(|| missing_field("GetQueueUrl", "QueueUrl"))
    }

    async fn set_queue_attributes(
        &self,
        url: &str,
        attributes: &BTreeMap<String, String>,
    ) -> ProviderResult<()> {
        self.sqs
            .set_queue_attributes()
            .queue_url(url)
            .set_attributes(Some(sdk_attributes(attributes)))
            .send()
            .await
            .map_err(|error| classify("SetQueueAttributes", error))?;
        Ok(())
    }

    async fn tag_queue(&self, url: &str, tags: &Tags) -> ProviderResult<()> {
        self.sqs
            .tag_queue()
            .queue_url(url)
            .set_tags(Some(to_hash_map(tags)))
            .send()
            .await
            .map_err(|error| classify("TagQueue", error))?;
        Ok(())
    }

    async fn delete_queue(&self, url: &str) -> ProviderResult<()> {
        self.sqs
            .delete_queue()
            .queue_url(url)
            .send()
            .await
            .map_err(|error| classify("DeleteQueue", error))?;
        Ok(())
    }
}
