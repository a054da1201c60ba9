use async_trait::async_trait;
use aws_sdk_sesv2::types::{DkimAttributes, Tag};
use deploy_core::resources::mail::MailIdentityLive;
use deploy_core::tags::Tags;
use deploy_engine::ports::{MailApi, ProviderResult};

use crate::error::{absent, classify, invalid_request};
use crate::provider::AwsCloud;

fn ses_tags(tags: &Tags) -> ProviderResult<Vec<Tag>> {
    tags.iter()
        .map(|(key, value)| {
            Tag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|error| invalid_request("TagResource", error))
        })
        .collect()
}

fn dkim(attributes: Option<&DkimAttributes>) -> (String, Vec<String>) {
    let Some(attributes) = attributes else {
        return (String::new(), Vec::new());
    };
    (
        attributes
            .status()
            .map(|status| status.as_str().to_string())
            .unwrap_or_default(),
        attributes.tokens().to_vec(),
    )
}

impl AwsCloud {
    /// SES does not return the identity ARN; it is derived.
    fn identity_arn(&self, domain: &str) -> String {
        format!(
            "arn:aws:ses:{}:{}:identity/{domain}",
            self.region, self.account_id
        )
    }
}

#[async_trait]
impl MailApi for AwsCloud {
    async fn get_email_identity(&self, domain: &str) -> ProviderResult<Option<MailIdentityLive>> {
        let output = match self
            .ses
            .get_email_identity()
            .email_identity(domain)
            .send()
            .await
        {
            Ok(output) => output,
            Err(error) => return absent("GetEmailIdentity", error),
        };
        let (dkim_status, dkim_tokens) = dkim(output.dkim_attributes());
        Ok(Some(MailIdentityLive {
            domain: domain.to_string(),
            arn: self.identity_arn(domain),
            verified: output.verified_for_sending_status(),
            dkim_status,
            dkim_tokens,
            tags: output
                .tags()
                .iter()
                .map(|tag| (tag.key().to_string(), tag.value().to_string()))
                .collect(),
        }))
    }

    async fn create_email_identity(
        &self,
        domain: &str,
        tags: &Tags,
    ) -> ProviderResult<MailIdentityLive> {
        let output = self
            .ses
            .create_email_identity()
            .email_identity(domain)
            .set_tags(Some(ses_tags(tags)?))
            .send()
            .await
            .map_err(|error| classify("CreateEmailIdentity", error))?;
        let (dkim_status, dkim_tokens) = dkim(output.dkim_attributes());
        Ok(MailIdentityLive {
            domain: domain.to_string(),
            arn: self.identity_arn(domain),
            verified: output.verified_for_sending_status(),
            dkim_status,
            dkim_tokens,
            tags: tags.clone(),
        })
    }

    async fn tag_email_identity(&self, arn: &str, tags: &Tags) -> ProviderResult<()> {
        self.ses
            .tag_resource()
            .resource_arn(arn)
            .set_tags(Some(ses_tags(tags)?))
            .send()
            .await
            .map_err(|error| classify("TagResource", error))?;
        Ok(())
    }

    async fn delete_email_identity(&self, domain: &str) -> ProviderResult<()> {
        self.ses
            .delete_email_identity()
            .email_identity(domain)
            .send()
            .await
            .map_err(|error| classify("DeleteEmailIdentity", error))?;
        Ok(())
    }
}
