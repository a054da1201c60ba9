//! Execution roles and their single inline policy.

use async_trait::async_trait;
use aws_sdk_iam::types::Tag;
use deploy_core::resources::role::RoleLive;
use deploy_core::tags::Tags;
use deploy_engine::ports::{ProviderResult, RoleApi};
use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::error::{absent, classify, invalid_request, missing_field};
use crate::provider::AwsCloud;

/// IAM returns policy documents URL-encoded.
pub fn decode_policy_document(encoded: &str) -> String {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| encoded.to_string())
}

pub(crate) fn iam_tags(tags: &Tags) -> ProviderResult<Vec<Tag>> {
    tags.iter()
        .map(|(key, value)| {
            Tag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|error| invalid_request("TagRole", error))
        })
        .collect()
}

impl AwsCloud {
    async fn inline_policy(&self, role: &str, policy_name: &str) -> ProviderResult<Option<String>> {
        match self
            .iam
            .get_role_policy()
            .role_name(role)
            .policy_name(policy_name)
            .send()
            .await
        {
            Ok(output) => Ok(Some(decode_policy_document(output.policy_document()))),
            Err(error) => absent("GetRolePolicy", error),
        }
    }

    pub(crate) async fn role_tags(&self, name: &str) -> ProviderResult<Tags> {
        let output = self
            .iam
            .list_role_tags()
            .role_name(name)
            .send()
            .await
            .map_err(|error| classify("ListRoleTags", error))?;
        Ok(output
            .tags()
            .iter()
            .map(|tag| (tag.key().to_string(), tag.value().to_string()))
            .collect())
    }

    /// Role names starting with `prefix`, across every page.
    pub(crate) async fn role_names_with_prefix(&self, prefix: &str) -> ProviderResult<Vec<(String, String)>> {
        let mut roles = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .iam
                .list_roles()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|error| classify("ListRoles", error))?;
            roles.extend(
                output
                    .roles()
                    .iter()
                    .filter(|role| role.role_name().starts_with(prefix))
                    .map(|role| (role.role_name().to_string(), role.arn().to_string())),
            );
            match output.marker() {
                Some(next) if output.is_truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(roles)
    }
}

#[async_trait]
impl RoleApi for AwsCloud {
    async fn get_role(&self, name: &str, policy_name: &str) -> ProviderResult<Option<RoleLive>> {
        let output = match self.iam.get_role().role_name(name).send().await {
            Ok(output) => output,
            Err(error) => return absent("GetRole", error),
        };
        let Some(role) = output.role() else {
            return Err(missing_field("GetRole", "Role"));
        };
        let tags = role
            .tags()
            .iter()
            .map(|tag| (tag.key().to_string(), tag.value().to_string()))
            .collect();
        Ok(Some(RoleLive {
            name: role.role_name().to_string(),
            arn: role.arn().to_string(),
            inline_policy: self.inline_policy(name, policy_name).await?,
            tags,
        }))
    }

    async fn create_role(
        &self,
        name: &str,
        trust_policy: &str,
        tags: &Tags,
    ) -> ProviderResult<RoleLive> {
        let output = self
            .iam
            .create_role()
            .role_name(name)
            .assume_role_policy_document(trust_policy)
            .set_tags(Some(iam_tags(tags)?))
            .send()
            .await
            .map_err(|error| classify("CreateRole", error))?;
        let role = output
            .role()
            .ok_or_else(|| missing_field("CreateRole", "Role"))?;
        Ok(RoleLive {
            name: role.role_name().to_string(),
            arn: role.arn().to_string(),
            inline_policy: None,
            tags: tags.clone(),
        })
    }

    async fn put_role_policy(
        &self,
        role: &str,
        policy_name: &str,
        document: &str,
    ) -> ProviderResult<()> {
        self.iam
            .put_role_policy()
            .role_name(role)
            .policy_name(policy_name)
            .policy_document(document)
            .send()
            .await
            .map_err(|error| classify("PutRolePolicy", error))?;
        Ok(())
    }

    async fn tag_role(&self, name: &str, tags: &Tags) -> ProviderResult<()> {
        self.iam
            .tag_role()
            .role_name(name)
            .set_tags(Some(iam_tags(tags)?))
            .send()
            .await
            .map_err(|error| classify("TagRole", error))?;
        Ok(())
    }

    async fn delete_role(&self, name: &str) -> ProviderResult<()> {
        let inline = self
            .iam
            .list_role_policies()
            .role_name(name)
            .send()
            .await
            .map_err(|error| classify("ListRolePolicies", error))?;
        for policy in inline.policy_names() {
            debug!(role = name, policy = %policy, "deleting inline policy");
            self.iam
                .delete_role_policy()
                .role_name(name)
                .policy_name(policy)
                .send()
                .await
                .map_err(|error| classify("DeleteRolePolicy", error))?;
        }

        let attached = self
            .iam
            .list_attached_role_policies()
            .role_name(name)
            .send()
            .await
            .map_err(|error| classify("ListAttachedRolePolicies", error))?;
        for policy in attached.attached_policies() {
            let Some(arn) = policy.policy_arn() else {
                continue;
            };
            self.iam
                .detach_role_policy()
                .role_name(name)
                .policy_arn(arn)
                .send()
                .await
                .map_err(|error| classify("DetachRolePolicy", error))?;
        }

        self.iam
            .delete_role()
            .role_name(name)
            .send()
            .await
            .map_err(|error| classify("DeleteRole", error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_documents_are_url_decoded() {
        let encoded = "%7B%22Version%22%3A%222012-10-17%22%2C%22Statement%22%3A%5B%5D%7D";
        assert_eq!(
            decode_policy_document(encoded),
            r#"{"Version":"2012-10-17","Statement":[]}"#
        );
        assert_eq!(decode_policy_document("{}"), "{}");
    }
}
