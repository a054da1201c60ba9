use crate::permissions::{
    policies_equivalent, render_policy, Permission, INLINE_POLICY_SIZE_LIMIT, LAMBDA_TRUST_POLICY,
};
use crate::resources::FieldChanges;
use crate::tags::Tags;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    pub permissions: Vec<Permission>,
}

impl RoleSpec {
    pub fn new(permissions: Vec<Permission>) -> Self {
        Self { permissions }
    }

    pub fn trust_policy(&self) -> &'static str {
        LAMBDA_TRUST_POLICY
    }

    pub fn policy_document(&self) -> String {
        render_policy(&self.permissions)
    }

    pub fn exceeds_inline_limit(&self) -> bool {
        self.policy_document().len() > INLINE_POLICY_SIZE_LIMIT
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleLive {
    pub name: String,
    pub arn: String,
    /// Inline policy document, already URL-decoded.
    pub inline_policy: Option<String>,
    pub tags: Tags,
}

pub fn diff_role(spec: &RoleSpec, live: &RoleLive) -> FieldChanges {
    let mut changes = FieldChanges::default();
    let differs = match &live.inline_policy {
        Some(current) => !policies_equivalent(&spec.policy_document(), current),
        None => true,
    };
    changes.mark("policy", differs);
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{function_defaults, mailer_access};
    use crate::resources::ChangeSet;

    #[test]
    fn missing_inline_policy_is_a_change() {
        let spec = RoleSpec::new(function_defaults());
        let live = RoleLive {
            name: "acme-dev-a-role".to_string(),
            arn: "arn:aws:iam::1:role/acme-dev-a-role".to_string(),
            inline_policy: None,
            tags: Tags::new(),
        };

        assert_eq!(diff_role(&spec, &live).changed_fields(), vec!["policy"]);
    }

    #[test]
    fn added_permission_is_detected() {
        let before = RoleSpec::new(function_defaults());
        let mut permissions = function_defaults();
        permissions.extend(mailer_access());
        let after = RoleSpec::new(permissions);

        let live = RoleLive {
            name: "acme-dev-a-role".to_string(),
            arn: "arn:aws:iam::1:role/acme-dev-a-role".to_string(),
            inline_policy: Some(before.policy_document()),
            tags: Tags::new(),
        };

        assert!(diff_role(&before, &live).is_empty());
        assert!(!diff_role(&after, &live).is_empty());
    }
}
