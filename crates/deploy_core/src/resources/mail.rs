use serde::{Deserialize, Serialize};

use crate::resources::NoChanges;
use crate::tags::Tags;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailIdentitySpec {
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailIdentityLive {
    pub domain: String,
    pub arn: String,
    pub verified: bool,
    pub dkim_status: String,
    pub dkim_tokens: Vec<String>,
    pub tags: Tags,
}

pub fn diff_mail_identity(_spec: &MailIdentitySpec, _live: &MailIdentityLive) -> NoChanges {
    NoChanges
}

/// DNS record the domain owner must publish for Easy DKIM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub name: String,
    pub record_type: String,
    pub value: String,
}

pub fn dkim_records(domain: &str, tokens: &[String]) -> Vec<DnsRecord> {
    tokens
        .iter()
        .map(|token| DnsRecord {
            name: format!("{token}._domainkey.{domain}"),
            record_type: "CNAME".to_string(),
            value: format!("{token}.dkim.amazonses.com"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dkim_records_are_cnames_per_token() {
        let records = dkim_records("acme.example", &["tok1".to_string(), "tok2".to_string()]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "tok1._domainkey.acme.example");
        assert_eq!(records[0].value, "tok1.dkim.amazonses.com");
        assert_eq!(records[1].record_type, "CNAME");
    }
}
