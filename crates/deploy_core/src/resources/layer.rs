use serde::{Deserialize, Serialize};

pub const LAYER_DESCRIPTION_PREFIX: &str = "deps:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSpec {
    pub content_hash: String,
    pub archive: Vec<u8>,
    pub compatible_runtimes: Vec<String>,
}

impl LayerSpec {
    pub fn description(&self) -> String {
        layer_description(&self.content_hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerVersion {
    pub layer_name: String,
    pub version: i64,
    pub version_arn: String,
    pub description: Option<String>,
}

impl LayerVersion {
    pub fn content_hash(&self) -> Option<&str> {
        self.description
            .as_deref()
            .and_then(|description| description.strip_prefix(LAYER_DESCRIPTION_PREFIX))
    }
}

/// Published dependency package attached to every function of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerManifest {
    pub content_hash: String,
    pub packages: Vec<String>,
    pub version: i64,
    pub arn: String,
}

pub fn layer_description(content_hash: &str) -> String {
    format!("{LAYER_DESCRIPTION_PREFIX}{content_hash}")
}

/// Newest version recording the given hash.
pub fn find_reusable<'a>(versions: &'a [LayerVersion], content_hash: &str) -> Option<&'a LayerVersion> {
    versions
        .iter()
        .filter(|version| version.content_hash() == Some(content_hash))
        .max_by_key(|version| version.version)
}

/// Versions to delete so that only the newest `keep` remain.
pub fn versions_to_prune(versions: &[LayerVersion], keep: usize) -> Vec<LayerVersion> {
    let mut ordered = versions.to_vec();
    ordered.sort_by(|a, b| b.version.cmp(&a.version));
    ordered.into_iter().skip(keep).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(number: i64, hash: &str) -> LayerVersion {
        LayerVersion {
            layer_name: "acme-dev-deps".to_string(),
            version: number,
            version_arn: format!("arn:aws:lambda:eu-west-1:1:layer:acme-dev-deps:{number}"),
            description: Some(layer_description(hash)),
        }
    }

    #[test]
    fn reuses_newest_version_with_matching_hash() {
        let versions = vec![version(1, "aaa"), version(2, "bbb"), version(3, "aaa")];
        let reusable = find_reusable(&versions, "aaa").expect("should reuse");
        assert_eq!(reusable.version, 3);
        assert!(find_reusable(&versions, "ccc").is_none());
    }

    #[test]
    fn prunes_all_but_newest() {
        let versions = vec![version(4, "d"), version(1, "a"), version(3, "c"), version(2, "b")];
        let pruned: Vec<i64> = versions_to_prune(&versions, 2)
            .into_iter()
            .map(|version| version.version)
            .collect();
        assert_eq!(pruned, vec![2, 1]);
    }
}
