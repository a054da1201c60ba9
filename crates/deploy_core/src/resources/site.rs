//! Static site file sync against the site bucket.
//!
//! The bucket keeps a manifest of `key -> sha256` for the last upload, so a
//! redeploy of unchanged files touches nothing.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DeployError;

pub const SITE_MANIFEST_KEY: &str = ".deploy/manifest.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteFile {
    pub key: String,
    pub sha256: String,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteManifest {
    pub files: BTreeMap<String, String>,
}

impl SiteManifest {
    pub fn from_files(files: &[SiteFile]) -> Self {
        Self {
            files: files
                .iter()
                .map(|file| (file.key.clone(), file.sha256.clone()))
                .collect(),
        }
    }

    pub fn parse(raw: &[u8]) -> Option<Self> {
        serde_json::from_slice(raw).ok()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DeployError> {
        serde_json::to_vec(self).map_err(|error| DeployError::Manifest(error.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub upload: Vec<String>,
    pub delete: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.upload.is_empty() && self.delete.is_empty()
    }
}

pub fn plan_sync(local: &SiteManifest, remote: Option<&SiteManifest>) -> SyncPlan {
    let empty = BTreeMap::new();
    let remote = remote.map_or(&empty, |manifest| &manifest.files);
    SyncPlan {
        upload: local
            .files
            .iter()
            .filter(|(key, sha)| remote.get(*key) != Some(*sha))
            .map(|(key, _)| key.clone())
            .collect(),
        delete: remote
            .keys()
            .filter(|key| !local.files.contains_key(*key))
            .cloned()
            .collect(),
    }
}

pub fn content_type_for(key: &str) -> &'static str {
    let extension = key.rsplit_once('.').map_or("", |(_, ext)| ext);
    match extension.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "txt" => "text/plain; charset=utf-8",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// Every file under `dir` keyed by its `/`-separated relative path, sorted.
pub fn collect_site_files(dir: &Path) -> Result<Vec<SiteFile>, DeployError> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = fs::read_dir(&current)
            .map_err(|error| DeployError::io(current.display().to_string(), error))?;
        for entry in entries {
            let entry =
                entry.map_err(|error| DeployError::io(current.display().to_string(), error))?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let Ok(relative) = path.strip_prefix(dir) else {
                continue;
            };
            let key = relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let body =
                fs::read(&path).map_err(|error| DeployError::io(path.display().to_string(), error))?;
            files.push(SiteFile {
                sha256: format!("{:x}", Sha256::digest(&body)),
                content_type: content_type_for(&key),
                key,
                body,
            });
        }
    }
    files.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(files)
}
