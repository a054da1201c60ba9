//! Shared dependency package (Lambda layer) for a project.
//!
//! A version is published only when no existing version records the same
//! content hash in its description, so an unchanged dependency set never
//! republishes.

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use deploy_core::error::{DeployError, ProviderResultExt};
use deploy_core::naming::layer_name;
use deploy_core::outcome::{DeploymentResult, DeploymentStatus};
use deploy_core::packages::{package_files, resolve_closure, DependencyClosure};
use deploy_core::resources::layer::{find_reusable, versions_to_prune, LayerManifest, LayerSpec};
use deploy_core::tags::ResourceType;
use tracing::{info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::ports::LayerApi;

const KIND: ResourceType = ResourceType::DependencyPackage;
const ARCHIVE_ROOT: &str = "nodejs/node_modules";

#[derive(Debug, Clone)]
pub struct LayerOutcome {
    pub manifest: LayerManifest,
    pub result: DeploymentResult,
}

#[derive(Debug, Clone)]
pub struct LayerSettings {
    pub runtime: String,
    pub keep_versions: usize,
}

/// Deterministic archive of the closure: entries sorted by path, fixed
/// 1980-01-01 timestamps, deflate.
pub fn build_archive(closure: &DependencyClosure) -> Result<Vec<u8>, DeployError> {
    let mut entries: Vec<(String, PathBuf)> = Vec::new();
    for package in &closure.packages {
        let prefix = archive_path(&package.install_path);
        for relative in package_files(&package.dir)? {
            entries.push((
                format!("{ARCHIVE_ROOT}/{prefix}/{}", archive_path(&relative)),
                package.dir.join(&relative),
            ));
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.dedup_by(|a, b| a.0 == b.0);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);
    for (entry, source) in &entries {
        let body = fs::read(source).map_err(|error| DeployError::io(source.display().to_string(), error))?;
        writer
            .start_file(entry.as_str(), options)
            .map_err(|error| DeployError::Package(format!("{entry}: {error}")))?;
        writer
            .write_all(&body)
            .map_err(|error| DeployError::io(entry.as_str(), error))?;
    }
    let cursor = writer
        .finish()
        .map_err(|error| DeployError::Package(error.to_string()))?;
    Ok(cursor.into_inner())
}

fn archive_path(path: &Path) -> String {
    path.components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Reuse or publish the project's dependency package. `Ok(None)` when the
/// project declares no runtime dependencies.
pub async fn ensure_layer(
    api: &dyn LayerApi,
    project: &str,
    stage: &str,
    project_dir: &Path,
    settings: &LayerSettings,
) -> Result<Option<LayerOutcome>, DeployError> {
    let dir = project_dir.to_path_buf();
    let closure = tokio::task::spawn_blocking(move || resolve_closure(&dir))
        .await
        .map_err(|error| DeployError::Package(error.to_string()))??;
    let Some(closure) = closure else {
        info!(project, stage, "no runtime dependencies; skipping dependency package");
        return Ok(None);
    };

    let name = layer_name(project, stage);
    let versions = api
        .list_layer_versions(&name)
        .await
        .for_resource(KIND, &name)?;

    if let Some(existing) = find_reusable(&versions, &closure.content_hash) {
        info!(layer = %name, version = existing.version, hash = %closure.content_hash, "reusing dependency package");
        return Ok(Some(LayerOutcome {
            manifest: LayerManifest {
                content_hash: closure.content_hash.clone(),
                packages: closure.package_ids(),
                version: existing.version,
                arn: existing.version_arn.clone(),
            },
            result: DeploymentResult::new(
                KIND,
                &name,
                &existing.version_arn,
                DeploymentStatus::Unchanged,
            ),
        }));
    }

    let packages = closure.package_ids();
    let content_hash = closure.content_hash.clone();
    let archive = tokio::task::spawn_blocking(move || build_archive(&closure))
        .await
        .map_err(|error| DeployError::Package(error.to_string()))??;
    let spec = LayerSpec {
        content_hash: content_hash.clone(),
        archive,
        compatible_runtimes: vec![settings.runtime.clone()],
    };
    let published = api
        .publish_layer_version(&name, &spec)
        .await
        .for_resource(KIND, &name)?;
    info!(layer = %name, version = published.version, packages = packages.len(), "published dependency package");

    let mut all_versions = versions;
    all_versions.push(published.clone());
    let stale_versions = versions_to_prune(&all_versions, settings.keep_versions.max(1))
        .into_iter()
        .filter(|stale| stale.version != published.version);
    for stale in stale_versions {
        if let Err(error) = api.delete_layer_version(&name, stale.version).await {
            warn!(layer = %name, version = stale.version, error = %error, "failed to prune dependency package version");
        }
    }

    let status = if all_versions.len() == 1 {
        DeploymentStatus::Created
    } else {
        DeploymentStatus::Updated
    };
    Ok(Some(LayerOutcome {
        result: DeploymentResult::new(KIND, &name, &published.version_arn, status),
        manifest: LayerManifest {
            content_hash,
            packages,
            version: published.version,
            arn: published.version_arn,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project_with(deps: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let dependencies: serde_json::Map<String, serde_json::Value> = deps
            .iter()
            .map(|(name, _)| (name.to_string(), json!("*")))
            .collect();
        fs::write(
            dir.path().join("package.json"),
            json!({ "dependencies": dependencies }).to_string(),
        )
        .expect("write package.json");
        for (name, version) in deps {
            let package_dir = dir.path().join("node_modules").join(name);
            fs::create_dir_all(&package_dir).expect("mkdir");
            fs::write(
                package_dir.join("package.json"),
                json!({ "name": name, "version": version }).to_string(),
            )
            .expect("write manifest");
            fs::write(package_dir.join("index.js"), format!("module.exports = '{name}';"))
                .expect("write index");
        }
        dir
    }

    #[test]
    fn archive_is_deterministic_and_rooted_under_nodejs() {
        let dir = project_with(&[("left-pad", "1.3.0"), ("uuid", "9.0.0")]);
        let closure = resolve_closure(dir.path())
            .expect("resolves")
            .expect("has packages");

        let first = build_archive(&closure).expect("archive");
        let second = build_archive(&closure).expect("archive");
        assert_eq!(first, second);

        let archive = zip::ZipArchive::new(Cursor::new(first)).expect("readable zip");
        let names: Vec<String> = archive.file_names().map(ToString::to_string).collect();
        assert!(names.contains(&"nodejs/node_modules/left-pad/index.js".to_string()));
        assert!(names.contains(&"nodejs/node_modules/uuid/package.json".to_string()));
    }
}
