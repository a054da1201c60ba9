//! Dependency closure and content hash for the shared dependency package.
//!
//! Only runtime `dependencies` from the project's `package.json` are
//! followed; dev and peer dependencies never ship. The closure is resolved
//! against the installed `node_modules` tree, so the hash reflects what is
//! actually on disk.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::DeployError;

pub const PACKAGE_MANIFEST: &str = "package.json";
pub const NODE_MODULES: &str = "node_modules";

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

/// One installed package in the closure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    /// Canonical directory of the installed package.
    pub dir: PathBuf,
    /// Location under the project's `node_modules`, e.g. `a/node_modules/c`
    /// for a nested install.
    pub install_path: PathBuf,
}

impl ResolvedPackage {
    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Resolved closure plus its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyClosure {
    pub packages: Vec<ResolvedPackage>,
    pub content_hash: String,
}

impl DependencyClosure {
    pub fn package_ids(&self) -> Vec<String> {
        sorted_ids(&self.packages)
    }
}

fn read_package_json(path: &Path) -> Result<PackageJson, DeployError> {
    let raw = fs::read_to_string(path)
        .map_err(|error| DeployError::io(path.display().to_string(), error))?;
    serde_json::from_str(&raw)
        .map_err(|error| DeployError::Package(format!("{}: {error}", path.display())))
}

/// Direct runtime dependencies declared by the project. A project without a
/// `package.json` has none.
pub fn direct_dependencies(project_dir: &Path) -> Result<Vec<String>, DeployError> {
    let manifest = project_dir.join(PACKAGE_MANIFEST);
    if !manifest.is_file() {
        return Ok(Vec::new());
    }
    Ok(read_package_json(&manifest)?.dependencies.into_keys().collect())
}

/// Installed directory for `name` as seen from `from_dir`, resolved the way
/// Node does: the `node_modules` of `from_dir` and of each ancestor up to the
/// project root, nearest first.
fn locate(project_dir: &Path, from_dir: Option<&Path>, name: &str) -> Option<PathBuf> {
    let inside = from_dir.filter(|dir| dir.starts_with(project_dir));
    inside
        .into_iter()
        .flat_map(Path::ancestors)
        .take_while(|dir| *dir != project_dir)
        .filter(|dir| dir.file_name() != Some(OsStr::new(NODE_MODULES)))
        .chain(std::iter::once(project_dir))
        .map(|dir| dir.join(NODE_MODULES).join(name))
        .find(|candidate| candidate.join(PACKAGE_MANIFEST).is_file())
}

/// Transitive closure of the project's runtime dependencies.
///
/// Traversal is iterative with a visited set keyed by canonical path, so
/// cycles and symlinked duplicates terminate. Packages that cannot be found
/// or read are skipped with a warning. Returns `None` when the project
/// declares no runtime dependencies.
pub fn resolve_closure(project_dir: &Path) -> Result<Option<DependencyClosure>, DeployError> {
    let direct = direct_dependencies(project_dir)?;
    if direct.is_empty() {
        return Ok(None);
    }
    let project_dir = project_dir
        .canonicalize()
        .map_err(|error| DeployError::io(project_dir.display().to_string(), error))?;
    let project_dir = project_dir.as_path();
    let root_modules = project_dir.join(NODE_MODULES);

    let mut visited: BTreeSet<PathBuf> = BTreeSet::new();
    let mut packages = Vec::new();
    let mut pending: Vec<(String, Option<PathBuf>)> =
        direct.into_iter().rev().map(|name| (name, None)).collect();

    while let Some((name, from_dir)) = pending.pop() {
        let Some(location) = locate(project_dir, from_dir.as_deref(), &name) else {
            warn!(package = %name, "dependency not installed; skipping");
            continue;
        };
        let dir = match location.canonicalize() {
            Ok(dir) => dir,
            Err(error) => {
                warn!(package = %name, error = %error, "cannot resolve package path; skipping");
                continue;
            }
        };
        if !visited.insert(dir.clone()) {
            continue;
        }
        let install_path = location
            .strip_prefix(&root_modules)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(&name));

        let manifest = match read_package_json(&dir.join(PACKAGE_MANIFEST)) {
            Ok(manifest) => manifest,
            Err(error) => {
                warn!(package = %name, error = %error, "unreadable package manifest; skipping");
                continue;
            }
        };

        for child in manifest.dependencies.keys().rev() {
            pending.push((child.clone(), Some(dir.clone())));
        }
        packages.push(ResolvedPackage {
            name,
            version: manifest.version.unwrap_or_else(|| "0.0.0".to_string()),
            dir,
            install_path,
        });
    }

    packages.sort();
    let content_hash = content_hash(&sorted_ids(&packages));
    Ok(Some(DependencyClosure {
        packages,
        content_hash,
    }))
}

fn sorted_ids(packages: &[ResolvedPackage]) -> Vec<String> {
    let mut ids: Vec<String> = packages.iter().map(ResolvedPackage::id).collect();
    ids.sort();
    ids
}

/// Hex SHA-256 over the sorted, newline-joined `name@version` list. Input
/// order does not matter.
pub fn content_hash(package_ids: &[String]) -> String {
    let mut ids = package_ids.to_vec();
    ids.sort();
    let mut hasher = Sha256::new();
    hasher.update(ids.join("\n"));
    format!("{:x}", hasher.finalize())
}

/// Every regular file of the package at `dir`, sorted, as paths relative to
/// `dir`. Nested `node_modules` are excluded; those packages are part of the
/// closure in their own right.
pub fn package_files(dir: &Path) -> Result<Vec<PathBuf>, DeployError> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = fs::read_dir(&current)
            .map_err(|error| DeployError::io(current.display().to_string(), error))?;
        for entry in entries {
            let entry = entry.map_err(|error| DeployError::io(current.display().to_string(), error))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|error| DeployError::io(path.display().to_string(), error))?;
            if file_type.is_dir() {
                if entry.file_name() != NODE_MODULES {
                    pending.push(path);
                }
            } else if file_type.is_file() {
                if let Ok(relative) = path.strip_prefix(dir) {
                    files.push(relative.to_path_buf());
                }
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_json(path: &Path, value: serde_json::Value) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, value.to_string()).expect("write json");
    }

    fn install(root: &Path, name: &str, version: &str, deps: &[&str]) {
        let dependencies: serde_json::Map<String, serde_json::Value> = deps
            .iter()
            .map(|dep| (dep.to_string(), json!("*")))
            .collect();
        write_json(
            &root.join(NODE_MODULES).join(name).join(PACKAGE_MANIFEST),
            json!({ "name": name, "version": version, "dependencies": dependencies }),
        );
    }

    #[test]
    fn hash_is_independent_of_input_order() {
        let forward = content_hash(&["a@1.0.0".to_string(), "b@2.0.0".to_string()]);
        let reverse = content_hash(&["b@2.0.0".to_string(), "a@1.0.0".to_string()]);
        assert_eq!(forward, reverse);
        assert_eq!(forward.len(), 64);
        assert_ne!(forward, content_hash(&["a@1.0.1".to_string(), "b@2.0.0".to_string()]));
    }

    #[test]
    fn no_dependencies_yields_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(resolve_closure(dir.path()).expect("resolves").is_none());

        write_json(
            &dir.path().join(PACKAGE_MANIFEST),
            json!({ "name": "app", "devDependencies": { "typescript": "5" } }),
        );
        assert!(resolve_closure(dir.path()).expect("resolves").is_none());
    }

    #[test]
    fn closure_follows_transitive_deps_and_terminates_on_cycles() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_json(
            &dir.path().join(PACKAGE_MANIFEST),
            json!({ "name": "app", "dependencies": { "a": "^1" } }),
        );
        install(dir.path(), "a", "1.0.0", &["b"]);
        install(dir.path(), "b", "2.1.0", &["a", "missing"]);

        let closure = resolve_closure(dir.path())
            .expect("resolves")
            .expect("has packages");

        assert_eq!(closure.package_ids(), vec!["a@1.0.0", "b@2.1.0"]);
        assert_eq!(
            closure.content_hash,
            content_hash(&["b@2.1.0".to_string(), "a@1.0.0".to_string()])
        );
    }

    #[test]
    fn nested_install_shadows_root_install() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_json(
            &dir.path().join(PACKAGE_MANIFEST),
            json!({ "dependencies": { "a": "^1", "c": "^3" } }),
        );
        install(dir.path(), "a", "1.0.0", &["c"]);
        install(dir.path(), "c", "3.0.0", &[]);
        install(&dir.path().join(NODE_MODULES).join("a"), "c", "2.0.0", &[]);

        let closure = resolve_closure(dir.path())
            .expect("resolves")
            .expect("has packages");

        assert_eq!(closure.package_ids(), vec!["a@1.0.0", "c@2.0.0", "c@3.0.0"]);
        let nested = closure
            .packages
            .iter()
            .find(|package| package.version == "2.0.0")
            .expect("nested c");
        assert_eq!(nested.install_path, Path::new("a").join(NODE_MODULES).join("c"));
    }

    #[test]
    fn lookup_walks_enclosing_node_modules_before_the_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_json(
            &dir.path().join(PACKAGE_MANIFEST),
            json!({ "dependencies": { "a": "^1" } }),
        );
        let a = dir.path().join(NODE_MODULES).join("a");
        install(dir.path(), "a", "1.0.0", &["b"]);
        install(&a, "b", "1.0.0", &["c"]);
        install(&a, "c", "2.0.0", &[]);
        install(dir.path(), "c", "3.0.0", &[]);

        let closure = resolve_closure(dir.path())
            .expect("resolves")
            .expect("has packages");

        assert_eq!(closure.package_ids(), vec!["a@1.0.0", "b@1.0.0", "c@2.0.0"]);
    }

    #[test]
    fn package_files_are_sorted_and_relative() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("lib")).expect("mkdir");
        fs::create_dir_all(dir.path().join("node_modules/dep")).expect("mkdir");
        fs::write(dir.path().join("lib/z.js"), "z").expect("write");
        fs::write(dir.path().join("index.js"), "i").expect("write");
        fs::write(dir.path().join("node_modules/dep/index.js"), "d").expect("write");

        let files = package_files(dir.path()).expect("lists");
        assert_eq!(files, vec![PathBuf::from("index.js"), PathBuf::from("lib/z.js")]);
    }
}
