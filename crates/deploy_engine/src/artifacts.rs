use std::path::{Path, PathBuf};

use deploy_core::error::DeployError;
use deploy_core::handler::HandlerSpec;
use deploy_core::resources::function::CodeArtifact;

/// Where bundled function code comes from.
pub trait ArtifactSource: Send + Sync {
    fn load(&self, handler: &HandlerSpec) -> Result<CodeArtifact, DeployError>;
}

/// Reads the zip named by each handler's `function.artifact`, resolved
/// against `base_dir` when relative.
#[derive(Debug, Clone, Default)]
pub struct FsArtifacts {
    base_dir: Option<PathBuf>,
}

impl FsArtifacts {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ArtifactSource for FsArtifacts {
    fn load(&self, handler: &HandlerSpec) -> Result<CodeArtifact, DeployError> {
        let Some(path) = handler.function.artifact.as_deref() else {
            return Err(DeployError::validation(format!(
                "Handler '{}' has no bundled artifact",
                handler.name
            )));
        };
        let path = self.resolve(path);
        let bytes =
            std::fs::read(&path).map_err(|error| DeployError::io(path.display().to_string(), error))?;
        Ok(CodeArtifact::new(bytes))
    }
}
