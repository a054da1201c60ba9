use std::fmt;

use thiserror::Error;

use crate::tags::ResourceType;

/// Provider error classes that drive reconcile decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Lookup found nothing; callers treat this as "must create".
    NotFound,
    /// Create raced an existing resource; treated as already reconciled.
    AlreadyExists,
    /// A prior asynchronous mutation is still settling.
    Conflict,
    Throttled,
    QuotaExceeded,
    PermissionDenied,
    Validation,
    Other,
}

impl ErrorKind {
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Conflict | Self::Throttled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::Conflict => "conflict",
            Self::Throttled => "throttled",
            Self::QuotaExceeded => "quota_exceeded",
            Self::PermissionDenied => "permission_denied",
            Self::Validation => "validation",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed ({kind}): {message}")]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub operation: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn not_found(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, operation, message)
    }

    pub fn conflict(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, operation, message)
    }

    pub fn validation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, operation, message)
    }

    pub fn other(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, operation, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind == ErrorKind::AlreadyExists
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{kind} {name}: {source}")]
    Provider {
        kind: ResourceType,
        name: String,
        #[source]
        source: ProviderError,
    },
    #[error("invalid spec: {0}")]
    Validation(#[from] ValidationError),
    #[error("{kind} {name} did not settle after {attempts} attempts: {last_state}")]
    Timeout {
        kind: ResourceType,
        name: String,
        attempts: u32,
        last_state: String,
    },
    #[error("{kind} {name} entered failed state: {reason}")]
    Failed {
        kind: ResourceType,
        name: String,
        reason: String,
    },
    #[error("dependency package: {0}")]
    Package(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest: {0}")]
    Manifest(String),
    #[error("configuration: {0}")]
    Config(String),
}

impl DeployError {
    pub fn provider(kind: ResourceType, name: impl Into<String>, source: ProviderError) -> Self {
        Self::Provider {
            kind,
            name: name.into(),
            source,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(message))
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Resource kind the failure is attributed to, when one is known.
    pub fn resource_kind(&self) -> Option<ResourceType> {
        match self {
            Self::Provider { kind, .. } | Self::Timeout { kind, .. } | Self::Failed { kind, .. } => {
                Some(*kind)
            }
            Self::Package(_) | Self::Io { .. } => Some(ResourceType::DependencyPackage),
            Self::Validation(_) | Self::Manifest(_) | Self::Config(_) => None,
        }
    }

    pub fn provider_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Provider { source, .. } => Some(source.kind),
            _ => None,
        }
    }
}

/// Extension for attaching resource context to provider results.
pub trait ProviderResultExt<T> {
    fn for_resource(self, kind: ResourceType, name: &str) -> Result<T, DeployError>;
}

impl<T> ProviderResultExt<T> for Result<T, ProviderError> {
    fn for_resource(self, kind: ResourceType, name: &str) -> Result<T, DeployError> {
        self.map_err(|source| DeployError::provider(kind, name, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_display_includes_operation_and_kind() {
        let error = ProviderError::conflict("UpdateFunctionConfiguration", "update in progress");
        assert_eq!(
            error.to_string(),
            "UpdateFunctionConfiguration failed (conflict): update in progress"
        );
        assert!(error.kind.is_transient());
    }

    #[test]
    fn deploy_error_reports_resource_kind() {
        let error = Err::<(), _>(ProviderError::new(
            ErrorKind::QuotaExceeded,
            "CreateFunction",
            "code storage limit exceeded",
        ))
        .for_resource(ResourceType::Function, "acme-dev-a")
        .expect_err("should map");

        assert_eq!(error.resource_kind(), Some(ResourceType::Function));
        assert_eq!(error.provider_kind(), Some(ErrorKind::QuotaExceeded));
        assert!(error.to_string().starts_with("function acme-dev-a:"));
    }
}
