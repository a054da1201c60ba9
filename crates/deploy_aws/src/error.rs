//! Mapping SDK failures onto [`ProviderError`] classes.
//!
//! Every service reports its own error codes; the engine only cares about
//! the handful of classes in [`ErrorKind`].

use std::error::Error as StdError;
use std::fmt::Debug;

use aws_sdk_lambda::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use deploy_core::error::{ErrorKind, ProviderError};

const NOT_FOUND: &[&str] = &[
    "ResourceNotFoundException",
    "NoSuchEntity",
    "NoSuchEntityException",
    "NoSuchBucket",
    "NoSuchKey",
    "NoSuchBucketPolicy",
    "NoSuchTagSet",
    "NoSuchDistribution",
    "NoSuchFunctionExists",
    "NoSuchOriginAccessControl",
    "NotFoundException",
    "NotFound",
    "QueueDoesNotExist",
    "AWS.SimpleQueueService.NonExistentQueue",
];

const ALREADY_EXISTS: &[&str] = &[
    "EntityAlreadyExists",
    "EntityAlreadyExistsException",
    "AlreadyExistsException",
    "BucketAlreadyOwnedByYou",
    "QueueAlreadyExists",
    "DistributionAlreadyExists",
    "FunctionAlreadyExists",
    "OriginAccessControlAlreadyExists",
];

const CONFLICT: &[&str] = &[
    "ResourceConflictException",
    "ResourceInUseException",
    "ConflictException",
    "ConcurrentModificationException",
    "OperationAbortedException",
    "OperationAborted",
    "DistributionNotDisabled",
    "PreconditionFailed",
    "InvalidIfMatchVersion",
    "FunctionInUse",
    "DeleteConflict",
    "DeleteConflictException",
];

const THROTTLED: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "SlowDown",
    "ProvisionedThroughputExceededException",
];

const PERMISSION_DENIED: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "UnrecognizedClientException",
    "InvalidClientTokenId",
    "ExpiredToken",
    "ExpiredTokenException",
];

const VALIDATION: &[&str] = &[
    "ValidationException",
    "ValidationError",
    "InvalidParameterValueException",
    "InvalidParameterValue",
    "InvalidParameterException",
    "InvalidArgument",
    "InvalidRequestContentException",
    "MalformedPolicyDocument",
    "MalformedPolicyDocumentException",
    "BadRequestException",
    "InvalidAttributeValue",
    "InvalidAttributeName",
    "InvalidViewerCertificate",
    "IllegalUpdate",
];

/// Class for a service error code.
pub fn kind_for_code(code: &str) -> ErrorKind {
    let matches = |codes: &[&str]| codes.contains(&code);
    if matches(NOT_FOUND) {
        ErrorKind::NotFound
    } else if matches(ALREADY_EXISTS) {
        ErrorKind::AlreadyExists
    } else if matches(CONFLICT) {
        ErrorKind::Conflict
    } else if matches(THROTTLED) {
        ErrorKind::Throttled
    } else if code.starts_with("LimitExceeded")
        || code.starts_with("TooMany")
        || code.ends_with("LimitExceededException")
        || code == "CodeStorageExceededException"
        || code == "ServiceQuotaExceededException"
    {
        ErrorKind::QuotaExceeded
    } else if matches(PERMISSION_DENIED) {
        ErrorKind::PermissionDenied
    } else if matches(VALIDATION) {
        ErrorKind::Validation
    } else {
        ErrorKind::Other
    }
}

/// Classify any SDK failure by its service error code. Transport and
/// timeout failures carry no code and land in [`ErrorKind::Other`].
pub fn classify<E, R>(operation: &str, error: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    R: Debug,
{
    let kind = error.code().map_or(ErrorKind::Other, kind_for_code);
    let message = match (error.code(), error.message()) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (Some(code), None) => code.to_string(),
        _ => DisplayErrorContext(&error).to_string(),
    };
    ProviderError::new(kind, operation, message)
}

/// `Ok(None)` for a not-found class, the classified error otherwise.
pub fn absent<T, E, R>(operation: &str, error: SdkError<E, R>) -> Result<Option<T>, ProviderError>
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    R: Debug,
{
    let error = classify(operation, error);
    if error.is_not_found() {
        Ok(None)
    } else {
        Err(error)
    }
}

/// For request shapes whose builders validate required members.
pub fn invalid_request(operation: &str, error: impl std::fmt::Display) -> ProviderError {
    ProviderError::validation(operation, format!("request could not be built: {error}"))
}

/// A response the service documents but which arrived without a field the
/// adapter depends on.
pub fn missing_field(operation: &str, field: &str) -> ProviderError {
    ProviderError::other(operation, format!("response did not include {field}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_codes_map_to_engine_classes() {
        assert_eq!(kind_for_code("ResourceNotFoundException"), ErrorKind::NotFound);
        assert_eq!(kind_for_code("NoSuchEntity"), ErrorKind::NotFound);
        assert_eq!(
            kind_for_code("AWS.SimpleQueueService.NonExistentQueue"),
            ErrorKind::NotFound
        );
        assert_eq!(kind_for_code("EntityAlreadyExists"), ErrorKind::AlreadyExists);
        assert_eq!(kind_for_code("BucketAlreadyOwnedByYou"), ErrorKind::AlreadyExists);
        assert_eq!(kind_for_code("ResourceConflictException"), ErrorKind::Conflict);
        assert_eq!(kind_for_code("DistributionNotDisabled"), ErrorKind::Conflict);
        assert_eq!(kind_for_code("TooManyRequestsException"), ErrorKind::Throttled);
        assert_eq!(kind_for_code("LimitExceededException"), ErrorKind::QuotaExceeded);
        assert_eq!(kind_for_code("TooManyDistributions"), ErrorKind::QuotaExceeded);
        assert_eq!(kind_for_code("AccessDeniedException"), ErrorKind::PermissionDenied);
        assert_eq!(kind_for_code("InvalidParameterValueException"), ErrorKind::Validation);
        assert_eq!(kind_for_code("InternalFailure"), ErrorKind::Other);
    }

    #[test]
    fn throttling_wins_over_the_too_many_prefix() {
        assert_eq!(kind_for_code("TooManyRequestsException"), ErrorKind::Throttled);
        assert!(kind_for_code("Throttling").is_transient());
    }
}
