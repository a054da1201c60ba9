//! Fixed-interval, bounded polling and retry.

use std::future::Future;
use std::time::Duration;

use deploy_core::config::DeployConfig;
use deploy_core::error::{DeployError, ErrorKind};
use deploy_core::tags::ResourceType;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &DeployConfig) -> Self {
        Self::new(config.poll_interval(), config.max_poll_attempts)
    }

    /// Wait for a distribution config change to propagate.
    pub fn for_distributions(config: &DeployConfig) -> Self {
        Self::new(
            config.distribution_poll_interval(),
            config.distribution_max_poll_attempts,
        )
    }
}

/// Result of a single readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness<T> {
    Ready(T),
    /// Not ready yet; carries the observed state for the timeout message.
    Pending(String),
}

/// Poll until ready, sleeping `policy.interval` between attempts. Errors
/// from `check` abort immediately.
pub async fn poll_until<T, F, Fut>(
    policy: PollPolicy,
    kind: ResourceType,
    name: &str,
    mut check: F,
) -> Result<T, DeployError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Readiness<T>, DeployError>>,
{
    let mut last_state = String::from("unknown");
    for attempt in 1..=policy.max_attempts {
        match check().await? {
            Readiness::Ready(value) => return Ok(value),
            Readiness::Pending(state) => {
                debug!(kind = %kind, name, attempt, state = %state, "waiting for resource to settle");
                last_state = state;
            }
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    Err(DeployError::Timeout {
        kind,
        name: name.to_string(),
        attempts: policy.max_attempts,
        last_state,
    })
}

/// Retry `operation` while `should_retry` accepts the error, up to the
/// policy's attempt budget. The last error is returned unchanged.
pub async fn retry_while<T, F, Fut, P>(
    policy: PollPolicy,
    should_retry: P,
    mut operation: F,
) -> Result<T, DeployError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DeployError>>,
    P: Fn(&DeployError) -> bool,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < policy.max_attempts && should_retry(&error) => {
                debug!(attempt, error = %error, "retrying after transient failure");
                attempt += 1;
                tokio::time::sleep(policy.interval).await;
            }
            Err(error) => return Err(error),
        }
    }
}

pub fn is_transient(error: &DeployError) -> bool {
    error.provider_kind().is_some_and(ErrorKind::is_transient)
}

/// A freshly created role is not yet assumable by the function service.
pub fn is_role_not_ready(error: &DeployError) -> bool {
    match error {
        DeployError::Provider { source, .. } => {
            source.kind == ErrorKind::Validation
                && source.message.to_ascii_lowercase().contains("assume")
        }
        _ => false,
    }
}
