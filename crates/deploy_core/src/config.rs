use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DeployError;

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_RUNTIME: &str = "nodejs20.x";

/// Engine tunables. Every field has a default and can be overridden through
/// `DEPLOY_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Handlers deployed at once.
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    /// CloudFront propagation is slow; disabling a distribution before its
    /// deletion gets its own budget.
    pub distribution_poll_interval_ms: u64,
    pub distribution_max_poll_attempts: u32,
    /// Wait after creating a role before a function may assume it.
    pub role_settle_delay_ms: u64,
    pub layer_keep_versions: usize,
    pub runtime: String,
    pub default_memory_mb: u32,
    pub default_timeout_secs: u32,
    pub default_entry: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval_ms: 2_000,
            max_poll_attempts: 60,
            distribution_poll_interval_ms: 30_000,
            distribution_max_poll_attempts: 40,
            role_settle_delay_ms: 10_000,
            layer_keep_versions: 3,
            runtime: DEFAULT_RUNTIME.to_string(),
            default_memory_mb: 256,
            default_timeout_secs: 30,
            default_entry: "index.handler".to_string(),
        }
    }
}

impl DeployConfig {
    pub fn from_env() -> Result<Self, DeployError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `DEPLOY_*`
    /// key. Unparseable values are rejected rather than ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DeployError> {
        let mut config = Self::default();
        override_parsed(&lookup, "DEPLOY_CONCURRENCY", &mut config.concurrency)?;
        override_parsed(&lookup, "DEPLOY_POLL_INTERVAL_MS", &mut config.poll_interval_ms)?;
        override_parsed(&lookup, "DEPLOY_MAX_POLL_ATTEMPTS", &mut config.max_poll_attempts)?;
        override_parsed(
            &lookup,
            "DEPLOY_DISTRIBUTION_POLL_INTERVAL_MS",
            &mut config.distribution_poll_interval_ms,
        )?;
        override_parsed(
            &lookup,
            "DEPLOY_DISTRIBUTION_MAX_POLL_ATTEMPTS",
            &mut config.distribution_max_poll_attempts,
        )?;
        override_parsed(&lookup, "DEPLOY_ROLE_SETTLE_DELAY_MS", &mut config.role_settle_delay_ms)?;
        override_parsed(&lookup, "DEPLOY_LAYER_KEEP_VERSIONS", &mut config.layer_keep_versions)?;
        override_parsed(&lookup, "DEPLOY_RUNTIME", &mut config.runtime)?;
        override_parsed(&lookup, "DEPLOY_DEFAULT_MEMORY_MB", &mut config.default_memory_mb)?;
        override_parsed(&lookup, "DEPLOY_DEFAULT_TIMEOUT_SECS", &mut config.default_timeout_secs)?;
        override_parsed(&lookup, "DEPLOY_DEFAULT_ENTRY", &mut config.default_entry)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DeployError> {
        if self.concurrency == 0 {
            return Err(DeployError::Config("concurrency must be at least 1".to_string()));
        }
        if self.max_poll_attempts == 0 {
            return Err(DeployError::Config("max_poll_attempts must be at least 1".to_string()));
        }
        if self.distribution_max_poll_attempts == 0 {
            return Err(DeployError::Config(
                "distribution_max_poll_attempts must be at least 1".to_string(),
            ));
        }
        // The newest version is the one functions attach.
        if self.layer_keep_versions == 0 {
            return Err(DeployError::Config("layer_keep_versions must be at least 1".to_string()));
        }
        if self.runtime.trim().is_empty() {
            return Err(DeployError::Config("runtime must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn distribution_poll_interval(&self) -> Duration {
        Duration::from_millis(self.distribution_poll_interval_ms)
    }

    pub fn role_settle_delay(&self) -> Duration {
        Duration::from_millis(self.role_settle_delay_ms)
    }
}

fn override_parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<(), DeployError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(());
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(());
    }
    *target = raw
        .parse()
        .map_err(|error| DeployError::Config(format!("{key}={raw}: {error}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let config = DeployConfig::from_lookup(lookup(&[])).expect("defaults are valid");
        assert_eq!(config, DeployConfig::default());
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.runtime, "nodejs20.x");
    }

    #[test]
    fn environment_overrides_are_parsed() {
        let config = DeployConfig::from_lookup(lookup(&[
            ("DEPLOY_CONCURRENCY", "8"),
            ("DEPLOY_POLL_INTERVAL_MS", " 50 "),
            ("DEPLOY_RUNTIME", "nodejs22.x"),
        ]))
        .expect("overrides are valid");

        assert_eq!(config.concurrency, 8);
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.runtime, "nodejs22.x");
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        let error = DeployConfig::from_lookup(lookup(&[("DEPLOY_CONCURRENCY", "many")]))
            .expect_err("should reject");
        assert!(error.to_string().contains("DEPLOY_CONCURRENCY=many"));

        let error = DeployConfig::from_lookup(lookup(&[("DEPLOY_CONCURRENCY", "0")]))
            .expect_err("should reject");
        assert!(matches!(error, DeployError::Config(_)));
    }

    #[test]
    fn keeping_zero_layer_versions_is_rejected() {
        let error = DeployConfig::from_lookup(lookup(&[("DEPLOY_LAYER_KEEP_VERSIONS", "0")]))
            .expect_err("should reject");
        assert!(error.to_string().contains("layer_keep_versions"));

        let config = DeployConfig {
            layer_keep_versions: 0,
            ..DeployConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn distribution_wait_outlasts_cloudfront_propagation() {
        let config = DeployConfig::default();
        let budget = config.distribution_poll_interval() * config.distribution_max_poll_attempts;
        assert!(budget >= Duration::from_secs(15 * 60));

        let config = DeployConfig::from_lookup(lookup(&[
            ("DEPLOY_DISTRIBUTION_POLL_INTERVAL_MS", "5"),
            ("DEPLOY_DISTRIBUTION_MAX_POLL_ATTEMPTS", "3"),
        ]))
        .expect("overrides are valid");
        assert_eq!(config.distribution_poll_interval(), Duration::from_millis(5));
        assert_eq!(config.distribution_max_poll_attempts, 3);
    }
}
