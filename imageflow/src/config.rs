//! Configuration for the security group step.

use crate::errors::StepError;
use crate::pipeline::{RetryPolicy, MAX_CLEANUP_ATTEMPTS, MAX_CLEANUP_DELAY_MS};
use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use thiserror::Error;

/// Port opened on a created group when none is configured.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Errors raised while parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid JSON for this configuration.
    #[error("Failed to parse security group configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration for [`StepSecurityGroup`](crate::steps::StepSecurityGroup).
///
/// Empty strings are treated as unset, so template layers can pass fields
/// through without checking them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityGroupConfig {
    /// Existing group to use instead of creating one.
    #[serde(deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub security_group_id: Option<String>,
    /// Port to open for inbound TCP on a created group.
    pub ssh_port: u16,
    /// Network scope for a created group.
    #[serde(deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    /// Retry policy for deleting a created group.
    pub cleanup_retry: RetryPolicy,
}

impl Default for SecurityGroupConfig {
    fn default() -> Self {
        Self {
            security_group_id: None,
            ssh_port: DEFAULT_SSH_PORT,
            vpc_id: None,
            cleanup_retry: RetryPolicy::default(),
        }
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(non_empty(value))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

impl SecurityGroupConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the document is malformed.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;
        Self::from_json_str(&contents)
            .with_context(|| format!("failed to parse configuration in {}", path.display()))
    }

    /// Uses an existing group instead of creating one.
    #[must_use]
    pub fn with_security_group_id(mut self, id: impl Into<String>) -> Self {
        self.security_group_id = non_empty(Some(id.into()));
        self
    }

    /// Sets the port opened on a created group.
    #[must_use]
    pub fn with_ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }

    /// Sets the network scope for a created group.
    #[must_use]
    pub fn with_vpc_id(mut self, vpc_id: impl Into<String>) -> Self {
        self.vpc_id = non_empty(Some(vpc_id.into()));
        self
    }

    /// Sets the retry policy used during cleanup.
    #[must_use]
    pub fn with_cleanup_retry(mut self, policy: RetryPolicy) -> Self {
        self.cleanup_retry = policy;
        self
    }

    /// Returns the explicitly configured group, if any.
    #[must_use]
    pub fn explicit_group_id(&self) -> Option<&str> {
        self.security_group_id.as_deref()
    }

    /// Checks the configuration before any remote call is made.
    ///
    /// A configured group id makes every other field irrelevant.
    ///
    /// # Errors
    ///
    /// Returns `StepError::Configuration` if a group must be created and
    /// `ssh_port` is zero, or the cleanup retry policy exceeds
    /// `MAX_CLEANUP_ATTEMPTS` attempts or `MAX_CLEANUP_DELAY_MS` per delay.
    pub fn validate(&self) -> Result<(), StepError> {
        if self.security_group_id.is_some() {
            return Ok(());
        }
        if self.ssh_port == 0 {
            return Err(StepError::configuration(
                "ssh_port must be set to a non-zero value",
            ));
        }
        if !self.cleanup_retry.is_bounded() {
            return Err(StepError::configuration(format!(
                "cleanup_retry allows at most {MAX_CLEANUP_ATTEMPTS} attempts \
                 and {MAX_CLEANUP_DELAY_MS} ms between attempts"
            )));
        }
        Ok(())
    }
}
