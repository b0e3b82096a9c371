//! Configuration for the guard client.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use spendguard_core::AuditError;
use std::path::Path;
use tracing::debug;

/// Base URL of a locally running guard.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8787";

/// Default per-call timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Guard client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Guard base URL (e.g., "http://127.0.0.1:8787")
    pub base_url: String,

    /// Value for the `x-api-key` header, for hosted deployments
    pub api_key: Option<String>,

    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl GuardConfig {
    /// Load configuration from a YAML file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> spendguard_core::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AuditError::config_not_found_with_source(path, e))?;

        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| AuditError::ConfigInvalid {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        debug!(path = %path.display(), base_url = %config.base_url, "Loaded guard config");
        Ok(config)
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Base URL without trailing slashes.
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }

    /// API key, if set and non-empty.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Check the configuration before building a client.
    pub fn validate(&self) -> Result<()> {
        let base_url = self.normalized_base_url();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "base_url must start with http:// or https:// (got '{}')",
                self.base_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ClientError::Config(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
