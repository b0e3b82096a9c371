//! Error types shared by the SpendGuard audit crates.
//!
//! [`AuditError`] covers the failures that are not specific to the ledger or the
//! guard client: configuration files, log directories and time windows. Errors
//! are never retried automatically and always carry an actionable message.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`AuditError`].
pub type Result<T> = std::result::Result<T, AuditError>;

/// Error type for core SpendGuard audit operations.
#[derive(Debug, Error)]
pub enum AuditError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file not found
    #[error("Configuration not found at {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file is invalid YAML
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Time Window Errors
    // =========================================================================
    /// Timestamp could not be parsed as ISO-8601
    #[error("Invalid timestamp '{input}': {message}")]
    InvalidTimestamp { input: String, message: String },

    /// Window start is after window end
    #[error("Invalid window: start {start} is after end {end}")]
    InvalidWindow { start: String, end: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (bug in the tooling)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AuditError {
    /// Create a ConfigNotFound error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a ConfigNotFound error with source
    pub fn config_not_found_with_source(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            source: Some(source),
        }
    }

    /// Create an InvalidTimestamp error
    pub fn invalid_timestamp(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. } | Self::ConfigInvalid { .. } | Self::ConfigValidation { .. }
        )
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound { .. } => {
                Some("Check the --config path or omit it to use flags and CAP_* variables")
            }
            Self::ConfigInvalid { .. } => Some("Check YAML syntax in the configuration file"),
            Self::InvalidTimestamp { .. } => {
                Some("Use ISO-8601 UTC timestamps such as 2026-02-10T01:02:03Z")
            }
            Self::InvalidWindow { .. } => Some("Swap --start and --end"),
            _ => None,
        }
    }
}
