//! Error types for ledger extraction and provider import.

use std::path::PathBuf;
use thiserror::Error;

/// Ledger and import errors.
///
/// Malformed metadata and malformed CSV rows are not errors: they degrade to
/// zero or are skipped. These variants cover failures of a whole store or file.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Ledger database file missing
    #[error("ledger database not found: {}", path.display())]
    DatabaseNotFound {
        /// Path that was expected to hold the database
        path: PathBuf,
    },

    /// CSV export could not be read
    #[error("failed to read {}: {source}", path.display())]
    Csv {
        /// Export path
        path: PathBuf,
        /// Underlying reader error
        #[source]
        source: csv::Error,
    },

    /// CSV export lacks required header columns
    #[error("{} is missing required column(s): {}", path.display(), columns.join(", "))]
    MissingColumns {
        /// Export path
        path: PathBuf,
        /// Column names that were not found in the header row
        columns: Vec<String>,
    },

    /// Unknown provider name
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

impl LedgerError {
    /// Create a CSV error for `path`.
    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    /// Check if this error indicates a database lock.
    pub fn is_database_locked(&self) -> bool {
        match self {
            LedgerError::Database(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
            }
            _ => false,
        }
    }

    /// Create a user-friendly message for this error.
    pub fn friendly_message(&self) -> String {
        match self {
            _ if self.is_database_locked() => {
                "Ledger database is locked by the guard. Please try again.".to_string()
            }
            LedgerError::Database(e) => {
                let msg = e.to_string().to_lowercase();
                if msg.contains("no such table") {
                    "Ledger database has no cap_usage_ledger table. Is this the guard's sidecar database?"
                        .to_string()
                } else {
                    format!("Database error: {}", e)
                }
            }
            LedgerError::DatabaseNotFound { path } => {
                format!("Ledger database not found at {}", path.display())
            }
            LedgerError::MissingColumns { path, columns } => format!(
                "{} does not look like a cost export (missing {})",
                path.display(),
                columns.join(", ")
            ),
            _ => format!("Error: {}", self),
        }
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
