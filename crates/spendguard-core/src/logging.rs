//! Logging infrastructure for the SpendGuard audit tooling.
//!
//! Structured logging using the `tracing` ecosystem. Diagnostics go to the
//! log file and stderr; reports and identifiers printed by the CLI go to stdout
//! and never pass through the logger.
//!
//! ## Features
//!
//! - JSON lines format for machine parsing
//! - File output to `~/.spendguard/logs/spendguard-audit.log`
//! - Console output with configurable verbosity
//! - `-v` flag support for verbose logging
//!
//! ## Example
//!
//! ```no_run
//! use spendguard_core::logging;
//!
//! let _guard = logging::init_logging(None, false).expect("logging init");
//!
//! tracing::info!("reconciliation started");
//! tracing::debug!(provider = "openai", "importing export");
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{AuditError, Result};

/// File name of the rolling log.
pub const LOG_FILE_NAME: &str = "spendguard-audit.log";

/// Guard that must be held to ensure log flushing on shutdown.
///
/// Keep this guard alive for the lifetime of the application.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the logging system.
///
/// This sets up:
/// - File logging under `log_dir` (JSON lines format, rotated daily)
/// - Console logging to stderr (human-readable format)
///
/// # Arguments
///
/// * `log_dir` - Optional custom log directory. Defaults to `~/.spendguard/logs/`
/// * `verbose` - If true, sets log level to DEBUG. Otherwise uses INFO.
///
/// `RUST_LOG` overrides the level when set.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir).map_err(|e| AuditError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("spendguard={default_level}")));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Initialize minimal console-only logging for tests.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Get the default log directory path.
///
/// Returns `~/.spendguard/logs/`
pub fn default_log_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| AuditError::Internal {
        message: "could not determine home directory".into(),
    })?;

    Ok(home.join(".spendguard").join("logs"))
}

/// Log one transition of the provisioning workflow.
///
/// # Example
///
/// ```ignore
/// log_workflow_step!("agent_created", agent_id = %agent_id);
/// ```
#[macro_export]
macro_rules! log_workflow_step {
    ($step:expr) => {
        tracing::info!(
            target: "spendguard::workflow",
            step = $step,
            "workflow step"
        )
    };
    ($step:expr, $($field:tt)*) => {
        tracing::info!(
            target: "spendguard::workflow",
            step = $step,
            $($field)*,
            "workflow step"
        )
    };
}
