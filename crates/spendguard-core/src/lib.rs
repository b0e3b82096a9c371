//! # spendguard-core
//!
//! Core types, errors, and utilities shared by the SpendGuard audit tooling.
//!
//! This crate provides:
//! - [`AuditError`] - Error type for configuration, paths and time windows
//! - [`logging`] - Tracing setup and log file management
//! - [`money`] - Lossless conversion between USD, cents and microcents
//! - [`types`] - The [`ReconciliationWindow`] shared by traffic and reconciliation
//!
//! ## Example
//!
//! ```no_run
//! use spendguard_core::{logging, money, ReconciliationWindow};
//!
//! fn main() -> spendguard_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!
//!     let window = ReconciliationWindow::parse(
//!         "2026-02-10T01:00:00Z",
//!         "2026-02-10T02:00:00Z",
//!     )?;
//!     tracing::info!(%window, "reconciling");
//!
//!     let microcents = money::usd_to_microcents(0.003421);
//!     assert_eq!(money::microcents_to_usd_string(microcents), "0.003421");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod money;
pub mod types;

// Re-export main types for convenience
pub use error::{AuditError, Result};
pub use logging::{LogGuard, init_logging};
pub use types::{ReconciliationWindow, parse_iso_utc};
