//! # spendguard-ledger
//!
//! Billing reconciliation between the SpendGuard usage ledger and provider
//! cost exports.
//!
//! This crate provides:
//! - [`LedgerStore`] - Read-only extraction of ledger rows for a time window
//! - [`ProviderCostImporter`] - One CSV adapter per provider (OpenAI, Anthropic, Gemini)
//! - [`reconcile`] - Merge both sources into a sorted, per-model diff report
//!
//! ## Example
//!
//! ```no_run
//! use spendguard_core::ReconciliationWindow;
//! use spendguard_ledger::{LedgerStore, ProviderKind, import_all, reconcile};
//!
//! fn main() -> anyhow::Result<()> {
//!     let window = ReconciliationWindow::parse("2026-02-10T01:00:00Z", "2026-02-10T02:00:00Z")?;
//!     let rows = LedgerStore::new("cynsta-spendguard.db").extract(&window)?;
//!
//!     let batch = import_all([(ProviderKind::OpenAi, "openai-export.csv".into())]);
//!     let report = reconcile(&rows, batch.sums)
//!         .with_window(window)
//!         .with_import_failures(batch.failures);
//!
//!     print!("{report}");
//!     Ok(())
//! }
//! ```

pub mod db;
pub mod error;
pub mod importer;
pub mod models;
pub mod reconcile;

pub use db::{LEDGER_TABLE, LedgerExtract, LedgerQuery, LedgerStore};
pub use error::{LedgerError, Result};
pub use importer::{
    AnthropicCsvImporter, GeminiCsvImporter, ImportBatch, OpenAiCsvImporter, ProviderCostImporter,
    ProviderKind, import_all,
};
pub use models::{
    AggregationKey, ImportFailure, LedgerRow, MicrocentSums, ProviderCostRecord,
    ReconciliationReport, ReconciliationRow,
};
pub use reconcile::{REPORT_HEADER, aggregate_ledger, merge_provider_sums, reconcile};
