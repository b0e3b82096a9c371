//! Data models for ledger reconciliation.

use serde::{Deserialize, Serialize};
use spendguard_core::ReconciliationWindow;
use spendguard_core::money::microcents_to_usd_string;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Join key between the ledger and provider exports.
///
/// Case-sensitive and compared verbatim: `gpt-5.2-pro` and `GPT-5.2-Pro` are
/// distinct keys. Ordering is lexicographic by provider, then model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregationKey {
    /// Provider tag (e.g., "openai")
    pub provider: String,

    /// Model identifier as reported by the source
    pub model: String,
}

impl AggregationKey {
    /// Create a new key.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl std::fmt::Display for AggregationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Microcent totals keyed by (provider, model), iterated in key order.
pub type MicrocentSums = BTreeMap<AggregationKey, i64>;

/// One row of the guard's usage ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    /// Provider tag
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Timestamp exactly as stored by the guard
    pub created_at: String,

    /// Coarse billed amount in cents. Display only; never used for diffs.
    pub realized_cents: i64,

    /// Realized cost from `billing_breakdown.totals.realized_microcents`,
    /// 0 when the metadata is missing or malformed
    pub realized_microcents: i64,
}

impl LedgerRow {
    /// Aggregation key for this row.
    pub fn key(&self) -> AggregationKey {
        AggregationKey::new(self.provider.clone(), self.model.clone())
    }
}

/// A single provider-reported cost, already converted to microcents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCostRecord {
    /// Provider-qualified model key
    pub key: AggregationKey,

    /// Cost in microcents
    pub cost_microcents: i64,
}

impl ProviderCostRecord {
    /// Create a new record.
    pub fn new(key: AggregationKey, cost_microcents: i64) -> Self {
        Self {
            key,
            cost_microcents,
        }
    }

    /// Add this record to `sums`, summing with any existing total for the key.
    pub fn accumulate_into(self, sums: &mut MicrocentSums) {
        let total = sums.entry(self.key).or_insert(0);
        *total = total.saturating_add(self.cost_microcents);
    }
}

/// A provider export that could not be imported at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    /// Provider tag of the adapter that failed
    pub provider: String,

    /// Export path
    pub path: PathBuf,

    /// Error message
    pub message: String,
}

/// One line of a reconciliation report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationRow {
    /// Provider tag
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Ledger total in microcents
    pub ledger_microcents: i64,

    /// Provider-reported total in microcents
    pub provider_microcents: i64,

    /// `ledger - provider` in microcents
    pub diff_microcents: i64,
}

impl ReconciliationRow {
    /// Build a row from both totals; the diff is derived.
    pub fn new(key: AggregationKey, ledger_microcents: i64, provider_microcents: i64) -> Self {
        Self {
            provider: key.provider,
            model: key.model,
            ledger_microcents,
            provider_microcents,
            diff_microcents: ledger_microcents.saturating_sub(provider_microcents),
        }
    }

    /// Ledger total as a 6-decimal USD string.
    pub fn ledger_usd(&self) -> String {
        microcents_to_usd_string(self.ledger_microcents)
    }

    /// Provider total as a 6-decimal USD string.
    pub fn provider_usd(&self) -> String {
        microcents_to_usd_string(self.provider_microcents)
    }

    /// Difference as a 6-decimal USD string.
    pub fn diff_usd(&self) -> String {
        microcents_to_usd_string(self.diff_microcents)
    }

    /// Whether the two sources disagree.
    pub fn has_drift(&self) -> bool {
        self.diff_microcents != 0
    }

    /// The row as a CSV line `provider,model,ledger_usd,provider_usd,diff_usd`.
    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.provider,
            self.model,
            self.ledger_usd(),
            self.provider_usd(),
            self.diff_usd()
        )
    }
}

/// Result of comparing ledger totals with provider exports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Window the ledger was extracted for, if known
    pub window: Option<ReconciliationWindow>,

    /// Number of ledger rows aggregated
    pub ledger_row_count: usize,

    /// Ledger rows whose metadata degraded to 0 microcents
    pub degraded_row_count: usize,

    /// One row per key present in either source, sorted by (provider, model)
    pub rows: Vec<ReconciliationRow>,

    /// Exports that could not be imported
    pub import_failures: Vec<ImportFailure>,
}
