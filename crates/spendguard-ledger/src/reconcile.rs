//! Reconciliation of ledger totals against provider exports.
//!
//! The ledger side is summed from `realized_microcents`; `realized_cents` is
//! too coarse to expose small drifts and is never used here. Provider sums
//! from all adapters are merged by integer addition, so the merge gives the
//! same result whatever order the adapters finished in.

use crate::models::{
    ImportFailure, LedgerRow, MicrocentSums, ReconciliationReport, ReconciliationRow,
};
use serde_json::{Value, json};
use spendguard_core::ReconciliationWindow;
use spendguard_core::money::microcents_to_usd_string;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Column header of the CSV section of a rendered report.
pub const REPORT_HEADER: &str = "provider,model,ledger_usd,provider_usd,diff_usd";

/// Sum `realized_microcents` per (provider, model).
pub fn aggregate_ledger(rows: &[LedgerRow]) -> MicrocentSums {
    let mut sums = MicrocentSums::new();
    for row in rows {
        let total = sums.entry(row.key()).or_insert(0);
        *total = total.saturating_add(row.realized_microcents);
    }
    sums
}

/// Merge adapter outputs into one map. Colliding keys are summed, never
/// overwritten.
pub fn merge_provider_sums<I>(sources: I) -> MicrocentSums
where
    I: IntoIterator<Item = MicrocentSums>,
{
    let mut merged = MicrocentSums::new();
    for source in sources {
        for (key, microcents) in source {
            let total = merged.entry(key).or_insert(0);
            *total = total.saturating_add(microcents);
        }
    }
    merged
}

/// Compare ledger rows with provider sums.
///
/// Produces exactly one row per key present in either source, sorted by
/// (provider, model). A key missing from one side counts as 0 there. Empty
/// inputs produce an empty report.
pub fn reconcile<I>(ledger_rows: &[LedgerRow], provider_sums: I) -> ReconciliationReport
where
    I: IntoIterator<Item = MicrocentSums>,
{
    let ledger = aggregate_ledger(ledger_rows);
    let provider = merge_provider_sums(provider_sums);

    let keys: BTreeSet<_> = ledger.keys().chain(provider.keys()).cloned().collect();
    let rows: Vec<ReconciliationRow> = keys
        .into_iter()
        .map(|key| {
            let ledger_microcents = ledger.get(&key).copied().unwrap_or(0);
            let provider_microcents = provider.get(&key).copied().unwrap_or(0);
            ReconciliationRow::new(key, ledger_microcents, provider_microcents)
        })
        .collect();

    debug!(
        ledger_keys = ledger.len(),
        provider_keys = provider.len(),
        rows = rows.len(),
        "Reconciled ledger against provider exports"
    );

    ReconciliationReport {
        window: None,
        ledger_row_count: ledger_rows.len(),
        degraded_row_count: 0,
        rows,
        import_failures: Vec::new(),
    }
}

impl ReconciliationReport {
    /// Attach the window the ledger was extracted for.
    pub fn with_window(mut self, window: ReconciliationWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Record how many ledger rows had unusable metadata.
    pub fn with_degraded_rows(mut self, count: usize) -> Self {
        self.degraded_row_count = count;
        self
    }

    /// Attach exports that failed to import.
    pub fn with_import_failures(mut self, failures: Vec<ImportFailure>) -> Self {
        self.import_failures = failures;
        self
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True when any row has a nonzero diff.
    pub fn has_drift(&self) -> bool {
        self.rows.iter().any(ReconciliationRow::has_drift)
    }

    /// Net `ledger - provider` across all rows, in microcents.
    pub fn total_diff_microcents(&self) -> i64 {
        self.rows
            .iter()
            .fold(0i64, |total, row| total.saturating_add(row.diff_microcents))
    }

    /// Header line followed by one CSV line per row.
    pub fn to_csv_lines(&self) -> Vec<String> {
        std::iter::once(REPORT_HEADER.to_string())
            .chain(self.rows.iter().map(ReconciliationRow::to_csv_line))
            .collect()
    }

    /// JSON form with USD strings and raw microcent figures.
    pub fn to_json(&self) -> Value {
        let rows: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                json!({
                    "provider": row.provider,
                    "model": row.model,
                    "ledger_usd": row.ledger_usd(),
                    "provider_usd": row.provider_usd(),
                    "diff_usd": row.diff_usd(),
                    "ledger_microcents": row.ledger_microcents,
                    "provider_microcents": row.provider_microcents,
                    "diff_microcents": row.diff_microcents,
                })
            })
            .collect();

        json!({
            "window": self.window.map(|w| json!({
                "start": w.start_iso(),
                "end": w.end_iso(),
            })),
            "ledger_rows": self.ledger_row_count,
            "degraded_ledger_rows": self.degraded_row_count,
            "has_drift": self.has_drift(),
            "total_diff_usd": microcents_to_usd_string(self.total_diff_microcents()),
            "total_diff_microcents": self.total_diff_microcents(),
            "rows": rows,
            "import_failures": self.import_failures,
        })
    }
}

impl fmt::Display for ReconciliationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(window) = &self.window {
            writeln!(f, "Window UTC: {window}")?;
        }
        writeln!(f, "Ledger rows: {}", self.ledger_row_count)?;
        writeln!(f)?;
        for line in self.to_csv_lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AggregationKey;

    fn ledger_row(provider: &str, model: &str, microcents: i64) -> LedgerRow {
        LedgerRow {
            provider: provider.to_string(),
            model: model.to_string(),
            created_at: "2026-02-10T01:30:00+00:00".to_string(),
            realized_cents: 1,
            realized_microcents: microcents,
        }
    }

    fn sums(entries: &[(&str, &str, i64)]) -> MicrocentSums {
        entries
            .iter()
            .map(|(p, m, v)| (AggregationKey::new(*p, *m), *v))
            .collect()
    }

    #[test]
    fn test_matching_totals_have_zero_diff() {
        let rows = vec![ledger_row("openai", "gpt-5.2-pro", 442_100)];
        let report = reconcile(&rows, vec![sums(&[("openai", "gpt-5.2-pro", 442_100)])]);

        assert_eq!(
            report.to_csv_lines()[1],
            "openai,gpt-5.2-pro,0.004421,0.004421,0.000000"
        );
        assert!(!report.has_drift());
    }

    #[test]
    fn test_missing_provider_side_reports_full_ledger_diff() {
        let rows = vec![ledger_row("anthropic", "claude-x", 1_000_000)];
        let report = reconcile(&rows, Vec::<MicrocentSums>::new());

        assert_eq!(
            report.rows[0].to_csv_line(),
            "anthropic,claude-x,0.010000,0.000000,0.010000"
        );
        assert!(report.has_drift());
    }

    #[test]
    fn test_missing_ledger_side_reports_negative_diff() {
        let report = reconcile(&[], vec![sums(&[("gemini", "gemini-2.5-pro", 250)])]);
        assert_eq!(report.rows[0].diff_usd(), "-0.000003");
        assert_eq!(report.total_diff_microcents(), -250);
    }

    #[test]
    fn test_empty_inputs_give_empty_report() {
        let report = reconcile(&[], Vec::<MicrocentSums>::new());
        assert!(report.is_empty());
        assert_eq!(report.to_csv_lines(), vec![REPORT_HEADER.to_string()]);
    }

    #[test]
    fn test_ledger_uses_microcents_not_cents() {
        let mut row = ledger_row("openai", "gpt-4o", 123);
        row.realized_cents = 99;
        let report = reconcile(&[row], Vec::<MicrocentSums>::new());
        assert_eq!(report.rows[0].ledger_microcents, 123);
    }

    #[test]
    fn test_key_union_is_complete_and_sorted() {
        let rows = vec![
            ledger_row("openai", "gpt-4o", 10),
            ledger_row("anthropic", "claude-x", 20),
            ledger_row("openai", "gpt-4o", 5),
        ];
        let report = reconcile(
            &rows,
            vec![
                sums(&[("openai", "gpt-4o", 15), ("openai", "gpt-5.2-pro", 1)]),
                sums(&[("gemini", "gemini-2.5-pro", 7)]),
            ],
        );

        let keys: Vec<(String, String)> = report
            .rows
            .iter()
            .map(|r| (r.provider.clone(), r.model.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("anthropic".to_string(), "claude-x".to_string()),
                ("gemini".to_string(), "gemini-2.5-pro".to_string()),
                ("openai".to_string(), "gpt-4o".to_string()),
                ("openai".to_string(), "gpt-5.2-pro".to_string()),
            ]
        );
        assert_eq!(report.rows[2].diff_microcents, 0);
        assert_eq!(report.ledger_row_count, 3);
    }

    #[test]
    fn test_merge_sums_colliding_keys_in_any_order() {
        let a = sums(&[("openai", "gpt-4o", 100)]);
        let b = sums(&[("openai", "gpt-4o", 23), ("anthropic", "claude-x", 1)]);

        let forward = merge_provider_sums(vec![a.clone(), b.clone()]);
        let backward = merge_provider_sums(vec![b, a]);

        assert_eq!(forward, backward);
        assert_eq!(forward[&AggregationKey::new("openai", "gpt-4o")], 123);
    }

    #[test]
    fn test_display_includes_window_and_header() {
        let window =
            ReconciliationWindow::parse("2026-02-10T01:00:00Z", "2026-02-10T02:00:00Z").unwrap();
        let report = reconcile(&[ledger_row("openai", "gpt-4o", 100)], Vec::<MicrocentSums>::new())
            .with_window(window);

        let text = report.to_string();
        assert_eq!(
            text,
            "Window UTC: 2026-02-10T01:00:00+00:00 .. 2026-02-10T02:00:00+00:00\n\
             Ledger rows: 1\n\
             \n\
             provider,model,ledger_usd,provider_usd,diff_usd\n\
             openai,gpt-4o,0.000001,0.000000,0.000001\n"
        );
    }

    #[test]
    fn test_json_output() {
        let report = reconcile(
            &[ledger_row("openai", "gpt-4o", 442_100)],
            vec![sums(&[("openai", "gpt-4o", 342_100)])],
        )
        .with_degraded_rows(2);

        let value = report.to_json();
        assert_eq!(value["ledger_rows"], 1);
        assert_eq!(value["degraded_ledger_rows"], 2);
        assert_eq!(value["has_drift"], true);
        assert_eq!(value["rows"][0]["diff_usd"], "0.001000");
        assert_eq!(value["rows"][0]["diff_microcents"], 100_000);
        assert_eq!(value["total_diff_usd"], "0.001000");
        assert_eq!(value["total_diff_microcents"], 100_000);
        assert!(value["window"].is_null());
    }

    #[test]
    fn test_totals_saturate_instead_of_overflowing() {
        let rows = vec![
            ledger_row("openai", "gpt-4o", i64::MAX),
            ledger_row("openai", "gpt-4o", 1),
        ];
        let report = reconcile(
            &rows,
            vec![
                sums(&[("openai", "gpt-4o", i64::MIN), ("gemini", "big", i64::MAX)]),
                sums(&[("gemini", "big", i64::MAX)]),
            ],
        );

        let gemini = &report.rows[0];
        assert_eq!(gemini.provider_microcents, i64::MAX);
        assert_eq!(gemini.diff_microcents, -i64::MAX);

        let openai = &report.rows[1];
        assert_eq!(openai.ledger_microcents, i64::MAX);
        assert_eq!(openai.provider_microcents, i64::MIN);
        assert_eq!(openai.diff_microcents, i64::MAX);

        assert_eq!(report.total_diff_microcents(), 0);
        assert!(report.to_json()["total_diff_usd"].is_string());
    }
}
