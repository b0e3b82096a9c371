//! Read-only access to the guard's SQLite usage ledger.

use crate::error::{LedgerError, Result};
use crate::models::{AggregationKey, LedgerRow};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, params_from_iter};
use serde_json::Value;
use spendguard_core::ReconciliationWindow;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Table the guard writes realized usage to.
pub const LEDGER_TABLE: &str = "cap_usage_ledger";

/// How long to wait on a lock held by the guard before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Ledger query: a time window plus optional provider/model filters.
#[derive(Debug, Clone)]
pub struct LedgerQuery {
    window: ReconciliationWindow,
    provider: Option<String>,
    model: Option<String>,
}

impl LedgerQuery {
    /// Query every row in `window`.
    pub fn new(window: ReconciliationWindow) -> Self {
        Self {
            window,
            provider: None,
            model: None,
        }
    }

    /// Only return rows for this provider.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Only return rows for this model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// The queried window.
    pub fn window(&self) -> &ReconciliationWindow {
        &self.window
    }

    /// Whether a (provider, model) key passes the provider and model filters.
    ///
    /// Applied to provider export sums so both sides of a reconciliation are
    /// narrowed the same way.
    pub fn matches(&self, key: &AggregationKey) -> bool {
        self.provider.as_deref().is_none_or(|p| p == key.provider)
            && self.model.as_deref().is_none_or(|m| m == key.model)
    }

    /// SQL text and bound parameters for this query.
    fn to_sql(&self) -> (String, Vec<String>) {
        let mut sql = format!(
            "SELECT provider, model, created_at, realized_cents, meta_json
             FROM {LEDGER_TABLE}
             WHERE created_at >= ?1 AND created_at <= ?2"
        );
        let mut params = vec![self.window.start_iso(), self.window.end_iso()];

        if let Some(provider) = &self.provider {
            params.push(provider.clone());
            sql.push_str(&format!(" AND provider = ?{}", params.len()));
        }
        if let Some(model) = &self.model {
            params.push(model.clone());
            sql.push_str(&format!(" AND model = ?{}", params.len()));
        }

        (sql, params)
    }
}

/// Rows returned by one extraction plus how many had unusable metadata.
#[derive(Debug, Clone, Default)]
pub struct LedgerExtract {
    /// Extracted rows, in no particular order
    pub rows: Vec<LedgerRow>,

    /// Rows whose `realized_microcents` degraded to 0
    pub degraded_rows: usize,
}

/// Handle on the guard's ledger database.
///
/// Holds only the path: each extraction opens its own read-only connection and
/// drops it before returning, on success and on error alike.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    /// Create a store handle for the database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extract every row in `window` (inclusive on both bounds).
    pub fn extract(&self, window: &ReconciliationWindow) -> Result<Vec<LedgerRow>> {
        Ok(self.extract_with_stats(&LedgerQuery::new(*window))?.rows)
    }

    /// Extract rows matching `query`, counting rows with degraded metadata.
    ///
    /// `created_at` is compared as a string against the window bounds rendered
    /// as `YYYY-MM-DDTHH:MM:SS[.ffffff]+00:00`, the format the guard writes.
    pub fn extract_with_stats(&self, query: &LedgerQuery) -> Result<LedgerExtract> {
        let conn = self.connect()?;
        let (sql, params) = query.to_sql();

        debug!(
            path = %self.path.display(),
            window = %query.window(),
            "Extracting ledger rows"
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        let mut extract = LedgerExtract::default();
        while let Some(row) = rows.next()? {
            let created_at: String = row.get(2)?;
            let realized_microcents = match realized_microcents_from_meta(row.get_ref(4)?) {
                Some(value) => value,
                None => {
                    warn!(
                        created_at = %created_at,
                        "Ledger row metadata lacks billing_breakdown.totals.realized_microcents; using 0"
                    );
                    extract.degraded_rows += 1;
                    0
                }
            };

            extract.rows.push(LedgerRow {
                provider: row.get(0)?,
                model: row.get(1)?,
                created_at,
                realized_cents: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                realized_microcents,
            });
        }

        debug!(
            count = extract.rows.len(),
            degraded = extract.degraded_rows,
            "Ledger extraction complete"
        );

        Ok(extract)
    }

    fn connect(&self) -> Result<Connection> {
        if !self.path.is_file() {
            return Err(LedgerError::DatabaseNotFound {
                path: self.path.clone(),
            });
        }

        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }
}

/// Pull `billing_breakdown.totals.realized_microcents` out of a `meta_json`
/// column value.
///
/// Returns `None` for anything unusable: SQL `NULL`, non-text, invalid JSON,
/// missing nested fields, or a value that is not an integer. An integer-valued
/// float or a numeric string is accepted.
pub fn realized_microcents_from_meta(meta: ValueRef<'_>) -> Option<i64> {
    let text = match meta {
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => std::str::from_utf8(bytes).ok()?,
        _ => return None,
    };

    let meta: Value = serde_json::from_str(text).ok()?;
    let value = meta
        .get("billing_breakdown")?
        .get("totals")?
        .get("realized_microcents")?;

    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> ValueRef<'_> {
        ValueRef::Text(s.as_bytes())
    }

    fn query() -> LedgerQuery {
        LedgerQuery::new(
            ReconciliationWindow::parse("2026-02-10T01:00:00Z", "2026-02-10T02:00:00Z").unwrap(),
        )
    }

    #[test]
    fn test_query_matches_filters() {
        let gpt4o = AggregationKey::new("openai", "gpt-4o");
        let pro = AggregationKey::new("openai", "gpt-5.2-pro");
        let claude = AggregationKey::new("anthropic", "gpt-5.2-pro");

        assert!(query().matches(&gpt4o));
        assert!(query().matches(&claude));

        let openai = query().with_provider("openai");
        assert!(openai.matches(&gpt4o));
        assert!(!openai.matches(&claude));

        let openai_pro = openai.with_model("gpt-5.2-pro");
        assert!(openai_pro.matches(&pro));
        assert!(!openai_pro.matches(&gpt4o));
        assert!(!openai_pro.matches(&claude));
    }

    #[test]
    fn test_sql_bounds_use_ledger_timestamp_layout() {
        let window = ReconciliationWindow::parse(
            "2026-02-10T01:00:00Z",
            "2026-02-10T01:02:03.5Z",
        )
        .unwrap();
        let (sql, params) = LedgerQuery::new(window).with_model("gpt-4o").to_sql();
        assert_eq!(
            params,
            vec![
                "2026-02-10T01:00:00+00:00".to_string(),
                "2026-02-10T01:02:03.500000+00:00".to_string(),
                "gpt-4o".to_string(),
            ]
        );
        assert!(sql.ends_with("AND model = ?3"));
    }

    #[test]
    fn test_meta_integer() {
        let meta = r#"{"billing_breakdown":{"totals":{"realized_microcents":442100}}}"#;
        assert_eq!(realized_microcents_from_meta(text(meta)), Some(442_100));
    }

    #[test]
    fn test_meta_integer_valued_float_and_string() {
        let meta = r#"{"billing_breakdown":{"totals":{"realized_microcents":1000.0}}}"#;
        assert_eq!(realized_microcents_from_meta(text(meta)), Some(1000));

        let meta = r#"{"billing_breakdown":{"totals":{"realized_microcents":"2500"}}}"#;
        assert_eq!(realized_microcents_from_meta(text(meta)), Some(2500));
    }

    #[test]
    fn test_meta_degrades() {
        let cases = [
            "not json",
            "[]",
            "{}",
            r#"{"billing_breakdown":null}"#,
            r#"{"billing_breakdown":{"totals":{}}}"#,
            r#"{"billing_breakdown":{"totals":{"realized_microcents":null}}}"#,
            r#"{"billing_breakdown":{"totals":{"realized_microcents":1.5}}}"#,
            r#"{"billing_breakdown":{"totals":{"realized_microcents":"lots"}}}"#,
        ];
        for meta in cases {
            assert_eq!(realized_microcents_from_meta(text(meta)), None, "{meta}");
        }
        assert_eq!(realized_microcents_from_meta(ValueRef::Null), None);
        assert_eq!(realized_microcents_from_meta(ValueRef::Integer(5)), None);
    }

    #[test]
    fn test_meta_blob_is_read_as_utf8() {
        let meta = br#"{"billing_breakdown":{"totals":{"realized_microcents":7}}}"#;
        assert_eq!(realized_microcents_from_meta(ValueRef::Blob(meta)), Some(7));
    }

    #[test]
    fn test_query_sql_with_filters() {
        let window =
            ReconciliationWindow::parse("2026-02-10T01:00:00Z", "2026-02-10T02:00:00Z").unwrap();
        let (sql, params) = LedgerQuery::new(window)
            .with_provider("openai")
            .with_model("gpt-5.2-pro")
            .to_sql();
        assert!(sql.contains("provider = ?3"));
        assert!(sql.contains("model = ?4"));
        assert_eq!(
            params,
            vec![
                "2026-02-10T01:00:00+00:00".to_string(),
                "2026-02-10T02:00:00+00:00".to_string(),
                "openai".to_string(),
                "gpt-5.2-pro".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_database_file() {
        let store = LedgerStore::new("/nonexistent/spendguard.db");
        let window =
            ReconciliationWindow::parse("2026-02-10T01:00:00Z", "2026-02-10T02:00:00Z").unwrap();
        let err = store.extract(&window).unwrap_err();
        assert!(matches!(err, LedgerError::DatabaseNotFound { .. }));
    }
}
