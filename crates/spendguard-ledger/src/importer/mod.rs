//! Provider cost importers.
//!
//! Each provider ships its own adapter that turns a CSV cost export into
//! `(provider, model) → microcents` sums. The adapters are deliberately
//! independent: they share the [`ProviderCostImporter`] contract but not their
//! parsing code, so one provider's export format can change without touching
//! the others.
//!
//! ## Contract
//!
//! - The header row must contain the adapter's model and cost columns; other
//!   columns are ignored.
//! - Rows with an empty model or cost are skipped.
//! - Rows with an unparsable cost, or that the reader cannot decode, are
//!   skipped with a warning.
//! - Every row is converted to microcents individually and summed as integers.

mod anthropic;
mod gemini;
mod openai;

pub use anthropic::AnthropicCsvImporter;
pub use gemini::GeminiCsvImporter;
pub use openai::OpenAiCsvImporter;

use crate::error::{LedgerError, Result};
use crate::models::{AggregationKey, ImportFailure, MicrocentSums};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Imports one provider's cost export.
pub trait ProviderCostImporter {
    /// Provider tag attached to every key this importer produces.
    fn provider(&self) -> &'static str;

    /// Read the export at `path` into per-model microcent sums.
    fn import(&self, path: &Path) -> Result<MicrocentSums>;
}

/// Providers with a cost-export adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI usage/cost export
    OpenAi,
    /// Anthropic console cost export
    Anthropic,
    /// Google Gemini billing export
    Gemini,
}

impl ProviderKind {
    /// All providers, in import order.
    pub const ALL: [ProviderKind; 3] = [Self::OpenAi, Self::Anthropic, Self::Gemini];

    /// Provider tag as it appears in the ledger.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }

    /// The adapter for this provider.
    pub fn importer(&self) -> Box<dyn ProviderCostImporter> {
        match self {
            Self::OpenAi => Box::new(OpenAiCsvImporter::new()),
            Self::Anthropic => Box::new(AnthropicCsvImporter::new()),
            Self::Gemini => Box::new(GeminiCsvImporter::new()),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(LedgerError::UnknownProvider(other.to_string())),
        }
    }
}

/// Parse a `cost_usd` cell. Only finite numbers are accepted.
pub(crate) fn parse_cost_usd(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|usd| usd.is_finite())
}

/// Outcome of importing several exports: one sum map per successful file and
/// one failure per file that could not be read.
#[derive(Debug, Default)]
pub struct ImportBatch {
    /// Per-adapter sums, in import order
    pub sums: Vec<MicrocentSums>,

    /// Exports that failed as a whole
    pub failures: Vec<ImportFailure>,
}

impl ImportBatch {
    /// Drop every imported key for which `keep` returns false.
    pub fn retain_keys<F>(&mut self, mut keep: F)
    where
        F: FnMut(&AggregationKey) -> bool,
    {
        for sums in &mut self.sums {
            sums.retain(|key, _| keep(key));
        }
    }
}

/// Import every `(provider, path)` pair. A file that fails is recorded and the
/// remaining files are still imported.
pub fn import_all<I>(exports: I) -> ImportBatch
where
    I: IntoIterator<Item = (ProviderKind, PathBuf)>,
{
    let mut batch = ImportBatch::default();

    for (kind, path) in exports {
        let importer = kind.importer();
        match importer.import(&path) {
            Ok(sums) => {
                info!(
                    provider = importer.provider(),
                    path = %path.display(),
                    models = sums.len(),
                    "Imported provider export"
                );
                batch.sums.push(sums);
            }
            Err(e) => {
                warn!(
                    provider = importer.provider(),
                    path = %path.display(),
                    error = %e,
                    "Provider export could not be imported"
                );
                batch.failures.push(ImportFailure {
                    provider: importer.provider().to_string(),
                    path,
                    message: e.to_string(),
                });
            }
        }
    }

    batch
}
