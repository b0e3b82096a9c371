//! OpenAI usage/cost export adapter.

use crate::error::{LedgerError, Result};
use crate::importer::{ProviderCostImporter, parse_cost_usd};
use crate::models::{AggregationKey, MicrocentSums, ProviderCostRecord};
use spendguard_core::money::usd_to_microcents;
use std::path::Path;
use tracing::{debug, trace, warn};

const PROVIDER: &str = "openai";
const MODEL_COLUMN: &str = "model";
const COST_COLUMN: &str = "cost_usd";

/// Reads OpenAI cost exports with `model` and `cost_usd` columns.
#[derive(Debug, Clone, Default)]
pub struct OpenAiCsvImporter;

impl OpenAiCsvImporter {
    /// Create a new importer.
    pub fn new() -> Self {
        Self
    }
}

impl ProviderCostImporter for OpenAiCsvImporter {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn import(&self, path: &Path) -> Result<MicrocentSums> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| LedgerError::csv(path, e))?;

        let headers = reader.headers().map_err(|e| LedgerError::csv(path, e))?;
        let model_idx = headers.iter().position(|h| h == MODEL_COLUMN);
        let cost_idx = headers.iter().position(|h| h == COST_COLUMN);
        let (Some(model_idx), Some(cost_idx)) = (model_idx, cost_idx) else {
            let columns = [(MODEL_COLUMN, model_idx), (COST_COLUMN, cost_idx)]
                .into_iter()
                .filter(|(_, idx)| idx.is_none())
                .map(|(name, _)| name.to_string())
                .collect();
            return Err(LedgerError::MissingColumns {
                path: path.to_path_buf(),
                columns,
            });
        };

        let mut sums = MicrocentSums::new();
        for (index, record) in reader.records().enumerate() {
            // Header is line 1
            let line = index + 2;
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!(provider = PROVIDER, line, error = %e, "Skipping unreadable export row");
                    continue;
                }
            };

            let model = record.get(model_idx).unwrap_or_default();
            let cost = record.get(cost_idx).unwrap_or_default();
            if model.is_empty() || cost.is_empty() {
                trace!(provider = PROVIDER, line, "Skipping row without model or cost");
                continue;
            }

            let Some(usd) = parse_cost_usd(cost) else {
                warn!(provider = PROVIDER, line, cost, "Skipping row with unparsable cost_usd");
                continue;
            };

            ProviderCostRecord::new(AggregationKey::new(PROVIDER, model), usd_to_microcents(usd))
                .accumulate_into(&mut sums);
        }

        debug!(provider = PROVIDER, path = %path.display(), models = sums.len(), "Parsed export");
        Ok(sums)
    }
}
