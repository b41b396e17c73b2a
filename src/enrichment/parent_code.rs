//! Budget item code copied onto delivery lines.

use super::{EnrichmentContext, EnrichmentJob};
use crate::dataset::Dataset;
use crate::error::{EtlError, Result};
use crate::transform::join::{gather, match_rows, LookupIndex};

/// Copies a budget item's code onto the delivery lines that reference it
/// (`lines.paride = items.ide`), as `codigo_partida`.
#[derive(Debug, Clone)]
pub struct ParentCode {
    pub lines: String,
    pub items: String,
}

impl Default for ParentCode {
    fn default() -> Self {
        Self {
            lines: "dcapro".to_string(),
            items: "obrparpar".to_string(),
        }
    }
}

impl ParentCode {
    pub fn enrich(&self, mut lines: Dataset, items: &Dataset) -> Result<Dataset> {
        let index = LookupIndex::build(items, &["ide"]);
        let codes = gather(items, "cod", &match_rows(&lines, &["paride"], &index));
        lines
            .set_column("codigo_partida", codes)
            .map_err(|e| EtlError::enrichment(self.name(), e.to_string()))?;
        Ok(lines)
    }
}

impl EnrichmentJob for ParentCode {
    fn name(&self) -> &str {
        "parent-code"
    }

    fn run(&self, context: &EnrichmentContext<'_>) -> Result<usize> {
        let lines = context.read_required(self.name(), &self.lines, &["paride"])?;
        let items = context.read_required(self.name(), &self.items, &["ide", "cod"])?;

        let enriched = self.enrich(lines, &items)?;
        context.replace(&self.lines, &enriched)?;
        Ok(enriched.row_count())
    }
}
