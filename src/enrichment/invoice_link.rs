//! Delivery note to invoice line linking.

use super::{require_input, EnrichmentContext, EnrichmentJob};
use crate::dataset::{Dataset, Value};
use crate::error::{EtlError, Result};
use crate::transform::join::{gather, match_rows, LookupIndex};

/// Links each delivery note to the invoice line that references it.
///
/// Adds `ide_factura` (the line id) and `tiene_factura`. When several lines
/// point at the same delivery the one with the lowest id wins.
#[derive(Debug, Clone)]
pub struct InvoiceLink {
    pub deliveries: String,
    pub invoice_lines: String,
}

impl Default for InvoiceLink {
    fn default() -> Self {
        Self {
            deliveries: "dca".to_string(),
            invoice_lines: "dcfpro".to_string(),
        }
    }
}

impl InvoiceLink {
    /// Derive the two columns; existing copies are overwritten.
    pub fn link(&self, mut deliveries: Dataset, lines: &Dataset) -> Result<Dataset> {
        let mut order: Vec<usize> = (0..lines.row_count()).collect();
        order.sort_by(|&a, &b| {
            lines
                .value(a, "docoriide")
                .sort_cmp(lines.value(b, "docoriide"))
                .then_with(|| lines.value(a, "ide").sort_cmp(lines.value(b, "ide")))
        });
        let index = LookupIndex::build_over(lines, &["docoriide"], &order);

        let matches = match_rows(&deliveries, &["ide"], &index);
        let invoice_ids = gather(lines, "ide", &matches);
        let has_invoice: Vec<Value> = invoice_ids
            .iter()
            .map(|id| Value::Bool(!id.is_empty_reference()))
            .collect();

        deliveries
            .set_column("ide_factura", invoice_ids)
            .and_then(|_| deliveries.set_column("tiene_factura", has_invoice))
            .map_err(|e| EtlError::enrichment(self.name(), e.to_string()))?;
        Ok(deliveries)
    }
}

impl EnrichmentJob for InvoiceLink {
    fn name(&self) -> &str {
        "invoice-link"
    }

    fn run(&self, context: &EnrichmentContext<'_>) -> Result<usize> {
        let deliveries = context.read_required(self.name(), &self.deliveries, &["ide"])?;
        let lines = context.read_or_empty(self.name(), &self.invoice_lines)?;
        require_input(
            self.name(),
            &context.target(&self.invoice_lines),
            &lines,
            &["docoriide", "ide"],
        )?;

        let linked = self.link(deliveries, &lines)?;
        context.replace(&self.deliveries, &linked)?;
        Ok(linked.row_count())
    }
}
