//! Post-load check that literal directive rows made it into a target.

use crate::error::{EtlError, Result};
use crate::store::sql::count_matching;
use crate::store::Sink;
use crate::transform::rows::RowLiteral;
use tracing::{info, warn};

/// Rows of `rows` with no exact match in `target`.
///
/// Runs one `SELECT COUNT(*)` per row through [`Sink::raw_query`], so it
/// needs a SQL-capable sink.
pub fn verify_inserted_rows(
    sink: &dyn Sink,
    target: &str,
    rows: &[RowLiteral],
) -> Result<Vec<RowLiteral>> {
    let mut missing = Vec::new();
    for row in rows {
        let result = sink
            .raw_query(&count_matching(target, row))
            .map_err(|e| EtlError::sink_write(target, e))?;
        let matches = result
            .first()
            .and_then(|record| record.get("matches"))
            .and_then(|value| value.as_i64())
            .unwrap_or(0);
        if matches == 0 {
            warn!(target_table = target, row = ?row, "directive row not found");
            missing.push(row.clone());
        }
    }
    info!(
        target_table = target,
        checked = rows.len(),
        missing = missing.len(),
        "directive rows verified"
    );
    Ok(missing)
}
