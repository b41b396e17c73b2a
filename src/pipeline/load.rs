//! Appends reshaped entities to the sink, creating missing targets first.

use crate::dataset::Dataset;
use crate::error::{EtlError, Result};
use crate::store::{infer_schema, InsertMode, Sink};
use tracing::{error, info};

/// Appends reshaped datasets to their targets.
///
/// No upsert and no de-duplication: loading the same dataset twice into a
/// table with a primary key fails on the second run.
pub struct Loader<'a> {
    sink: &'a dyn Sink,
}

impl<'a> Loader<'a> {
    pub fn new(sink: &'a dyn Sink) -> Self {
        Self { sink }
    }

    /// Create `target` from the inferred schema if needed, then append every row.
    pub fn load(&self, target: &str, dataset: &Dataset, primary_key: Option<&str>) -> Result<usize> {
        self.write(target, dataset, primary_key).map_err(|e| {
            error!(target_table = target, error = %e, "load failed");
            e
        })
    }

    fn write(&self, target: &str, dataset: &Dataset, primary_key: Option<&str>) -> Result<usize> {
        let exists = self
            .sink
            .exists(target)
            .map_err(|e| EtlError::sink_write(target, e))?;
        if !exists {
            let primary_key = primary_key.filter(|pk| dataset.has_column(pk));
            self.sink
                .create(target, &infer_schema(dataset), primary_key)
                .map_err(|e| EtlError::sink_write(target, e))?;
            info!(target_table = target, "created");
        }
        if dataset.is_empty() {
            return Ok(0);
        }
        let rows = self
            .sink
            .insert(dataset, target, InsertMode::Append)
            .map_err(|e| EtlError::sink_write(target, e))?;
        info!(target_table = target, rows, "loaded");
        Ok(rows)
    }
}
