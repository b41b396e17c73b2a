//! Dataset-to-dataset reshaping steps.
//!
//! Every step implements [`Transformation`]: it takes a [`Dataset`] by value and
//! returns the reshaped dataset. Steps are assembled into pipelines by
//! [`crate::pipeline::PipelineBuilder`].
//!
//! Two missing-column policies exist. Date normalization, column combination
//! and pruning log a warning and skip. Every other step fails with
//! [`TransformError::Schema`] naming the column.

pub mod columns;
pub mod custom;
pub mod dates;
pub mod join;
pub mod rows;
pub mod sanitize;

use crate::dataset::{Dataset, DatasetError};
use thiserror::Error;

pub use columns::{CombineColumns, PruneEmptyColumns, RenameColumns, SortColumns};
pub use custom::{CompositeKey, DropOrphanDeliveries, ExecutionMonths, FirstOriginCode, SuffixJoin};
pub use dates::NormalizeDates;
pub use join::{LookupIndex, ReferenceJoin};
pub use rows::{DeleteRows, InsertRows};
pub use sanitize::StripNulChars;

/// Error type for transformation steps
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("{step}: missing column '{column}'")]
    Schema { step: String, column: String },

    #[error("{step}: column '{column}' already exists")]
    ColumnCollision { step: String, column: String },

    #[error("{step}: {source}")]
    Shape {
        step: String,
        #[source]
        source: DatasetError,
    },
}

impl TransformError {
    pub fn missing(step: &str, column: &str) -> Self {
        TransformError::Schema {
            step: step.to_string(),
            column: column.to_string(),
        }
    }

    pub fn collision(step: &str, column: &str) -> Self {
        TransformError::ColumnCollision {
            step: step.to_string(),
            column: column.to_string(),
        }
    }

    pub fn shape(step: &str, source: DatasetError) -> Self {
        TransformError::Shape {
            step: step.to_string(),
            source,
        }
    }
}

/// One reshaping step.
///
/// Implementations must accept datasets with zero rows and must keep all
/// columns the same length.
pub trait Transformation: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Reshape `dataset`, consuming it.
    fn transform(&self, dataset: Dataset) -> Result<Dataset, TransformError>;
}

/// Fail with a schema error naming the first absent column.
pub(crate) fn require_columns(
    dataset: &Dataset,
    step: &str,
    columns: &[&str],
) -> Result<(), TransformError> {
    match dataset.first_missing(columns) {
        Some(column) => Err(TransformError::missing(step, column)),
        None => Ok(()),
    }
}
