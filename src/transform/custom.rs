//! Entity-specific steps.
//!
//! These run after the generic steps, on renamed and alphabetized columns.
//! They are wired to entity keys in [`crate::step_registry`].

use super::join::{gather, match_rows, LookupIndex};
use super::{require_columns, TransformError, Transformation};
use crate::calendar::whole_months_between;
use crate::dataset::{Dataset, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Whole months between two date columns, e.g. a project's planned duration.
#[derive(Debug, Clone)]
pub struct ExecutionMonths {
    start: String,
    end: String,
    output: String,
}

impl ExecutionMonths {
    pub fn new(start: impl Into<String>, end: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            output: output.into(),
        }
    }
}

impl Transformation for ExecutionMonths {
    fn name(&self) -> &str {
        "execution_months"
    }

    fn transform(&self, mut dataset: Dataset) -> Result<Dataset, TransformError> {
        if dataset.first_missing(&[self.start.as_str(), self.end.as_str()]).is_some() {
            warn!(start = %self.start, end = %self.end, "date columns not present, skipping");
            return Ok(dataset);
        }
        let months = (0..dataset.row_count())
            .map(|row| {
                let start = dataset.value(row, &self.start).as_date();
                let end = dataset.value(row, &self.end).as_date();
                match (start, end) {
                    (Some(s), Some(e)) => Value::Int(whole_months_between(s, e)),
                    _ => Value::Null,
                }
            })
            .collect();
        dataset
            .set_column(self.output.clone(), months)
            .map_err(|e| TransformError::shape(self.name(), e))?;
        Ok(dataset)
    }
}

/// `"<left>_<right>"` text key, null when either part is null.
#[derive(Debug, Clone)]
pub struct CompositeKey {
    left: String,
    right: String,
    output: String,
}

impl CompositeKey {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
            output: "composite_key".to_string(),
        }
    }
}

impl Transformation for CompositeKey {
    fn name(&self) -> &str {
        "composite_key"
    }

    fn transform(&self, mut dataset: Dataset) -> Result<Dataset, TransformError> {
        if dataset.first_missing(&[self.left.as_str(), self.right.as_str()]).is_some() {
            warn!(left = %self.left, right = %self.right, "key columns not present, skipping");
            return Ok(dataset);
        }
        let keys = (0..dataset.row_count())
            .map(|row| {
                let left = dataset.value(row, &self.left);
                let right = dataset.value(row, &self.right);
                if left.is_null() || right.is_null() {
                    Value::Null
                } else {
                    Value::Text(format!("{}_{}", left, right))
                }
            })
            .collect();
        dataset
            .set_column(self.output.clone(), keys)
            .map_err(|e| TransformError::shape(self.name(), e))?;
        Ok(dataset)
    }
}

/// Drop delivery notes that reference neither a contract, a supplier nor a project.
#[derive(Debug, Clone)]
pub struct DropOrphanDeliveries {
    columns: Vec<String>,
}

impl Default for DropOrphanDeliveries {
    fn default() -> Self {
        Self {
            columns: vec!["ctride".into(), "entide".into(), "obride".into()],
        }
    }
}

impl Transformation for DropOrphanDeliveries {
    fn name(&self) -> &str {
        "drop_orphan_deliveries"
    }

    fn transform(&self, mut dataset: Dataset) -> Result<Dataset, TransformError> {
        let columns: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        require_columns(&dataset, self.name(), &columns)?;

        let keep: Vec<bool> = (0..dataset.row_count())
            .map(|row| {
                !columns
                    .iter()
                    .all(|c| dataset.value(row, c).is_empty_reference())
            })
            .collect();
        let before = dataset.row_count();
        dataset.retain_rows(&keep);
        info!(deleted = before - dataset.row_count(), "orphan deliveries removed");
        Ok(dataset)
    }
}

/// Copy the first non-null origin code of an invoice's lines onto the invoice.
#[derive(Debug, Clone)]
pub struct FirstOriginCode {
    lines: Arc<Dataset>,
    index: LookupIndex,
}

impl FirstOriginCode {
    const ID: &'static str = "ide";
    const LINE_PARENT: &'static str = "docide";
    const LINE_CODE: &'static str = "docoricod";
    const OUTPUT: &'static str = "docoricod_dcfpro";

    pub fn new(lines: Arc<Dataset>) -> Self {
        let with_code: Vec<usize> = (0..lines.row_count())
            .filter(|&row| !lines.value(row, Self::LINE_CODE).is_null())
            .collect();
        let index = LookupIndex::build_over(&lines, &[Self::LINE_PARENT], &with_code);
        Self { lines, index }
    }
}

impl Transformation for FirstOriginCode {
    fn name(&self) -> &str {
        "first_origin_code"
    }

    fn transform(&self, mut dataset: Dataset) -> Result<Dataset, TransformError> {
        require_columns(&dataset, self.name(), &[Self::ID])?;
        require_columns(&self.lines, self.name(), &[Self::LINE_PARENT, Self::LINE_CODE])?;

        let matches = match_rows(&dataset, &[Self::ID], &self.index);
        let codes = gather(&self.lines, Self::LINE_CODE, &matches);
        dataset
            .set_column(Self::OUTPUT, codes)
            .map_err(|e| TransformError::shape(self.name(), e))?;
        Ok(dataset)
    }
}

/// Left join where colliding reference columns get a suffix.
#[derive(Debug, Clone)]
pub struct SuffixJoin {
    reference: Arc<Dataset>,
    left_on: String,
    right_on: String,
    suffix: String,
    index: LookupIndex,
}

impl SuffixJoin {
    pub fn new(
        reference: Arc<Dataset>,
        left_on: impl Into<String>,
        right_on: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        let right_on = right_on.into();
        let index = LookupIndex::build(&reference, &[right_on.as_str()]);
        Self {
            reference,
            left_on: left_on.into(),
            right_on,
            suffix: suffix.into(),
            index,
        }
    }
}

impl Transformation for SuffixJoin {
    fn name(&self) -> &str {
        "suffix_join"
    }

    fn transform(&self, mut dataset: Dataset) -> Result<Dataset, TransformError> {
        if !dataset.has_column(&self.left_on) {
            warn!(column = %self.left_on, "join column not present, skipping");
            return Ok(dataset);
        }
        require_columns(&self.reference, self.name(), &[self.right_on.as_str()])?;

        let matches = match_rows(&dataset, &[self.left_on.as_str()], &self.index);
        let columns: Vec<String> = self.reference.column_names().map(str::to_string).collect();
        for column in columns {
            let name = if dataset.has_column(&column) {
                format!("{}{}", column, self.suffix)
            } else {
                column.clone()
            };
            if dataset.has_column(&name) {
                return Err(TransformError::collision(self.name(), &name));
            }
            let values = gather(&self.reference, &column, &matches);
            dataset
                .set_column(name, values)
                .map_err(|e| TransformError::shape(self.name(), e))?;
        }
        Ok(dataset)
    }
}
