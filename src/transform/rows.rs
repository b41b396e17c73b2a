//! Literal row directives applied before any column reshaping.

use super::{require_columns, TransformError, Transformation};
use crate::dataset::{Dataset, Value};
use indexmap::IndexMap;
use tracing::info;

/// A literal row or an equality condition, keyed by source column name.
pub type RowLiteral = IndexMap<String, Value>;

/// Append literal rows. Columns a row leaves out are null.
#[derive(Debug, Clone)]
pub struct InsertRows {
    rows: Vec<RowLiteral>,
}

impl InsertRows {
    pub fn new(rows: Vec<RowLiteral>) -> Self {
        Self { rows }
    }
}

impl Transformation for InsertRows {
    fn name(&self) -> &str {
        "insert_rows"
    }

    fn transform(&self, mut dataset: Dataset) -> Result<Dataset, TransformError> {
        for row in &self.rows {
            dataset.push_record(row);
        }
        info!(count = self.rows.len(), "rows inserted");
        Ok(dataset)
    }
}

/// Drop every row matching any of the conditions.
///
/// A row matches a condition when all of its columns equal the literal values.
/// Every column named by a condition must exist.
#[derive(Debug, Clone)]
pub struct DeleteRows {
    conditions: Vec<RowLiteral>,
}

impl DeleteRows {
    pub fn new(conditions: Vec<RowLiteral>) -> Self {
        Self { conditions }
    }

    fn matches(&self, dataset: &Dataset, row: usize) -> bool {
        self.conditions.iter().any(|condition| {
            condition
                .iter()
                .all(|(column, literal)| dataset.value(row, column).matches(literal))
        })
    }
}

impl Transformation for DeleteRows {
    fn name(&self) -> &str {
        "delete_rows"
    }

    fn transform(&self, mut dataset: Dataset) -> Result<Dataset, TransformError> {
        for condition in &self.conditions {
            let columns: Vec<&str> = condition.keys().map(String::as_str).collect();
            require_columns(&dataset, self.name(), &columns)?;
        }

        let keep: Vec<bool> = (0..dataset.row_count())
            .map(|row| !self.matches(&dataset, row))
            .collect();
        let before = dataset.row_count();
        dataset.retain_rows(&keep);
        info!(deleted = before - dataset.row_count(), "rows deleted");
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    fn ids(values: &[i64]) -> Dataset {
        Dataset::from_columns(vec![
            ("id", values.iter().map(|v| Value::Int(*v)).collect()),
            ("tag", values.iter().map(|v| Value::from(format!("t{}", v))).collect()),
        ])
        .unwrap()
    }

    #[test]
    fn test_delete_any_condition_regardless_of_order() {
        let expected = vec![Value::Int(1), Value::Int(2), Value::Int(7)];
        for conditions in [
            vec![record! { "id" => 0 }, record! { "id" => 5 }],
            vec![record! { "id" => 5 }, record! { "id" => 0 }],
        ] {
            let out = DeleteRows::new(conditions)
                .transform(ids(&[0, 1, 5, 2, 0, 7]))
                .unwrap();
            assert_eq!(out.column("id").unwrap(), expected.as_slice());
            assert_eq!(out.column("tag").unwrap().len(), 3);
        }
    }

    #[test]
    fn test_delete_conjunction_within_condition() {
        let out = DeleteRows::new(vec![record! { "id" => 1, "tag" => "t2" }])
            .transform(ids(&[1, 2]))
            .unwrap();
        assert_eq!(out.row_count(), 2);

        let out = DeleteRows::new(vec![record! { "id" => 1, "tag" => "t1" }])
            .transform(ids(&[1, 2]))
            .unwrap();
        assert_eq!(out.column("id").unwrap(), &[Value::Int(2)]);
    }

    #[test]
    fn test_delete_missing_column_is_schema_error() {
        let err = DeleteRows::new(vec![record! { "ide" => 496414 }])
            .transform(ids(&[1]))
            .unwrap_err();
        assert_eq!(err, TransformError::missing("delete_rows", "ide"));
    }

    #[test]
    fn test_insert_appends_and_fills_nulls() {
        let out = InsertRows::new(vec![record! { "id" => 0, "extra" => 9 }])
            .transform(ids(&[3]))
            .unwrap();

        assert_eq!(out.row_count(), 2);
        assert_eq!(out.column("tag").unwrap()[1], Value::Null);
        assert_eq!(out.column("extra").unwrap(), &[Value::Null, Value::Int(9)]);
    }
}
