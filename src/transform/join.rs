//! Left joins against an in-memory reference dataset.

use super::{require_columns, TransformError, Transformation};
use crate::dataset::{Dataset, Key, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Row index keyed by one or more columns. The first row for a key wins, so
/// joining through the index never multiplies rows.
#[derive(Debug, Clone, Default)]
pub struct LookupIndex {
    rows: HashMap<Vec<Key>, usize>,
}

impl LookupIndex {
    /// Index `dataset` by `columns`. Rows with a null key part are left out.
    pub fn build(dataset: &Dataset, columns: &[&str]) -> Self {
        let mut rows = HashMap::new();
        for row in 0..dataset.row_count() {
            let parts: Vec<&Value> = columns.iter().map(|c| dataset.value(row, c)).collect();
            if let Some(key) = composite_key(&parts) {
                rows.entry(key).or_insert(row);
            }
        }
        Self { rows }
    }

    /// Like [`LookupIndex::build`] but only over the given rows, in order.
    pub fn build_over(dataset: &Dataset, columns: &[&str], order: &[usize]) -> Self {
        let mut rows = HashMap::new();
        for &row in order {
            let parts: Vec<&Value> = columns.iter().map(|c| dataset.value(row, c)).collect();
            if let Some(key) = composite_key(&parts) {
                rows.entry(key).or_insert(row);
            }
        }
        Self { rows }
    }

    pub fn find(&self, parts: &[&Value]) -> Option<usize> {
        composite_key(parts).and_then(|key| self.rows.get(&key).copied())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn composite_key(parts: &[&Value]) -> Option<Vec<Key>> {
    parts.iter().map(|v| v.key()).collect()
}

/// For each row of `left`, the matching row of the index (if any).
pub(crate) fn match_rows(left: &Dataset, left_on: &[&str], index: &LookupIndex) -> Vec<Option<usize>> {
    (0..left.row_count())
        .map(|row| {
            let parts: Vec<&Value> = left_on.iter().map(|c| left.value(row, c)).collect();
            index.find(&parts)
        })
        .collect()
}

/// Gather `column` of `right` through precomputed matches.
pub(crate) fn gather(right: &Dataset, column: &str, matches: &[Option<usize>]) -> Vec<Value> {
    matches
        .iter()
        .map(|m| match m {
            Some(row) => right.value(*row, column).clone(),
            None => Value::Null,
        })
        .collect()
}

/// Left-join a cached reference dataset on `join_column = reference.<id>`.
///
/// Every reference column is prefixed with `<prefix>_`; the id column becomes
/// `<prefix>_<id>`. The reference is de-duplicated on its id, so the row count
/// of the joined dataset never changes.
#[derive(Debug, Clone)]
pub struct ReferenceJoin {
    join_column: String,
    id_column: String,
    prefix: String,
    reference: Arc<Dataset>,
    index: LookupIndex,
}

impl ReferenceJoin {
    pub fn new(
        reference: Arc<Dataset>,
        join_column: impl Into<String>,
        id_column: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        let id_column = id_column.into();
        let index = LookupIndex::build(&reference, &[id_column.as_str()]);
        Self {
            join_column: join_column.into(),
            id_column,
            prefix: prefix.into(),
            reference,
            index,
        }
    }

    fn prefixed(&self, column: &str) -> String {
        format!("{}_{}", self.prefix, column)
    }
}

impl Transformation for ReferenceJoin {
    fn name(&self) -> &str {
        "reference_join"
    }

    fn transform(&self, mut dataset: Dataset) -> Result<Dataset, TransformError> {
        require_columns(&dataset, self.name(), &[self.join_column.as_str()])?;
        if !self.reference.has_column(&self.id_column) {
            return Err(TransformError::missing(self.name(), &self.id_column));
        }

        let added: Vec<(String, String)> = self
            .reference
            .column_names()
            .map(|c| (c.to_string(), self.prefixed(c)))
            .collect();
        if let Some((_, clash)) = added.iter().find(|(_, new)| dataset.has_column(new)) {
            return Err(TransformError::collision(self.name(), clash));
        }

        let matches = match_rows(&dataset, &[self.join_column.as_str()], &self.index);
        for (column, new_name) in added {
            let values = gather(&self.reference, &column, &matches);
            dataset
                .set_column(new_name, values)
                .map_err(|e| TransformError::shape(self.name(), e))?;
        }
        debug!(
            matched = matches.iter().filter(|m| m.is_some()).count(),
            rows = dataset.row_count(),
            "reference joined"
        );
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> Arc<Dataset> {
        Arc::new(
            Dataset::from_columns(vec![
                ("ide", vec![Value::Int(10), Value::Int(20), Value::Int(10)]),
                ("cod", vec![Value::from("A"), Value::from("B"), Value::from("dup")]),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_reference_join_prefixes_and_preserves_rows() {
        let ds = Dataset::from_columns(vec![
            ("ide", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            ("cenide", vec![Value::Int(10), Value::Float(20.0), Value::Null]),
        ])
        .unwrap();

        let out = ReferenceJoin::new(reference(), "cenide", "ide", "con")
            .transform(ds)
            .unwrap();

        assert_eq!(out.row_count(), 3);
        assert_eq!(
            out.column_names().collect::<Vec<_>>(),
            vec!["ide", "cenide", "con_ide", "con_cod"]
        );
        assert_eq!(
            out.column("con_cod").unwrap(),
            &[Value::from("A"), Value::from("B"), Value::Null]
        );
        assert_eq!(out.column("con_ide").unwrap()[0], Value::Int(10));
    }

    #[test]
    fn test_reference_join_requires_join_column() {
        let ds = Dataset::from_columns(vec![("ide", vec![Value::Int(1)])]).unwrap();
        let err = ReferenceJoin::new(reference(), "cenide", "ide", "con")
            .transform(ds)
            .unwrap_err();
        assert_eq!(err, TransformError::missing("reference_join", "cenide"));
    }

    #[test]
    fn test_lookup_index_composite_keys() {
        let ds = Dataset::from_columns(vec![
            ("obride", vec![Value::Int(1), Value::Int(1), Value::Int(2)]),
            ("fasnum", vec![Value::Int(1), Value::Int(2), Value::Int(1)]),
        ])
        .unwrap();
        let index = LookupIndex::build(&ds, &["obride", "fasnum"]);

        assert_eq!(index.find(&[&Value::Int(1), &Value::Int(2)]), Some(1));
        assert_eq!(index.find(&[&Value::Int(2), &Value::Int(2)]), None);
        assert_eq!(index.find(&[&Value::Null, &Value::Int(1)]), None);
    }
}
