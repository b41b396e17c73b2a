//! Column-level reshaping: combination, pruning, renaming and ordering.

use super::{TransformError, Transformation};
use crate::dataset::{Dataset, Value};
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Join several columns, as text, into a new column.
///
/// If any source column is absent the dataset is returned unchanged. Nulls
/// render as the empty string. An existing column named `new_name` is
/// overwritten in place.
#[derive(Debug, Clone)]
pub struct CombineColumns {
    new_name: String,
    sources: Vec<String>,
    separator: String,
}

impl CombineColumns {
    pub fn new(
        new_name: impl Into<String>,
        sources: Vec<String>,
        separator: impl Into<String>,
    ) -> Self {
        Self {
            new_name: new_name.into(),
            sources,
            separator: separator.into(),
        }
    }
}

impl Transformation for CombineColumns {
    fn name(&self) -> &str {
        "combine_columns"
    }

    fn transform(&self, mut dataset: Dataset) -> Result<Dataset, TransformError> {
        if let Some(missing) = self.sources.iter().find(|c| !dataset.has_column(c)) {
            warn!(
                column = %missing,
                target = %self.new_name,
                "source column not present, combination skipped"
            );
            return Ok(dataset);
        }

        let combined = (0..dataset.row_count())
            .map(|row| {
                let parts: Vec<String> = self
                    .sources
                    .iter()
                    .map(|c| dataset.value(row, c).render())
                    .collect();
                Value::Text(parts.join(&self.separator))
            })
            .collect();

        dataset
            .set_column(self.new_name.clone(), combined)
            .map_err(|e| TransformError::shape(self.name(), e))?;
        debug!(column = %self.new_name, sources = ?self.sources, "columns combined");
        Ok(dataset)
    }
}

/// Drop columns whose non-null values are all null, all zero or all blank.
///
/// Datasets without rows are left untouched.
#[derive(Debug, Clone, Default)]
pub struct PruneEmptyColumns;

impl PruneEmptyColumns {
    fn is_absent_equivalent(values: &[Value]) -> bool {
        let present: Vec<&Value> = values
            .iter()
            .filter(|v| !matches!(v, Value::Null) && !matches!(v, Value::Float(f) if f.is_nan()))
            .collect();

        if present.is_empty() {
            return true;
        }
        if present.iter().all(|v| matches!(v, Value::Int(_) | Value::Float(_))) {
            return present.iter().all(|v| v.is_zero_like());
        }
        if present.iter().all(|v| v.as_text().is_some()) {
            return present
                .iter()
                .all(|v| v.as_text().map_or(false, |t| t.trim().is_empty()));
        }
        false
    }
}

impl Transformation for PruneEmptyColumns {
    fn name(&self) -> &str {
        "prune_empty_columns"
    }

    fn transform(&self, mut dataset: Dataset) -> Result<Dataset, TransformError> {
        if dataset.is_empty() {
            return Ok(dataset);
        }

        let doomed: Vec<String> = dataset
            .columns()
            .filter(|(_, values)| Self::is_absent_equivalent(values))
            .map(|(name, _)| name.to_string())
            .collect();

        for name in &doomed {
            dataset.remove_column(name);
        }
        if !doomed.is_empty() {
            info!(dropped = ?doomed, "pruned empty columns");
        }
        Ok(dataset)
    }
}

/// Apply an old→new column name map.
///
/// Names absent from the dataset are ignored, since pruning may already have
/// removed them. A new name that collides with another column fails.
#[derive(Debug, Clone)]
pub struct RenameColumns {
    mapping: IndexMap<String, String>,
}

impl RenameColumns {
    pub fn new(mapping: IndexMap<String, String>) -> Self {
        Self { mapping }
    }
}

impl Transformation for RenameColumns {
    fn name(&self) -> &str {
        "rename_columns"
    }

    fn transform(&self, mut dataset: Dataset) -> Result<Dataset, TransformError> {
        let mut seen = HashSet::new();
        for current in dataset.column_names() {
            let target = self.mapping.get(current).map(String::as_str).unwrap_or(current);
            if !seen.insert(target.to_string()) {
                return Err(TransformError::collision(self.name(), target));
            }
        }

        for old in self.mapping.keys().filter(|old| !dataset.has_column(old)) {
            debug!(column = %old, "rename source not present");
        }
        dataset.rename_columns(|name| self.mapping.get(name).cloned());
        Ok(dataset)
    }
}

/// Reorder columns by byte-wise name order.
#[derive(Debug, Clone, Default)]
pub struct SortColumns {
    descending: bool,
}

impl SortColumns {
    pub fn ascending() -> Self {
        Self { descending: false }
    }

    pub fn descending() -> Self {
        Self { descending: true }
    }
}

impl Transformation for SortColumns {
    fn name(&self) -> &str {
        "sort_columns"
    }

    fn transform(&self, mut dataset: Dataset) -> Result<Dataset, TransformError> {
        dataset.sort_columns(self.descending);
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn test_combine_joins_text_and_renders_nulls_empty() {
        let ds = Dataset::from_columns(vec![
            ("tip", vec![Value::Int(1), Value::from("B"), Value::Null]),
            ("est", vec![Value::Int(7), Value::Float(2.5), Value::from("x")]),
        ])
        .unwrap();

        let out = CombineColumns::new("primary_ide", vec!["tip".into(), "est".into()], "_")
            .transform(ds)
            .unwrap();

        assert_eq!(
            out.column("primary_ide").unwrap(),
            &[Value::from("1_7"), Value::from("B_2.5"), Value::from("_x")]
        );
    }

    #[test]
    fn test_combine_skips_when_source_missing() {
        let ds = Dataset::from_columns(vec![("tip", vec![Value::Int(1)])]).unwrap();
        let out = CombineColumns::new("k", vec!["tip".into(), "est".into()], "_")
            .transform(ds.clone())
            .unwrap();
        assert_eq!(out, ds);
    }

    #[test]
    fn test_prune_drops_null_zero_and_blank_columns() {
        let ds = Dataset::from_columns(vec![
            ("nulls", vec![Value::Null, Value::Null]),
            ("zeros", vec![Value::Int(0), Value::Float(0.0)]),
            ("blanks", vec![Value::from("  "), Value::Null]),
            ("bytes", vec![Value::Bytes(b" ".to_vec()), Value::Null]),
            ("mixed", vec![Value::Int(0), Value::from("")]),
            ("keep", vec![Value::Int(0), Value::Int(3)]),
            ("flags", vec![Value::Bool(false), Value::Bool(false)]),
        ])
        .unwrap();

        let out = PruneEmptyColumns.transform(ds).unwrap();

        assert_eq!(
            out.column_names().collect::<Vec<_>>(),
            vec!["mixed", "keep", "flags"]
        );
        assert_eq!(out.row_count(), 2);
    }

    #[test]
    fn test_prune_leaves_zero_row_datasets_alone() {
        let ds = Dataset::empty_with_columns(&["a", "b"]);
        let out = PruneEmptyColumns.transform(ds).unwrap();
        assert_eq!(out.column_count(), 2);
    }

    #[test]
    fn test_rename_keeps_position_and_ignores_absent_names() {
        let ds = Dataset::from_columns(vec![
            ("res", vec![Value::from("Obra")]),
            ("ide", vec![Value::Int(1)]),
        ])
        .unwrap();

        let out = RenameColumns::new(mapping(&[("res", "nombre_obra"), ("gone", "x")]))
            .transform(ds)
            .unwrap();

        assert_eq!(out.column_names().collect::<Vec<_>>(), vec!["nombre_obra", "ide"]);
    }

    #[test]
    fn test_rename_collision_is_schema_error() {
        let ds = Dataset::from_columns(vec![
            ("fec", vec![Value::Null]),
            ("fecha_alta", vec![Value::Null]),
        ])
        .unwrap();

        let err = RenameColumns::new(mapping(&[("fec", "fecha_alta")]))
            .transform(ds)
            .unwrap_err();

        assert_eq!(err, TransformError::collision("rename_columns", "fecha_alta"));
    }

    #[test]
    fn test_rename_swap_is_allowed() {
        let ds = Dataset::from_columns(vec![
            ("a", vec![Value::Int(1)]),
            ("b", vec![Value::Int(2)]),
        ])
        .unwrap();
        let out = RenameColumns::new(mapping(&[("a", "b"), ("b", "a")]))
            .transform(ds)
            .unwrap();
        assert_eq!(out.column("a").unwrap(), &[Value::Int(2)]);
    }

    #[test]
    fn test_prune_rename_sort_is_idempotent() {
        let ds = Dataset::from_columns(vec![
            ("zeta", vec![Value::Int(1), Value::Int(2)]),
            ("res", vec![Value::from("a"), Value::from("b")]),
            ("empty", vec![Value::from(""), Value::Null]),
            ("Alpha", vec![Value::Null, Value::Float(1.5)]),
        ])
        .unwrap();
        let steps: Vec<Box<dyn Transformation>> = vec![
            Box::new(PruneEmptyColumns),
            Box::new(RenameColumns::new(mapping(&[("res", "nombre")]))),
            Box::new(SortColumns::ascending()),
        ];
        let run = |ds: Dataset| {
            steps
                .iter()
                .try_fold(ds, |acc, step| step.transform(acc))
                .unwrap()
        };

        let once = run(ds);
        let twice = run(once.clone());

        assert_eq!(once, twice);
        assert_eq!(once.column_names().collect::<Vec<_>>(), vec!["Alpha", "nombre", "zeta"]);
    }
}
