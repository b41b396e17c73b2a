//! Reads registered entities from the source, skipping those with no rows.

use crate::dataset::Dataset;
use crate::error::{EtlError, Result};
use crate::registry::EntityRegistry;
use crate::store::Source;
use indexmap::IndexMap;
use tracing::{info, warn};

/// Datasets read by one extraction, in request order.
#[derive(Debug, Default)]
pub struct ExtractOutcome {
    pub datasets: IndexMap<String, Dataset>,
    /// Entities whose source table had no rows
    pub skipped: Vec<String>,
}

pub struct Extractor<'a> {
    source: &'a dyn Source,
    registry: &'a EntityRegistry,
}

impl<'a> Extractor<'a> {
    pub fn new(source: &'a dyn Source, registry: &'a EntityRegistry) -> Self {
        Self { source, registry }
    }

    /// Read the given entities, or every registered entity when `keys` is empty.
    ///
    /// Rows are counted before reading; empty entities are skipped and
    /// reported together. A count or read failure aborts the extraction.
    pub fn extract(&self, keys: &[String]) -> Result<ExtractOutcome> {
        let keys: Vec<String> = if keys.is_empty() {
            self.registry.keys().map(str::to_string).collect()
        } else {
            keys.to_vec()
        };

        let mut outcome = ExtractOutcome::default();
        for key in keys {
            let table = self.registry.resolve(&key).source.clone();
            let rows = self
                .source
                .row_count(&table)
                .map_err(|e| EtlError::source_read(&key, e))?;
            if rows == 0 {
                outcome.skipped.push(key);
                continue;
            }
            let dataset = self
                .source
                .read(&table, None)
                .map_err(|e| EtlError::source_read(&key, e))?;
            info!(entity = %key, rows = dataset.row_count(), "extracted");
            outcome.datasets.insert(key, dataset);
        }

        if !outcome.skipped.is_empty() {
            warn!(entities = ?outcome.skipped, "skipped empty entities");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;
    use crate::store::MemoryStore;

    fn registry() -> EntityRegistry {
        EntityRegistry::from_yaml_str(
            "entities:\n  a: {source: src_a, target: A}\n  b: {source: src_b, target: B}\n",
        )
        .unwrap()
    }

    #[test]
    fn test_empty_entities_are_skipped() {
        let source = MemoryStore::new()
            .with_table(
                "src_a",
                Dataset::from_columns(vec![("ide", vec![Value::Int(1)])]).unwrap(),
            )
            .with_table("src_b", Dataset::empty_with_columns(&["ide"]));
        let registry = registry();

        let outcome = Extractor::new(&source, &registry).extract(&[]).unwrap();

        assert_eq!(outcome.datasets.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(outcome.skipped, vec!["b"]);
    }

    #[test]
    fn test_missing_table_aborts() {
        let source = MemoryStore::new();
        let registry = registry();

        let err = Extractor::new(&source, &registry)
            .extract(&["a".to_string()])
            .unwrap_err();

        assert!(matches!(err, EtlError::Source { ref entity, .. } if entity == "a"));
    }
}
