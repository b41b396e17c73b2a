//! Memoized reference datasets.

use crate::dataset::Dataset;
use crate::error::{EtlError, Result};
use crate::registry::EntityRegistry;
use crate::step_registry::ReferenceLookup;
use crate::store::Source;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reference datasets read from the source, keyed by entity key.
///
/// A reference is read at most once per cache. The orchestrator creates a
/// fresh cache for every batch; [`ReferenceCache::invalidate`] empties it in
/// between.
#[derive(Debug, Default)]
pub struct ReferenceCache {
    entries: HashMap<String, Arc<Dataset>>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached reference for `key`, reading the source table on first use.
    ///
    /// Fails with [`EtlError::ReferenceUnavailable`] when the read fails or
    /// the table has no rows. Failures are not cached.
    pub fn get_or_load(
        &mut self,
        key: &str,
        source: &dyn Source,
        registry: &EntityRegistry,
    ) -> Result<Arc<Dataset>> {
        if let Some(dataset) = self.entries.get(key) {
            return Ok(dataset.clone());
        }

        let table = registry.resolve(key).source.clone();
        let dataset = source
            .read(&table, None)
            .map_err(|e| EtlError::ReferenceUnavailable {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        if dataset.is_empty() {
            return Err(EtlError::ReferenceUnavailable {
                key: key.to_string(),
                reason: format!("table '{}' is empty", table),
            });
        }

        debug!(reference = key, rows = dataset.row_count(), "reference cached");
        let dataset = Arc::new(dataset);
        self.entries.insert(key.to_string(), dataset.clone());
        Ok(dataset)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every cached reference.
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }
}

/// [`ReferenceLookup`] over a cache and the source it fills from.
/// Unavailable references are logged and reported as absent.
pub struct CachedReferences<'a> {
    pub cache: &'a mut ReferenceCache,
    pub source: &'a dyn Source,
    pub registry: &'a EntityRegistry,
}

impl ReferenceLookup for CachedReferences<'_> {
    fn reference(&mut self, key: &str) -> Option<Arc<Dataset>> {
        match self.cache.get_or_load(key, self.source, self.registry) {
            Ok(dataset) => Some(dataset),
            Err(e) => {
                warn!(reference = key, error = %e, "reference unavailable, step omitted");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;
    use crate::store::MemoryStore;

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_table(
                "con",
                Dataset::from_columns(vec![("ide", vec![Value::Int(1)])]).unwrap(),
            )
            .with_table("empty", Dataset::empty_with_columns(&["ide"]))
    }

    #[test]
    fn test_reference_is_read_once() {
        let source = store();
        let registry = EntityRegistry::new();
        let mut cache = ReferenceCache::new();

        let first = cache.get_or_load("con", &source, &registry).unwrap();
        source.put("con", Dataset::new());
        let second = cache.get_or_load("con", &source, &registry).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let source = store();
        let registry = EntityRegistry::new();
        let mut cache = ReferenceCache::new();

        cache.get_or_load("con", &source, &registry).unwrap();
        cache.invalidate();
        assert!(cache.is_empty());

        source.put("con", Dataset::empty_with_columns(&["ide"]));
        assert!(cache.get_or_load("con", &source, &registry).is_err());
    }

    #[test]
    fn test_empty_and_missing_references_are_unavailable() {
        let source = store();
        let registry = EntityRegistry::new();
        let mut cache = ReferenceCache::new();

        for key in ["empty", "missing"] {
            let err = cache.get_or_load(key, &source, &registry).unwrap_err();
            assert!(matches!(err, EtlError::ReferenceUnavailable { .. }));
        }
        assert!(!cache.contains("empty"));
    }

    #[test]
    fn test_cached_references_swallow_failures() {
        let source = store();
        let registry = EntityRegistry::new();
        let mut cache = ReferenceCache::new();
        let mut lookup = CachedReferences {
            cache: &mut cache,
            source: &source,
            registry: &registry,
        };

        assert!(lookup.reference("missing").is_none());
        assert!(lookup.reference("con").is_some());
    }
}
