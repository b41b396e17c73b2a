//! Assembles the ordered step list of an entity.

use super::cache::{CachedReferences, ReferenceCache};
use crate::registry::EntityRegistry;
use crate::step_registry::{ReferenceLookup, StepRegistry};
use crate::store::Source;
use crate::transform::{
    CombineColumns, DeleteRows, InsertRows, NormalizeDates, PruneEmptyColumns, ReferenceJoin,
    RenameColumns, SortColumns, StripNulChars, Transformation,
};

/// Turns registry entries into step lists.
///
/// The order is fixed:
///
/// 1. reference join
/// 2. row insertion
/// 3. row deletion
/// 4. date normalization
/// 5. column combination, in declaration order
/// 6. pruning
/// 7. rename
/// 8. ascending column sort
/// 9. entity-specific steps
/// 10. NUL stripping
///
/// Steps 1-5, 7 and 9 are present only when configured.
pub struct PipelineBuilder<'a> {
    registry: &'a EntityRegistry,
    steps: &'a StepRegistry,
    source: &'a dyn Source,
    cache: &'a mut ReferenceCache,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(
        registry: &'a EntityRegistry,
        steps: &'a StepRegistry,
        source: &'a dyn Source,
        cache: &'a mut ReferenceCache,
    ) -> Self {
        Self {
            registry,
            steps,
            source,
            cache,
        }
    }

    pub fn build(&mut self, key: &str) -> Vec<Box<dyn Transformation>> {
        let config = self.registry.resolve(key);
        let mut references = CachedReferences {
            cache: &mut *self.cache,
            source: self.source,
            registry: self.registry,
        };
        let mut pipeline: Vec<Box<dyn Transformation>> = Vec::new();

        if let Some(join) = &config.reference_join {
            if let Some(reference) = references.reference(&join.reference) {
                pipeline.push(Box::new(ReferenceJoin::new(
                    reference,
                    join.join_column.clone(),
                    join.id_column.clone(),
                    join.prefix(),
                )));
            }
        }

        if let Some(directives) = self.registry.directives(key) {
            if !directives.insert.is_empty() {
                pipeline.push(Box::new(InsertRows::new(directives.insert.clone())));
            }
            if !directives.delete.is_empty() {
                pipeline.push(Box::new(DeleteRows::new(directives.delete.clone())));
            }
        }

        if !config.date_columns.is_empty() {
            pipeline.push(Box::new(NormalizeDates::new(
                config.date_columns.iter().cloned(),
                config.zero_dates_are_null,
            )));
        }

        for spec in &config.combine_columns {
            pipeline.push(Box::new(CombineColumns::new(
                spec.new_name.clone(),
                spec.columns.clone(),
                spec.separator.clone(),
            )));
        }

        pipeline.push(Box::new(PruneEmptyColumns));

        if !config.rename.is_empty() {
            pipeline.push(Box::new(RenameColumns::new(config.rename.clone())));
        }

        pipeline.push(Box::new(SortColumns::ascending()));
        pipeline.extend(self.steps.steps_for(key, &mut references));
        pipeline.push(Box::new(StripNulChars));

        pipeline
    }
}
