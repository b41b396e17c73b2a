//! Batch runner for the first phase.

use super::builder::PipelineBuilder;
use super::cache::ReferenceCache;
use super::extract::Extractor;
use super::load::Loader;
use super::transformer::Transformer;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::registry::EntityRegistry;
use crate::step_registry::StepRegistry;
use crate::store::{Sink, Source};
use serde::Serialize;
use tracing::{error, info, info_span};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedEntity {
    pub key: String,
    pub target: String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedEntity {
    pub key: String,
    pub reason: String,
}

/// Outcome of one [`EtlProcess::run`].
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub skipped: Vec<String>,
    pub failed: Vec<FailedEntity>,
    pub loaded: Vec<LoadedEntity>,
}

impl BatchReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            skipped: Vec::new(),
            failed: Vec::new(),
            loaded: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Extract, transform and load a batch of entities.
///
/// Entities run one after the other. A failure in one entity is recorded in
/// the report and the batch carries on; only an extraction failure aborts the
/// whole run.
pub struct EtlProcess<'a> {
    source: &'a dyn Source,
    sink: &'a dyn Sink,
    registry: &'a EntityRegistry,
    steps: &'a StepRegistry,
}

impl<'a> EtlProcess<'a> {
    pub fn new(
        source: &'a dyn Source,
        sink: &'a dyn Sink,
        registry: &'a EntityRegistry,
        steps: &'a StepRegistry,
    ) -> Self {
        Self {
            source,
            sink,
            registry,
            steps,
        }
    }

    /// Run the given entities, or all registered ones when `keys` is empty.
    pub fn run(&self, keys: &[String]) -> Result<BatchReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("etl_run", %run_id);
        let _guard = span.enter();

        let extracted = Extractor::new(self.source, self.registry).extract(keys)?;
        let mut report = BatchReport::new(run_id);
        report.skipped = extracted.skipped;

        let mut cache = ReferenceCache::new();
        let mut transformer = Transformer::new(PipelineBuilder::new(
            self.registry,
            self.steps,
            self.source,
            &mut cache,
        ));
        let loader = Loader::new(self.sink);

        for (key, dataset) in extracted.datasets {
            match self.process(&mut transformer, &loader, &key, dataset) {
                Ok(loaded) => report.loaded.push(loaded),
                Err(e) => {
                    error!(entity = %key, error = %e, "entity failed");
                    report.failed.push(FailedEntity {
                        key,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "batch finished"
        );
        Ok(report)
    }

    fn process(
        &self,
        transformer: &mut Transformer<'_>,
        loader: &Loader<'_>,
        key: &str,
        dataset: Dataset,
    ) -> Result<LoadedEntity> {
        let config = self.registry.resolve(key);
        let reshaped = transformer.transform(key, dataset)?;
        let rows = loader.load(&config.target, &reshaped, config.primary_key.as_deref())?;
        Ok(LoadedEntity {
            key: key.to_string(),
            target: config.target.clone(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::store::MemoryStore;

    #[test]
    fn test_failures_do_not_stop_the_batch() {
        let registry = EntityRegistry::from_yaml_str(
            "entities:\n  dca: {source: dca, target: D, primary_key: ide}\n  cen: {source: cen, target: C}\n",
        )
        .unwrap();
        let source = MemoryStore::new()
            .with_table("dca", Dataset::from_records(&[record! { "ide" => 1 }]))
            .with_table("cen", Dataset::from_records(&[record! { "ide" => 7, "res" => "x" }]));
        let sink = MemoryStore::new();
        let steps = StepRegistry::builtin();

        let report = EtlProcess::new(&source, &sink, &registry, &steps)
            .run(&[])
            .unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].key, "dca");
        assert_eq!(
            report.loaded,
            vec![LoadedEntity {
                key: "cen".into(),
                target: "C".into(),
                rows: 1
            }]
        );
        assert!(sink.table("D").is_none());
        assert!(!report.is_success());
    }
}
