//! Runs an entity's pipeline over its extracted dataset.

use super::builder::PipelineBuilder;
use crate::dataset::Dataset;
use crate::error::{EtlError, Result};
use crate::transform::Transformation;
use tracing::debug;

/// Builds an entity's pipeline and runs it.
pub struct Transformer<'a> {
    builder: PipelineBuilder<'a>,
}

impl<'a> Transformer<'a> {
    pub fn new(builder: PipelineBuilder<'a>) -> Self {
        Self { builder }
    }

    pub fn transform(&mut self, key: &str, dataset: Dataset) -> Result<Dataset> {
        let steps = self.builder.build(key);
        run_steps(key, &steps, dataset)
    }
}

/// Fold `steps` over `dataset`. The first failing step aborts.
pub fn run_steps(
    entity: &str,
    steps: &[Box<dyn Transformation>],
    dataset: Dataset,
) -> Result<Dataset> {
    steps.iter().try_fold(dataset, |dataset, step| {
        let out = step
            .transform(dataset)
            .map_err(|e| EtlError::schema(entity, e))?;
        debug!(
            entity,
            step = step.name(),
            rows = out.row_count(),
            columns = out.column_count(),
            "step applied"
        );
        Ok(out)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;
    use crate::transform::{DropOrphanDeliveries, SortColumns};

    #[test]
    fn test_first_failure_aborts() {
        let steps: Vec<Box<dyn Transformation>> = vec![
            Box::new(SortColumns::ascending()),
            Box::new(DropOrphanDeliveries::default()),
        ];
        let ds = Dataset::from_columns(vec![("ide", vec![Value::Int(1)])]).unwrap();

        let err = run_steps("dca", &steps, ds).unwrap_err();

        assert!(matches!(err, EtlError::Schema { ref entity, .. } if entity == "dca"));
    }
}
