//! Project code propagation through cost centers.

use super::{EnrichmentContext, EnrichmentJob};
use crate::dataset::{Dataset, Value};
use crate::error::{EtlError, Result};
use crate::transform::join::{gather, match_rows, LookupIndex};

/// Propagates a project's code onto a dependent entity.
///
/// The code lives on the concept entity and reaches the project through its
/// cost center: `target.obride = obr.ide`, `obr.cenide = con.ide`, giving
/// `codigo_obra = con.cod`. The items variant also writes
/// `cod_obraConcat = "<cod>_<codigo_obra>"`.
#[derive(Debug, Clone)]
pub struct ProjectCode {
    name: &'static str,
    pub concepts: String,
    pub projects: String,
    pub target: String,
    pub with_concat: bool,
}

impl ProjectCode {
    /// Delivery notes (`dca`).
    pub fn deliveries() -> Self {
        Self {
            name: "project-code-deliveries",
            concepts: "con".to_string(),
            projects: "obr".to_string(),
            target: "dca".to_string(),
            with_concat: false,
        }
    }

    /// Budget items (`obrparpar`), with the concatenated code.
    pub fn items() -> Self {
        Self {
            name: "project-code-items",
            concepts: "con".to_string(),
            projects: "obr".to_string(),
            target: "obrparpar".to_string(),
            with_concat: true,
        }
    }

    fn target_columns(&self) -> &'static [&'static str] {
        if self.with_concat {
            &["obride", "cod"]
        } else {
            &["obride"]
        }
    }

    pub fn enrich(&self, mut target: Dataset, projects: &Dataset, concepts: &Dataset) -> Result<Dataset> {
        let project_index = LookupIndex::build(projects, &["ide"]);
        let cost_centers = gather(
            projects,
            "cenide",
            &match_rows(&target, &["obride"], &project_index),
        );

        let concept_index = LookupIndex::build(concepts, &["ide"]);
        let codes: Vec<Value> = cost_centers
            .iter()
            .map(|center| match concept_index.find(&[center]) {
                Some(row) => concepts.value(row, "cod").clone(),
                None => Value::Null,
            })
            .collect();

        if self.with_concat {
            let concat: Vec<Value> = codes
                .iter()
                .enumerate()
                .map(|(row, code)| {
                    Value::Text(format!("{}_{}", target.value(row, "cod").render(), code.render()))
                })
                .collect();
            target
                .set_column("cod_obraConcat", concat)
                .map_err(|e| EtlError::enrichment(self.name, e.to_string()))?;
        }
        target
            .set_column("codigo_obra", codes)
            .map_err(|e| EtlError::enrichment(self.name, e.to_string()))?;
        Ok(target)
    }
}

impl EnrichmentJob for ProjectCode {
    fn name(&self) -> &str {
        self.name
    }

    fn run(&self, context: &EnrichmentContext<'_>) -> Result<usize> {
        let concepts = context.read_required(self.name, &self.concepts, &["ide", "cod"])?;
        let projects = context.read_required(self.name, &self.projects, &["ide", "cenide"])?;
        let target = context.read_required(self.name, &self.target, self.target_columns())?;

        let enriched = self.enrich(target, &projects, &concepts)?;
        context.replace(&self.target, &enriched)?;
        Ok(enriched.row_count())
    }
}
