//! Second phase: jobs that read loaded targets back from the sink, derive
//! join columns and replace the target.
//!
//! Every job follows the same shape:
//!
//! 1. resolve entity keys to target names through the registry
//! 2. read the targets (a missing table reads from its backup, else as empty)
//! 3. abort with [`EtlError::EnrichmentJoin`] when a required input is empty
//!    or lacks a column; the target is left untouched
//! 4. compute the new columns without changing the row count
//! 5. replace the target through [`Sink::replace_table`]
//!
//! Allocation differs in step 4 and 5: it writes a new derived table with
//! [`InsertMode::Replace`](crate::store::InsertMode::Replace) and keeps no backup.

pub mod allocation;
pub mod invoice_link;
pub mod parent_code;
pub mod project_code;
pub mod verify;

use crate::dataset::Dataset;
use crate::error::{EtlError, Result};
use crate::registry::EntityRegistry;
use crate::store::{backup_name, Sink};
use serde::Serialize;
use tracing::{info, warn};

pub use allocation::{allocate, AllocationJob, AllocationRow, AllocationSettings};
pub use invoice_link::InvoiceLink;
pub use parent_code::ParentCode;
pub use project_code::ProjectCode;
pub use verify::verify_inserted_rows;

/// Names accepted by [`job_by_name`], in the order [`all_jobs`] runs them.
pub const JOB_NAMES: [&str; 5] = [
    "invoice-link",
    "project-code-deliveries",
    "project-code-items",
    "parent-code",
    "allocation",
];

/// Sink and registry shared by the jobs of one run.
pub struct EnrichmentContext<'a> {
    pub sink: &'a dyn Sink,
    pub registry: &'a EntityRegistry,
}

impl<'a> EnrichmentContext<'a> {
    pub fn new(sink: &'a dyn Sink, registry: &'a EntityRegistry) -> Self {
        Self { sink, registry }
    }

    pub fn target(&self, key: &str) -> String {
        self.registry.target_name(key)
    }

    /// Read the target of `key`.
    ///
    /// A target left missing by an interrupted replace is read from its
    /// backup instead; with neither present the result is empty.
    pub fn read_or_empty(&self, job: &str, key: &str) -> Result<Dataset> {
        let target = self.target(key);
        let exists = |name: &str| {
            self.sink
                .exists(name)
                .map_err(|e| EtlError::enrichment(job, e.to_string()))
        };
        let table = if exists(&target)? {
            target
        } else {
            let backup = backup_name(&target);
            if !exists(&backup)? {
                return Ok(Dataset::new());
            }
            warn!(job, target_table = %target, "target missing, reading its backup");
            backup
        };
        self.sink
            .read_table(&table)
            .map_err(|e| EtlError::enrichment(job, e.to_string()))
    }

    /// Read the target of `key`, requiring rows and the given columns.
    pub fn read_required(&self, job: &str, key: &str, columns: &[&str]) -> Result<Dataset> {
        let dataset = self.read_or_empty(job, key)?;
        require_input(job, &self.target(key), &dataset, columns)?;
        Ok(dataset)
    }

    /// Replace the target of `key`, keeping its registered primary key.
    pub fn replace(&self, key: &str, dataset: &Dataset) -> Result<()> {
        let config = self.registry.resolve(key);
        let primary_key = config
            .primary_key
            .as_deref()
            .filter(|pk| dataset.has_column(pk));
        self.sink
            .replace_table(&config.target, dataset, primary_key)
            .map_err(|e| EtlError::sink_write(config.target.clone(), e))
    }
}

/// Fail unless `dataset` has rows and every column in `columns`.
pub(crate) fn require_input(job: &str, table: &str, dataset: &Dataset, columns: &[&str]) -> Result<()> {
    if dataset.is_empty() {
        return Err(EtlError::enrichment(job, format!("table '{}' is empty", table)));
    }
    match dataset.first_missing(columns) {
        Some(column) => Err(EtlError::enrichment(
            job,
            format!("table '{}' has no column '{}'", table, column),
        )),
        None => Ok(()),
    }
}

/// One second-phase job.
pub trait EnrichmentJob {
    fn name(&self) -> &str;

    /// Run the job; returns the number of rows written.
    fn run(&self, context: &EnrichmentContext<'_>) -> Result<usize>;
}

/// Look a job up by its CLI name.
pub fn job_by_name(name: &str, settings: &AllocationSettings) -> Result<Box<dyn EnrichmentJob>> {
    let job: Box<dyn EnrichmentJob> = match name {
        "invoice-link" => Box::new(InvoiceLink::default()),
        "project-code-deliveries" => Box::new(ProjectCode::deliveries()),
        "project-code-items" => Box::new(ProjectCode::items()),
        "parent-code" => Box::new(ParentCode::default()),
        "allocation" => Box::new(AllocationJob::new(settings.clone())),
        other => return Err(EtlError::UnknownJob(other.to_string())),
    };
    Ok(job)
}

pub fn all_jobs(settings: &AllocationSettings) -> Vec<Box<dyn EnrichmentJob>> {
    JOB_NAMES
        .iter()
        .filter_map(|name| job_by_name(name, settings).ok())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedJob {
    pub job: String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedJob {
    pub job: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichmentReport {
    pub completed: Vec<CompletedJob>,
    pub not_run: Vec<SkippedJob>,
}

/// Runs jobs in order. A failing job is reported and the next one still runs.
pub struct EnrichmentRunner<'a> {
    context: EnrichmentContext<'a>,
}

impl<'a> EnrichmentRunner<'a> {
    pub fn new(sink: &'a dyn Sink, registry: &'a EntityRegistry) -> Self {
        Self {
            context: EnrichmentContext::new(sink, registry),
        }
    }

    pub fn run(&self, jobs: &[Box<dyn EnrichmentJob>]) -> EnrichmentReport {
        let mut report = EnrichmentReport::default();
        for job in jobs {
            match job.run(&self.context) {
                Ok(rows) => {
                    info!(job = job.name(), rows, "enrichment job completed");
                    report.completed.push(CompletedJob {
                        job: job.name().to_string(),
                        rows,
                    });
                }
                Err(e) => {
                    warn!(job = job.name(), error = %e, "enrichment job did not run");
                    report.not_run.push(SkippedJob {
                        job: job.name().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }
}
