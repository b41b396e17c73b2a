//! # tabular-etl: batch ETL from an operational database into an analytical store
//!
//! Entities are read from a [`store::Source`], reshaped by a fixed pipeline of
//! column and row transformations and appended to a [`store::Sink`]. A second
//! phase reads the loaded tables back, derives join columns and replaces them,
//! and explodes budget lines into a per-phase allocation table.
//!
//! ## Features
//!
//! - **Declarative entity registry**: source/target names, renames, date columns,
//!   combined keys and reference joins in one YAML file
//! - **Ordered pipelines**: every entity gets the same deterministic step order,
//!   plus entity-specific steps from an explicit [`StepRegistry`]
//! - **Second-phase enrichment**: invoice links, project codes, parent codes and
//!   temporal allocation, each replacing its target with a backup kept
//! - **Postgres store**: pooled Diesel connections (feature: `postgres`)
//!
//! ## Example: registry entry
//!
//! ```yaml
//! entities:
//!   obr:
//!     source: obr
//!     target: FactObra
//!     primary_key: ide
//!     rename:
//!       res: nombre_obra
//!     date_columns: [fecinirea, fecfinpre]
//!     reference_join:
//!       reference: con
//!       join_column: cenide
//! directives:
//!   cen:
//!     insert:
//!       - {ide: 0, cenide: 0}
//! ```

// Core modules
pub mod calendar;
pub mod dataset;
pub mod error;
pub mod registry;

// Reshaping steps and their per-entity registry
pub mod step_registry;
pub mod transform;

// Sources and sinks
pub mod store;

// Phases
pub mod enrichment;
pub mod pipeline;

pub mod config;

// Re-export key types
pub use config::EtlConfig;
pub use dataset::{Dataset, Value};
pub use error::{EtlError, Result};
pub use registry::{EntityConfig, EntityRegistry, RegistryError};
pub use step_registry::{ReferenceLookup, StepFactory, StepRegistry};
pub use transform::{TransformError, Transformation};

pub use enrichment::{
    AllocationSettings, EnrichmentJob, EnrichmentReport, EnrichmentRunner,
};
pub use pipeline::{BatchReport, EtlProcess, PipelineBuilder, ReferenceCache};
pub use store::{InsertMode, MemoryStore, Sink, Source, StoreError};

#[cfg(feature = "postgres")]
pub use store::{Database, DatabaseConfig};
