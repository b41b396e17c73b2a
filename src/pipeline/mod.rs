//! First phase: extract every entity, reshape it and load it into the sink.
//!
//! ```text
//! Source ──count/read──> Extractor ──> Transformer ──> Loader ──> Sink
//!                                         │
//!                          PipelineBuilder + ReferenceCache
//! ```

pub mod builder;
pub mod cache;
pub mod extract;
pub mod load;
pub mod orchestrator;
pub mod transformer;

pub use builder::PipelineBuilder;
pub use cache::{CachedReferences, ReferenceCache};
pub use extract::{ExtractOutcome, Extractor};
pub use load::Loader;
pub use orchestrator::{BatchReport, EtlProcess, FailedEntity, LoadedEntity};
pub use transformer::{run_steps, Transformer};
