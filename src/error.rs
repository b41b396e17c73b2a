//! Crate-level error type.
//!
//! Lower layers have their own errors ([`TransformError`], [`StoreError`],
//! [`RegistryError`]); this enum attaches the entity, target or job they
//! happened in so the orchestrator can report them per entity.

use crate::registry::RegistryError;
use crate::store::StoreError;
use crate::transform::TransformError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EtlError>;

#[derive(Debug, Error)]
pub enum EtlError {
    /// A column required under the strict policy is missing.
    #[error("schema error in '{entity}': {source}")]
    Schema {
        entity: String,
        #[source]
        source: TransformError,
    },

    #[error("reference '{key}' unavailable: {reason}")]
    ReferenceUnavailable { key: String, reason: String },

    #[error("reading '{entity}' from source failed: {source}")]
    Source {
        entity: String,
        #[source]
        source: StoreError,
    },

    #[error("writing '{target}' failed: {source}")]
    SinkWrite {
        target: String,
        #[source]
        source: StoreError,
    },

    /// A second-phase job could not run because an input was empty or incomplete.
    #[error("enrichment job '{job}' aborted: {reason}")]
    EnrichmentJoin { job: String, reason: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("unknown enrichment job '{0}'")]
    UnknownJob(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EtlError {
    pub fn schema(entity: impl Into<String>, source: TransformError) -> Self {
        EtlError::Schema {
            entity: entity.into(),
            source,
        }
    }

    pub fn source_read(entity: impl Into<String>, source: StoreError) -> Self {
        EtlError::Source {
            entity: entity.into(),
            source,
        }
    }

    pub fn sink_write(target: impl Into<String>, source: StoreError) -> Self {
        EtlError::SinkWrite {
            target: target.into(),
            source,
        }
    }

    pub fn enrichment(job: impl Into<String>, reason: impl Into<String>) -> Self {
        EtlError::EnrichmentJoin {
            job: job.into(),
            reason: reason.into(),
        }
    }
}
