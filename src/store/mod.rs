//! Source and sink interfaces plus their implementations.
//!
//! - [`MemoryStore`]: in-process tables, used by tests and dry runs
//! - [`Database`]: Postgres through a pooled Diesel connection (feature `postgres`)

pub mod memory;
pub mod schema;
pub mod sql;

#[cfg(feature = "postgres")]
pub mod database;

use crate::dataset::{Dataset, Value};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::warn;

pub use memory::MemoryStore;
pub use schema::{infer_schema, ColumnDef, ColumnType};

#[cfg(feature = "postgres")]
pub use database::{Database, DatabaseConfig, Pool, PooledConnection};

/// One row as returned by [`Sink::raw_query`].
pub type Record = IndexMap<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("could not decode row: {0}")]
    Decode(String),

    #[error("table '{0}' does not exist")]
    NotFound(String),

    #[error("table '{0}' already exists")]
    AlreadyExists(String),

    #[error("table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    #[error("duplicate primary key {key} in '{table}'")]
    DuplicateKey { table: String, key: String },

    #[error("{0} is not supported by this store")]
    Unsupported(&'static str),
}

/// How [`Sink::insert`] treats existing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Add rows to the existing table
    Append,
    /// Drop the table and recreate it from the dataset's inferred schema
    Replace,
}

/// Where entities are extracted from.
pub trait Source {
    fn list_entity_names(&self) -> Result<Vec<String>, StoreError>;

    fn row_count(&self, name: &str) -> Result<usize, StoreError>;

    /// Read a table, optionally restricted to `columns`.
    fn read(&self, name: &str, columns: Option<&[String]>) -> Result<Dataset, StoreError>;
}

/// Where transformed entities are loaded.
pub trait Sink {
    fn exists(&self, name: &str) -> Result<bool, StoreError>;

    fn create(
        &self,
        name: &str,
        schema: &[ColumnDef],
        primary_key: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Insert every row of `dataset`; returns the number of rows written.
    fn insert(&self, dataset: &Dataset, name: &str, mode: InsertMode) -> Result<usize, StoreError>;

    fn read_table(&self, name: &str) -> Result<Dataset, StoreError>;

    fn rename(&self, from: &str, to: &str) -> Result<(), StoreError>;

    /// Drop a table if it exists.
    fn drop_table(&self, name: &str) -> Result<(), StoreError>;

    fn raw_query(&self, sql: &str) -> Result<Vec<Record>, StoreError>;

    /// Swap `name` for a new table built from `dataset`.
    ///
    /// The default is two-phase: the current table is renamed to
    /// `<name>_backup` (replacing an older backup), then `name` is recreated
    /// and loaded. If the create or the insert fails, the half-built table is
    /// dropped and the backup is renamed back, so `name` keeps its previous
    /// contents. Should that rollback fail too, the backup is left in place.
    fn replace_table(
        &self,
        name: &str,
        dataset: &Dataset,
        primary_key: Option<&str>,
    ) -> Result<(), StoreError> {
        let backup = backup_name(name);
        let had_table = self.exists(name)?;
        if had_table {
            self.drop_table(&backup)?;
            self.rename(name, &backup)?;
        }

        let loaded = self
            .create(name, &infer_schema(dataset), primary_key)
            .and_then(|_| self.insert(dataset, name, InsertMode::Append));
        if let Err(e) = loaded {
            let rollback = self.drop_table(name).and_then(|_| {
                if had_table {
                    self.rename(&backup, name)
                } else {
                    Ok(())
                }
            });
            if let Err(rollback) = rollback {
                warn!(table = name, error = %rollback, "rollback failed, previous contents kept in backup");
            }
            return Err(e);
        }
        Ok(())
    }
}

pub fn backup_name(name: &str) -> String {
    format!("{}_backup", name)
}
