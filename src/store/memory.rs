//! In-process store implementing both [`Source`] and [`Sink`].

use super::schema::{infer_schema, ColumnDef};
use super::{InsertMode, Record, Sink, Source, StoreError};
use crate::dataset::{Dataset, Key};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashSet;

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: Vec<ColumnDef>,
    primary_key: Option<String>,
    data: Dataset,
}

/// Tables held in memory, keyed by name in creation order.
///
/// Enforces the same contracts a relational sink would: inserts into a
/// missing table fail, unknown columns fail and duplicate primary keys fail.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RefCell<IndexMap<String, MemoryTable>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table holding `dataset`, with an inferred schema and no key.
    pub fn with_table(self, name: &str, dataset: Dataset) -> Self {
        self.put(name, dataset);
        self
    }

    /// Create or overwrite a table holding `dataset`.
    pub fn put(&self, name: &str, dataset: Dataset) {
        self.tables.borrow_mut().insert(
            name.to_string(),
            MemoryTable {
                schema: infer_schema(&dataset),
                primary_key: None,
                data: dataset,
            },
        );
    }

    /// Snapshot of a table's contents.
    pub fn table(&self, name: &str) -> Option<Dataset> {
        self.tables.borrow().get(name).map(|t| t.data.clone())
    }

    pub fn primary_key(&self, name: &str) -> Option<String> {
        self.tables.borrow().get(name).and_then(|t| t.primary_key.clone())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.borrow().keys().cloned().collect()
    }
}

impl Source for MemoryStore {
    fn list_entity_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.table_names())
    }

    fn row_count(&self, name: &str) -> Result<usize, StoreError> {
        self.tables
            .borrow()
            .get(name)
            .map(|t| t.data.row_count())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn read(&self, name: &str, columns: Option<&[String]>) -> Result<Dataset, StoreError> {
        let tables = self.tables.borrow();
        let table = tables
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let Some(columns) = columns else {
            return Ok(table.data.clone());
        };

        let mut selected = Vec::with_capacity(columns.len());
        for column in columns {
            let values = table
                .data
                .column(column)
                .ok_or_else(|| StoreError::UnknownColumn {
                    table: name.to_string(),
                    column: column.clone(),
                })?;
            selected.push((column.clone(), values.to_vec()));
        }
        Dataset::from_columns(selected).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

impl Sink for MemoryStore {
    fn exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.tables.borrow().contains_key(name))
    }

    fn create(
        &self,
        name: &str,
        schema: &[ColumnDef],
        primary_key: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.borrow_mut();
        if tables.contains_key(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        let names: Vec<&str> = schema.iter().map(|c| c.name.as_str()).collect();
        let primary_key = primary_key
            .filter(|pk| names.contains(pk))
            .map(str::to_string);
        tables.insert(
            name.to_string(),
            MemoryTable {
                schema: schema.to_vec(),
                primary_key,
                data: Dataset::empty_with_columns(&names),
            },
        );
        Ok(())
    }

    fn insert(&self, dataset: &Dataset, name: &str, mode: InsertMode) -> Result<usize, StoreError> {
        if mode == InsertMode::Replace {
            self.drop_table(name)?;
            self.create(name, &infer_schema(dataset), None)?;
        }

        let mut tables = self.tables.borrow_mut();
        let table = tables
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        if let Some(column) = dataset
            .column_names()
            .find(|c| !table.schema.iter().any(|def| def.name == *c))
        {
            return Err(StoreError::UnknownColumn {
                table: name.to_string(),
                column: column.to_string(),
            });
        }

        if let Some(pk) = &table.primary_key {
            let mut seen: HashSet<Key> = table
                .data
                .column(pk)
                .unwrap_or_default()
                .iter()
                .filter_map(|v| v.key())
                .collect();
            for value in dataset.column(pk).unwrap_or_default() {
                if let Some(key) = value.key() {
                    if !seen.insert(key) {
                        return Err(StoreError::DuplicateKey {
                            table: name.to_string(),
                            key: value.to_string(),
                        });
                    }
                }
            }
        }

        for record in dataset.records() {
            table.data.push_record(&record);
        }
        Ok(dataset.row_count())
    }

    fn read_table(&self, name: &str) -> Result<Dataset, StoreError> {
        self.read(name, None)
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.borrow_mut();
        if tables.contains_key(to) {
            return Err(StoreError::AlreadyExists(to.to_string()));
        }
        let table = tables
            .shift_remove(from)
            .ok_or_else(|| StoreError::NotFound(from.to_string()))?;
        tables.insert(to.to_string(), table);
        Ok(())
    }

    fn drop_table(&self, name: &str) -> Result<(), StoreError> {
        self.tables.borrow_mut().shift_remove(name);
        Ok(())
    }

    fn raw_query(&self, _sql: &str) -> Result<Vec<Record>, StoreError> {
        Err(StoreError::Unsupported("raw SQL"))
    }
}
