//! Entity registry loaded from YAML.
//!
//! Maps a short entity key to its source table, target table and the
//! declarative reshaping hints the pipeline builder turns into steps. Row
//! insertion and deletion directives live in the same document and are keyed
//! by entity key as well.

use crate::transform::rows::RowLiteral;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const BUILTIN_REGISTRY: &str = include_str!("../config/entities.yaml");

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read registry file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse registry YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid registry: {0}")]
    Invalid(String),
}

/// Configuration for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Entity key; filled from the map key when loading
    #[serde(skip)]
    pub key: String,

    /// Table name in the source
    pub source: String,

    /// Table name in the analytical store
    pub target: String,

    /// Unique key of the target, named after renaming
    #[serde(default)]
    pub primary_key: Option<String>,

    /// Old column name -> new column name
    #[serde(default)]
    pub rename: IndexMap<String, String>,

    /// Columns holding compact `YYYYMMDD` dates
    #[serde(default)]
    pub date_columns: Vec<String>,

    /// Treat a literal 0 in date columns as "no date"
    #[serde(default = "default_true")]
    pub zero_dates_are_null: bool,

    #[serde(default)]
    pub combine_columns: Vec<CombineSpec>,

    #[serde(default)]
    pub reference_join: Option<ReferenceJoinSpec>,
}

impl EntityConfig {
    /// Configuration for an unregistered key: same source and target name, no hints.
    pub fn passthrough(key: &str) -> Self {
        EntityConfig {
            key: key.to_string(),
            source: key.to_string(),
            target: key.to_string(),
            primary_key: None,
            rename: IndexMap::new(),
            date_columns: Vec::new(),
            zero_dates_are_null: true,
            combine_columns: Vec::new(),
            reference_join: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombineSpec {
    pub new_name: String,
    pub columns: Vec<String>,
    #[serde(default = "default_separator")]
    pub separator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceJoinSpec {
    /// Entity key of the reference dataset
    pub reference: String,

    /// Column of this entity matched against the reference id
    pub join_column: String,

    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Column prefix; defaults to the reference key
    #[serde(default)]
    pub prefix: Option<String>,
}

impl ReferenceJoinSpec {
    pub fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or(&self.reference)
    }
}

/// Literal rows to add to or remove from an entity before reshaping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowDirectives {
    #[serde(default)]
    pub insert: Vec<RowLiteral>,

    #[serde(default)]
    pub delete: Vec<RowLiteral>,
}

fn default_true() -> bool {
    true
}

fn default_separator() -> String {
    "_".to_string()
}

fn default_id_column() -> String {
    "ide".to_string()
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    entities: IndexMap<String, EntityConfig>,
    #[serde(default)]
    directives: IndexMap<String, RowDirectives>,
}

/// All registered entities, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: IndexMap<String, EntityConfig>,
    directives: IndexMap<String, RowDirectives>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shipped with the crate (`config/entities.yaml`).
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_yaml_str(BUILTIN_REGISTRY)
    }

    /// Load and validate a registry file.
    ///
    /// # Example
    /// ```ignore
    /// use tabular_etl::EntityRegistry;
    ///
    /// let registry = EntityRegistry::load_from_file("config/entities.yaml")?;
    /// println!("{} entities", registry.len());
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_yaml::from_str(yaml)?;
        let mut registry = EntityRegistry {
            entities: IndexMap::new(),
            directives: file.directives,
        };
        for (key, mut config) in file.entities {
            config.key = key.clone();
            registry.entities.insert(key, config);
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Register or replace an entity.
    pub fn insert(&mut self, mut config: EntityConfig) {
        if config.key.is_empty() {
            config.key = config.source.clone();
        }
        self.entities.insert(config.key.clone(), config);
    }

    pub fn set_directives(&mut self, key: impl Into<String>, directives: RowDirectives) {
        self.directives.insert(key.into(), directives);
    }

    pub fn get(&self, key: &str) -> Option<&EntityConfig> {
        self.entities.get(key)
    }

    /// The registered configuration, or a passthrough for unknown keys.
    pub fn resolve(&self, key: &str) -> Cow<'_, EntityConfig> {
        match self.entities.get(key) {
            Some(config) => Cow::Borrowed(config),
            None => Cow::Owned(EntityConfig::passthrough(key)),
        }
    }

    /// Target table for `key`; unknown keys map to themselves.
    pub fn target_name(&self, key: &str) -> String {
        self.entities
            .get(key)
            .map(|c| c.target.clone())
            .unwrap_or_else(|| key.to_string())
    }

    pub fn directives(&self, key: &str) -> Option<&RowDirectives> {
        self.directives.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityConfig> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Check cross-field consistency.
    ///
    /// - the primary key must survive renaming
    /// - target names must be unique
    /// - combine specs need a name and at least one column
    /// - directives must refer to registered entities
    pub fn validate(&self) -> Result<(), RegistryError> {
        let mut targets = HashSet::new();
        for config in self.entities.values() {
            if !targets.insert(config.target.as_str()) {
                return Err(RegistryError::Invalid(format!(
                    "target '{}' is used by more than one entity",
                    config.target
                )));
            }
            if let Some(pk) = &config.primary_key {
                if config.rename.contains_key(pk) {
                    return Err(RegistryError::Invalid(format!(
                        "entity '{}': primary key '{}' is renamed away",
                        config.key, pk
                    )));
                }
            }
            for spec in &config.combine_columns {
                if spec.new_name.is_empty() || spec.columns.is_empty() {
                    return Err(RegistryError::Invalid(format!(
                        "entity '{}': combine_columns entries need a new_name and columns",
                        config.key
                    )));
                }
            }
        }
        for key in self.directives.keys() {
            if !self.entities.contains_key(key) {
                return Err(RegistryError::Invalid(format!(
                    "directives given for unregistered entity '{}'",
                    key
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;

    #[test]
    fn test_builtin_registry_loads() {
        let registry = EntityRegistry::builtin().unwrap();

        let obr = registry.get("obr").unwrap();
        assert_eq!(obr.target, "FactObra");
        assert_eq!(obr.primary_key.as_deref(), Some("ide"));
        assert_eq!(obr.rename.get("res").map(String::as_str), Some("nombre_obra"));
        assert_eq!(obr.date_columns.len(), 11);
        assert_eq!(obr.reference_join.as_ref().unwrap().prefix(), "con");

        let con = registry.get("con").unwrap();
        assert_eq!(con.combine_columns[0].columns, vec!["tip", "est"]);

        let cen = registry.directives("cen").unwrap();
        assert_eq!(cen.insert[0]["cenide"], Value::Int(0));
        assert_eq!(cen.delete[0]["ide"], Value::Int(496414));
    }

    #[test]
    fn test_registry_preserves_declaration_order() {
        let registry = EntityRegistry::from_yaml_str(
            "entities:\n  zz: {source: z, target: Z}\n  aa: {source: a, target: A}\n",
        )
        .unwrap();
        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["zz", "aa"]);
        assert_eq!(registry.get("aa").unwrap().key, "aa");
    }

    #[test]
    fn test_unknown_key_resolves_to_itself() {
        let registry = EntityRegistry::builtin().unwrap();
        assert_eq!(registry.target_name("obrparpre_planif"), "obrparpre_planif");
        assert_eq!(registry.resolve("xyz").source, "xyz");
        assert_eq!(registry.target_name("dca"), "DimAlbaranCompra");
    }

    #[test]
    fn test_validate_rejects_renamed_primary_key() {
        let err = EntityRegistry::from_yaml_str(
            "entities:\n  a:\n    source: a\n    target: A\n    primary_key: ide\n    rename: {ide: id}\n",
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::Invalid(_)));
    }

    #[test]
    fn test_validate_rejects_orphan_directives() {
        let err = EntityRegistry::from_yaml_str(
            "entities:\n  a: {source: a, target: A}\ndirectives:\n  b:\n    delete: [{ide: 1}]\n",
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::Invalid(_)));
    }
}
