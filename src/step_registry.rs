//! Registry of entity-specific steps.
//!
//! Maps an entity key to the factories that build its custom steps. The
//! pipeline builder appends whatever the factories return after the generic
//! reshaping steps. Factories that need another entity's data ask the
//! [`ReferenceLookup`] they are given; when it has nothing the factory simply
//! returns no steps.

use crate::dataset::Dataset;
use crate::transform::{
    CompositeKey, DropOrphanDeliveries, ExecutionMonths, FirstOriginCode, SuffixJoin,
    Transformation,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Access to reference datasets while steps are being built.
pub trait ReferenceLookup {
    /// The reference dataset for `key`, or `None` when it is unavailable or empty.
    fn reference(&mut self, key: &str) -> Option<Arc<Dataset>>;
}

/// Builds the custom steps of one entity.
pub trait StepFactory: Send + Sync {
    fn build(&self, references: &mut dyn ReferenceLookup) -> Vec<Box<dyn Transformation>>;
}

/// Closures work as factories.
impl<F> StepFactory for F
where
    F: Fn(&mut dyn ReferenceLookup) -> Vec<Box<dyn Transformation>> + Send + Sync,
{
    fn build(&self, references: &mut dyn ReferenceLookup) -> Vec<Box<dyn Transformation>> {
        self(references)
    }
}

/// Entity key -> step factories, in registration order.
pub struct StepRegistry {
    factories: HashMap<String, Vec<Box<dyn StepFactory>>>,
}

impl StepRegistry {
    /// A registry with no custom steps.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// The steps shipped for the built-in entities.
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.register(
            "obr",
            Box::new(|_: &mut dyn ReferenceLookup| -> Vec<Box<dyn Transformation>> {
                vec![Box::new(ExecutionMonths::new(
                    "fecinirea",
                    "fecfinpre",
                    "plazo_ejecucion",
                ))]
            }),
        );
        registry.register(
            "obrfas",
            Box::new(|_: &mut dyn ReferenceLookup| -> Vec<Box<dyn Transformation>> {
                vec![Box::new(CompositeKey::new("obride", "fasnum"))]
            }),
        );
        registry.register(
            "obrparpre",
            Box::new(|_: &mut dyn ReferenceLookup| -> Vec<Box<dyn Transformation>> {
                vec![Box::new(CompositeKey::new("obride", "fas"))]
            }),
        );
        registry.register(
            "dca",
            Box::new(|_: &mut dyn ReferenceLookup| -> Vec<Box<dyn Transformation>> {
                vec![Box::new(DropOrphanDeliveries::default())]
            }),
        );
        registry.register(
            "dcf",
            Box::new(|refs: &mut dyn ReferenceLookup| -> Vec<Box<dyn Transformation>> {
                match refs.reference("dcfpro") {
                    Some(lines) => vec![Box::new(FirstOriginCode::new(lines))],
                    None => Vec::new(),
                }
            }),
        );
        registry.register(
            "dcapro",
            Box::new(|refs: &mut dyn ReferenceLookup| -> Vec<Box<dyn Transformation>> {
                match refs.reference("obrparpar") {
                    Some(items) => vec![Box::new(SuffixJoin::new(items, "paride", "ide", "_obrpar"))],
                    None => Vec::new(),
                }
            }),
        );

        registry
    }

    /// Add a factory for `key`. Factories of one key run in registration order.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use tabular_etl::step_registry::{ReferenceLookup, StepRegistry};
    /// use tabular_etl::transform::{CompositeKey, Transformation};
    ///
    /// let mut registry = StepRegistry::new();
    /// registry.register("obrfas", Box::new(|_: &mut dyn ReferenceLookup| {
    ///     vec![Box::new(CompositeKey::new("obride", "fasnum")) as Box<dyn Transformation>]
    /// }));
    /// ```
    pub fn register(&mut self, key: impl Into<String>, factory: Box<dyn StepFactory>) {
        self.factories.entry(key.into()).or_default().push(factory);
    }

    /// Build the custom steps of `key`.
    pub fn steps_for(
        &self,
        key: &str,
        references: &mut dyn ReferenceLookup,
    ) -> Vec<Box<dyn Transformation>> {
        self.factories
            .get(key)
            .map(|factories| {
                factories
                    .iter()
                    .flat_map(|factory| factory.build(references))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_steps(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Keys with at least one factory, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.factories.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;

    struct NoReferences;

    impl ReferenceLookup for NoReferences {
        fn reference(&mut self, _key: &str) -> Option<Arc<Dataset>> {
            None
        }
    }

    struct Recording(Vec<String>, Arc<Dataset>);

    impl ReferenceLookup for Recording {
        fn reference(&mut self, key: &str) -> Option<Arc<Dataset>> {
            self.0.push(key.to_string());
            Some(self.1.clone())
        }
    }

    fn names(steps: &[Box<dyn Transformation>]) -> Vec<&str> {
        steps.iter().map(|s| s.name()).collect()
    }

    #[test]
    fn test_builtin_steps() {
        let registry = StepRegistry::builtin();

        assert_eq!(
            registry.list(),
            vec!["dca", "dcapro", "dcf", "obr", "obrfas", "obrparpre"]
        );
        assert_eq!(
            names(&registry.steps_for("obr", &mut NoReferences)),
            vec!["execution_months"]
        );
        assert!(registry.steps_for("cen", &mut NoReferences).is_empty());
        assert!(!registry.has_steps("cen"));
    }

    #[test]
    fn test_reference_steps_omitted_without_reference() {
        let registry = StepRegistry::builtin();
        assert!(registry.steps_for("dcf", &mut NoReferences).is_empty());
        assert!(registry.steps_for("dcapro", &mut NoReferences).is_empty());
    }

    #[test]
    fn test_reference_steps_ask_for_their_reference() {
        let registry = StepRegistry::builtin();
        let reference = Arc::new(
            Dataset::from_columns(vec![
                ("docide", vec![Value::Int(1)]),
                ("docoricod", vec![Value::from("X")]),
            ])
            .unwrap(),
        );
        let mut lookup = Recording(Vec::new(), reference);

        let steps = registry.steps_for("dcf", &mut lookup);

        assert_eq!(names(&steps), vec!["first_origin_code"]);
        assert_eq!(lookup.0, vec!["dcfpro"]);
    }

    #[test]
    fn test_register_appends_in_order() {
        let mut registry = StepRegistry::new();
        registry.register(
            "x",
            Box::new(|_: &mut dyn ReferenceLookup| -> Vec<Box<dyn Transformation>> {
                vec![Box::new(CompositeKey::new("a", "b"))]
            }),
        );
        registry.register(
            "x",
            Box::new(|_: &mut dyn ReferenceLookup| -> Vec<Box<dyn Transformation>> {
                vec![Box::new(DropOrphanDeliveries::default())]
            }),
        );

        assert_eq!(
            names(&registry.steps_for("x", &mut NoReferences)),
            vec!["composite_key", "drop_orphan_deliveries"]
        );
    }
}
