//! The catalog of known model types.
//!
//! Registration-time validation reads this: a preparer can only be registered
//! for a model the catalog knows, and only when that model carries the entity
//! capability. Model and table names are declared explicitly; nothing is
//! derived from naming conventions.

use indexmap::IndexMap;

/// Definition of a single model type.
#[derive(Debug, Clone)]
pub struct ModelDef {
    name: String,
    table: String,
    primary_key: String,
    entity: bool,
}

impl ModelDef {
    /// Define a model with its canonical storage table. The primary key
    /// defaults to `id` and the entity capability defaults to on.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: "id".to_string(),
            entity: true,
        }
    }

    /// Override the primary key field.
    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = field.into();
        self
    }

    /// Mark this model as not carrying the entity capability (a projection,
    /// a report row). Such models cannot take preparers.
    pub fn non_entity(mut self) -> Self {
        self.entity = false;
        self
    }

    /// The model type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The storage table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The primary key field.
    pub fn primary_key_field(&self) -> &str {
        &self.primary_key
    }

    /// Whether the model carries the entity capability.
    pub fn is_entity(&self) -> bool {
        self.entity
    }
}

/// The set of model types a registry knows about.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    models: IndexMap<String, ModelDef>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model definition. Re-adding a name replaces the definition.
    pub fn model(mut self, def: ModelDef) -> Self {
        self.models.insert(def.name.clone(), def);
        self
    }

    /// Look up a model by name.
    pub fn get(&self, name: &str) -> Option<&ModelDef> {
        self.models.get(name)
    }

    /// Whether the catalog knows this model.
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// All model definitions in insertion order.
    pub fn models(&self) -> impl Iterator<Item = &ModelDef> {
        self.models.values()
    }
}
