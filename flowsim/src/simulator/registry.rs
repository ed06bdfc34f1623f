//! Registry of component schemas.

use super::catalog::StdComponent;
use crate::model::ComponentSchema;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory registry of component schemas keyed by FQN.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    entries: RwLock<HashMap<String, ComponentSchema>>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-filled with the standard library.
    #[must_use]
    pub fn with_standard_library() -> Self {
        let registry = Self::new();
        for component in StdComponent::ALL {
            registry.register(
                ComponentSchema::new(component.fqn()).with_description(component.description()),
            );
        }
        registry
    }

    /// Registers or replaces a schema. Returns the previous one, if any.
    pub fn register(&self, schema: ComponentSchema) -> Option<ComponentSchema> {
        self.entries.write().insert(schema.fqn.clone(), schema)
    }

    /// Looks up a schema by exact FQN, then by standard-library alias.
    #[must_use]
    pub fn get(&self, fqn: &str) -> Option<ComponentSchema> {
        let entries = self.entries.read();
        entries.get(fqn).cloned().or_else(|| {
            StdComponent::from_fqn(fqn).and_then(|c| entries.get(c.fqn()).cloned())
        })
    }

    /// All schemas, sorted by FQN.
    #[must_use]
    pub fn list(&self) -> Vec<ComponentSchema> {
        let mut schemas: Vec<_> = self.entries.read().values().cloned().collect();
        schemas.sort_by(|a, b| a.fqn.cmp(&b.fqn));
        schemas
    }

    /// Removes a schema.
    pub fn remove(&self, fqn: &str) -> Option<ComponentSchema> {
        self.entries.write().remove(fqn)
    }

    /// Number of schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
