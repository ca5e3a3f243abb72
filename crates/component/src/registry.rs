//! Process-wide component registry.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::definition::ComponentDefinition;

/// Error returned when registering a component whose id is taken.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("component id already registered: {id}")]
pub struct DuplicateId {
    /// The conflicting component id.
    pub id: String,
}

/// Registry mapping component id to its immutable definition.
///
/// Populated once at startup, before the first request is served, and
/// injected (`Arc<ComponentRegistry>`) into the compiler, runner, and
/// gateway. Iteration order is insertion order, which keeps compiled
/// plans reproducible across processes registering the same set.
#[derive(Default)]
pub struct ComponentRegistry {
    components: IndexMap<String, Arc<ComponentDefinition>>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Fails when the id is already present —
    /// definitions are immutable for the process lifetime.
    pub fn register(&mut self, def: ComponentDefinition) -> Result<(), DuplicateId> {
        if self.components.contains_key(&def.id) {
            return Err(DuplicateId { id: def.id });
        }
        self.components.insert(def.id.clone(), Arc::new(def));
        Ok(())
    }

    /// Look up a definition by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<ComponentDefinition>> {
        self.components.get(id)
    }

    /// Whether a component with the given id is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.components.contains_key(id)
    }

    /// Iterate definitions in insertion order.
    pub fn list(&self) -> impl Iterator<Item = &Arc<ComponentDefinition>> {
        self.components.values()
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns `true` if no components are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("count", &self.components.len())
            .field("ids", &self.components.keys().collect::<Vec<_>>())
            .finish()
    }
}
