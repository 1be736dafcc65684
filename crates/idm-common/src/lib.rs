//! IdM Core Common
//!
//! Types shared by every IdM core crate:
//! - `SecuredEntity`: the attribute view the authorization engine evaluates
//! - `EntityRecord`: generic attribute-bag entity
//! - `EntityLookup` / `InMemoryEntityStore`: correlated lookups for `Exists` predicates
//! - `LoggingConfig` and `logging::init`

pub mod logging;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

pub use logging::LoggingConfig;

/// Attribute name that always resolves to the entity identifier.
pub const ID_ATTRIBUTE: &str = "id";

// ============================================================================
// Entity Model
// ============================================================================

/// An entity the authorization engine can reason about.
///
/// Implementations must resolve [`ID_ATTRIBUTE`] to the entity id so that
/// predicates and correlations can address it like any other attribute.
pub trait SecuredEntity: fmt::Debug + Send + Sync {
    /// Entity type name (e.g. `identity`, `role`, `identity-role`).
    fn entity_type(&self) -> &str;

    /// Stable identifier.
    fn id(&self) -> &str;

    /// Attribute value by name. `None` when the attribute is absent.
    fn attribute(&self, name: &str) -> Option<Value>;
}

/// Generic entity backed by a JSON attribute map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    pub entity_type: String,
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl EntityRecord {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }
}

impl SecuredEntity for EntityRecord {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        if name == ID_ATTRIBUTE {
            return Some(Value::String(self.id.clone()));
        }
        self.attributes.get(name).cloned()
    }
}

// ============================================================================
// Lookups
// ============================================================================

/// Resolves related entities by attribute value.
///
/// Used to evaluate correlated (`Exists`) predicates against loaded entities.
pub trait EntityLookup: Send + Sync {
    fn find_by_attribute(
        &self,
        entity_type: &str,
        attribute: &str,
        value: &Value,
    ) -> Vec<Arc<dyn SecuredEntity>>;
}

/// Lookup that never finds anything. Correlated predicates evaluate to false.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl EntityLookup for NoLookup {
    fn find_by_attribute(&self, _: &str, _: &str, _: &Value) -> Vec<Arc<dyn SecuredEntity>> {
        Vec::new()
    }
}

/// Thread-safe in-memory entity store, keyed by entity type then id.
///
/// Insertion order is preserved per type so listings are deterministic.
#[derive(Default)]
pub struct InMemoryEntityStore {
    entities: RwLock<HashMap<String, IndexMap<String, Arc<EntityRecord>>>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: EntityRecord) -> Arc<EntityRecord> {
        let record = Arc::new(record);
        let replaced = self
            .entities
            .write()
            .entry(record.entity_type.clone())
            .or_default()
            .insert(record.id.clone(), record.clone())
            .is_some();
        debug!(entity_type = %record.entity_type, id = %record.id, replaced, "Entity stored");
        record
    }

    pub fn get(&self, entity_type: &str, id: &str) -> Option<Arc<EntityRecord>> {
        self.entities
            .read()
            .get(entity_type)
            .and_then(|by_id| by_id.get(id).cloned())
    }

    pub fn remove(&self, entity_type: &str, id: &str) -> Option<Arc<EntityRecord>> {
        let removed = self
            .entities
            .write()
            .get_mut(entity_type)
            .and_then(|by_id| by_id.shift_remove(id));
        debug!(entity_type, id, found = removed.is_some(), "Entity removed");
        removed
    }

    pub fn all(&self, entity_type: &str) -> Vec<Arc<EntityRecord>> {
        self.entities
            .read()
            .get(entity_type)
            .map(|by_id| by_id.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, entity_type: &str) -> usize {
        self.entities
            .read()
            .get(entity_type)
            .map(IndexMap::len)
            .unwrap_or(0)
    }
}

impl EntityLookup for InMemoryEntityStore {
    fn find_by_attribute(
        &self,
        entity_type: &str,
        attribute: &str,
        value: &Value,
    ) -> Vec<Arc<dyn SecuredEntity>> {
        self.all(entity_type)
            .into_iter()
            .filter(|record| record.attribute(attribute).as_ref() == Some(value))
            .map(|record| record as Arc<dyn SecuredEntity>)
            .collect()
    }
}
