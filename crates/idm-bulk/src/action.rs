//! Bulk Actions
//!
//! A bulk action applies one event-driven operation to every item of a
//! selection. The action names the event it publishes and the permissions
//! an actor must hold on an item for it to run.

use serde_json::Value;

use idm_authz::{Permission, Predicate};
use idm_events::{EventProperties, EventType};

/// Items a bulk action applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkSelection {
    /// Explicit entity ids
    Ids(Vec<String>),
    /// Every entity matching the filter
    Filter(Predicate),
}

impl BulkSelection {
    pub fn ids(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Ids(ids.into_iter().map(Into::into).collect())
    }

    pub fn all() -> Self {
        Self::Filter(Predicate::True)
    }
}

pub trait BulkAction<T: EventType>: Send + Sync {
    fn name(&self) -> &str;

    /// Entity type the selection is drawn from.
    fn entity_type(&self) -> &str;

    /// Event published for each permitted item.
    fn event_type(&self) -> T;

    /// Permissions required on each item.
    fn required_permissions(&self) -> Vec<Permission>;

    /// Properties attached to every published event.
    fn properties(&self) -> EventProperties {
        EventProperties::new()
    }
}

/// Bulk action that publishes one event per item.
#[derive(Debug, Clone)]
pub struct EventBulkAction<T: EventType> {
    name: String,
    entity_type: String,
    event_type: T,
    permissions: Vec<Permission>,
    properties: EventProperties,
}

impl<T: EventType> EventBulkAction<T> {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>, event_type: T) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            event_type,
            permissions: Vec::new(),
            properties: EventProperties::new(),
        }
    }

    /// Delete action requiring `DELETE` on every item.
    pub fn delete(entity_type: impl Into<String>, event_type: T) -> Self {
        let entity_type = entity_type.into();
        Self::new(format!("{}-delete-bulk-action", entity_type), entity_type, event_type)
            .requires(Permission::DELETE)
    }

    pub fn requires(mut self, permission: Permission) -> Self {
        if !self.permissions.contains(&permission) {
            self.permissions.push(permission);
        }
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

impl<T: EventType> BulkAction<T> for EventBulkAction<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn event_type(&self) -> T {
        self.event_type
    }

    fn required_permissions(&self) -> Vec<Permission> {
        self.permissions.clone()
    }

    fn properties(&self) -> EventProperties {
        self.properties.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_action() {
        let action = EventBulkAction::delete("identity", 7u8).with_property("force", true);

        assert_eq!(action.name(), "identity-delete-bulk-action");
        assert_eq!(action.entity_type(), "identity");
        assert_eq!(action.event_type(), 7);
        assert_eq!(action.required_permissions(), vec![Permission::DELETE]);
        assert_eq!(action.properties().get("force"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_required_permissions_deduplicated() {
        let action = EventBulkAction::new("disable", "identity", 1u8)
            .requires(Permission::UPDATE)
            .requires(Permission::UPDATE)
            .requires(Permission::READ);
        assert_eq!(action.required_permissions(), vec![Permission::UPDATE, Permission::READ]);
    }
}
