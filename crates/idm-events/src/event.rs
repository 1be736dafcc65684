//! Entity Events
//!
//! An event describes one in-progress domain operation: its type, the
//! content being operated on, a property bag, and an optional reference to
//! the event that caused it.

use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Closed, domain-specific event type enumeration.
///
/// Implemented automatically for any small `Copy` enum with `Display`.
pub trait EventType: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

impl<T> EventType for T where
    T: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

/// String-keyed event properties, in insertion order.
pub type EventProperties = IndexMap<String, Value>;

/// Reference to the event that caused a secondary event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRef {
    pub id: Uuid,
    pub event_type: String,
    /// Depth of the referenced event (root events are depth 0)
    pub depth: usize,
    /// Id of the root of the causal chain
    pub root_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct EntityEvent<T: EventType, C> {
    pub id: Uuid,
    pub event_type: T,
    pub content: C,
    pub properties: EventProperties,
    pub parent: Option<EventRef>,
    /// Closed events run no further processors
    pub closed: bool,
    pub created_at: DateTime<Utc>,
}

impl<T: EventType, C> EntityEvent<T, C> {
    pub fn new(event_type: T, content: C) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            content,
            properties: EventProperties::new(),
            parent: None,
            closed: false,
            created_at: Utc::now(),
        }
    }

    /// Secondary event caused by `parent`.
    pub fn child_of<P: EventType, PC>(
        parent: &EntityEvent<P, PC>,
        event_type: T,
        content: C,
    ) -> Self {
        let mut event = Self::new(event_type, content);
        event.parent = Some(parent.to_ref());
        event
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_properties(mut self, properties: EventProperties) -> Self {
        self.properties.extend(properties);
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Boolean property, `false` when absent or not a boolean.
    pub fn flag(&self, name: &str) -> bool {
        self.properties.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Number of causal ancestors.
    pub fn depth(&self) -> usize {
        self.parent.as_ref().map(|p| p.depth + 1).unwrap_or(0)
    }

    pub fn root_id(&self) -> Uuid {
        self.parent.as_ref().map(|p| p.root_id).unwrap_or(self.id)
    }

    pub fn to_ref(&self) -> EventRef {
        EventRef {
            id: self.id,
            event_type: self.event_type.to_string(),
            depth: self.depth(),
            root_id: self.root_id(),
        }
    }
}

/// Outcome of one processor run.
#[derive(Debug, Clone)]
pub struct EventResult<C> {
    pub event_id: Uuid,
    /// Name of the processor that produced the result
    pub processor: String,
    /// Content handed to the next processor
    pub content: C,
    /// Stops the chain when set
    pub closed: bool,
    /// Properties merged into the event for later processors
    pub properties: EventProperties,
}

impl<C> EventResult<C> {
    pub fn new<T: EventType, E>(
        event: &EntityEvent<T, E>,
        processor: impl Into<String>,
        content: C,
    ) -> Self {
        Self {
            event_id: event.id,
            processor: processor.into(),
            content,
            closed: false,
            properties: EventProperties::new(),
        }
    }

    pub fn close(mut self) -> Self {
        self.closed = true;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// What `publish` returns to its caller.
#[derive(Debug, Clone)]
pub struct PublishOutcome<C> {
    pub event_id: Uuid,
    /// Content produced by the last executed processor
    pub content: C,
    pub properties: EventProperties,
    /// Results in execution order
    pub results: Vec<EventResult<C>>,
    pub closed: bool,
}

impl<C> PublishOutcome<C> {
    pub fn into_content(self) -> C {
        self.content
    }

    /// Names of the processors that ran, in order.
    pub fn executed(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.processor.as_str()).collect()
    }
}
