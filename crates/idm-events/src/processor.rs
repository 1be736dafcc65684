//! Entity Event Processors

use serde::Serialize;

use crate::error::Result;
use crate::event::{EntityEvent, EventResult, EventType, PublishOutcome};

/// Order of processors that don't declare one.
pub const DEFAULT_ORDER: i32 = 0;

/// Publishes events, including secondary events raised by processors.
pub trait EventPublisher<T: EventType, C>: Send + Sync {
    fn publish(&self, event: EntityEvent<T, C>) -> Result<PublishOutcome<C>>;
}

/// A pluggable handler bound to one or more event types.
///
/// Processors run sequentially in ascending `order`; ties run in ascending
/// `name`. A processor may replace the content, add properties or close the
/// chain. Errors propagate to the `publish` caller unchanged.
pub trait EntityEventProcessor<T: EventType, C>: Send + Sync {
    /// Unique name within the event manager.
    fn name(&self) -> &str;

    /// Lower runs earlier. Negative values run before the defaults.
    fn order(&self) -> i32 {
        DEFAULT_ORDER
    }

    /// Event types this processor handles.
    fn event_types(&self) -> Vec<T>;

    /// Refinement over one event instance.
    fn conditional(&self, _event: &EntityEvent<T, C>) -> bool {
        true
    }

    fn process(
        &self,
        event: &EntityEvent<T, C>,
        publisher: &dyn EventPublisher<T, C>,
    ) -> anyhow::Result<EventResult<C>>;
}

/// Administrative view of a registered processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessorInfo {
    pub name: String,
    pub order: i32,
    pub event_types: Vec<String>,
    pub enabled: bool,
}
