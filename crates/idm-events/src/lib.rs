//! IdM Event Pipeline
//!
//! Ordered, type-filtered processors for domain operations:
//! - `EntityEvent`: type tag, content, properties and causal parent
//! - `EntityEventProcessor`: a named handler with an `order`
//! - `EventManager`: builds one chain per event type and publishes through it
//!
//! Publishing is synchronous and runs on the caller's thread. Processor
//! failures reach the caller unchanged; nothing is retried.

pub mod error;
pub mod event;
pub mod manager;
pub mod processor;

pub use error::{EventError, Result};
pub use event::{EntityEvent, EventProperties, EventRef, EventResult, EventType, PublishOutcome};
pub use manager::{EventManager, EventManagerBuilder, DEFAULT_MAX_DEPTH};
pub use processor::{EntityEventProcessor, EventPublisher, ProcessorInfo, DEFAULT_ORDER};
