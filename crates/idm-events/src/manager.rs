//! Event Manager
//!
//! Holds one precomputed chain per event type and publishes events through
//! it. A publish is a fold over the chain threading the event's content,
//! properties and closed flag: each processor sees the state produced by
//! its predecessors, and a closed state ends the fold.
//!
//! The manager is immutable after `build()`; concurrent publishes share
//! nothing but the chains.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, warn};

use crate::error::{EventError, Result};
use crate::event::{EntityEvent, EventRef, EventType, PublishOutcome};
use crate::processor::{EntityEventProcessor, EventPublisher, ProcessorInfo};

/// Default limit for nested secondary events.
pub const DEFAULT_MAX_DEPTH: usize = 16;

type SharedProcessor<T, C> = Arc<dyn EntityEventProcessor<T, C>>;

pub struct EventManager<T: EventType, C> {
    /// Every registered processor, sorted by order then name
    processors: Vec<SharedProcessor<T, C>>,
    chains: HashMap<T, Vec<SharedProcessor<T, C>>>,
    disabled: HashSet<String>,
    max_depth: usize,
}

impl<T: EventType, C: Clone + Send + Sync + 'static> EventManager<T, C> {
    pub fn builder() -> EventManagerBuilder<T, C> {
        EventManagerBuilder::default()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn info(&self, processor: &SharedProcessor<T, C>) -> ProcessorInfo {
        ProcessorInfo {
            name: processor.name().to_string(),
            order: processor.order(),
            event_types: processor.event_types().iter().map(ToString::to_string).collect(),
            enabled: !self.disabled.contains(processor.name()),
        }
    }

    /// Processors in the chain of `event_type`, in execution order.
    pub fn processors(&self, event_type: T) -> Vec<ProcessorInfo> {
        self.chains
            .get(&event_type)
            .map(|chain| chain.iter().map(|p| self.info(p)).collect())
            .unwrap_or_default()
    }

    /// Every registered processor, including disabled ones.
    pub fn describe(&self) -> Vec<ProcessorInfo> {
        self.processors.iter().map(|p| self.info(p)).collect()
    }

    pub fn has_processors(&self, event_type: T) -> bool {
        self.chains.get(&event_type).map(|c| !c.is_empty()).unwrap_or(false)
    }

    /// Run the event through its chain and return the final state.
    ///
    /// An event type without processors passes its content through.
    pub fn publish(&self, event: EntityEvent<T, C>) -> Result<PublishOutcome<C>> {
        let depth = event.depth();
        if depth > self.max_depth {
            warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                depth,
                max_depth = self.max_depth,
                "Event recursion limit reached, refusing to publish"
            );
            return Err(EventError::RecursionLimit {
                event_type: event.event_type.to_string(),
                depth,
                max_depth: self.max_depth,
            });
        }

        counter!("idm_events_published_total", "event_type" => event.event_type.to_string())
            .increment(1);

        let chain = self
            .chains
            .get(&event.event_type)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let mut state = event;
        let mut results = Vec::new();

        for processor in chain {
            if state.closed {
                debug!(
                    event_id = %state.id,
                    processor = processor.name(),
                    "Event closed, skipping remaining processors"
                );
                break;
            }
            if !processor.conditional(&state) {
                debug!(
                    event_id = %state.id,
                    processor = processor.name(),
                    "Processor condition not met"
                );
                continue;
            }

            debug!(
                event_id = %state.id,
                event_type = %state.event_type,
                processor = processor.name(),
                order = processor.order(),
                "Running processor"
            );

            let scoped = ScopedPublisher {
                manager: self,
                cause: state.to_ref(),
            };
            let result = match processor.process(&state, &scoped) {
                Ok(result) => result,
                Err(e) => {
                    counter!(
                        "idm_event_processor_failures_total",
                        "processor" => processor.name().to_string()
                    )
                    .increment(1);
                    warn!(
                        event_id = %state.id,
                        processor = processor.name(),
                        error = %e,
                        "Processor failed"
                    );
                    // Failures from nested publishes are already wrapped.
                    return Err(match e.downcast::<EventError>() {
                        Ok(inner) => inner,
                        Err(e) => EventError::Processor(e),
                    });
                }
            };

            state.content = result.content.clone();
            state
                .properties
                .extend(result.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
            state.closed = result.closed;
            results.push(result);
        }

        info!(
            event_id = %state.id,
            event_type = %state.event_type,
            depth,
            executed = results.len(),
            closed = state.closed,
            "Event published"
        );

        Ok(PublishOutcome {
            event_id: state.id,
            content: state.content,
            properties: state.properties,
            results,
            closed: state.closed,
        })
    }

    /// Publish a secondary event caused by `parent`.
    pub fn publish_child<P: EventType, PC>(
        &self,
        parent: &EntityEvent<P, PC>,
        event_type: T,
        content: C,
    ) -> Result<PublishOutcome<C>> {
        self.publish(EntityEvent::child_of(parent, event_type, content))
    }
}

impl<T: EventType, C: Clone + Send + Sync + 'static> EventPublisher<T, C> for EventManager<T, C> {
    fn publish(&self, event: EntityEvent<T, C>) -> Result<PublishOutcome<C>> {
        EventManager::publish(self, event)
    }
}

/// Publisher handed to a running processor.
///
/// Events published from inside `process` are secondary events of the event
/// being processed, whether or not the processor linked them with
/// `EntityEvent::child_of`, so the recursion limit sees their real depth.
struct ScopedPublisher<'a, T: EventType, C> {
    manager: &'a EventManager<T, C>,
    cause: EventRef,
}

impl<T, C> EventPublisher<T, C> for ScopedPublisher<'_, T, C>
where
    T: EventType,
    C: Clone + Send + Sync + 'static,
{
    fn publish(&self, mut event: EntityEvent<T, C>) -> Result<PublishOutcome<C>> {
        let linked = event
            .parent
            .as_ref()
            .map(|parent| parent.depth >= self.cause.depth)
            .unwrap_or(false);
        if !linked {
            event.parent = Some(self.cause.clone());
        }
        self.manager.publish(event)
    }
}

// ============================================================================
// Builder
// ============================================================================

pub struct EventManagerBuilder<T: EventType, C> {
    processors: Vec<SharedProcessor<T, C>>,
    disabled: HashSet<String>,
    max_depth: usize,
}

impl<T: EventType, C> Default for EventManagerBuilder<T, C> {
    fn default() -> Self {
        Self {
            processors: Vec::new(),
            disabled: HashSet::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl<T: EventType, C: Clone + Send + Sync + 'static> EventManagerBuilder<T, C> {
    pub fn register(mut self, processor: SharedProcessor<T, C>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn register_all(
        mut self,
        processors: impl IntoIterator<Item = SharedProcessor<T, C>>,
    ) -> Self {
        self.processors.extend(processors);
        self
    }

    /// Keep the processor registered but out of every chain.
    pub fn disable(mut self, name: impl Into<String>) -> Self {
        self.disabled.insert(name.into());
        self
    }

    pub fn disabled_processors(
        mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.disabled.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn build(self) -> Result<EventManager<T, C>> {
        let mut names = HashSet::new();
        for processor in &self.processors {
            if !names.insert(processor.name().to_string()) {
                return Err(EventError::DuplicateProcessor(processor.name().to_string()));
            }
        }
        for name in &self.disabled {
            if !names.contains(name) {
                warn!(processor = %name, "Disabled processor is not registered");
            }
        }

        let mut processors = self.processors;
        processors.sort_by(|a, b| a.order().cmp(&b.order()).then_with(|| a.name().cmp(b.name())));

        let mut chains: HashMap<T, Vec<SharedProcessor<T, C>>> = HashMap::new();
        for processor in processors.iter().filter(|p| !self.disabled.contains(p.name())) {
            let event_types: HashSet<T> = processor.event_types().into_iter().collect();
            for event_type in event_types {
                chains.entry(event_type).or_default().push(processor.clone());
            }
        }

        info!(
            processors = processors.len(),
            disabled = self.disabled.len(),
            event_types = chains.len(),
            max_depth = self.max_depth,
            "Event manager built"
        );

        Ok(EventManager {
            processors,
            chains,
            disabled: self.disabled,
            max_depth: self.max_depth,
        })
    }
}
