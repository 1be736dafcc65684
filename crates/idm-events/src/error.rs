//! Event Pipeline Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventError {
    /// A processor failed. The original error is kept as is and can be
    /// recovered with `downcast_ref`.
    #[error(transparent)]
    Processor(anyhow::Error),

    #[error("Event {event_type} at depth {depth} exceeds maximum depth {max_depth}")]
    RecursionLimit {
        event_type: String,
        depth: usize,
        max_depth: usize,
    },

    #[error("Duplicate processor name: {0}")]
    DuplicateProcessor(String),
}

impl EventError {
    /// The processor's original error, if this is a processor failure.
    pub fn processor_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Processor(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_recursion_limit(&self) -> bool {
        matches!(self, Self::RecursionLimit { .. })
    }
}

pub type Result<T> = std::result::Result<T, EventError>;
