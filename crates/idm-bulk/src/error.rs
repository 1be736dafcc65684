//! Bulk Action Error Types
//!
//! Per-item failures never surface here; they are captured in the report.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BulkError {
    #[error("Failed to load items for bulk action {action}: {source}")]
    Source {
        action: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid bulk action: {0}")]
    Validation(String),
}

impl BulkError {
    pub fn load_failed(action: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Source {
            action: action.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BulkError>;
