//! IdM Bulk Actions
//!
//! Applies one event-driven operation across a selection of entities.
//! Items the actor may not process are reported as not permitted, item
//! failures are captured in the report, and cancellation is checked between
//! items.

pub mod action;
pub mod error;
pub mod executor;
pub mod report;
pub mod source;

pub use action::{BulkAction, BulkSelection, EventBulkAction};
pub use error::{BulkError, Result};
pub use executor::{BulkActionExecutor, DEFAULT_PROGRESS_INTERVAL};
pub use report::{BulkActionReport, BulkCounts, BulkItemOutcome, BulkItemReport, BulkPreview};
pub use source::{BulkItemSource, StoreItemSource};

pub use tokio_util::sync::CancellationToken;
