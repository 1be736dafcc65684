//! Bulk Action Reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to one selected item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkItemOutcome {
    Succeeded,
    /// The actor lacks the required permissions on the item
    NotPermitted,
    /// The event pipeline failed for the item
    Failed { message: String },
    /// The action was cancelled before the item was reached
    NotExecuted,
    /// The selected id matches no entity
    NotFound,
}

impl BulkItemOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::NotPermitted => "not_permitted",
            Self::Failed { .. } => "failed",
            Self::NotExecuted => "not_executed",
            Self::NotFound => "not_found",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemReport {
    pub id: String,
    #[serde(flatten)]
    pub outcome: BulkItemOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkCounts {
    pub succeeded: usize,
    pub not_permitted: usize,
    pub failed: usize,
    pub not_executed: usize,
    pub not_found: usize,
}

impl BulkCounts {
    pub fn total(&self) -> usize {
        self.succeeded + self.not_permitted + self.failed + self.not_executed + self.not_found
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkActionReport {
    pub action: String,
    pub entity_type: String,
    pub items: Vec<BulkItemReport>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BulkActionReport {
    pub fn new(action: impl Into<String>, entity_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            action: action.into(),
            entity_type: entity_type.into(),
            items: Vec::new(),
            cancelled: false,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn record(&mut self, id: impl Into<String>, outcome: BulkItemOutcome) {
        self.items.push(BulkItemReport {
            id: id.into(),
            outcome,
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    pub fn counts(&self) -> BulkCounts {
        let mut counts = BulkCounts::default();
        for item in &self.items {
            match item.outcome {
                BulkItemOutcome::Succeeded => counts.succeeded += 1,
                BulkItemOutcome::NotPermitted => counts.not_permitted += 1,
                BulkItemOutcome::Failed { .. } => counts.failed += 1,
                BulkItemOutcome::NotExecuted => counts.not_executed += 1,
                BulkItemOutcome::NotFound => counts.not_found += 1,
            }
        }
        counts
    }

    /// Outcome of the item with `id`, if it was selected.
    pub fn outcome(&self, id: &str) -> Option<&BulkItemOutcome> {
        self.items.iter().find(|i| i.id == id).map(|i| &i.outcome)
    }

    pub fn ids_with(&self, label: &str) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| i.outcome.label() == label)
            .map(|i| i.id.as_str())
            .collect()
    }
}

/// Result of a dry run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkPreview {
    pub total: usize,
    pub permitted: Vec<String>,
    pub not_permitted: Vec<String>,
    pub not_found: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mut report = BulkActionReport::new("delete", "identity");
        report.record("a", BulkItemOutcome::Succeeded);
        report.record("b", BulkItemOutcome::NotPermitted);
        report.record("c", BulkItemOutcome::Failed { message: "boom".into() });
        report.record("d", BulkItemOutcome::NotExecuted);
        report.record("e", BulkItemOutcome::Succeeded);
        report.record("f", BulkItemOutcome::NotFound);

        let counts = report.counts();
        assert_eq!(counts.succeeded, 2);
        assert_eq!(counts.not_permitted, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.not_executed, 1);
        assert_eq!(counts.not_found, 1);
        assert_eq!(counts.total(), 6);
        assert_eq!(report.ids_with("succeeded"), vec!["a", "e"]);
        assert_eq!(report.ids_with("not_found"), vec!["f"]);
    }

    #[test]
    fn test_item_serialization() {
        let item = BulkItemReport {
            id: "c".into(),
            outcome: BulkItemOutcome::Failed { message: "boom".into() },
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json, serde_json::json!({"id": "c", "status": "FAILED", "message": "boom"}));
    }
}
