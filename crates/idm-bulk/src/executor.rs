//! Bulk Action Executor
//!
//! Loads the selection, then for each item in order:
//! 1. reports selected ids the source did not return as `NotFound`
//! 2. stops if cancellation was requested (remaining items: `NotExecuted`)
//! 3. checks the actor's permissions on the item (`NotPermitted`)
//! 4. publishes the action's event (`Succeeded` or `Failed`)
//!
//! Item failures are recorded and the batch continues.

use std::sync::Arc;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use idm_authz::{Actor, AuthorizationManager, Permission};
use idm_common::SecuredEntity;
use idm_events::{EntityEvent, EventManager, EventType};

use crate::action::{BulkAction, BulkSelection};
use crate::error::{BulkError, Result};
use crate::report::{BulkActionReport, BulkItemOutcome, BulkPreview};
use crate::source::BulkItemSource;

/// Default number of items between progress log lines.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 100;

pub struct BulkActionExecutor<T: EventType, C> {
    authorization: Arc<AuthorizationManager>,
    events: Arc<EventManager<T, C>>,
    source: Arc<dyn BulkItemSource<C>>,
    progress_interval: usize,
}

impl<T, C> BulkActionExecutor<T, C>
where
    T: EventType,
    C: SecuredEntity + Clone + 'static,
{
    pub fn new(
        authorization: Arc<AuthorizationManager>,
        events: Arc<EventManager<T, C>>,
        source: Arc<dyn BulkItemSource<C>>,
    ) -> Self {
        Self {
            authorization,
            events,
            source,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    async fn load(&self, action: &dyn BulkAction<T>, selection: &BulkSelection) -> Result<Vec<C>> {
        if action.name().trim().is_empty() {
            return Err(BulkError::Validation("action name is empty".to_string()));
        }
        self.source
            .find(action.entity_type(), selection)
            .await
            .map_err(|e| BulkError::load_failed(action.name(), e))
    }

    /// Pairs every selected id with its loaded item. Ids the source did not
    /// return are paired with `None`.
    fn align(selection: &BulkSelection, items: Vec<C>) -> Vec<(String, Option<C>)> {
        let BulkSelection::Ids(ids) = selection else {
            return items.into_iter().map(|item| (item.id().to_string(), Some(item))).collect();
        };
        let mut items = items.into_iter().peekable();
        ids.iter()
            .map(|id| {
                let item = items.next_if(|item| item.id() == id.as_str());
                (id.clone(), item)
            })
            .collect()
    }

    fn permitted(&self, actor: &Actor, item: &C, required: &[Permission]) -> bool {
        let granted = self.authorization.permissions(actor, item);
        if required.is_empty() {
            !granted.is_empty()
        } else {
            granted.implies_all(required)
        }
    }

    fn process_item(
        &self,
        actor: &Actor,
        action: &dyn BulkAction<T>,
        required: &[Permission],
        item: C,
    ) -> BulkItemOutcome {
        if !self.permitted(actor, &item, required) {
            debug!(action = action.name(), item_id = item.id(), "Item not permitted");
            return BulkItemOutcome::NotPermitted;
        }

        let event =
            EntityEvent::new(action.event_type(), item).with_properties(action.properties());
        let item_id = event.content.id().to_string();
        match self.events.publish(event) {
            Ok(_) => {
                debug!(action = action.name(), item_id = %item_id, "Item processed");
                BulkItemOutcome::Succeeded
            }
            Err(e) => {
                warn!(action = action.name(), item_id = %item_id, error = %e, "Item failed");
                BulkItemOutcome::Failed { message: e.to_string() }
            }
        }
    }

    /// Run the action over the selection.
    pub async fn execute(
        &self,
        actor: &Actor,
        action: &dyn BulkAction<T>,
        selection: &BulkSelection,
        cancel: &CancellationToken,
    ) -> Result<BulkActionReport> {
        let items = Self::align(selection, self.load(action, selection).await?);
        let required = action.required_permissions();
        let total = items.len();

        info!(
            action = action.name(),
            entity_type = action.entity_type(),
            actor = %actor.id,
            total,
            "Starting bulk action"
        );

        let mut report = BulkActionReport::new(action.name(), action.entity_type());
        let mut items = items.into_iter();
        let mut processed = 0usize;

        while let Some((id, item)) = items.next() {
            let Some(item) = item else {
                debug!(action = action.name(), item_id = %id, "Selected item not found");
                report.record(id, BulkItemOutcome::NotFound);
                continue;
            };
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.record(id, BulkItemOutcome::NotExecuted);
                for (rest, item) in items.by_ref() {
                    let outcome = match item {
                        Some(_) => BulkItemOutcome::NotExecuted,
                        None => BulkItemOutcome::NotFound,
                    };
                    report.record(rest, outcome);
                }
                warn!(action = action.name(), processed, total, "Bulk action cancelled");
                break;
            }

            let outcome = self.process_item(actor, action, &required, item);
            counter!(
                "idm_bulk_items_total",
                "action" => action.name().to_string(),
                "outcome" => outcome.label()
            )
            .increment(1);
            report.record(id, outcome);

            processed += 1;
            if processed % self.progress_interval == 0 {
                info!(action = action.name(), processed, total, "Bulk action progress");
            }

            // Lets a canceller on the same runtime get scheduled between items.
            tokio::task::yield_now().await;
        }

        report.finish();
        let counts = report.counts();
        info!(
            action = action.name(),
            succeeded = counts.succeeded,
            not_permitted = counts.not_permitted,
            failed = counts.failed,
            not_executed = counts.not_executed,
            not_found = counts.not_found,
            cancelled = report.cancelled,
            "Bulk action finished"
        );
        Ok(report)
    }

    /// Count the items the actor may process without running anything.
    pub async fn preview(
        &self,
        actor: &Actor,
        action: &dyn BulkAction<T>,
        selection: &BulkSelection,
    ) -> Result<BulkPreview> {
        let items = Self::align(selection, self.load(action, selection).await?);
        let required = action.required_permissions();

        let mut preview = BulkPreview {
            total: items.len(),
            ..BulkPreview::default()
        };
        for (id, item) in items {
            match item {
                Some(item) if self.permitted(actor, &item, &required) => preview.permitted.push(id),
                Some(_) => preview.not_permitted.push(id),
                None => preview.not_found.push(id),
            }
        }
        Ok(preview)
    }
}
