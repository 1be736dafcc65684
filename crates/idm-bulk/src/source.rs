//! Bulk Item Sources

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use idm_common::{EntityRecord, InMemoryEntityStore};

use crate::action::BulkSelection;

/// Loads the items of a selection.
#[async_trait]
pub trait BulkItemSource<C>: Send + Sync {
    /// Items of `entity_type` in `selection`, in selection order. Unknown ids
    /// are left out.
    async fn find(&self, entity_type: &str, selection: &BulkSelection) -> anyhow::Result<Vec<C>>;
}

/// Item source over an [`InMemoryEntityStore`].
pub struct StoreItemSource {
    store: Arc<InMemoryEntityStore>,
}

impl StoreItemSource {
    pub fn new(store: Arc<InMemoryEntityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BulkItemSource<EntityRecord> for StoreItemSource {
    async fn find(
        &self,
        entity_type: &str,
        selection: &BulkSelection,
    ) -> anyhow::Result<Vec<EntityRecord>> {
        let items: Vec<EntityRecord> = match selection {
            BulkSelection::Ids(ids) => ids
                .iter()
                .filter_map(|id| {
                    let found = self.store.get(entity_type, id);
                    if found.is_none() {
                        debug!(entity_type, id = %id, "Selected item not found");
                    }
                    found
                })
                .map(|record| record.as_ref().clone())
                .collect(),
            BulkSelection::Filter(predicate) => self
                .store
                .all(entity_type)
                .into_iter()
                .filter(|record| predicate.matches(record.as_ref(), self.store.as_ref()))
                .map(|record| record.as_ref().clone())
                .collect(),
        };
        Ok(items)
    }
}
