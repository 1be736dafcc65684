//! Bulk delete over an in-memory identity store.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use idm_authz::{
    Actor, AuthorizationManager, AuthorizationPolicy, EvaluatorRegistry, InMemoryPolicyStore,
    Permission, Predicate,
};
use idm_bulk::{
    BulkActionExecutor, BulkError, BulkItemOutcome, BulkItemSource, BulkSelection,
    CancellationToken, EventBulkAction, StoreItemSource,
};
use idm_common::{EntityRecord, InMemoryEntityStore, SecuredEntity};
use idm_events::{EntityEvent, EntityEventProcessor, EventManager, EventPublisher, EventResult};

const IDENTITY: &str = "identity";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum IdentityEvent {
    Delete,
}

impl fmt::Display for IdentityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IDENTITY_DELETE")
    }
}

/// Removes the identity from the store; refuses locked identities.
struct DeleteIdentityProcessor {
    store: Arc<InMemoryEntityStore>,
    /// Cancelled once this many identities were deleted
    cancel_after: Option<(usize, CancellationToken)>,
}

impl EntityEventProcessor<IdentityEvent, EntityRecord> for DeleteIdentityProcessor {
    fn name(&self) -> &str {
        "identity-delete-processor"
    }

    fn event_types(&self) -> Vec<IdentityEvent> {
        vec![IdentityEvent::Delete]
    }

    fn process(
        &self,
        event: &EntityEvent<IdentityEvent, EntityRecord>,
        _publisher: &dyn EventPublisher<IdentityEvent, EntityRecord>,
    ) -> anyhow::Result<EventResult<EntityRecord>> {
        if event.content.attribute("locked") == Some(serde_json::json!(true)) {
            anyhow::bail!("identity {} is locked", event.content.id);
        }
        self.store.remove(IDENTITY, &event.content.id);

        if let Some((limit, token)) = &self.cancel_after {
            let deleted = 5 - self.store.count(IDENTITY);
            if deleted >= *limit {
                token.cancel();
            }
        }
        Ok(EventResult::new(event, self.name(), event.content.clone()))
    }
}

struct Fixture {
    store: Arc<InMemoryEntityStore>,
    executor: BulkActionExecutor<IdentityEvent, EntityRecord>,
}

fn identities() -> Arc<InMemoryEntityStore> {
    let store = Arc::new(InMemoryEntityStore::new());
    for (id, state) in [
        ("i1", "VALID"),
        ("i2", "DISABLED"),
        ("i3", "VALID"),
        ("i4", "DISABLED"),
        ("i5", "VALID"),
    ] {
        store.insert(EntityRecord::new(IDENTITY, id).with_attribute("state", state));
    }
    store
}

fn fixture(
    store: Arc<InMemoryEntityStore>,
    policies: Vec<AuthorizationPolicy>,
    cancel_after: Option<(usize, CancellationToken)>,
) -> Fixture {
    let registry = EvaluatorRegistry::builder().with_defaults().build().unwrap();
    let authorization = Arc::new(AuthorizationManager::new(
        Arc::new(registry),
        Arc::new(InMemoryPolicyStore::with_policies(policies)),
    ));
    let events = Arc::new(
        EventManager::<IdentityEvent, EntityRecord>::builder()
            .register(Arc::new(DeleteIdentityProcessor {
                store: store.clone(),
                cancel_after,
            }))
            .build()
            .unwrap(),
    );
    let source = Arc::new(StoreItemSource::new(store.clone()));
    let executor =
        BulkActionExecutor::new(authorization, events, source).with_progress_interval(2);
    Fixture { store, executor }
}

fn delete_valid_only() -> AuthorizationPolicy {
    AuthorizationPolicy::new(IDENTITY, "attribute")
        .with_permissions([Permission::READ, Permission::DELETE])
        .with_property("attribute", "state")
        .with_property("value", "VALID")
}

fn delete_everything() -> AuthorizationPolicy {
    AuthorizationPolicy::new(IDENTITY, "base-permission").with_permission(Permission::DELETE)
}

fn delete_action() -> EventBulkAction<IdentityEvent> {
    EventBulkAction::delete(IDENTITY, IdentityEvent::Delete)
}

#[tokio::test]
async fn test_delete_skips_items_not_permitted() {
    let fixture = fixture(identities(), vec![delete_valid_only()], None);
    let actor = Actor::new("admin");

    let report = fixture
        .executor
        .execute(
            &actor,
            &delete_action(),
            &BulkSelection::ids(["i1", "i2", "i3", "i4", "i5"]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let counts = report.counts();
    assert_eq!(counts.succeeded, 3);
    assert_eq!(counts.not_permitted, 2);
    assert_eq!(counts.failed, 0);
    assert!(!report.cancelled);
    assert_eq!(report.ids_with("not_permitted"), vec!["i2", "i4"]);

    let remaining: Vec<String> = fixture.store.all(IDENTITY).iter().map(|r| r.id.clone()).collect();
    assert_eq!(remaining, vec!["i2", "i4"]);
}

#[tokio::test]
async fn test_item_failure_does_not_abort_batch() {
    let store = identities();
    store.insert(
        EntityRecord::new(IDENTITY, "i3")
            .with_attribute("state", "VALID")
            .with_attribute("locked", true),
    );
    let fixture = fixture(store, vec![delete_everything()], None);

    let report = fixture
        .executor
        .execute(
            &Actor::new("admin"),
            &delete_action(),
            &BulkSelection::all(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let counts = report.counts();
    assert_eq!(counts.succeeded, 4);
    assert_eq!(counts.failed, 1);
    assert_eq!(
        report.outcome("i3"),
        Some(&BulkItemOutcome::Failed {
            message: "identity i3 is locked".to_string()
        })
    );
    assert_eq!(fixture.store.count(IDENTITY), 1);
}

#[tokio::test]
async fn test_cancellation_marks_remaining_items_not_executed() {
    let token = CancellationToken::new();
    let fixture = fixture(identities(), vec![delete_everything()], Some((2, token.clone())));

    let report = fixture
        .executor
        .execute(&Actor::new("admin"), &delete_action(), &BulkSelection::all(), &token)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.ids_with("succeeded"), vec!["i1", "i2"]);
    assert_eq!(report.ids_with("not_executed"), vec!["i3", "i4", "i5"]);
    assert_eq!(fixture.store.count(IDENTITY), 3);
}

#[tokio::test]
async fn test_cancelled_before_start_executes_nothing() {
    let fixture = fixture(identities(), vec![delete_everything()], None);
    let token = CancellationToken::new();
    token.cancel();

    let report = fixture
        .executor
        .execute(&Actor::new("admin"), &delete_action(), &BulkSelection::all(), &token)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.counts().not_executed, 5);
    assert_eq!(fixture.store.count(IDENTITY), 5);
}

#[tokio::test]
async fn test_preview_runs_nothing() {
    let fixture = fixture(identities(), vec![delete_valid_only()], None);

    let preview = fixture
        .executor
        .preview(
            &Actor::new("admin"),
            &delete_action(),
            &BulkSelection::Filter(Predicate::not(Predicate::eq("state", "ARCHIVED"))),
        )
        .await
        .unwrap();

    assert_eq!(preview.total, 5);
    assert_eq!(preview.permitted, vec!["i1", "i3", "i5"]);
    assert_eq!(preview.not_permitted, vec!["i2", "i4"]);
    assert_eq!(fixture.store.count(IDENTITY), 5);
}

#[tokio::test]
async fn test_unknown_selected_ids_are_reported_not_found() {
    let fixture = fixture(identities(), vec![delete_valid_only()], None);
    let selection = BulkSelection::ids(["i3", "ghost", "i2", "i1", "gone"]);

    let preview = fixture
        .executor
        .preview(&Actor::new("admin"), &delete_action(), &selection)
        .await
        .unwrap();
    assert_eq!(preview.total, 5);
    assert_eq!(preview.permitted, vec!["i3", "i1"]);
    assert_eq!(preview.not_permitted, vec!["i2"]);
    assert_eq!(preview.not_found, vec!["ghost", "gone"]);

    let report = fixture
        .executor
        .execute(&Actor::new("admin"), &delete_action(), &selection, &CancellationToken::new())
        .await
        .unwrap();

    let ids: Vec<&str> = report.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["i3", "ghost", "i2", "i1", "gone"]);
    assert_eq!(report.counts().total(), 5);
    assert_eq!(report.ids_with("not_found"), vec!["ghost", "gone"]);
    assert_eq!(report.ids_with("succeeded"), vec!["i3", "i1"]);
    assert_eq!(report.outcome("i2"), Some(&BulkItemOutcome::NotPermitted));
    assert_eq!(fixture.store.count(IDENTITY), 3);
}

struct UnavailableSource;

#[async_trait]
impl BulkItemSource<EntityRecord> for UnavailableSource {
    async fn find(&self, _: &str, _: &BulkSelection) -> anyhow::Result<Vec<EntityRecord>> {
        anyhow::bail!("identity repository unavailable")
    }
}

#[tokio::test]
async fn test_source_failure_fails_the_action() {
    let registry = EvaluatorRegistry::builder().with_defaults().build().unwrap();
    let authorization = Arc::new(AuthorizationManager::new(
        Arc::new(registry),
        Arc::new(InMemoryPolicyStore::new()),
    ));
    let events = Arc::new(EventManager::<IdentityEvent, EntityRecord>::builder().build().unwrap());
    let executor = BulkActionExecutor::new(authorization, events, Arc::new(UnavailableSource));

    let err = executor
        .execute(
            &Actor::new("admin"),
            &delete_action(),
            &BulkSelection::all(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BulkError::Source { ref action, .. } if action == "identity-delete-bulk-action"
    ));
}
