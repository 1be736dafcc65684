//! IdM Core Development Binary
//!
//! Wires the authorization engine, the event pipeline and the bulk action
//! executor over an in-memory store, then runs a sample bulk identity delete:
//! - identities, roles and identity-role assignments are seeded in memory
//! - identity-roles are secured transitively through their identity
//! - deleting an identity cascades to its identity-roles through secondary events
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `IDM_CONFIG` | - | Path of the TOML configuration |
//! | `IDM_LOG_LEVEL` | `info` | Overrides `logging.level` |
//! | `IDM_EVENTS_MAX_DEPTH` | `16` | Overrides `events.max_depth` |
//! | `IDM_DEV_ACTOR` | `admin` | Actor running the sample bulk action |
//! | `RUST_LOG` | - | Log filter, wins over the configured level |

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use idm_authz::{
    Actor, AuthorizationManager, AuthorizationPolicy, Correlation, EvaluatorRegistry,
    InMemoryPolicyStore, Permission, TransitiveEvaluator,
};
use idm_bulk::{
    BulkActionExecutor, BulkSelection, CancellationToken, EventBulkAction, StoreItemSource,
};
use idm_common::{EntityRecord, InMemoryEntityStore, SecuredEntity};
use idm_config::IdmConfig;
use idm_events::{EntityEvent, EntityEventProcessor, EventManager, EventPublisher, EventResult};

const IDENTITY: &str = "identity";
const ROLE: &str = "role";
const IDENTITY_ROLE: &str = "identity-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum IdmEvent {
    IdentityDelete,
    IdentityRoleDelete,
}

impl fmt::Display for IdmEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdentityDelete => f.write_str("IDENTITY_DELETE"),
            Self::IdentityRoleDelete => f.write_str("IDENTITY_ROLE_DELETE"),
        }
    }
}

/// Deletes the identity's role assignments, then the identity itself.
struct IdentityDeleteProcessor {
    store: Arc<InMemoryEntityStore>,
}

impl EntityEventProcessor<IdmEvent, EntityRecord> for IdentityDeleteProcessor {
    fn name(&self) -> &str {
        "identity-delete-processor"
    }

    fn event_types(&self) -> Vec<IdmEvent> {
        vec![IdmEvent::IdentityDelete]
    }

    fn process(
        &self,
        event: &EntityEvent<IdmEvent, EntityRecord>,
        publisher: &dyn EventPublisher<IdmEvent, EntityRecord>,
    ) -> anyhow::Result<EventResult<EntityRecord>> {
        let identity_id = event.content.id();
        let owner = Some(serde_json::Value::from(identity_id));
        let assignments: Vec<_> = self
            .store
            .all(IDENTITY_ROLE)
            .into_iter()
            .filter(|r| r.attribute(IDENTITY) == owner)
            .collect();

        for assignment in assignments {
            publisher.publish(EntityEvent::child_of(
                event,
                IdmEvent::IdentityRoleDelete,
                assignment.as_ref().clone(),
            ))?;
        }

        self.store
            .remove(IDENTITY, identity_id)
            .ok_or_else(|| anyhow::anyhow!("identity {} no longer exists", identity_id))?;
        Ok(EventResult::new(event, self.name(), event.content.clone()))
    }
}

struct IdentityRoleDeleteProcessor {
    store: Arc<InMemoryEntityStore>,
}

impl EntityEventProcessor<IdmEvent, EntityRecord> for IdentityRoleDeleteProcessor {
    fn name(&self) -> &str {
        "identity-role-delete-processor"
    }

    fn event_types(&self) -> Vec<IdmEvent> {
        vec![IdmEvent::IdentityRoleDelete]
    }

    fn process(
        &self,
        event: &EntityEvent<IdmEvent, EntityRecord>,
        _publisher: &dyn EventPublisher<IdmEvent, EntityRecord>,
    ) -> anyhow::Result<EventResult<EntityRecord>> {
        self.store.remove(IDENTITY_ROLE, event.content.id());
        Ok(EventResult::new(event, self.name(), event.content.clone()))
    }
}

/// Logs every delete after the store processors ran.
struct AuditProcessor;

impl EntityEventProcessor<IdmEvent, EntityRecord> for AuditProcessor {
    fn name(&self) -> &str {
        "audit-processor"
    }

    fn order(&self) -> i32 {
        100
    }

    fn event_types(&self) -> Vec<IdmEvent> {
        vec![IdmEvent::IdentityDelete, IdmEvent::IdentityRoleDelete]
    }

    fn process(
        &self,
        event: &EntityEvent<IdmEvent, EntityRecord>,
        _publisher: &dyn EventPublisher<IdmEvent, EntityRecord>,
    ) -> anyhow::Result<EventResult<EntityRecord>> {
        info!(
            event_type = %event.event_type,
            entity_id = event.content.id(),
            depth = event.depth(),
            root_id = %event.root_id(),
            "Audit"
        );
        Ok(EventResult::new(event, self.name(), event.content.clone()))
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn seed_store() -> Arc<InMemoryEntityStore> {
    let store = Arc::new(InMemoryEntityStore::new());
    for (id, state) in [
        ("alice", "VALID"),
        ("bob", "DISABLED"),
        ("carol", "VALID"),
        ("dave", "ARCHIVED"),
    ] {
        store.insert(EntityRecord::new(IDENTITY, id).with_attribute("state", state));
    }
    for (id, code) in [("r-admin", "ADMINISTRATOR"), ("r-user", "USER")] {
        store.insert(EntityRecord::new(ROLE, id).with_attribute("code", code));
    }
    for (id, identity, role) in [
        ("ir-1", "alice", "r-admin"),
        ("ir-2", "alice", "r-user"),
        ("ir-3", "bob", "r-user"),
        ("ir-4", "carol", "r-user"),
    ] {
        store.insert(
            EntityRecord::new(IDENTITY_ROLE, id)
                .with_attribute(IDENTITY, identity)
                .with_attribute(ROLE, role),
        );
    }
    store
}

fn default_policies() -> Vec<AuthorizationPolicy> {
    vec![
        AuthorizationPolicy::new(IDENTITY, "attribute")
            .with_id("valid-identity-manage")
            .with_permissions([Permission::READ, Permission::DELETE])
            .with_property("attribute", "state")
            .with_property("value", "VALID"),
        AuthorizationPolicy::new(IDENTITY, "base-permission")
            .with_id("identity-read")
            .with_permission(Permission::READ),
        AuthorizationPolicy::new(IDENTITY_ROLE, "identity-role-by-identity")
            .with_id("identity-role-by-identity")
            .with_permissions([Permission::READ, Permission::DELETE]),
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = IdmConfig::load_from_env()?;
    idm_common::logging::init(&config.logging)?;

    info!("Starting IdM development binary");

    let store = seed_store();

    let registry = EvaluatorRegistry::builder()
        .with_defaults()
        .register(Arc::new(TransitiveEvaluator::with_lookup(
            "identity-role-by-identity",
            IDENTITY_ROLE,
            IDENTITY,
            Correlation::by_id(IDENTITY),
            store.clone(),
        )))
        .build()?;

    if config.authorization.policies.is_empty() {
        info!("No policies configured, seeding defaults");
        config.authorization.policies = default_policies();
    }
    config.validate_policies(&registry)?;

    let authorization = Arc::new(
        AuthorizationManager::new(
            Arc::new(registry),
            Arc::new(InMemoryPolicyStore::with_policies(config.authorization.policies.clone())),
        )
        .with_max_depth(config.authorization.max_transitive_depth),
    );
    info!(evaluators = ?authorization.evaluators().ids(), "Authorization manager ready");

    let events = Arc::new(
        EventManager::<IdmEvent, EntityRecord>::builder()
            .register(Arc::new(IdentityDeleteProcessor { store: store.clone() }))
            .register(Arc::new(IdentityRoleDeleteProcessor { store: store.clone() }))
            .register(Arc::new(AuditProcessor))
            .disabled_processors(config.events.disabled_processors.iter().cloned())
            .max_depth(config.events.max_depth)
            .build()?,
    );
    for processor in events.describe() {
        info!(
            name = %processor.name,
            order = processor.order,
            event_types = ?processor.event_types,
            enabled = processor.enabled,
            "Processor registered"
        );
    }

    let actor = Actor::new(env_or("IDM_DEV_ACTOR", "admin"));

    let filter = authorization.predicate(&actor, IDENTITY_ROLE, &[Permission::DELETE]);
    info!(entity_type = IDENTITY_ROLE, predicate = %filter, "Delete filter");
    if !authorization.can_create(&actor, IDENTITY) {
        info!(actor = %actor.id, "Actor may not create identities");
    }

    let executor = BulkActionExecutor::new(
        authorization.clone(),
        events.clone(),
        Arc::new(StoreItemSource::new(store.clone())),
    )
    .with_progress_interval(config.bulk.progress_interval);

    let action = EventBulkAction::delete(IDENTITY, IdmEvent::IdentityDelete);
    let selection = BulkSelection::all();

    let preview = executor.preview(&actor, &action, &selection).await?;
    info!(total = preview.total, permitted = ?preview.permitted, "Bulk delete preview");

    let report = executor
        .execute(&actor, &action, &selection, &CancellationToken::new())
        .await?;
    if report.counts().failed > 0 {
        warn!("Some items failed");
    }
    info!(report = %serde_json::to_string(&report)?, "Bulk delete report");

    let remaining: Vec<String> = store
        .all(IDENTITY_ROLE)
        .iter()
        .map(|r| r.id().to_string())
        .collect();
    info!(
        identities = store.count(IDENTITY),
        identity_roles = ?remaining,
        "Done"
    );

    Ok(())
}
