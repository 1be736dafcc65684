//! Authorization manager scenarios over an in-memory identity domain.

use std::sync::Arc;

use idm_authz::{
    Actor, AuthorizationManager, AuthorizationPolicy, Correlation, EvaluatorRegistry,
    InMemoryPolicyStore, Permission, Predicate, TransitiveEvaluator,
};
use idm_common::{EntityRecord, InMemoryEntityStore, SecuredEntity};

const IDENTITY: &str = "identity";
const IDENTITY_ROLE: &str = "identity-role";
const ROLE: &str = "role";

struct Fixture {
    entities: Arc<InMemoryEntityStore>,
    policies: Arc<InMemoryPolicyStore>,
    manager: AuthorizationManager,
}

impl Fixture {
    fn new(policies: Vec<AuthorizationPolicy>) -> Self {
        let entities = Arc::new(InMemoryEntityStore::new());
        entities.insert(EntityRecord::new(IDENTITY, "alice").with_attribute("code", "alice"));
        entities.insert(EntityRecord::new(IDENTITY, "bob").with_attribute("code", "bob"));
        entities.insert(
            EntityRecord::new(IDENTITY_ROLE, "ir-alice")
                .with_attribute("identity", "alice")
                .with_attribute("role", "r-helpdesk"),
        );
        entities.insert(
            EntityRecord::new(IDENTITY_ROLE, "ir-bob")
                .with_attribute("identity", "bob")
                .with_attribute("role", "r-helpdesk"),
        );
        entities.insert(EntityRecord::new(ROLE, "r-helpdesk").with_attribute("parent", "r-admin"));
        entities.insert(EntityRecord::new(ROLE, "r-admin").with_attribute("parent", "r-helpdesk"));

        let registry = EvaluatorRegistry::builder()
            .with_defaults()
            .register(Arc::new(TransitiveEvaluator::with_lookup(
                "identity-role-by-identity",
                IDENTITY_ROLE,
                IDENTITY,
                Correlation::by_id("identity"),
                entities.clone(),
            )))
            .register(Arc::new(TransitiveEvaluator::with_lookup(
                "role-by-parent",
                ROLE,
                ROLE,
                Correlation::by_id("parent"),
                entities.clone(),
            )))
            .build()
            .unwrap();

        let policies = Arc::new(InMemoryPolicyStore::with_policies(policies));
        let manager =
            AuthorizationManager::new(Arc::new(registry), policies.clone()).with_max_depth(4);
        Self {
            entities,
            policies,
            manager,
        }
    }

    fn entity(&self, entity_type: &str, id: &str) -> Arc<EntityRecord> {
        self.entities.get(entity_type, id).unwrap()
    }

    fn visible(&self, actor: &Actor, entity_type: &str, permissions: &[Permission]) -> Vec<String> {
        let predicate = self.manager.predicate(actor, entity_type, permissions);
        self.entities
            .all(entity_type)
            .into_iter()
            .filter(|e| predicate.matches(e.as_ref(), self.entities.as_ref()))
            .map(|e| e.id().to_string())
            .collect()
    }
}

fn transitive_assignment_policy() -> AuthorizationPolicy {
    AuthorizationPolicy::new(IDENTITY_ROLE, "identity-role-by-identity")
        .with_id("assignments")
        .with_permissions([Permission::READ, Permission::UPDATE])
}

#[test]
fn test_transitive_grant_and_revoke() {
    let fixture = Fixture::new(vec![
        transitive_assignment_policy(),
        AuthorizationPolicy::new(IDENTITY, "self")
            .with_id("own-identity")
            .with_permission(Permission::READ),
    ]);
    let alice = Actor::new("alice");

    let own = fixture.entity(IDENTITY_ROLE, "ir-alice");
    let foreign = fixture.entity(IDENTITY_ROLE, "ir-bob");

    assert!(fixture.manager.evaluate(&alice, own.as_ref(), &Permission::READ));
    assert!(!fixture.manager.evaluate(&alice, own.as_ref(), &Permission::UPDATE));
    assert!(!fixture.manager.evaluate(&alice, foreign.as_ref(), &Permission::READ));
    assert_eq!(fixture.visible(&alice, IDENTITY_ROLE, &[Permission::READ]), vec!["ir-alice"]);

    fixture.policies.set_enabled("own-identity", false).unwrap();

    assert!(fixture.manager.permissions(&alice, own.as_ref()).is_empty());
    assert!(fixture.visible(&alice, IDENTITY_ROLE, &[Permission::READ]).is_empty());
}

#[test]
fn test_transitive_clamps_to_policy_permissions() {
    let fixture = Fixture::new(vec![
        transitive_assignment_policy(),
        AuthorizationPolicy::new(IDENTITY, "base-permission").with_permission(Permission::ADMIN),
    ]);
    let alice = Actor::new("alice");
    let assignment = fixture.entity(IDENTITY_ROLE, "ir-bob");

    let granted = fixture.manager.permissions(&alice, assignment.as_ref());
    assert_eq!(granted.to_vec(), vec![Permission::READ, Permission::UPDATE]);
    assert!(fixture.visible(&alice, IDENTITY_ROLE, &[Permission::DELETE]).is_empty());
    assert_eq!(fixture.visible(&alice, IDENTITY_ROLE, &[Permission::UPDATE]).len(), 2);
}

#[test]
fn test_default_deny_per_entity_type() {
    let fixture = Fixture::new(vec![
        AuthorizationPolicy::new(IDENTITY, "base-permission").with_permission(Permission::READ),
    ]);
    let alice = Actor::new("alice");

    assert_eq!(fixture.manager.predicate(&alice, ROLE, &[]), Predicate::False);
    for role in fixture.entities.all(ROLE) {
        assert!(fixture.manager.permissions(&alice, role.as_ref()).is_empty());
    }
}

#[test]
fn test_misconfigured_policy_grants_nothing_while_others_apply() {
    let fixture = Fixture::new(vec![
        AuthorizationPolicy::new(IDENTITY, "uuid")
            .with_id("broken")
            .with_permission(Permission::ADMIN),
        AuthorizationPolicy::new(IDENTITY, "codeable")
            .with_id("bob-only")
            .with_permission(Permission::READ)
            .with_property("identifier", "bob"),
    ]);
    let alice = Actor::new("alice");

    assert_eq!(fixture.visible(&alice, IDENTITY, &[]), vec!["bob"]);
    let bob = fixture.entity(IDENTITY, "bob");
    assert_eq!(fixture.manager.permissions(&alice, bob.as_ref()).to_vec(), vec![Permission::READ]);
    assert!(fixture
        .manager
        .permissions(&alice, fixture.entity(IDENTITY, "alice").as_ref())
        .is_empty());
}

#[test]
fn test_cyclic_transitive_policies_terminate() {
    let fixture = Fixture::new(vec![
        AuthorizationPolicy::new(ROLE, "role-by-parent")
            .with_id("inherit-from-parent")
            .with_permission(Permission::READ),
        AuthorizationPolicy::new(ROLE, "uuid")
            .with_id("nothing-matches")
            .with_permission(Permission::READ)
            .with_property("uuid", "6f1c1c1e-8a1d-4bb4-9a8e-0a43c1f3b6a2"),
    ]);
    let alice = Actor::new("alice");

    let role = fixture.entity(ROLE, "r-helpdesk");
    assert!(fixture.manager.permissions(&alice, role.as_ref()).is_empty());
    assert!(fixture.visible(&alice, ROLE, &[Permission::READ]).is_empty());
}

#[test]
fn test_group_permission_requires_authority() {
    let fixture = Fixture::new(vec![AuthorizationPolicy::new(IDENTITY, "base-permission")
        .with_group(IDENTITY)
        .with_permission(Permission::READ)]);
    let bob = fixture.entity(IDENTITY, "bob");

    let plain = Actor::new("alice");
    let reader = Actor::new("alice").with_authority("IDENTITY_READ");

    assert!(fixture.manager.permissions(&plain, bob.as_ref()).is_empty());
    assert_eq!(fixture.manager.predicate(&plain, IDENTITY, &[]), Predicate::False);
    assert!(fixture.manager.evaluate(&reader, bob.as_ref(), &Permission::READ));
    assert_eq!(fixture.manager.predicate(&reader, IDENTITY, &[]), Predicate::True);
}

#[test]
fn test_can_create_through_generic_rules() {
    let fixture = Fixture::new(vec![
        AuthorizationPolicy::new(ROLE, "base-permission").with_permission(Permission::CREATE),
        transitive_assignment_policy().with_permission(Permission::CREATE),
    ]);
    let alice = Actor::new("alice");

    assert!(fixture.manager.can_create(&alice, ROLE));
    assert!(!fixture.manager.can_create(&alice, IDENTITY_ROLE));
    assert!(!fixture.manager.can_create(&alice, IDENTITY));
}

#[test]
fn test_transitive_grant_from_any_correlated_owner() {
    let entities = Arc::new(InMemoryEntityStore::new());
    entities.insert(EntityRecord::new(IDENTITY, "i1").with_attribute("username", "alice"));
    entities.insert(
        EntityRecord::new(IDENTITY, "i2")
            .with_attribute("username", "alice")
            .with_attribute("code", "auditor"),
    );
    let request =
        entities.insert(EntityRecord::new("request", "q1").with_attribute("owner", "alice"));

    let registry = EvaluatorRegistry::builder()
        .with_defaults()
        .register(Arc::new(TransitiveEvaluator::with_lookup(
            "request-by-owner",
            "request",
            IDENTITY,
            Correlation::new("owner", "username"),
            entities.clone(),
        )))
        .build()
        .unwrap();
    let policies = InMemoryPolicyStore::with_policies([
        AuthorizationPolicy::new(IDENTITY, "codeable")
            .with_permission(Permission::READ)
            .with_property("identifier", "auditor"),
        AuthorizationPolicy::new("request", "request-by-owner").with_permission(Permission::READ),
    ]);
    let manager = AuthorizationManager::new(Arc::new(registry), Arc::new(policies));
    let actor = Actor::new("reviewer");

    let predicate = manager.predicate(&actor, "request", &[Permission::READ]);
    assert!(predicate.matches(request.as_ref(), entities.as_ref()));
    assert!(manager.evaluate(&actor, request.as_ref(), &Permission::READ));
}
