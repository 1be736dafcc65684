//! Authorization Manager
//!
//! Composes every applicable policy of an entity type:
//! - predicate for permissions `P`: `AND(p in P) OR(policy) condition(policy, p)`
//! - predicate for no permissions: `OR(policy) condition(policy)`
//! - permissions on an instance: union of each matching policy's grant
//!
//! No applicable policy means default deny. Policies whose evaluator is
//! unknown, unsupported or misconfigured contribute nothing.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use idm_common::SecuredEntity;

use crate::actor::Actor;
use crate::evaluator::{has_authority, AuthorizationEvaluator, Authorizer, EvaluationContext};
use crate::permission::{Permission, PermissionSet};
use crate::policy::{AuthorizationPolicy, PolicyStore};
use crate::predicate::Predicate;
use crate::registry::EvaluatorRegistry;

/// Default limit for transitive hops.
pub const DEFAULT_MAX_TRANSITIVE_DEPTH: usize = 8;

pub struct AuthorizationManager {
    evaluators: Arc<EvaluatorRegistry>,
    policies: Arc<dyn PolicyStore>,
    max_depth: usize,
}

impl AuthorizationManager {
    pub fn new(evaluators: Arc<EvaluatorRegistry>, policies: Arc<dyn PolicyStore>) -> Self {
        Self {
            evaluators,
            policies,
            max_depth: DEFAULT_MAX_TRANSITIVE_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn evaluators(&self) -> &EvaluatorRegistry {
        &self.evaluators
    }

    fn root<'a>(&'a self, actor: &'a Actor) -> EvaluationContext<'a> {
        EvaluationContext::new(actor, self, self.max_depth)
    }

    /// Enabled policies on `entity_type` that apply to the actor, in store order.
    pub fn policies_for(&self, actor: &Actor, entity_type: &str) -> Vec<AuthorizationPolicy> {
        self.policies
            .policies(entity_type)
            .into_iter()
            .filter(|p| p.applies_to(actor))
            .collect()
    }

    /// Predicate selecting instances on which the actor holds every permission
    /// in `permissions`, or any permission when `permissions` is empty.
    pub fn predicate(
        &self,
        actor: &Actor,
        entity_type: &str,
        permissions: &[Permission],
    ) -> Predicate {
        let ctx = self.root(actor);
        self.compose_predicate(&ctx, entity_type, permissions)
    }

    /// Permissions the actor holds on a loaded instance.
    pub fn permissions(&self, actor: &Actor, entity: &dyn SecuredEntity) -> PermissionSet {
        let ctx = self.root(actor);
        self.compose_permissions(&ctx, entity.entity_type(), Some(entity))
    }

    /// Permissions the actor would hold on a new instance of `entity_type`.
    pub fn permissions_for_new(&self, actor: &Actor, entity_type: &str) -> PermissionSet {
        let ctx = self.root(actor);
        self.compose_permissions(&ctx, entity_type, None)
    }

    pub fn can_create(&self, actor: &Actor, entity_type: &str) -> bool {
        self.permissions_for_new(actor, entity_type)
            .implies(&Permission::CREATE)
    }

    pub fn evaluate(
        &self,
        actor: &Actor,
        entity: &dyn SecuredEntity,
        permission: &Permission,
    ) -> bool {
        self.permissions(actor, entity).implies(permission)
    }

    /// Authorities the actor gains from all applicable policies.
    pub fn authorities(&self, actor: &Actor) -> BTreeSet<String> {
        let mut authorities = BTreeSet::new();
        for policy in self.policies.all().iter().filter(|p| p.applies_to(actor)) {
            if let Some(evaluator) = self.evaluator_for(policy) {
                authorities.extend(evaluator.authorities(policy));
            }
        }
        authorities
    }

    fn evaluator_for(
        &self,
        policy: &AuthorizationPolicy,
    ) -> Option<Arc<dyn AuthorizationEvaluator>> {
        let Some(evaluator) = self.evaluators.get(&policy.evaluator) else {
            warn!(
                policy_id = %policy.id,
                evaluator = %policy.evaluator,
                "Unknown evaluator, policy grants nothing"
            );
            return None;
        };
        if !evaluator.supports(&policy.entity_type) {
            warn!(
                policy_id = %policy.id,
                evaluator = %policy.evaluator,
                entity_type = %policy.entity_type,
                "Evaluator does not support entity type, policy grants nothing"
            );
            return None;
        }
        Some(evaluator)
    }

    /// One policy's contribution to a predicate.
    fn policy_predicate(
        &self,
        ctx: &EvaluationContext<'_>,
        policy: &AuthorizationPolicy,
        permissions: &[Permission],
    ) -> Predicate {
        if !has_authority(ctx.actor, policy, permissions) {
            return Predicate::False;
        }
        let Some(evaluator) = self.evaluator_for(policy) else {
            return Predicate::False;
        };
        match evaluator.predicate(ctx, policy, permissions) {
            Ok(Some(predicate)) => predicate,
            Ok(None) => Predicate::False,
            Err(e) => {
                warn!(policy_id = %policy.id, error = %e, "Policy predicate failed, denying");
                Predicate::False
            }
        }
    }

    /// One policy's contribution to an instance's permissions.
    fn policy_permissions(
        &self,
        ctx: &EvaluationContext<'_>,
        policy: &AuthorizationPolicy,
        entity: Option<&dyn SecuredEntity>,
    ) -> PermissionSet {
        if !has_authority(ctx.actor, policy, &[]) {
            return PermissionSet::new();
        }
        let Some(evaluator) = self.evaluator_for(policy) else {
            return PermissionSet::new();
        };
        match evaluator.permissions(ctx, entity, policy) {
            Ok(granted) => granted.restrict_to(&policy.permissions),
            Err(e) => {
                warn!(policy_id = %policy.id, error = %e, "Policy permissions failed, denying");
                PermissionSet::new()
            }
        }
    }
}

impl Authorizer for AuthorizationManager {
    fn compose_predicate(
        &self,
        ctx: &EvaluationContext<'_>,
        entity_type: &str,
        permissions: &[Permission],
    ) -> Predicate {
        let policies = self.policies_for(ctx.actor, entity_type);

        let predicate = if permissions.is_empty() {
            Predicate::or(policies.iter().map(|policy| self.policy_predicate(ctx, policy, &[])))
        } else {
            Predicate::and(permissions.iter().map(|permission| {
                let requested = std::slice::from_ref(permission);
                Predicate::or(
                    policies
                        .iter()
                        .map(|policy| self.policy_predicate(ctx, policy, requested)),
                )
            }))
        };

        debug!(
            actor = %ctx.actor.id,
            entity_type,
            policies = policies.len(),
            depth = ctx.depth,
            predicate = %predicate,
            "Authorization predicate composed"
        );
        predicate
    }

    fn compose_permissions(
        &self,
        ctx: &EvaluationContext<'_>,
        entity_type: &str,
        entity: Option<&dyn SecuredEntity>,
    ) -> PermissionSet {
        let mut granted = PermissionSet::new();
        for policy in self.policies_for(ctx.actor, entity_type) {
            granted.extend(self.policy_permissions(ctx, &policy, entity));
        }

        debug!(
            actor = %ctx.actor.id,
            entity_type,
            entity_id = entity.map(|e| e.id()).unwrap_or("<new>"),
            depth = ctx.depth,
            permissions = %granted,
            "Authorization permissions computed"
        );
        granted
    }
}
