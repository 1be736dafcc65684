//! Transitive Evaluator
//!
//! Secures an entity type through an owner of another type. A policy on
//! `identity-role` using a transitive evaluator over `identity` grants on an
//! assignment whatever the actor holds on the assigned identity, clamped to
//! the policy's own permissions.
//!
//! Predicate: `exists owner[owner_attribute = attribute] (owner predicate)`.
//! Permissions: union of the permissions on every owner resolved through an
//! [`OwnerResolver`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use idm_common::{EntityLookup, SecuredEntity};

use super::{AuthorizationEvaluator, EvaluationContext};
use crate::error::{AuthorizationError, Result};
use crate::permission::{Permission, PermissionSet};
use crate::policy::AuthorizationPolicy;
use crate::predicate::{Correlation, Predicate};

// ============================================================================
// Owner resolution
// ============================================================================

/// Loads the owners of a secured entity.
pub trait OwnerResolver: Send + Sync {
    /// Every owner correlated with `entity`. Empty when the reference is
    /// unset or dangling.
    fn resolve(
        &self,
        entity: &dyn SecuredEntity,
        owner_type: &str,
        correlation: &Correlation,
    ) -> Vec<Arc<dyn SecuredEntity>>;
}

/// Resolves owners through an [`EntityLookup`] using the correlation.
///
/// Must be backed by the same lookup the `Exists` predicates are matched
/// against, otherwise the two authorization paths can disagree.
pub struct LookupOwnerResolver {
    lookup: Arc<dyn EntityLookup>,
}

impl LookupOwnerResolver {
    pub fn new(lookup: Arc<dyn EntityLookup>) -> Self {
        Self { lookup }
    }
}

impl OwnerResolver for LookupOwnerResolver {
    fn resolve(
        &self,
        entity: &dyn SecuredEntity,
        owner_type: &str,
        correlation: &Correlation,
    ) -> Vec<Arc<dyn SecuredEntity>> {
        match entity.attribute(&correlation.attribute) {
            None | Some(Value::Null) => Vec::new(),
            Some(reference) => {
                self.lookup
                    .find_by_attribute(owner_type, &correlation.owner_attribute, &reference)
            }
        }
    }
}

// ============================================================================
// Evaluator
// ============================================================================

pub struct TransitiveEvaluator {
    id: String,
    entity_type: String,
    owner_type: String,
    correlation: Correlation,
    resolver: Arc<dyn OwnerResolver>,
}

impl fmt::Debug for TransitiveEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitiveEvaluator")
            .field("id", &self.id)
            .field("entity_type", &self.entity_type)
            .field("owner_type", &self.owner_type)
            .field("correlation", &self.correlation)
            .finish()
    }
}

impl TransitiveEvaluator {
    pub fn new(
        id: impl Into<String>,
        entity_type: impl Into<String>,
        owner_type: impl Into<String>,
        correlation: Correlation,
        resolver: Arc<dyn OwnerResolver>,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            owner_type: owner_type.into(),
            correlation,
            resolver,
        }
    }

    /// Transitive evaluator resolving owners from `lookup`.
    pub fn with_lookup(
        id: impl Into<String>,
        entity_type: impl Into<String>,
        owner_type: impl Into<String>,
        correlation: Correlation,
        lookup: Arc<dyn EntityLookup>,
    ) -> Self {
        Self::new(
            id,
            entity_type,
            owner_type,
            correlation,
            Arc::new(LookupOwnerResolver::new(lookup)),
        )
    }

    pub fn owner_type(&self) -> &str {
        &self.owner_type
    }

    pub fn correlation(&self) -> &Correlation {
        &self.correlation
    }

    fn check_depth(&self, ctx: &EvaluationContext<'_>) -> Result<()> {
        if ctx.depth_exhausted() {
            warn!(
                evaluator = %self.id,
                entity_type = %self.entity_type,
                owner_type = %self.owner_type,
                max_depth = ctx.max_depth,
                "Transitive evaluation depth exceeded"
            );
            return Err(AuthorizationError::DepthExceeded {
                entity_type: self.entity_type.clone(),
                max_depth: ctx.max_depth,
            });
        }
        Ok(())
    }
}

impl AuthorizationEvaluator for TransitiveEvaluator {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports(&self, entity_type: &str) -> bool {
        self.entity_type == entity_type
    }

    fn predicate(
        &self,
        ctx: &EvaluationContext<'_>,
        policy: &AuthorizationPolicy,
        permissions: &[Permission],
    ) -> Result<Option<Predicate>> {
        self.check_depth(ctx)?;
        let nested = ctx.nested();

        // Without requested permissions the owner must grant at least one of
        // the permissions this policy can pass through.
        let owner_predicate = if !permissions.is_empty() || policy.permissions.is_admin() {
            nested
                .authorizer
                .compose_predicate(&nested, &self.owner_type, permissions)
        } else {
            Predicate::or(policy.permissions.iter().map(|p| {
                nested
                    .authorizer
                    .compose_predicate(&nested, &self.owner_type, std::slice::from_ref(p))
            }))
        };

        debug!(
            evaluator = %self.id,
            owner_type = %self.owner_type,
            depth = ctx.depth,
            owner_predicate = %owner_predicate,
            "Transitive predicate composed"
        );
        Ok(Some(Predicate::exists(
            self.owner_type.clone(),
            self.correlation.clone(),
            owner_predicate,
        )))
    }

    fn permissions(
        &self,
        ctx: &EvaluationContext<'_>,
        entity: Option<&dyn SecuredEntity>,
        _policy: &AuthorizationPolicy,
    ) -> Result<PermissionSet> {
        self.check_depth(ctx)?;
        let Some(entity) = entity else {
            return Ok(PermissionSet::new());
        };
        let owners = self.resolver.resolve(entity, &self.owner_type, &self.correlation);
        if owners.is_empty() {
            debug!(evaluator = %self.id, entity_id = %entity.id(), "No owner resolved");
            return Ok(PermissionSet::new());
        }

        // Matches the `Exists` predicate: any correlated owner may grant.
        let nested = ctx.nested();
        let mut granted = PermissionSet::new();
        for owner in &owners {
            granted.extend(
                nested
                    .authorizer
                    .compose_permissions(&nested, &self.owner_type, Some(owner.as_ref())),
            );
        }
        Ok(granted)
    }

    fn authorities(&self, _policy: &AuthorizationPolicy) -> BTreeSet<String> {
        // Authorities come from the owner's own policies.
        BTreeSet::new()
    }
}
