//! Authorization Evaluators
//!
//! An evaluator turns one [`AuthorizationPolicy`] into:
//! - a [`Predicate`] selecting the instances the policy grants access to
//! - the [`PermissionSet`] the policy grants on one loaded instance
//!
//! Evaluators only compute the policy's *condition*. The manager applies the
//! authority gate, clamps results to the policy's granted permissions, and
//! composes policies with OR.
//!
//! The two code paths must agree: for every entity `e`, the predicate
//! matches `e` exactly when the permission path grants a non-empty set.

pub mod basic;
pub mod transitive;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use idm_common::SecuredEntity;

use crate::actor::Actor;
use crate::error::Result;
use crate::permission::{authority, Permission, PermissionSet};
use crate::policy::AuthorizationPolicy;
use crate::predicate::Predicate;

pub use basic::{
    AttributeEvaluator, BasePermissionEvaluator, CodeableEvaluator, SecuredSubsetEvaluator,
    SelfEvaluator, UuidEvaluator,
};
pub use transitive::{LookupOwnerResolver, OwnerResolver, TransitiveEvaluator};

// ============================================================================
// Parameters
// ============================================================================

/// Value type a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    String,
    /// JSON boolean or the strings `"true"` / `"false"`
    Boolean,
    /// String holding a UUID
    Uuid,
    /// Any JSON value
    Any,
}

impl ParameterKind {
    /// Whether `value` is acceptable for this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Boolean => match value {
                Value::Bool(_) => true,
                Value::String(s) => {
                    matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "false")
                }
                _ => false,
            },
            Self::Uuid => value
                .as_str()
                .map(|s| uuid::Uuid::parse_str(s).is_ok())
                .unwrap_or(false),
            Self::Any => true,
        }
    }
}

/// A parameter an evaluator reads from the policy's property bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub kind: ParameterKind,
    pub required: bool,
    /// Value used when the parameter is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterDefinition {
    pub fn required(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        kind: ParameterKind,
        default: impl Into<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: Some(default.into()),
        }
    }
}

// ============================================================================
// Evaluation Context
// ============================================================================

/// Composes predicates and permissions across all policies of an entity type.
///
/// Implemented by the authorization manager. Evaluators reach it through the
/// [`EvaluationContext`] to delegate to another entity type.
pub trait Authorizer: Send + Sync {
    /// Predicate over `entity_type` for the context's actor.
    fn compose_predicate(
        &self,
        ctx: &EvaluationContext<'_>,
        entity_type: &str,
        permissions: &[Permission],
    ) -> Predicate;

    /// Permissions on `entity` (or on a new instance when `None`).
    fn compose_permissions(
        &self,
        ctx: &EvaluationContext<'_>,
        entity_type: &str,
        entity: Option<&dyn SecuredEntity>,
    ) -> PermissionSet;
}

/// Per-call evaluation state.
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub actor: &'a Actor,
    pub authorizer: &'a dyn Authorizer,
    /// Number of transitive hops taken so far
    pub depth: usize,
    pub max_depth: usize,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(actor: &'a Actor, authorizer: &'a dyn Authorizer, max_depth: usize) -> Self {
        Self {
            actor,
            authorizer,
            depth: 0,
            max_depth,
        }
    }

    /// Context for one more transitive hop.
    pub fn nested(&self) -> Self {
        Self {
            depth: self.depth + 1,
            ..*self
        }
    }

    pub fn depth_exhausted(&self) -> bool {
        self.depth >= self.max_depth
    }
}

// ============================================================================
// Evaluator Trait
// ============================================================================

/// Stateless policy logic, addressed by a stable id from policy rows.
pub trait AuthorizationEvaluator: Send + Sync {
    /// Stable identifier referenced by `AuthorizationPolicy::evaluator`.
    fn id(&self) -> &str;

    /// Whether policies on `entity_type` may use this evaluator.
    fn supports(&self, _entity_type: &str) -> bool {
        true
    }

    /// Parameters read from the policy, in declaration order.
    fn parameters(&self) -> Vec<ParameterDefinition> {
        Vec::new()
    }

    fn parameter_names(&self) -> Vec<String> {
        self.parameters().into_iter().map(|p| p.name).collect()
    }

    /// Condition selecting the instances this policy applies to.
    ///
    /// `Ok(None)` means the evaluator contributes nothing for these permissions.
    fn predicate(
        &self,
        ctx: &EvaluationContext<'_>,
        policy: &AuthorizationPolicy,
        permissions: &[Permission],
    ) -> Result<Option<Predicate>>;

    /// Permissions granted on `entity`. `None` asks about a new instance.
    fn permissions(
        &self,
        ctx: &EvaluationContext<'_>,
        entity: Option<&dyn SecuredEntity>,
        policy: &AuthorizationPolicy,
    ) -> Result<PermissionSet>;

    /// Authorities an actor gains from the policy.
    fn authorities(&self, policy: &AuthorizationPolicy) -> BTreeSet<String> {
        policy.authorities()
    }
}

/// Whether `policy` may contribute to a request for `permissions`.
///
/// The policy must grant something, must grant every requested permission,
/// and, when it carries a group permission, the actor must hold `APP_ADMIN`,
/// the group's `ADMIN` authority or one of the policy's authorities.
pub fn has_authority(
    actor: &Actor,
    policy: &AuthorizationPolicy,
    permissions: &[Permission],
) -> bool {
    if policy.permissions.is_empty() || !policy.permissions.implies_all(permissions) {
        return false;
    }
    match &policy.group_permission {
        None => true,
        Some(group) => {
            let group_admin = authority(group, &Permission::ADMIN);
            let granted = policy.authorities();
            actor.has_any_authority(
                std::iter::once(group_admin.as_str()).chain(granted.iter().map(String::as_str)),
            )
        }
    }
}

/// Grant the policy's permissions when `condition` holds.
pub(crate) fn grant_if(condition: bool, policy: &AuthorizationPolicy) -> PermissionSet {
    if condition {
        policy.permissions.clone()
    } else {
        PermissionSet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::APP_ADMIN;
    use serde_json::json;

    fn grouped_policy() -> AuthorizationPolicy {
        AuthorizationPolicy::new("identity", "base-permission")
            .with_group("identity")
            .with_permissions([Permission::READ, Permission::UPDATE])
    }

    #[test]
    fn test_has_authority_requires_granted_permissions() {
        let actor = Actor::new("alice");
        let policy = AuthorizationPolicy::new("identity", "base-permission")
            .with_permission(Permission::READ);

        assert!(has_authority(&actor, &policy, &[]));
        assert!(has_authority(&actor, &policy, &[Permission::READ]));
        assert!(!has_authority(&actor, &policy, &[Permission::DELETE]));

        let empty = AuthorizationPolicy::new("identity", "base-permission");
        assert!(!has_authority(&actor, &empty, &[]));
    }

    #[test]
    fn test_has_authority_with_group() {
        let policy = grouped_policy();

        assert!(!has_authority(&Actor::new("a"), &policy, &[]));
        assert!(has_authority(&Actor::new("b").with_authority("IDENTITY_READ"), &policy, &[]));
        assert!(has_authority(&Actor::new("c").with_authority("IDENTITY_ADMIN"), &policy, &[]));
        assert!(has_authority(&Actor::new("d").with_authority(APP_ADMIN), &policy, &[]));
        assert!(!has_authority(&Actor::new("e").with_authority("ROLE_READ"), &policy, &[]));
    }

    #[test]
    fn test_parameter_kinds() {
        assert!(ParameterKind::Boolean.accepts(&json!(true)));
        assert!(ParameterKind::Boolean.accepts(&json!("False")));
        assert!(!ParameterKind::Boolean.accepts(&json!("yes")));
        assert!(ParameterKind::Uuid.accepts(&json!("6f1c1c1e-8a1d-4bb4-9a8e-0a43c1f3b6a2")));
        assert!(!ParameterKind::Uuid.accepts(&json!("nope")));
        assert!(!ParameterKind::String.accepts(&json!(1)));
        assert!(ParameterKind::Any.accepts(&json!([1, 2])));
    }
}
