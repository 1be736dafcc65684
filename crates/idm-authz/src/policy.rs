//! Authorization Policies
//!
//! A policy binds an evaluator, its parameters and a granted permission set
//! to an entity type. Policies are administrative configuration: this crate
//! only reads them through a [`PolicyStore`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::actor::Actor;
use crate::error::{AuthorizationError, Result};
use crate::permission::{authority, Permission, PermissionSet};

fn default_enabled() -> bool {
    true
}

/// Evaluator-specific parameters, keyed by the evaluator's declared names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyProperties(BTreeMap<String, Value>);

impl PolicyProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Authorization policy row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationPolicy {
    pub id: String,

    /// Role the policy is assigned to. `None` applies to every actor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,

    /// Entity type the policy secures
    pub entity_type: String,

    /// Authority group (e.g. `IDENTITY`). When set, the actor must hold one of
    /// the policy's authorities for the policy to contribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_permission: Option<String>,

    /// Evaluator id
    pub evaluator: String,

    /// Permissions granted when the evaluator matches
    #[serde(default)]
    pub permissions: PermissionSet,

    #[serde(default)]
    pub properties: PolicyProperties,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Lower sorts first
    #[serde(default)]
    pub priority: i32,
}

impl AuthorizationPolicy {
    pub fn new(entity_type: impl Into<String>, evaluator: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role_id: None,
            entity_type: entity_type.into(),
            group_permission: None,
            evaluator: evaluator.into(),
            permissions: PermissionSet::new(),
            properties: PolicyProperties::new(),
            enabled: true,
            priority: 0,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn for_role(mut self, role_id: impl Into<String>) -> Self {
        self.role_id = Some(role_id.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group_permission = Some(group.into().to_ascii_uppercase());
        self
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.insert(permission);
        self
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        for p in permissions {
            self.permissions.insert(p);
        }
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name, value);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether the policy applies to the actor (enabled and role matches).
    pub fn applies_to(&self, actor: &Actor) -> bool {
        self.enabled
            && self
                .role_id
                .as_deref()
                .map(|role| actor.has_role(role))
                .unwrap_or(true)
    }

    /// Authorities granted by this policy: `GROUP_PERMISSION` for each permission.
    pub fn authorities(&self) -> BTreeSet<String> {
        match &self.group_permission {
            Some(group) => self
                .permissions
                .iter()
                .map(|p| authority(group, p))
                .collect(),
            None => BTreeSet::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Parameter accessors. Invalid values are misconfiguration errors.
    // ------------------------------------------------------------------------

    pub fn string_parameter(&self, name: &str) -> Result<Option<&str>> {
        match self.properties.get(name) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(AuthorizationError::misconfiguration(
                &self.id,
                format!("parameter '{}' must be a string, got {}", name, other),
            )),
        }
    }

    pub fn required_string_parameter(&self, name: &str) -> Result<&str> {
        self.string_parameter(name)?.ok_or_else(|| {
            AuthorizationError::misconfiguration(
                &self.id,
                format!("parameter '{}' is required", name),
            )
        })
    }

    /// Missing parameters resolve to `default`. Accepts booleans and "true"/"false".
    pub fn bool_parameter(&self, name: &str, default: bool) -> Result<bool> {
        match self.properties.get(name) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(AuthorizationError::misconfiguration(
                    &self.id,
                    format!("parameter '{}' must be a boolean, got '{}'", name, s),
                )),
            },
            Some(other) => Err(AuthorizationError::misconfiguration(
                &self.id,
                format!("parameter '{}' must be a boolean, got {}", name, other),
            )),
        }
    }

    pub fn required_uuid_parameter(&self, name: &str) -> Result<uuid::Uuid> {
        let raw = self.required_string_parameter(name)?;
        uuid::Uuid::parse_str(raw).map_err(|e| {
            AuthorizationError::misconfiguration(
                &self.id,
                format!("parameter '{}' is not a valid uuid: {}", name, e),
            )
        })
    }

    /// Raw value, any JSON type. Missing values are an error.
    pub fn required_value_parameter(&self, name: &str) -> Result<&Value> {
        self.properties.get(name).ok_or_else(|| {
            AuthorizationError::misconfiguration(
                &self.id,
                format!("parameter '{}' is required", name),
            )
        })
    }
}

// ============================================================================
// Policy Store
// ============================================================================

/// Read access to configured policies.
///
/// Implementations return policies sorted by priority, then id.
pub trait PolicyStore: Send + Sync {
    /// All policies (enabled or not) for an entity type.
    fn policies(&self, entity_type: &str) -> Vec<AuthorizationPolicy>;

    /// Every policy in the store.
    fn all(&self) -> Vec<AuthorizationPolicy>;
}

/// In-memory policy store.
///
/// Readers take a cheap `Arc` snapshot; writers build a new snapshot and swap
/// it in. Edits are visible to reads that start after the swap.
#[derive(Default)]
pub struct InMemoryPolicyStore {
    snapshot: RwLock<Arc<Vec<AuthorizationPolicy>>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policies(policies: impl IntoIterator<Item = AuthorizationPolicy>) -> Self {
        let store = Self::new();
        store.replace_all(policies);
        store
    }

    fn sorted(mut policies: Vec<AuthorizationPolicy>) -> Arc<Vec<AuthorizationPolicy>> {
        policies.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Arc::new(policies)
    }

    fn modify(&self, f: impl FnOnce(&mut Vec<AuthorizationPolicy>)) {
        let mut guard = self.snapshot.write();
        let mut next = guard.as_ref().clone();
        f(&mut next);
        *guard = Self::sorted(next);
    }

    pub fn snapshot(&self) -> Arc<Vec<AuthorizationPolicy>> {
        self.snapshot.read().clone()
    }

    pub fn replace_all(&self, policies: impl IntoIterator<Item = AuthorizationPolicy>) {
        *self.snapshot.write() = Self::sorted(policies.into_iter().collect());
    }

    /// Insert or replace by id.
    pub fn upsert(&self, policy: AuthorizationPolicy) {
        debug!(
            policy_id = %policy.id,
            entity_type = %policy.entity_type,
            "Upserting authorization policy"
        );
        self.modify(|policies| {
            policies.retain(|p| p.id != policy.id);
            policies.push(policy);
        });
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut removed = false;
        self.modify(|policies| {
            let before = policies.len();
            policies.retain(|p| p.id != id);
            removed = policies.len() < before;
        });
        removed
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut found = false;
        self.modify(|policies| {
            if let Some(p) = policies.iter_mut().find(|p| p.id == id) {
                p.enabled = enabled;
                found = true;
            }
        });
        if found {
            Ok(())
        } else {
            Err(AuthorizationError::PolicyNotFound(id.to_string()))
        }
    }

    pub fn get(&self, id: &str) -> Option<AuthorizationPolicy> {
        self.snapshot().iter().find(|p| p.id == id).cloned()
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn policies(&self, entity_type: &str) -> Vec<AuthorizationPolicy> {
        self.snapshot()
            .iter()
            .filter(|p| p.entity_type == entity_type)
            .cloned()
            .collect()
    }

    fn all(&self) -> Vec<AuthorizationPolicy> {
        self.snapshot().as_ref().clone()
    }
}
