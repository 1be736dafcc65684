//! Built-in evaluators
//!
//! Each evaluator computes its condition twice: once as a [`Predicate`] for
//! query filtering and once directly against a loaded entity. Both forms
//! must select the same instances.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use idm_common::{SecuredEntity, ID_ATTRIBUTE};

use super::{
    grant_if, AuthorizationEvaluator, EvaluationContext, ParameterDefinition, ParameterKind,
};
use crate::error::{AuthorizationError, Result};
use crate::permission::{Permission, PermissionSet};
use crate::policy::AuthorizationPolicy;
use crate::predicate::Predicate;

pub const BASE_PERMISSION: &str = "base-permission";
pub const UUID: &str = "uuid";
pub const CODEABLE: &str = "codeable";
pub const SELF: &str = "self";
pub const ATTRIBUTE: &str = "attribute";
pub const SECURED_SUBSET: &str = "secured-subset";

/// Every built-in evaluator, ready for registration.
pub fn builtin() -> Vec<Arc<dyn AuthorizationEvaluator>> {
    vec![
        Arc::new(BasePermissionEvaluator),
        Arc::new(UuidEvaluator),
        Arc::new(CodeableEvaluator),
        Arc::new(SelfEvaluator),
        Arc::new(AttributeEvaluator),
        Arc::new(SecuredSubsetEvaluator),
    ]
}

fn attribute_equals(entity: &dyn SecuredEntity, attribute: &str, value: &Value) -> bool {
    entity.attribute(attribute).as_ref() == Some(value)
}

// ============================================================================
// Base permission
// ============================================================================

/// Grants the policy's permissions on every instance of the type.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasePermissionEvaluator;

impl AuthorizationEvaluator for BasePermissionEvaluator {
    fn id(&self) -> &str {
        BASE_PERMISSION
    }

    fn predicate(
        &self,
        _ctx: &EvaluationContext<'_>,
        _policy: &AuthorizationPolicy,
        _permissions: &[Permission],
    ) -> Result<Option<Predicate>> {
        Ok(Some(Predicate::True))
    }

    fn permissions(
        &self,
        _ctx: &EvaluationContext<'_>,
        _entity: Option<&dyn SecuredEntity>,
        policy: &AuthorizationPolicy,
    ) -> Result<PermissionSet> {
        Ok(policy.permissions.clone())
    }
}

// ============================================================================
// Uuid
// ============================================================================

/// Grants the policy's permissions on the single instance named by `uuid`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidEvaluator;

impl UuidEvaluator {
    pub const PARAMETER_UUID: &'static str = "uuid";

    fn target(policy: &AuthorizationPolicy) -> Result<Value> {
        let id = policy.required_uuid_parameter(Self::PARAMETER_UUID)?;
        Ok(Value::String(id.to_string()))
    }
}

impl AuthorizationEvaluator for UuidEvaluator {
    fn id(&self) -> &str {
        UUID
    }

    fn parameters(&self) -> Vec<ParameterDefinition> {
        vec![ParameterDefinition::required(Self::PARAMETER_UUID, ParameterKind::Uuid)]
    }

    fn predicate(
        &self,
        _ctx: &EvaluationContext<'_>,
        policy: &AuthorizationPolicy,
        _permissions: &[Permission],
    ) -> Result<Option<Predicate>> {
        Ok(Some(Predicate::eq(ID_ATTRIBUTE, Self::target(policy)?)))
    }

    fn permissions(
        &self,
        _ctx: &EvaluationContext<'_>,
        entity: Option<&dyn SecuredEntity>,
        policy: &AuthorizationPolicy,
    ) -> Result<PermissionSet> {
        let target = Self::target(policy)?;
        Ok(grant_if(
            entity.map(|e| attribute_equals(e, ID_ATTRIBUTE, &target)).unwrap_or(false),
            policy,
        ))
    }
}

// ============================================================================
// Codeable
// ============================================================================

/// Grants the policy's permissions on instances whose `code` equals the
/// `identifier` parameter.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodeableEvaluator;

impl CodeableEvaluator {
    pub const PARAMETER_IDENTIFIER: &'static str = "identifier";
    pub const CODE_ATTRIBUTE: &'static str = "code";
}

impl AuthorizationEvaluator for CodeableEvaluator {
    fn id(&self) -> &str {
        CODEABLE
    }

    fn parameters(&self) -> Vec<ParameterDefinition> {
        vec![ParameterDefinition::required(Self::PARAMETER_IDENTIFIER, ParameterKind::String)]
    }

    fn predicate(
        &self,
        _ctx: &EvaluationContext<'_>,
        policy: &AuthorizationPolicy,
        _permissions: &[Permission],
    ) -> Result<Option<Predicate>> {
        let code = policy.required_string_parameter(Self::PARAMETER_IDENTIFIER)?;
        Ok(Some(Predicate::eq(Self::CODE_ATTRIBUTE, code)))
    }

    fn permissions(
        &self,
        _ctx: &EvaluationContext<'_>,
        entity: Option<&dyn SecuredEntity>,
        policy: &AuthorizationPolicy,
    ) -> Result<PermissionSet> {
        let code = Value::from(policy.required_string_parameter(Self::PARAMETER_IDENTIFIER)?);
        Ok(grant_if(
            entity
                .map(|e| attribute_equals(e, Self::CODE_ATTRIBUTE, &code))
                .unwrap_or(false),
            policy,
        ))
    }
}

// ============================================================================
// Self
// ============================================================================

/// Grants the policy's permissions on instances that reference the actor,
/// e.g. an identity's own profile or its own role requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfEvaluator;

impl SelfEvaluator {
    pub const PARAMETER_ATTRIBUTE: &'static str = "attribute";

    fn attribute(policy: &AuthorizationPolicy) -> Result<&str> {
        Ok(policy
            .string_parameter(Self::PARAMETER_ATTRIBUTE)?
            .unwrap_or(ID_ATTRIBUTE))
    }
}

impl AuthorizationEvaluator for SelfEvaluator {
    fn id(&self) -> &str {
        SELF
    }

    fn parameters(&self) -> Vec<ParameterDefinition> {
        vec![ParameterDefinition::optional(
            Self::PARAMETER_ATTRIBUTE,
            ParameterKind::String,
            ID_ATTRIBUTE,
        )]
    }

    fn predicate(
        &self,
        ctx: &EvaluationContext<'_>,
        policy: &AuthorizationPolicy,
        _permissions: &[Permission],
    ) -> Result<Option<Predicate>> {
        Ok(Some(Predicate::eq(Self::attribute(policy)?, ctx.actor.id.as_str())))
    }

    fn permissions(
        &self,
        ctx: &EvaluationContext<'_>,
        entity: Option<&dyn SecuredEntity>,
        policy: &AuthorizationPolicy,
    ) -> Result<PermissionSet> {
        let attribute = Self::attribute(policy)?;
        let actor = Value::String(ctx.actor.id.clone());
        Ok(grant_if(
            entity.map(|e| attribute_equals(e, attribute, &actor)).unwrap_or(false),
            policy,
        ))
    }
}

// ============================================================================
// Attribute
// ============================================================================

/// Comparison applied by [`AttributeEvaluator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeOperator {
    Equals,
    NotEquals,
    In,
}

impl AttributeOperator {
    fn parse(policy: &AuthorizationPolicy) -> Result<Self> {
        match policy.string_parameter(AttributeEvaluator::PARAMETER_OPERATOR)? {
            None | Some("equals") => Ok(Self::Equals),
            Some("not-equals") => Ok(Self::NotEquals),
            Some("in") => Ok(Self::In),
            Some(other) => Err(AuthorizationError::misconfiguration(
                &policy.id,
                format!("unknown operator '{}'", other),
            )),
        }
    }
}

/// ABAC rule on one attribute of the secured entity.
///
/// Parameters: `attribute`, `value`, and `operator` (`equals` by default,
/// `not-equals`, or `in` with an array `value`).
#[derive(Debug, Default, Clone, Copy)]
pub struct AttributeEvaluator;

impl AttributeEvaluator {
    pub const PARAMETER_ATTRIBUTE: &'static str = "attribute";
    pub const PARAMETER_VALUE: &'static str = "value";
    pub const PARAMETER_OPERATOR: &'static str = "operator";

    fn rule(policy: &AuthorizationPolicy) -> Result<(&str, AttributeOperator, &Value)> {
        let attribute = policy.required_string_parameter(Self::PARAMETER_ATTRIBUTE)?;
        let operator = AttributeOperator::parse(policy)?;
        let value = policy.required_value_parameter(Self::PARAMETER_VALUE)?;
        if operator == AttributeOperator::In && !value.is_array() {
            return Err(AuthorizationError::misconfiguration(
                &policy.id,
                "operator 'in' requires an array value",
            ));
        }
        Ok((attribute, operator, value))
    }
}

impl AuthorizationEvaluator for AttributeEvaluator {
    fn id(&self) -> &str {
        ATTRIBUTE
    }

    fn parameters(&self) -> Vec<ParameterDefinition> {
        vec![
            ParameterDefinition::required(Self::PARAMETER_ATTRIBUTE, ParameterKind::String),
            ParameterDefinition::required(Self::PARAMETER_VALUE, ParameterKind::Any),
            ParameterDefinition::optional(
                Self::PARAMETER_OPERATOR,
                ParameterKind::String,
                "equals",
            ),
        ]
    }

    fn predicate(
        &self,
        _ctx: &EvaluationContext<'_>,
        policy: &AuthorizationPolicy,
        _permissions: &[Permission],
    ) -> Result<Option<Predicate>> {
        let (attribute, operator, value) = Self::rule(policy)?;
        let predicate = match operator {
            AttributeOperator::Equals => Predicate::eq(attribute, value.clone()),
            AttributeOperator::NotEquals => Predicate::not(Predicate::eq(attribute, value.clone())),
            AttributeOperator::In => {
                let values = value.as_array().cloned().unwrap_or_default();
                Predicate::in_values(attribute, values)
            }
        };
        Ok(Some(predicate))
    }

    fn permissions(
        &self,
        _ctx: &EvaluationContext<'_>,
        entity: Option<&dyn SecuredEntity>,
        policy: &AuthorizationPolicy,
    ) -> Result<PermissionSet> {
        let (attribute, operator, value) = Self::rule(policy)?;
        let Some(entity) = entity else {
            return Ok(PermissionSet::new());
        };
        let actual = entity.attribute(attribute);
        let matched = match operator {
            AttributeOperator::Equals => actual.as_ref() == Some(value),
            AttributeOperator::NotEquals => actual.as_ref() != Some(value),
            AttributeOperator::In => match (actual, value.as_array()) {
                (Some(actual), Some(values)) => values.contains(&actual),
                _ => false,
            },
        };
        debug!(policy_id = %policy.id, attribute, matched, "Attribute rule evaluated");
        Ok(grant_if(matched, policy))
    }
}

// ============================================================================
// Secured subset
// ============================================================================

/// Grants the policy's permissions on every instance, optionally excluding
/// instances flagged as secured.
///
/// `include-secured` defaults to `false`: flagged instances are excluded
/// unless a policy opts in explicitly.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecuredSubsetEvaluator;

impl SecuredSubsetEvaluator {
    pub const PARAMETER_INCLUDE_SECURED: &'static str = "include-secured";
    pub const PARAMETER_SECURED_ATTRIBUTE: &'static str = "secured-attribute";
    pub const DEFAULT_SECURED_ATTRIBUTE: &'static str = "secured";

    fn settings(policy: &AuthorizationPolicy) -> Result<(bool, &str)> {
        let include = policy.bool_parameter(Self::PARAMETER_INCLUDE_SECURED, false)?;
        let attribute = policy
            .string_parameter(Self::PARAMETER_SECURED_ATTRIBUTE)?
            .unwrap_or(Self::DEFAULT_SECURED_ATTRIBUTE);
        Ok((include, attribute))
    }
}

impl AuthorizationEvaluator for SecuredSubsetEvaluator {
    fn id(&self) -> &str {
        SECURED_SUBSET
    }

    fn parameters(&self) -> Vec<ParameterDefinition> {
        vec![
            ParameterDefinition::optional(
                Self::PARAMETER_INCLUDE_SECURED,
                ParameterKind::Boolean,
                false,
            ),
            ParameterDefinition::optional(
                Self::PARAMETER_SECURED_ATTRIBUTE,
                ParameterKind::String,
                Self::DEFAULT_SECURED_ATTRIBUTE,
            ),
        ]
    }

    fn predicate(
        &self,
        _ctx: &EvaluationContext<'_>,
        policy: &AuthorizationPolicy,
        _permissions: &[Permission],
    ) -> Result<Option<Predicate>> {
        let (include, attribute) = Self::settings(policy)?;
        if include {
            return Ok(Some(Predicate::True));
        }
        Ok(Some(Predicate::not(Predicate::eq(attribute, true))))
    }

    fn permissions(
        &self,
        _ctx: &EvaluationContext<'_>,
        entity: Option<&dyn SecuredEntity>,
        policy: &AuthorizationPolicy,
    ) -> Result<PermissionSet> {
        let (include, attribute) = Self::settings(policy)?;
        let condition = match entity {
            None => true,
            Some(entity) => include || entity.attribute(attribute) != Some(Value::Bool(true)),
        };
        Ok(grant_if(condition, policy))
    }
}
