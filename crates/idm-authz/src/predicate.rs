//! Predicate Algebra
//!
//! Abstract filter trees produced by the authorization engine. An external
//! query backend translates them into its own query language; the in-memory
//! [`Predicate::matches`] evaluates them against one loaded entity.
//!
//! Semantics are two-valued: a comparison against a missing attribute is
//! `false`, and `Not` is plain boolean negation.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use idm_common::{EntityLookup, SecuredEntity, ID_ATTRIBUTE};

/// Correlation between a secured entity and its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    /// Attribute on the secured entity holding the owner reference
    pub attribute: String,
    /// Attribute on the owner the reference points at
    pub owner_attribute: String,
}

impl Correlation {
    /// Correlate `attribute` with the owner's id.
    pub fn by_id(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            owner_attribute: ID_ATTRIBUTE.to_string(),
        }
    }

    pub fn new(attribute: impl Into<String>, owner_attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            owner_attribute: owner_attribute.into(),
        }
    }
}

/// Composable filter tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Matches everything
    True,

    /// Matches nothing
    False,

    /// Attribute equals value
    Eq { attribute: String, value: Value },

    /// Attribute equals one of the values
    In { attribute: String, values: Vec<Value> },

    /// Attribute missing or null
    IsNull { attribute: String },

    And { predicates: Vec<Predicate> },

    Or { predicates: Vec<Predicate> },

    Not { predicate: Box<Predicate> },

    /// An entity of `entity_type` exists, correlated with the current entity,
    /// that satisfies `predicate`.
    Exists {
        entity_type: String,
        correlation: Correlation,
        predicate: Box<Predicate>,
    },
}

impl Predicate {
    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// An empty value list matches nothing.
    pub fn in_values(attribute: impl Into<String>, values: Vec<Value>) -> Self {
        if values.is_empty() {
            return Self::False;
        }
        Self::In {
            attribute: attribute.into(),
            values,
        }
    }

    pub fn is_null(attribute: impl Into<String>) -> Self {
        Self::IsNull {
            attribute: attribute.into(),
        }
    }

    /// Conjunction. Flattens nested `And`, drops `True`, collapses on `False`.
    /// An empty conjunction is `True`.
    pub fn and(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        let mut parts = Vec::new();
        for p in predicates {
            match p {
                Self::True => {}
                Self::False => return Self::False,
                Self::And { predicates } => parts.extend(predicates),
                other => parts.push(other),
            }
        }
        match parts.len() {
            0 => Self::True,
            1 => parts.remove(0),
            _ => Self::And { predicates: parts },
        }
    }

    /// Disjunction. Flattens nested `Or`, drops `False`, collapses on `True`.
    /// An empty disjunction is `False`.
    pub fn or(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        let mut parts = Vec::new();
        for p in predicates {
            match p {
                Self::False => {}
                Self::True => return Self::True,
                Self::Or { predicates } => parts.extend(predicates),
                other => parts.push(other),
            }
        }
        match parts.len() {
            0 => Self::False,
            1 => parts.remove(0),
            _ => Self::Or { predicates: parts },
        }
    }

    pub fn not(predicate: Predicate) -> Self {
        match predicate {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Not { predicate } => *predicate,
            other => Self::Not {
                predicate: Box::new(other),
            },
        }
    }

    /// Existential correlation. An owner predicate of `False` can never be
    /// satisfied, so the whole predicate is `False`.
    pub fn exists(
        entity_type: impl Into<String>,
        correlation: Correlation,
        predicate: Predicate,
    ) -> Self {
        if predicate.is_false() {
            return Self::False;
        }
        Self::Exists {
            entity_type: entity_type.into(),
            correlation,
            predicate: Box::new(predicate),
        }
    }

    pub fn and_with(self, other: Predicate) -> Self {
        Self::and([self, other])
    }

    pub fn or_with(self, other: Predicate) -> Self {
        Self::or([self, other])
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Self::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Self::False)
    }

    /// Evaluate against a loaded entity. `lookup` resolves `Exists` owners.
    pub fn matches(&self, entity: &dyn SecuredEntity, lookup: &dyn EntityLookup) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::Eq { attribute, value } => entity.attribute(attribute).as_ref() == Some(value),
            Self::In { attribute, values } => entity
                .attribute(attribute)
                .map(|v| values.contains(&v))
                .unwrap_or(false),
            Self::IsNull { attribute } => entity
                .attribute(attribute)
                .map(|v| v.is_null())
                .unwrap_or(true),
            Self::And { predicates } => predicates.iter().all(|p| p.matches(entity, lookup)),
            Self::Or { predicates } => predicates.iter().any(|p| p.matches(entity, lookup)),
            Self::Not { predicate } => !predicate.matches(entity, lookup),
            Self::Exists {
                entity_type,
                correlation,
                predicate,
            } => match entity.attribute(&correlation.attribute) {
                None | Some(Value::Null) => false,
                Some(reference) => lookup
                    .find_by_attribute(entity_type, &correlation.owner_attribute, &reference)
                    .iter()
                    .any(|owner| predicate.matches(owner.as_ref(), lookup)),
            },
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => f.write_str("true"),
            Self::False => f.write_str("false"),
            Self::Eq { attribute, value } => write!(f, "{} eq {}", attribute, value),
            Self::In { attribute, values } => {
                let rendered: Vec<String> = values.iter().map(Value::to_string).collect();
                write!(f, "{} in [{}]", attribute, rendered.join(", "))
            }
            Self::IsNull { attribute } => write!(f, "{} is null", attribute),
            Self::And { predicates } => join(f, predicates, " and "),
            Self::Or { predicates } => join(f, predicates, " or "),
            Self::Not { predicate } => write!(f, "not ({})", predicate),
            Self::Exists {
                entity_type,
                correlation,
                predicate,
            } => write!(
                f,
                "exists {}[{} = {}] ({})",
                entity_type, correlation.owner_attribute, correlation.attribute, predicate
            ),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, predicates: &[Predicate], separator: &str) -> fmt::Result {
    for (i, p) in predicates.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "({})", p)?;
    }
    Ok(())
}
