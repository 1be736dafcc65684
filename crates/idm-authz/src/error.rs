//! Authorization Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("Unknown evaluator: {0}")]
    UnknownEvaluator(String),

    #[error("Duplicate evaluator: {0}")]
    DuplicateEvaluator(String),

    #[error("Evaluator {evaluator} does not support entity type {entity_type}")]
    UnsupportedEntityType { evaluator: String, entity_type: String },

    #[error("Policy {policy_id} is misconfigured: {message}")]
    Misconfiguration { policy_id: String, message: String },

    #[error("Transitive evaluation of {entity_type} exceeded depth {max_depth}")]
    DepthExceeded { entity_type: String, max_depth: usize },

    #[error("Policy not found: {0}")]
    PolicyNotFound(String),
}

impl AuthorizationError {
    pub fn misconfiguration(policy_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Misconfiguration {
            policy_id: policy_id.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(evaluator: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self::UnsupportedEntityType {
            evaluator: evaluator.into(),
            entity_type: entity_type.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthorizationError>;
