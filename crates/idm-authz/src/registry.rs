//! Evaluator Registry
//!
//! Evaluators are registered once at startup and addressed by their stable
//! id. The registry is immutable after `build()` and shared as `Arc`.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::error::{AuthorizationError, Result};
use crate::evaluator::{basic, AuthorizationEvaluator, ParameterDefinition};
use crate::policy::AuthorizationPolicy;

pub struct EvaluatorRegistry {
    evaluators: BTreeMap<String, Arc<dyn AuthorizationEvaluator>>,
}

impl EvaluatorRegistry {
    pub fn builder() -> EvaluatorRegistryBuilder {
        EvaluatorRegistryBuilder::default()
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn AuthorizationEvaluator>> {
        self.evaluators.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.evaluators.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        self.evaluators.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }

    /// Check a policy against its evaluator's parameter definitions.
    pub fn validate(&self, policy: &AuthorizationPolicy) -> Result<()> {
        let evaluator = self
            .get(&policy.evaluator)
            .ok_or_else(|| AuthorizationError::UnknownEvaluator(policy.evaluator.clone()))?;

        if !evaluator.supports(&policy.entity_type) {
            return Err(AuthorizationError::unsupported(&policy.evaluator, &policy.entity_type));
        }

        let definitions = evaluator.parameters();
        for key in policy.properties.keys() {
            if !definitions.iter().any(|d| d.name == key) {
                return Err(AuthorizationError::misconfiguration(
                    &policy.id,
                    format!("unknown parameter '{}' for evaluator '{}'", key, policy.evaluator),
                ));
            }
        }

        for ParameterDefinition { name, kind, required, .. } in &definitions {
            match policy.properties.get(name) {
                None if *required => {
                    return Err(AuthorizationError::misconfiguration(
                        &policy.id,
                        format!("parameter '{}' is required", name),
                    ))
                }
                None => {}
                Some(value) if !kind.accepts(value) => {
                    return Err(AuthorizationError::misconfiguration(
                        &policy.id,
                        format!("parameter '{}' expects {:?}, got {}", name, kind, value),
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct EvaluatorRegistryBuilder {
    evaluators: Vec<Arc<dyn AuthorizationEvaluator>>,
}

impl EvaluatorRegistryBuilder {
    /// Register the built-in evaluators.
    pub fn with_defaults(mut self) -> Self {
        self.evaluators.extend(basic::builtin());
        self
    }

    pub fn register(mut self, evaluator: Arc<dyn AuthorizationEvaluator>) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    pub fn build(self) -> Result<EvaluatorRegistry> {
        let mut evaluators = BTreeMap::new();
        for evaluator in self.evaluators {
            let id = evaluator.id().to_string();
            if evaluators.insert(id.clone(), evaluator).is_some() {
                return Err(AuthorizationError::DuplicateEvaluator(id));
            }
        }
        info!(count = evaluators.len(), "Authorization evaluators registered");
        Ok(EvaluatorRegistry { evaluators })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::BasePermissionEvaluator;
    use crate::permission::Permission;

    fn registry() -> EvaluatorRegistry {
        EvaluatorRegistry::builder().with_defaults().build().unwrap()
    }

    #[test]
    fn test_defaults_registered() {
        let registry = registry();
        assert_eq!(
            registry.ids(),
            vec!["attribute", "base-permission", "codeable", "secured-subset", "self", "uuid"]
        );
        assert!(registry.get("uuid").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let result = EvaluatorRegistry::builder()
            .with_defaults()
            .register(Arc::new(BasePermissionEvaluator))
            .build();
        assert!(matches!(
            result,
            Err(AuthorizationError::DuplicateEvaluator(id)) if id == "base-permission"
        ));
    }

    #[test]
    fn test_validate_policy() {
        let registry = registry();
        let ok = AuthorizationPolicy::new("role", "codeable")
            .with_permission(Permission::READ)
            .with_property("identifier", "helpdesk");
        assert!(registry.validate(&ok).is_ok());

        let unknown_evaluator = AuthorizationPolicy::new("role", "nope");
        assert!(matches!(
            registry.validate(&unknown_evaluator),
            Err(AuthorizationError::UnknownEvaluator(_))
        ));

        let missing = AuthorizationPolicy::new("role", "codeable");
        assert!(matches!(
            registry.validate(&missing),
            Err(AuthorizationError::Misconfiguration { .. })
        ));

        let extra = ok.clone().with_property("colour", "red");
        assert!(registry.validate(&extra).is_err());

        let ill_typed = AuthorizationPolicy::new("role", "secured-subset")
            .with_property("include-secured", "maybe");
        assert!(registry.validate(&ill_typed).is_err());
    }
}
