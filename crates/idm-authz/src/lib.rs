//! IdM Authorization Engine
//!
//! Attribute-based authorization over policy rows:
//! - `permission`: permissions, permission sets and authorities
//! - `policy`: `AuthorizationPolicy` and the `PolicyStore` seam
//! - `predicate`: the abstract filter algebra handed to query backends
//! - `evaluator`: built-in and transitive evaluators
//! - `registry`: evaluators keyed by stable id
//! - `manager`: OR-composition across policies, default deny

pub mod actor;
pub mod error;
pub mod evaluator;
pub mod manager;
pub mod permission;
pub mod policy;
pub mod predicate;
pub mod registry;

pub use actor::Actor;
pub use error::{AuthorizationError, Result};
pub use evaluator::{
    has_authority, AuthorizationEvaluator, Authorizer, EvaluationContext, LookupOwnerResolver,
    OwnerResolver, ParameterDefinition, ParameterKind, TransitiveEvaluator,
};
pub use manager::{AuthorizationManager, DEFAULT_MAX_TRANSITIVE_DEPTH};
pub use permission::{authority, Permission, PermissionSet, APP_ADMIN};
pub use policy::{AuthorizationPolicy, InMemoryPolicyStore, PolicyProperties, PolicyStore};
pub use predicate::{Correlation, Predicate};
pub use registry::{EvaluatorRegistry, EvaluatorRegistryBuilder};
