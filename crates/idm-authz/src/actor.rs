//! Acting principal
//!
//! Passed explicitly into every predicate and permission computation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::permission::APP_ADMIN;

/// The principal an authorization decision is made for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Identity id of the acting principal
    pub id: String,

    /// Role ids assigned to the actor. Policies bound to a role apply only to
    /// actors holding that role.
    #[serde(default)]
    pub roles: BTreeSet<String>,

    /// Authorities held by the actor (e.g. `IDENTITY_READ`, `APP_ADMIN`)
    #[serde(default)]
    pub authorities: BTreeSet<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: BTreeSet::new(),
            authorities: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role_id: impl Into<String>) -> Self {
        self.roles.insert(role_id.into());
        self
    }

    pub fn with_roles(mut self, role_ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.roles.extend(role_ids.into_iter().map(Into::into));
        self
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authorities.insert(authority.into().to_ascii_uppercase());
        self
    }

    pub fn with_authorities(
        mut self,
        authorities: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        for a in authorities {
            self.authorities.insert(a.into().to_ascii_uppercase());
        }
        self
    }

    pub fn has_role(&self, role_id: &str) -> bool {
        self.roles.contains(role_id)
    }

    pub fn is_app_admin(&self) -> bool {
        self.authorities.contains(APP_ADMIN)
    }

    /// Whether the actor holds any of the given authorities (`APP_ADMIN` holds all).
    pub fn has_any_authority<'a>(&self, authorities: impl IntoIterator<Item = &'a str>) -> bool {
        self.is_app_admin() || authorities.into_iter().any(|a| self.authorities.contains(a))
    }
}
