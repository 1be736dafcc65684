//! Permissions and Authorities
//!
//! A permission is a capability name such as `READ` or `DELETE`. `ADMIN`
//! implies every other permission. An authority scopes a permission to a
//! module group: `IDENTITY_READ`, `ROLE_ADMIN`. `APP_ADMIN` implies every
//! authority.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Global authority held by application administrators.
pub const APP_ADMIN: &str = "APP_ADMIN";

/// A capability name. Stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const ADMIN: Permission = Permission(Cow::Borrowed("ADMIN"));
    pub const READ: Permission = Permission(Cow::Borrowed("READ"));
    pub const AUTOCOMPLETE: Permission = Permission(Cow::Borrowed("AUTOCOMPLETE"));
    pub const CREATE: Permission = Permission(Cow::Borrowed("CREATE"));
    pub const UPDATE: Permission = Permission(Cow::Borrowed("UPDATE"));
    pub const DELETE: Permission = Permission(Cow::Borrowed("DELETE"));
    pub const COUNT: Permission = Permission(Cow::Borrowed("COUNT"));

    /// Base permissions every module understands.
    pub fn base() -> [Permission; 7] {
        [
            Self::ADMIN,
            Self::READ,
            Self::AUTOCOMPLETE,
            Self::CREATE,
            Self::UPDATE,
            Self::DELETE,
            Self::COUNT,
        ]
    }

    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Cow::Owned(name.as_ref().trim().to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_admin(&self) -> bool {
        self.0 == "ADMIN"
    }

    /// Whether holding `self` grants `other`.
    pub fn implies(&self, other: &Permission) -> bool {
        self.is_admin() || self == other
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Permission {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Permission {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Permission {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Permission> for String {
    fn from(p: Permission) -> Self {
        p.0.into_owned()
    }
}

/// Build the authority string for a module group and permission.
pub fn authority(group: &str, permission: &Permission) -> String {
    format!("{}_{}", group.trim().to_ascii_uppercase(), permission)
}

/// Ordered set of permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    pub fn contains(&self, permission: &Permission) -> bool {
        self.0.contains(permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    pub fn is_admin(&self) -> bool {
        self.0.contains(&Permission::ADMIN)
    }

    /// `ADMIN` implies everything
    pub fn implies(&self, permission: &Permission) -> bool {
        self.is_admin() || self.0.contains(permission)
    }

    /// True for an empty request.
    pub fn implies_all(&self, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.implies(p))
    }

    /// False for an empty request.
    pub fn implies_any(&self, permissions: &[Permission]) -> bool {
        permissions.iter().any(|p| self.implies(p))
    }

    pub fn union(&self, other: &PermissionSet) -> PermissionSet {
        Self(self.0.union(&other.0).cloned().collect())
    }

    pub fn extend(&mut self, other: PermissionSet) {
        self.0.extend(other.0);
    }

    /// Clamp this set to what `granted` allows, honouring `ADMIN` on either side.
    ///
    /// The result always satisfies `granted.implies(p)` for each member `p`.
    pub fn restrict_to(&self, granted: &PermissionSet) -> PermissionSet {
        if granted.is_admin() {
            return self.clone();
        }
        if self.is_admin() {
            return granted.clone();
        }
        Self(self.0.intersection(&granted.0).cloned().collect())
    }

    pub fn to_vec(&self) -> Vec<Permission> {
        self.0.iter().cloned().collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PermissionSet {
    type Item = Permission;
    type IntoIter = std::collections::btree_set::IntoIter<Permission>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Permission::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
