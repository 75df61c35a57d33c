use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::groups::AccessGroup;

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "catalog.read").
/// A special wildcard permission `"*"` is used by policy layers to indicate
/// "allow all" without hardcoding domain permissions into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Permissions granted to each access group.
///
/// Standard staff can read everything, manage customers and rentals, and open
/// incidents. Resolving or voiding incidents, catalog writes, and employee
/// administration stay with the elevated group.
pub fn permissions_for_group(group: AccessGroup) -> Vec<Permission> {
    match group {
        AccessGroup::Elevated => vec![Permission::new("*")],
        AccessGroup::Standard => vec![
            Permission::new("catalog.read"),
            Permission::new("customers.read"),
            Permission::new("customers.write"),
            Permission::new("rentals.read"),
            Permission::new("rentals.write"),
            Permission::new("incidents.read"),
            Permission::new("incidents.create"),
            Permission::new("employees.read"),
            Permission::new("dashboard.read"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elevated_group_gets_wildcard() {
        let perms = permissions_for_group(AccessGroup::Elevated);
        assert!(perms.iter().any(|p| p.is_wildcard()));
    }

    #[test]
    fn standard_group_cannot_resolve_incidents() {
        let perms = permissions_for_group(AccessGroup::Standard);
        assert!(perms.iter().any(|p| p.as_str() == "incidents.create"));
        assert!(!perms.iter().any(|p| p.as_str() == "incidents.resolve"));
        assert!(!perms.iter().any(|p| p.is_wildcard()));
    }
}
