//! Access-group resolution (the role/group synchronizer core).

use serde::{Deserialize, Serialize};

use crate::roles::StaffRole;

/// Access group an identity belongs to. Exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessGroup {
    /// Full administrative access.
    Elevated,
    /// Default staff access.
    Standard,
}

impl AccessGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessGroup::Elevated => "elevated",
            AccessGroup::Standard => "standard",
        }
    }
}

impl core::fmt::Display for AccessGroup {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministically resolve the access group for an identity.
///
/// Administrative roles and superusers land in `Elevated`; everyone else in
/// `Standard`. Pure and idempotent; the `User` aggregate calls this on every
/// command that creates the record or touches role/superuser, so group
/// membership can never drift from the role.
pub fn resolve_access_group(role: StaffRole, superuser: bool) -> AccessGroup {
    if superuser || role.is_administrative() {
        AccessGroup::Elevated
    } else {
        AccessGroup::Standard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn administrator_role_is_elevated() {
        assert_eq!(
            resolve_access_group(StaffRole::Administrator, false),
            AccessGroup::Elevated
        );
    }

    #[test]
    fn superuser_flag_is_elevated_regardless_of_role() {
        for role in StaffRole::ALL {
            assert_eq!(resolve_access_group(role, true), AccessGroup::Elevated);
        }
    }

    #[test]
    fn non_administrative_roles_are_standard() {
        for role in StaffRole::ALL {
            if !role.is_administrative() {
                assert_eq!(resolve_access_group(role, false), AccessGroup::Standard);
            }
        }
    }

    #[test]
    fn resolution_is_idempotent() {
        let first = resolve_access_group(StaffRole::Cashier, false);
        let second = resolve_access_group(StaffRole::Cashier, false);
        assert_eq!(first, second);
    }
}
