use std::collections::HashSet;

use thiserror::Error;

use crate::groups::AccessGroup;
use crate::permissions::Permission;
use crate::principal::PrincipalId;
use crate::roles::StaffRole;

/// A fully resolved principal for authorization decisions.
///
/// Construction is decoupled from storage and transport: the API derives one
/// from verified token claims plus the group → permission policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub username: String,
    pub role: StaffRole,
    pub group: AccessGroup,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Command-side authorization contract (checked at the command boundary).
///
/// Implement this on commands that require permissions.
/// The API layer enforces these requirements before dispatching.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal for one required permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let perms: HashSet<&str> = principal.permissions.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::permissions_for_group;

    fn principal(group: AccessGroup) -> Principal {
        Principal {
            principal_id: PrincipalId::new(),
            username: "staff".to_string(),
            role: match group {
                AccessGroup::Elevated => StaffRole::Administrator,
                AccessGroup::Standard => StaffRole::Clerk,
            },
            group,
            permissions: permissions_for_group(group),
        }
    }

    #[test]
    fn wildcard_grants_everything() {
        let p = principal(AccessGroup::Elevated);
        assert!(authorize(&p, &Permission::new("incidents.resolve")).is_ok());
        assert!(authorize(&p, &Permission::new("catalog.write")).is_ok());
    }

    #[test]
    fn standard_staff_can_open_but_not_resolve_incidents() {
        let p = principal(AccessGroup::Standard);
        assert!(authorize(&p, &Permission::new("incidents.create")).is_ok());
        assert_eq!(
            authorize(&p, &Permission::new("incidents.resolve")),
            Err(AuthzError::Forbidden("incidents.resolve".to_string()))
        );
    }
}
