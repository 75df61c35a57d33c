use eventhire_auth::{AccessGroup, Permission, PrincipalId, StaffRole};

/// Principal context for a request (authenticated identity + access group).
///
/// Built by the auth middleware from verified token claims and the
/// group → permission policy; present on all protected routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    username: String,
    role: StaffRole,
    group: AccessGroup,
    permissions: Vec<Permission>,
}

impl PrincipalContext {
    pub fn new(
        principal_id: PrincipalId,
        username: String,
        role: StaffRole,
        group: AccessGroup,
        permissions: Vec<Permission>,
    ) -> Self {
        Self {
            principal_id,
            username,
            role,
            group,
            permissions,
        }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn role(&self) -> StaffRole {
        self.role
    }

    pub fn group(&self) -> AccessGroup {
        self.group
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }
}
