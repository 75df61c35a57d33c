//! API-side authorization guard for commands.
//!
//! Enforces permissions at the command boundary (before dispatch), keeping
//! domain aggregates and infra auth-agnostic.

use eventhire_auth::{AuthzError, CommandAuthorization, Principal, authorize};

use crate::context::PrincipalContext;

/// Check authorization for a command in the current request context.
///
/// Intended to be called **before** dispatching a command.
pub fn authorize_command<C: CommandAuthorization>(
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = Principal {
        principal_id: principal.principal_id(),
        username: principal.username().to_string(),
        role: principal.role(),
        group: principal.group(),
        permissions: principal.permissions().to_vec(),
    };

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}
