//! `eventhire-auth` — staff identity, credentials, and authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage. It owns the
//! `User` aggregate (employee identity), the role → access-group synchronizer,
//! JWT claims and HS256 token handling, and the pure authorization check.

pub mod authorize;
pub mod claims;
pub mod groups;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod token;
pub mod user;

pub use authorize::{authorize, AuthzError, CommandAuthorization, Principal};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use groups::{resolve_access_group, AccessGroup};
pub use password::PasswordHash;
pub use permissions::{permissions_for_group, Permission};
pub use principal::PrincipalId;
pub use roles::StaffRole;
pub use token::{Hs256TokenService, TokenCodecError};
pub use user::{User, UserCommand, UserEvent, UserId};
