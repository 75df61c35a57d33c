use axum::http::StatusCode;

use eventhire_auth::{CommandAuthorization, Permission};
use eventhire_core::AggregateId;

use crate::app::errors;

/// Associates required permissions with a command for the authz guard.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Parse a path id, mapping failures to a uniform 400 response.
pub fn parse_id(raw: &str, what: &'static str) -> Result<AggregateId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what} id"),
        )
    })
}
