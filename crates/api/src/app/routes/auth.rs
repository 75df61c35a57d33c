use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use chrono::Utc;

use crate::app::services::{AppServices, LoginError};
use crate::app::{dto, errors};

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::LoginRequest>,
) -> axum::response::Response {
    match services.login(&body.username, &body.password, Utc::now()) {
        Ok(success) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "token": success.token,
                "expires_at": success.claims.expires_at,
                "username": success.claims.username,
                "role": success.claims.role,
                "group": success.claims.group.as_str(),
            })),
        )
            .into_response(),
        Err(LoginError::Locked { until }) => errors::json_error(
            StatusCode::LOCKED,
            "account_locked",
            format!("too many failed attempts; locked until {until}"),
        ),
        Err(LoginError::InvalidCredentials) => errors::json_error(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "invalid username or password",
        ),
        Err(LoginError::Suspended) => {
            errors::json_error(StatusCode::FORBIDDEN, "account_suspended", "account is suspended")
        }
        Err(LoginError::Token(e)) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "token_error",
            e.to_string(),
        ),
    }
}
