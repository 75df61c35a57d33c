use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;
use serde_json::json;

use eventhire_auth::user::{
    ChangeRole, CreateUser, ReactivateUser, SetPassword, SuspendUser, UpdateProfile,
};
use eventhire_auth::{PasswordHash, Permission, User, UserCommand, UserId};
use eventhire_core::AggregateId;
use eventhire_infra::streams;

use crate::app::routes::common::{CmdAuth, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create).get(list))
        .route("/:id", get(get_one))
        .route("/:id/profile", put(update_profile))
        .route("/:id/role", post(change_role))
        .route("/:id/password", post(set_password))
        .route("/:id/suspend", post(suspend))
        .route("/:id/reactivate", post(reactivate))
}

/// Dispatch a staff command and render the standard commit response.
fn dispatch_user(
    services: &AppServices,
    user_id: UserId,
    command: UserCommand,
    status: StatusCode,
) -> axum::response::Response {
    match services.dispatch::<User>(user_id.0, streams::USER, command, |id| {
        User::empty(UserId::new(id))
    }) {
        Ok(committed) => (
            status,
            Json(json!({
                "id": user_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateEmployeeRequest>,
) -> axum::response::Response {
    let password = match PasswordHash::create(&body.password) {
        Ok(hash) => hash,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "weak_password", e.to_string());
        }
    };
    let user_id = UserId::new(AggregateId::new());
    let command = CmdAuth {
        inner: CreateUser {
            user_id,
            username: body.username,
            display_name: body.display_name,
            email: body.email,
            phone: body.phone,
            national_id: body.national_id,
            hired_on: body.hired_on,
            role: body.role,
            superuser: body.superuser,
            password,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("employees.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    dispatch_user(
        &services,
        user_id,
        UserCommand::CreateUser(command.inner),
        StatusCode::CREATED,
    )
}

async fn list(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let employees = services
        .staff()
        .list()
        .into_iter()
        .map(dto::employee_to_json)
        .collect::<Vec<_>>();
    Json(json!({ "employees": employees })).into_response()
}

async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let user_id = match parse_id(&id, "employee") {
        Ok(id) => UserId::new(id),
        Err(resp) => return resp,
    };
    match services.staff().get(&user_id) {
        Some(rm) => Json(dto::employee_to_json(rm)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "employee not found"),
    }
}

async fn update_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateEmployeeProfileRequest>,
) -> axum::response::Response {
    let user_id = match parse_id(&id, "employee") {
        Ok(id) => UserId::new(id),
        Err(resp) => return resp,
    };
    let command = CmdAuth {
        inner: UpdateProfile {
            user_id,
            display_name: body.display_name,
            email: body.email,
            phone: body.phone,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("employees.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    dispatch_user(
        &services,
        user_id,
        UserCommand::UpdateProfile(command.inner),
        StatusCode::OK,
    )
}

async fn change_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeRoleRequest>,
) -> axum::response::Response {
    let user_id = match parse_id(&id, "employee") {
        Ok(id) => UserId::new(id),
        Err(resp) => return resp,
    };
    let command = CmdAuth {
        inner: ChangeRole {
            user_id,
            role: body.role,
            superuser: body.superuser,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("employees.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    // Access-group synchronization happens inside the aggregate: a role or
    // superuser change emits AccessGroupSynced alongside RoleChanged.
    dispatch_user(
        &services,
        user_id,
        UserCommand::ChangeRole(command.inner),
        StatusCode::OK,
    )
}

async fn set_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetPasswordRequest>,
) -> axum::response::Response {
    let user_id = match parse_id(&id, "employee") {
        Ok(id) => UserId::new(id),
        Err(resp) => return resp,
    };
    let password = match PasswordHash::create(&body.password) {
        Ok(hash) => hash,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "weak_password", e.to_string());
        }
    };
    let command = CmdAuth {
        inner: SetPassword {
            user_id,
            password,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("employees.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    dispatch_user(
        &services,
        user_id,
        UserCommand::SetPassword(command.inner),
        StatusCode::OK,
    )
}

async fn suspend(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let user_id = match parse_id(&id, "employee") {
        Ok(id) => UserId::new(id),
        Err(resp) => return resp,
    };
    let command = CmdAuth {
        inner: SuspendUser {
            user_id,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("employees.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    dispatch_user(
        &services,
        user_id,
        UserCommand::SuspendUser(command.inner),
        StatusCode::OK,
    )
}

async fn reactivate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let user_id = match parse_id(&id, "employee") {
        Ok(id) => UserId::new(id),
        Err(resp) => return resp,
    };
    let command = CmdAuth {
        inner: ReactivateUser {
            user_id,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("employees.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    dispatch_user(
        &services,
        user_id,
        UserCommand::ReactivateUser(command.inner),
        StatusCode::OK,
    )
}
