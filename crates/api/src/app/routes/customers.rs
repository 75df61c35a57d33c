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

use eventhire_auth::Permission;
use eventhire_core::AggregateId;
use eventhire_customers::{
    ArchiveCustomer, ContactInfo, Customer, CustomerCommand, CustomerId, RegisterCustomer,
    UpdateContact,
};
use eventhire_infra::streams;

use crate::app::routes::common::{CmdAuth, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register).get(list))
        .route("/:id", get(get_one))
        .route("/:id/contact", put(update_contact))
        .route("/:id/archive", post(archive))
}

fn contact_from(req: dto::ContactRequest) -> ContactInfo {
    ContactInfo {
        email: req.email,
        phone: req.phone,
        address: req.address,
    }
}

async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RegisterCustomerRequest>,
) -> axum::response::Response {
    let customer_id = CustomerId::new(AggregateId::new());
    let command = CmdAuth {
        inner: RegisterCustomer {
            customer_id,
            first_name: body.first_name,
            last_name: body.last_name,
            national_id: body.national_id,
            contact: contact_from(body.contact),
            notes: body.notes,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("customers.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Customer>(
        customer_id.0,
        streams::CUSTOMER,
        CustomerCommand::RegisterCustomer(command.inner),
        |id| Customer::empty(CustomerId::new(id)),
    ) {
        Ok(committed) => (
            StatusCode::CREATED,
            Json(json!({
                "id": customer_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn list(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let customers = services
        .customers()
        .list()
        .into_iter()
        .map(dto::customer_to_json)
        .collect::<Vec<_>>();
    Json(json!({ "customers": customers })).into_response()
}

async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let customer_id = match parse_id(&id, "customer") {
        Ok(id) => CustomerId::new(id),
        Err(resp) => return resp,
    };
    match services.customers().get(&customer_id) {
        Some(rm) => Json(dto::customer_to_json(rm)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "customer not found"),
    }
}

async fn update_contact(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateContactRequest>,
) -> axum::response::Response {
    let customer_id = match parse_id(&id, "customer") {
        Ok(id) => CustomerId::new(id),
        Err(resp) => return resp,
    };
    let command = CmdAuth {
        inner: UpdateContact {
            customer_id,
            contact: contact_from(body.contact),
            notes: body.notes,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("customers.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Customer>(
        customer_id.0,
        streams::CUSTOMER,
        CustomerCommand::UpdateContact(command.inner),
        |id| Customer::empty(CustomerId::new(id)),
    ) {
        Ok(committed) => (
            StatusCode::OK,
            Json(json!({
                "id": customer_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn archive(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let customer_id = match parse_id(&id, "customer") {
        Ok(id) => CustomerId::new(id),
        Err(resp) => return resp,
    };
    let command = CmdAuth {
        inner: ArchiveCustomer {
            customer_id,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("customers.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Customer>(
        customer_id.0,
        streams::CUSTOMER,
        CustomerCommand::ArchiveCustomer(command.inner),
        |id| Customer::empty(CustomerId::new(id)),
    ) {
        Ok(committed) => (
            StatusCode::OK,
            Json(json!({
                "id": customer_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
