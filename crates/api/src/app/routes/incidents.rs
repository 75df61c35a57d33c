use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use eventhire_auth::Permission;
use eventhire_core::AggregateId;
use eventhire_incidents::IncidentId;
use eventhire_infra::incident_engine::{
    CreateIncidentRequest, ResolveIncidentRequest, VoidIncidentRequest,
};
use eventhire_rentals::{LineItemId, RentalOrderId};

use crate::app::routes::common::{CmdAuth, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create).get(list))
        .route("/:id", get(get_one))
        .route("/:id/resolve", post(resolve))
        .route("/:id/void", post(void))
}

#[derive(Debug, Deserialize)]
struct ListFilter {
    line_item_id: Option<String>,
}

async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateIncidentRequest>,
) -> axum::response::Response {
    let order_id = match parse_id(&body.order_id, "rental order") {
        Ok(id) => RentalOrderId::new(id),
        Err(resp) => return resp,
    };
    let line_item_id = match parse_id(&body.line_item_id, "line item") {
        Ok(id) => LineItemId::new(id),
        Err(resp) => return resp,
    };
    let incident_id = IncidentId::new(AggregateId::new());
    let command = CmdAuth {
        inner: CreateIncidentRequest {
            incident_id,
            order_id,
            line_item_id,
            damage_kind: body.damage_kind,
            affected_quantity: body.affected_quantity,
            description: body.description,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("incidents.create")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.engine().create_incident(&command.inner) {
        Ok(view) => (StatusCode::CREATED, Json(dto::incident_view_to_json(view))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Query(filter): Query<ListFilter>,
) -> axum::response::Response {
    let records = match filter.line_item_id {
        Some(raw) => {
            let line_item_id = match parse_id(&raw, "line item") {
                Ok(id) => LineItemId::new(id),
                Err(resp) => return resp,
            };
            services.incidents().list_for_line(line_item_id)
        }
        None => services.incidents().list(),
    };
    let incidents = records
        .into_iter()
        .map(dto::incident_to_json)
        .collect::<Vec<_>>();
    Json(json!({ "incidents": incidents })).into_response()
}

async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let incident_id = match parse_id(&id, "incident") {
        Ok(id) => IncidentId::new(id),
        Err(resp) => return resp,
    };
    match services.incidents().get(&incident_id) {
        Some(rm) => Json(dto::incident_to_json(rm)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "incident not found"),
    }
}

async fn resolve(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ResolveIncidentRequest>,
) -> axum::response::Response {
    let incident_id = match parse_id(&id, "incident") {
        Ok(id) => IncidentId::new(id),
        Err(resp) => return resp,
    };
    let command = CmdAuth {
        inner: ResolveIncidentRequest {
            incident_id,
            outcome: body.outcome,
            replaced_quantity: body.replaced_quantity,
            description: body.description,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("incidents.resolve")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.engine().resolve_incident(&command.inner) {
        Ok(view) => (StatusCode::OK, Json(dto::incident_view_to_json(view))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

async fn void(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::VoidIncidentRequest>,
) -> axum::response::Response {
    let incident_id = match parse_id(&id, "incident") {
        Ok(id) => IncidentId::new(id),
        Err(resp) => return resp,
    };
    let command = CmdAuth {
        inner: VoidIncidentRequest {
            incident_id,
            reason: body.reason,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("incidents.void")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.engine().void_incident(&command.inner) {
        Ok(view) => (StatusCode::OK, Json(dto::incident_view_to_json(view))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
