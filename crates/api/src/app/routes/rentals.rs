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
use eventhire_catalog::ProductId;
use eventhire_core::AggregateId;
use eventhire_customers::CustomerId;
use eventhire_infra::streams;
use eventhire_rentals::{
    AddLine, CancelRental, CloseRental, ConfirmRental, LineItemId, OpenRental, RemoveLine,
    RentalOrder, RentalOrderCommand, RentalOrderId, UpdateLineQuantity,
};

use crate::app::routes::common::{CmdAuth, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(open).get(list))
        .route("/:id", get(get_one))
        .route("/:id/lines", post(add_line))
        .route(
            "/:id/lines/:line_id",
            put(update_line_quantity).delete(remove_line),
        )
        .route("/:id/confirm", post(confirm))
        .route("/:id/close", post(close))
        .route("/:id/cancel", post(cancel))
}

/// Dispatch a rental order command and render the standard commit response.
fn dispatch_order(
    services: &AppServices,
    order_id: RentalOrderId,
    command: RentalOrderCommand,
    status: StatusCode,
) -> axum::response::Response {
    match services.dispatch::<RentalOrder>(order_id.0, streams::RENTAL_ORDER, command, |id| {
        RentalOrder::empty(RentalOrderId::new(id))
    }) {
        Ok(committed) => (
            status,
            Json(json!({
                "id": order_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn open(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::OpenRentalRequest>,
) -> axum::response::Response {
    let customer_id = match parse_id(&body.customer_id, "customer") {
        Ok(id) => CustomerId::new(id),
        Err(resp) => return resp,
    };
    let order_id = RentalOrderId::new(AggregateId::new());
    let command = CmdAuth {
        inner: OpenRental {
            order_id,
            customer_id,
            event_date: body.event_date,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("rentals.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    dispatch_order(
        &services,
        order_id,
        RentalOrderCommand::OpenRental(command.inner),
        StatusCode::CREATED,
    )
}

async fn list(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let rentals = services
        .rentals()
        .list()
        .into_iter()
        .map(dto::rental_to_json)
        .collect::<Vec<_>>();
    Json(json!({ "rentals": rentals })).into_response()
}

async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_id(&id, "rental order") {
        Ok(id) => RentalOrderId::new(id),
        Err(resp) => return resp,
    };
    match services.rentals().get(&order_id) {
        Some(rm) => Json(dto::rental_to_json(rm)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "rental order not found"),
    }
}

async fn add_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddLineRequest>,
) -> axum::response::Response {
    let order_id = match parse_id(&id, "rental order") {
        Ok(id) => RentalOrderId::new(id),
        Err(resp) => return resp,
    };
    let product_id = match parse_id(&body.product_id, "product") {
        Ok(id) => ProductId::new(id),
        Err(resp) => return resp,
    };
    let line_item_id = LineItemId::new(AggregateId::new());
    let command = CmdAuth {
        inner: AddLine {
            order_id,
            line_item_id,
            product_id,
            quantity: body.quantity,
            unit_price: body.unit_price,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("rentals.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<RentalOrder>(
        order_id.0,
        streams::RENTAL_ORDER,
        RentalOrderCommand::AddLine(command.inner),
        |id| RentalOrder::empty(RentalOrderId::new(id)),
    ) {
        Ok(committed) => (
            StatusCode::CREATED,
            Json(json!({
                "id": order_id.to_string(),
                "line_item_id": line_item_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn update_line_quantity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, line_id)): Path<(String, String)>,
    Json(body): Json<dto::UpdateLineQuantityRequest>,
) -> axum::response::Response {
    let order_id = match parse_id(&id, "rental order") {
        Ok(id) => RentalOrderId::new(id),
        Err(resp) => return resp,
    };
    let line_item_id = match parse_id(&line_id, "line item") {
        Ok(id) => LineItemId::new(id),
        Err(resp) => return resp,
    };
    let command = CmdAuth {
        inner: UpdateLineQuantity {
            order_id,
            line_item_id,
            quantity: body.quantity,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("rentals.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    dispatch_order(
        &services,
        order_id,
        RentalOrderCommand::UpdateLineQuantity(command.inner),
        StatusCode::OK,
    )
}

async fn remove_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, line_id)): Path<(String, String)>,
) -> axum::response::Response {
    let order_id = match parse_id(&id, "rental order") {
        Ok(id) => RentalOrderId::new(id),
        Err(resp) => return resp,
    };
    let line_item_id = match parse_id(&line_id, "line item") {
        Ok(id) => LineItemId::new(id),
        Err(resp) => return resp,
    };
    let command = CmdAuth {
        inner: RemoveLine {
            order_id,
            line_item_id,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("rentals.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    dispatch_order(
        &services,
        order_id,
        RentalOrderCommand::RemoveLine(command.inner),
        StatusCode::OK,
    )
}

async fn confirm(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_id(&id, "rental order") {
        Ok(id) => RentalOrderId::new(id),
        Err(resp) => return resp,
    };
    let command = CmdAuth {
        inner: ConfirmRental {
            order_id,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("rentals.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    dispatch_order(
        &services,
        order_id,
        RentalOrderCommand::ConfirmRental(command.inner),
        StatusCode::OK,
    )
}

async fn close(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_id(&id, "rental order") {
        Ok(id) => RentalOrderId::new(id),
        Err(resp) => return resp,
    };
    let command = CmdAuth {
        inner: CloseRental {
            order_id,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("rentals.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    // Open incidents hold stock debits against this order's lines; the order
    // stays open until every incident is resolved or voided.
    if services.incidents().has_open_incidents_for_order(order_id) {
        return errors::json_error(
            StatusCode::CONFLICT,
            "open_incidents",
            "rental order has open incidents",
        );
    }

    dispatch_order(
        &services,
        order_id,
        RentalOrderCommand::CloseRental(command.inner),
        StatusCode::OK,
    )
}

async fn cancel(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_id(&id, "rental order") {
        Ok(id) => RentalOrderId::new(id),
        Err(resp) => return resp,
    };
    let command = CmdAuth {
        inner: CancelRental {
            order_id,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("rentals.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    if services.incidents().has_open_incidents_for_order(order_id) {
        return errors::json_error(
            StatusCode::CONFLICT,
            "open_incidents",
            "rental order has open incidents",
        );
    }

    dispatch_order(
        &services,
        order_id,
        RentalOrderCommand::CancelRental(command.inner),
        StatusCode::OK,
    )
}
