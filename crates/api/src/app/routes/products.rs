use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;

use eventhire_auth::Permission;
use eventhire_catalog::{
    AdjustStock, CreateProduct, Product, ProductId, RetireProduct, StockMovementReason,
    UpdateProduct, ensure_no_open_incidents,
};
use eventhire_core::AggregateId;

use crate::app::routes::common::{CmdAuth, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;
use eventhire_infra::streams;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create).get(list))
        .route("/:id", get(get_one).put(update))
        .route("/:id/stock", post(adjust_stock))
        .route("/:id/retire", post(retire))
}

async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateProductRequest>,
) -> axum::response::Response {
    let product_id = ProductId::new(AggregateId::new());
    let command = CmdAuth {
        inner: CreateProduct {
            product_id,
            name: body.name,
            category: body.category,
            unit_price: body.unit_price,
            initial_stock: body.initial_stock,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("catalog.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Product>(
        product_id.0,
        streams::PRODUCT,
        eventhire_catalog::ProductCommand::CreateProduct(command.inner),
        |id| Product::empty(ProductId::new(id)),
    ) {
        Ok(committed) => (
            StatusCode::CREATED,
            Json(json!({
                "id": product_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn list(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let products = services
        .catalog()
        .list()
        .into_iter()
        .map(dto::product_to_json)
        .collect::<Vec<_>>();
    Json(json!({ "products": products })).into_response()
}

async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id = match parse_id(&id, "product") {
        Ok(id) => ProductId::new(id),
        Err(resp) => return resp,
    };
    match services.catalog().get(&product_id) {
        Some(rm) => Json(dto::product_to_json(rm)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "product not found"),
    }
}

async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateProductRequest>,
) -> axum::response::Response {
    let product_id = match parse_id(&id, "product") {
        Ok(id) => ProductId::new(id),
        Err(resp) => return resp,
    };
    let command = CmdAuth {
        inner: UpdateProduct {
            product_id,
            name: body.name,
            category: body.category,
            unit_price: body.unit_price,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("catalog.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Product>(
        product_id.0,
        streams::PRODUCT,
        eventhire_catalog::ProductCommand::UpdateProduct(command.inner),
        |id| Product::empty(ProductId::new(id)),
    ) {
        Ok(committed) => (
            StatusCode::OK,
            Json(json!({
                "id": product_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> axum::response::Response {
    let product_id = match parse_id(&id, "product") {
        Ok(id) => ProductId::new(id),
        Err(resp) => return resp,
    };
    let command = CmdAuth {
        inner: AdjustStock {
            product_id,
            delta: body.delta,
            reason: body.reason.unwrap_or(StockMovementReason::Correction),
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("catalog.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Product>(
        product_id.0,
        streams::PRODUCT,
        eventhire_catalog::ProductCommand::AdjustStock(command.inner),
        |id| Product::empty(ProductId::new(id)),
    ) {
        Ok(committed) => (
            StatusCode::OK,
            Json(json!({
                "id": product_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn retire(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id = match parse_id(&id, "product") {
        Ok(id) => ProductId::new(id),
        Err(resp) => return resp,
    };
    let command = CmdAuth {
        inner: RetireProduct {
            product_id,
            occurred_at: Utc::now(),
        },
        required: vec![Permission::new("catalog.write")],
    };
    if let Err(e) = authz::authorize_command(&principal, &command) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    // Retirement precondition: no open incidents against any line of this
    // product. Checked against the incidents read model before dispatch.
    if let Err(e) = ensure_no_open_incidents(product_id, &**services.incidents()) {
        return errors::json_error(StatusCode::CONFLICT, "open_incidents", e.to_string());
    }

    match services.dispatch::<Product>(
        product_id.0,
        streams::PRODUCT,
        eventhire_catalog::ProductCommand::RetireProduct(command.inner),
        |id| Product::empty(ProductId::new(id)),
    ) {
        Ok(committed) => (
            StatusCode::OK,
            Json(json!({
                "id": product_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
