use std::sync::Arc;

use axum::{Json, Router, extract::Extension, response::IntoResponse, routing::get};
use serde_json::json;

use eventhire_catalog::ProductStatus;
use eventhire_customers::CustomerStatus;
use eventhire_rentals::RentalOrderStatus;

use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/", get(summary))
}

/// Cross-domain counters for the landing dashboard.
async fn summary(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let products = services.catalog().list();
    let active_products = products
        .iter()
        .filter(|p| p.status == ProductStatus::Active)
        .count();
    let total_stock: i64 = products.iter().map(|p| p.stock).sum();

    let customers = services.customers().list();
    let active_customers = customers
        .iter()
        .filter(|c| c.status == CustomerStatus::Active)
        .count();

    let rentals = services.rentals().list();
    let count_status =
        |s: RentalOrderStatus| rentals.iter().filter(|r| r.status == s).count();

    Json(json!({
        "products": {
            "total": products.len(),
            "active": active_products,
            "total_stock": total_stock,
        },
        "customers": {
            "total": customers.len(),
            "active": active_customers,
        },
        "rentals": {
            "total": rentals.len(),
            "draft": count_status(RentalOrderStatus::Draft),
            "confirmed": count_status(RentalOrderStatus::Confirmed),
            "closed": count_status(RentalOrderStatus::Closed),
            "cancelled": count_status(RentalOrderStatus::Cancelled),
        },
        "incidents": {
            "total": services.incidents().list().len(),
            "open": services.incidents().open_count(),
        },
    }))
    .into_response()
}
