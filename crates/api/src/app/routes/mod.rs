use axum::{Router, routing::get};

pub mod auth;
pub mod common;
pub mod customers;
pub mod dashboard;
pub mod employees;
pub mod incidents;
pub mod products;
pub mod rentals;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .nest("/products", products::router())
        .nest("/customers", customers::router())
        .nest("/rentals", rentals::router())
        .nest("/incidents", incidents::router())
        .nest("/employees", employees::router())
        .nest("/dashboard", dashboard::router())
}
