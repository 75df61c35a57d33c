//! HTTP application wiring (Axum router + service graph).
//!
//! - `services.rs`: infrastructure wiring (event store/bus, projections,
//!   dispatcher, incident engine)
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::{get, post},
};

use eventhire_auth::Hs256TokenService;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(jwt_secret: String) -> Router {
    let tokens = Arc::new(Hs256TokenService::new(&jwt_secret));
    let auth_state = middleware::AuthState {
        tokens: tokens.clone(),
    };

    let services = Arc::new(services::build_services(tokens).await);

    // Protected routes: require a verified bearer token.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/auth/login", post(routes::auth::login))
        .merge(protected)
        .layer(Extension(services))
}
