//! Infrastructure layer: event store, command dispatch, projections, and the
//! incident workflow engine.

pub mod command_dispatcher;
pub mod event_store;
pub mod incident_engine;
pub mod projections;
pub mod read_model;

/// Aggregate type identifiers used as stream labels.
///
/// Passed to the dispatcher/engine at append time and matched by projections
/// when filtering the shared envelope feed.
pub mod streams {
    pub const PRODUCT: &str = "catalog.product";
    pub const CUSTOMER: &str = "customers.customer";
    pub const RENTAL_ORDER: &str = "rentals.order";
    pub const INCIDENT_LEDGER: &str = "incidents.ledger";
    pub const USER: &str = "auth.user";
}
