//! `eventhire-incidents` — damage/loss ledgers per rental line item.
//!
//! Each confirmed rental line gets at most one [`IncidentLedger`] aggregate
//! (streamed under the line item id). The ledger owns the incident state
//! machine and the capacity invariant; stock side effects are coordinated by
//! the workflow engine in the infra crate.

pub mod error;
pub mod ledger;

pub use error::IncidentError;
pub use ledger::{
    DamageKind, IncidentEntry, IncidentId, IncidentLedger, IncidentLedgerCommand,
    IncidentLedgerEvent, IncidentOutcome, IncidentStatus, OpenIncident, ResolveIncident,
    VoidIncident, VoidPolicy, stock_credit_for,
};
