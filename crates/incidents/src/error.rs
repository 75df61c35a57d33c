//! Incident ledger error taxonomy.

use thiserror::Error;

use crate::ledger::IncidentStatus;

/// Deterministic failures of the incident state machine.
///
/// Every variant is a distinct, user-visible error kind; callers map them to
/// API error codes without string matching.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IncidentError {
    /// Malformed or missing required input (rejected before any state change).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Requested affected quantity exceeds what remains available on the line.
    #[error("capacity exceeded: requested {requested}, available {available}")]
    CapacityExceeded { requested: i64, available: i64 },

    /// Attempted to resolve or void an entry that is not open.
    #[error("invalid transition: entry is {status:?}")]
    InvalidTransition { status: IncidentStatus },

    /// Outcome incompatible with the damage kind (irreparable + restocked).
    #[error("illegal outcome: irreparable damage cannot be restocked")]
    IllegalOutcome,

    /// `replaced` outcome without a positive replacement quantity.
    #[error("replaced outcome requires a positive replaced_quantity")]
    MissingReplacementQuantity,

    /// Replacement quantity larger than the affected quantity.
    #[error("replaced_quantity {replaced} exceeds affected_quantity {affected}")]
    ReplacementExceedsAffected { replaced: i64, affected: i64 },

    /// Referenced incident entry does not exist on this ledger.
    #[error("incident entry not found")]
    EntryNotFound,

    /// Duplicate identifier or binding mismatch on the ledger.
    #[error("conflict: {0}")]
    Conflict(String),
}
