//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and build query-optimized read
//! models. All projections are:
//! - **Rebuildable**: can be reconstructed from the event stream
//! - **Idempotent**: safe for at-least-once delivery (replays <= cursor are ignored)
//! - **Filtered**: each projection matches on its aggregate type and ignores
//!   the rest of the shared envelope feed

pub mod catalog;
pub mod customers;
pub mod incidents;
pub mod rentals;
pub mod staff;

pub use catalog::{CatalogProjection, ProductReadModel};
pub use customers::{CustomerReadModel, CustomersProjection};
pub use incidents::{IncidentRecord, IncidentsProjection};
pub use rentals::{RentalLineRecord, RentalOrderReadModel, RentalsProjection};
pub use staff::{StaffProjection, StaffRecord};

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use eventhire_core::AggregateId;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("envelope does not match its stream: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Outcome of a cursor check for one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CursorCheck {
    /// First sight of this sequence number; apply and advance.
    Apply,
    /// Replay at or below the cursor; skip without error.
    Duplicate,
}

/// Per-stream cursors supporting idempotent, at-least-once projections.
///
/// A projection advances the cursor only after a successful apply, so a crash
/// between apply and advance re-applies the envelope on restart (upserts make
/// that safe).
#[derive(Debug, Default)]
pub(crate) struct StreamCursors {
    inner: RwLock<HashMap<AggregateId, u64>>,
}

impl StreamCursors {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn check(
        &self,
        aggregate_id: AggregateId,
        sequence_number: u64,
    ) -> Result<CursorCheck, ProjectionError> {
        let last = self
            .inner
            .read()
            .map(|m| m.get(&aggregate_id).copied().unwrap_or(0))
            .unwrap_or(0);

        if sequence_number == 0 {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: sequence_number,
            });
        }
        if sequence_number <= last {
            return Ok(CursorCheck::Duplicate);
        }
        // The first observed event may carry any positive sequence number (a
        // projection can attach mid-stream after a rebuild); after that,
        // strict +1 increments are required.
        if last != 0 && sequence_number != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: sequence_number,
            });
        }

        Ok(CursorCheck::Apply)
    }

    pub(crate) fn advance(&self, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut m) = self.inner.write() {
            m.insert(aggregate_id, sequence_number);
        }
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut m) = self.inner.write() {
            m.clear();
        }
    }
}
