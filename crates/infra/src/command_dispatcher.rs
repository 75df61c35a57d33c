//! Command execution pipeline (application-level orchestration).
//!
//! The `CommandDispatcher` implements the command execution lifecycle shared
//! by every aggregate:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events to store (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus (for projections, handlers, etc.)
//! ```
//!
//! Events are persisted before publication; if the append fails, nothing is
//! published. If publication fails after a successful append the error is
//! surfaced, giving at-least-once delivery (subscribers must be idempotent).
//!
//! This module contains no IO itself; it composes the `EventStore` and
//! `EventBus` traits, so it runs against in-memory implementations in tests
//! and real backends in production without changes to domain code.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use eventhire_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use eventhire_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug)]
pub enum DispatchError {
    /// Optimistic concurrency failure (e.g. stale aggregate version).
    Concurrency(String),
    /// Domain validation failure (deterministic).
    Validation(String),
    /// Domain invariant failure (deterministic).
    InvariantViolation(String),
    /// Domain authorization failure.
    Unauthorized,
    /// Domain-level not found.
    NotFound,
    /// Failed to deserialize historical event payloads into the aggregate event type.
    Deserialize(String),
    /// Persisting to the event store failed.
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and bus so tests compose `InMemoryEventStore` +
/// `InMemoryEventBus` while production wires durable backends. Aggregates
/// must be deterministic and side-effect free; the `make_aggregate` factory
/// lets domain code control initialization (e.g. `Product::empty(id)`).
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full pipeline.
    ///
    /// Uses optimistic concurrency: the stream version observed during load is
    /// expected at append time, so a concurrent writer surfaces as
    /// `DispatchError::Concurrency` and the caller can reload and retry.
    ///
    /// Returns the committed `StoredEvent`s (with assigned sequence numbers),
    /// or an empty vector when the command decided no events.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: eventhire_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish committed events (after append)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

pub(crate) fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

pub(crate) fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Ensure the stream belongs to the requested aggregate and is
    // monotonically increasing by sequence number, even if a buggy backend
    // returns mixed data.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!("loaded stream contains wrong aggregate_id at index {idx}"),
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!(
                    "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                    e.sequence_number
                ),
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

pub(crate) fn apply_history<A>(
    aggregate: &mut A,
    history: &[StoredEvent],
) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    use eventhire_catalog::{
        AdjustStock, CreateProduct, Product, ProductCategory, ProductCommand, ProductId,
        StockMovementReason,
    };
    use eventhire_events::InMemoryEventBus;

    use crate::event_store::InMemoryEventStore;
    use crate::streams;

    type TestDispatcher =
        CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> TestDispatcher {
        CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
        )
    }

    fn create_cmd(product_id: ProductId, initial_stock: i64) -> ProductCommand {
        ProductCommand::CreateProduct(CreateProduct {
            product_id,
            name: "Folding chair".to_string(),
            category: ProductCategory::Furniture,
            unit_price: 250,
            initial_stock,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_persists_and_publishes_decided_events() {
        let dispatcher = dispatcher();
        let product_id = ProductId::new(AggregateId::new());

        let committed = dispatcher
            .dispatch::<Product>(
                product_id.0,
                streams::PRODUCT,
                create_cmd(product_id, 10),
                |id| Product::empty(ProductId::new(id)),
            )
            .unwrap();

        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].sequence_number, 1);
        assert_eq!(committed[0].event_type, "catalog.product.created");
    }

    #[test]
    fn dispatch_surfaces_domain_errors() {
        let dispatcher = dispatcher();
        let product_id = ProductId::new(AggregateId::new());

        let err = dispatcher
            .dispatch::<Product>(
                product_id.0,
                streams::PRODUCT,
                ProductCommand::AdjustStock(AdjustStock {
                    product_id,
                    delta: -1,
                    reason: StockMovementReason::Correction,
                    occurred_at: Utc::now(),
                }),
                |id| Product::empty(ProductId::new(id)),
            )
            .unwrap_err();

        assert!(matches!(err, DispatchError::NotFound));
    }

    #[test]
    fn dispatch_rehydrates_before_deciding() {
        let dispatcher = dispatcher();
        let product_id = ProductId::new(AggregateId::new());

        dispatcher
            .dispatch::<Product>(
                product_id.0,
                streams::PRODUCT,
                create_cmd(product_id, 5),
                |id| Product::empty(ProductId::new(id)),
            )
            .unwrap();

        // A debit below zero must fail against the rehydrated stock, not empty state.
        let err = dispatcher
            .dispatch::<Product>(
                product_id.0,
                streams::PRODUCT,
                ProductCommand::AdjustStock(AdjustStock {
                    product_id,
                    delta: -6,
                    reason: StockMovementReason::IncidentDebit,
                    occurred_at: Utc::now(),
                }),
                |id| Product::empty(ProductId::new(id)),
            )
            .unwrap_err();

        assert!(matches!(err, DispatchError::InvariantViolation(_)));
    }
}
