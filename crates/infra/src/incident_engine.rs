//! Incident workflow engine.
//!
//! Coordinates the two streams an incident touches: the ledger of the rental
//! line item and the stock of the affected product. The ledger aggregate owns
//! the capacity invariant; this engine owns the cross-stream protocol:
//!
//! - **Create** debits product stock in the same guarded section that checks
//!   line capacity, so the two can never disagree.
//! - **Resolve** validates the transition first (pure `handle`, no mutation)
//!   and only then credits stock according to the outcome.
//! - **Void** releases the entry; whether the original debit is credited back
//!   is a process-wide [`VoidPolicy`].
//!
//! Work on one line item is serialized through a per-line mutex; commands for
//! different line items proceed in parallel. Within the guarded section the
//! product stream is appended before the ledger stream: the product stream is
//! the one other writers touch concurrently, so its optimistic append is the
//! step that can fail, and failing there leaves no partial state behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use chrono::{DateTime, Utc};

use eventhire_catalog::{
    AdjustStock, Product, ProductCommand, ProductId, StockMovementReason,
};
use eventhire_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use eventhire_events::{Event, EventBus, EventEnvelope};
use eventhire_incidents::{
    DamageKind, IncidentEntry, IncidentError, IncidentId, IncidentLedger, IncidentLedgerCommand,
    IncidentLedgerEvent, IncidentOutcome, OpenIncident, ResolveIncident, VoidIncident, VoidPolicy,
    stock_credit_for,
};
use eventhire_rentals::{LineItemId, RentalOrder, RentalOrderId};

use crate::event_store::{EventStore, EventStoreError, UncommittedEvent};
use crate::streams;

/// Lookup capability the engine falls back to when an incident id is not in
/// its own index (e.g. after a restart). The incidents projection implements
/// this.
pub trait IncidentDirectory: Send + Sync {
    fn line_item_for(&self, incident_id: IncidentId) -> Option<LineItemId>;
}

/// No fallback; only incidents created by this engine instance resolve.
impl IncidentDirectory for () {
    fn line_item_for(&self, _incident_id: IncidentId) -> Option<LineItemId> {
        None
    }
}

impl<D> IncidentDirectory for Arc<D>
where
    D: IncidentDirectory + ?Sized,
{
    fn line_item_for(&self, incident_id: IncidentId) -> Option<LineItemId> {
        (**self).line_item_for(incident_id)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Deterministic rejection by the incident state machine.
    #[error(transparent)]
    Incident(#[from] IncidentError),

    /// Product stock cannot cover the requested debit. Checked before any
    /// append, so nothing is persisted.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    #[error("rental order not found")]
    RentalNotFound,

    #[error("rental order is not confirmed")]
    RentalNotConfirmed,

    #[error("line item not found on rental order")]
    LineNotFound,

    #[error("product not found")]
    ProductNotFound,

    #[error("incident not found")]
    IncidentNotFound,

    /// Product-side rejection other than insufficiency (e.g. retired product).
    #[error("domain error: {0}")]
    Domain(DomainError),

    #[error(transparent)]
    Store(EventStoreError),

    #[error("failed to deserialize stored events: {0}")]
    Deserialize(String),

    /// Publication failed after a successful append (at-least-once; the
    /// events are durable).
    #[error("event publication failed: {0}")]
    Publish(String),
}

/// Request to open an incident against a confirmed rental line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIncidentRequest {
    pub incident_id: IncidentId,
    pub order_id: RentalOrderId,
    pub line_item_id: LineItemId,
    pub damage_kind: DamageKind,
    pub affected_quantity: i64,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// Request to resolve an open incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveIncidentRequest {
    pub incident_id: IncidentId,
    pub outcome: IncidentOutcome,
    pub replaced_quantity: Option<i64>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Request to void an open incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoidIncidentRequest {
    pub incident_id: IncidentId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Snapshot of an incident entry together with its ledger binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentView {
    pub line_item_id: LineItemId,
    pub order_id: RentalOrderId,
    pub product_id: ProductId,
    pub entry: IncidentEntry,
}

/// Coordinates incident ledgers with product stock.
pub struct IncidentWorkflowEngine<S, B, D = ()> {
    store: S,
    bus: B,
    directory: D,
    void_policy: VoidPolicy,
    line_locks: Mutex<HashMap<LineItemId, Arc<Mutex<()>>>>,
    incident_index: RwLock<HashMap<IncidentId, LineItemId>>,
}

impl<S, B, D> IncidentWorkflowEngine<S, B, D> {
    pub fn new(store: S, bus: B, directory: D, void_policy: VoidPolicy) -> Self {
        Self {
            store,
            bus,
            directory,
            void_policy,
            line_locks: Mutex::new(HashMap::new()),
            incident_index: RwLock::new(HashMap::new()),
        }
    }

    pub fn void_policy(&self) -> VoidPolicy {
        self.void_policy
    }

    fn line_lock(&self, line_item_id: LineItemId) -> Arc<Mutex<()>> {
        let mut locks = match self.line_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(line_item_id).or_default().clone()
    }
}

fn hold(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<S, B, D> IncidentWorkflowEngine<S, B, D>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    D: IncidentDirectory,
{
    /// Open an incident: capacity-check the line, debit product stock, and
    /// record the ledger entry, all under the line's lock.
    ///
    /// Nothing is persisted when any check fails.
    #[instrument(
        skip(self, request),
        fields(incident_id = %request.incident_id, line_item_id = %request.line_item_id),
        err
    )]
    pub fn create_incident(
        &self,
        request: &CreateIncidentRequest,
    ) -> Result<IncidentView, EngineError> {
        let lock = self.line_lock(request.line_item_id);
        let _guard = hold(&lock);

        // Bind the line: it must exist on a confirmed order.
        let (order, order_version) = self.load(request.order_id.0, || {
            RentalOrder::empty(request.order_id)
        })?;
        if order_version == 0 {
            return Err(EngineError::RentalNotFound);
        }
        if !order.is_confirmed() {
            return Err(EngineError::RentalNotConfirmed);
        }
        let line = order
            .line(request.line_item_id)
            .ok_or(EngineError::LineNotFound)?;

        let (ledger, ledger_version) = self.load(request.line_item_id.0, || {
            IncidentLedger::empty(request.line_item_id)
        })?;
        let (product, product_version) =
            self.load(line.product_id.0, || Product::empty(line.product_id))?;
        if product_version == 0 {
            return Err(EngineError::ProductNotFound);
        }

        // Capacity decision is the ledger's; it sees only open entries.
        let ledger_events = ledger.handle(&IncidentLedgerCommand::OpenIncident(OpenIncident {
            line_item_id: request.line_item_id,
            incident_id: request.incident_id,
            order_id: request.order_id,
            product_id: line.product_id,
            line_quantity: line.quantity,
            damage_kind: request.damage_kind,
            affected_quantity: request.affected_quantity,
            description: request.description.clone(),
            occurred_at: request.occurred_at,
        }))?;

        // Stock check is separate from capacity and reported as its own error.
        let available = product.stock();
        if available < request.affected_quantity {
            return Err(EngineError::InsufficientStock {
                requested: request.affected_quantity,
                available,
            });
        }

        let debit_events = product
            .handle(&ProductCommand::AdjustStock(AdjustStock {
                product_id: line.product_id,
                delta: -request.affected_quantity,
                reason: StockMovementReason::IncidentDebit,
                occurred_at: request.occurred_at,
            }))
            .map_err(EngineError::Domain)?;

        self.append_and_publish(
            line.product_id.0,
            streams::PRODUCT,
            product_version,
            &debit_events,
        )?;
        self.append_and_publish(
            request.line_item_id.0,
            streams::INCIDENT_LEDGER,
            ledger_version,
            &ledger_events,
        )?;

        if let Ok(mut index) = self.incident_index.write() {
            index.insert(request.incident_id, request.line_item_id);
        }

        self.view_after(ledger, &ledger_events, request.incident_id)
    }

    /// Resolve an open incident, crediting stock according to the outcome.
    #[instrument(skip(self, request), fields(incident_id = %request.incident_id), err)]
    pub fn resolve_incident(
        &self,
        request: &ResolveIncidentRequest,
    ) -> Result<IncidentView, EngineError> {
        let line_item_id = self.locate(request.incident_id)?;
        let lock = self.line_lock(line_item_id);
        let _guard = hold(&lock);

        let (ledger, ledger_version) =
            self.load(line_item_id.0, || IncidentLedger::empty(line_item_id))?;
        let entry = ledger
            .entry(request.incident_id)
            .ok_or(EngineError::IncidentNotFound)?
            .clone();

        // All resolution validation happens here, before any mutation.
        let ledger_events =
            ledger.handle(&IncidentLedgerCommand::ResolveIncident(ResolveIncident {
                line_item_id,
                incident_id: request.incident_id,
                outcome: request.outcome,
                replaced_quantity: request.replaced_quantity,
                description: request.description.clone(),
                occurred_at: request.occurred_at,
            }))?;

        let replaced = ledger_events
            .iter()
            .find_map(|e| match e {
                IncidentLedgerEvent::IncidentResolved(r) => Some(r.replaced_quantity),
                _ => None,
            })
            .unwrap_or(0);
        let credit = stock_credit_for(request.outcome, entry.affected_quantity, replaced);

        if credit > 0 {
            let reason = match request.outcome {
                IncidentOutcome::Replaced => StockMovementReason::IncidentReplacement,
                _ => StockMovementReason::IncidentRestock,
            };
            self.credit_stock(&ledger, credit, reason, request.occurred_at)?;
        }

        self.append_and_publish(
            line_item_id.0,
            streams::INCIDENT_LEDGER,
            ledger_version,
            &ledger_events,
        )?;

        self.view_after(ledger, &ledger_events, request.incident_id)
    }

    /// Void an open incident. Under [`VoidPolicy::RestoreStock`] the original
    /// debit is credited back; under [`VoidPolicy::WriteOff`] it stands.
    #[instrument(skip(self, request), fields(incident_id = %request.incident_id), err)]
    pub fn void_incident(
        &self,
        request: &VoidIncidentRequest,
    ) -> Result<IncidentView, EngineError> {
        let line_item_id = self.locate(request.incident_id)?;
        let lock = self.line_lock(line_item_id);
        let _guard = hold(&lock);

        let (ledger, ledger_version) =
            self.load(line_item_id.0, || IncidentLedger::empty(line_item_id))?;
        let entry = ledger
            .entry(request.incident_id)
            .ok_or(EngineError::IncidentNotFound)?
            .clone();

        let ledger_events = ledger.handle(&IncidentLedgerCommand::VoidIncident(VoidIncident {
            line_item_id,
            incident_id: request.incident_id,
            reason: request.reason.clone(),
            occurred_at: request.occurred_at,
        }))?;

        if self.void_policy == VoidPolicy::RestoreStock {
            self.credit_stock(
                &ledger,
                entry.affected_quantity,
                StockMovementReason::IncidentVoidReversal,
                request.occurred_at,
            )?;
        }

        self.append_and_publish(
            line_item_id.0,
            streams::INCIDENT_LEDGER,
            ledger_version,
            &ledger_events,
        )?;

        self.view_after(ledger, &ledger_events, request.incident_id)
    }

    /// Rehydrated ledger for a line item, for read paths that need exact
    /// capacity numbers rather than the eventually consistent projection.
    pub fn ledger(&self, line_item_id: LineItemId) -> Result<IncidentLedger, EngineError> {
        let (ledger, _) = self.load(line_item_id.0, || IncidentLedger::empty(line_item_id))?;
        Ok(ledger)
    }

    fn locate(&self, incident_id: IncidentId) -> Result<LineItemId, EngineError> {
        let indexed = self
            .incident_index
            .read()
            .ok()
            .and_then(|m| m.get(&incident_id).copied());
        if let Some(line_item_id) = indexed {
            return Ok(line_item_id);
        }
        self.directory
            .line_item_for(incident_id)
            .ok_or(EngineError::IncidentNotFound)
    }

    fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make: impl FnOnce() -> A,
    ) -> Result<(A, u64), EngineError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self
            .store
            .load_stream(aggregate_id)
            .map_err(EngineError::Store)?;
        let version = history.last().map(|e| e.sequence_number).unwrap_or(0);

        let mut aggregate = make();
        for stored in &history {
            let event: A::Event = serde_json::from_value(stored.payload.clone())
                .map_err(|e| EngineError::Deserialize(e.to_string()))?;
            aggregate.apply(&event);
        }

        Ok((aggregate, version))
    }

    fn credit_stock(
        &self,
        ledger: &IncidentLedger,
        credit: i64,
        reason: StockMovementReason,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let product_id = ledger.product_id().ok_or(EngineError::ProductNotFound)?;
        let (product, product_version) =
            self.load(product_id.0, || Product::empty(product_id))?;
        if product_version == 0 {
            return Err(EngineError::ProductNotFound);
        }

        let credit_events = product
            .handle(&ProductCommand::AdjustStock(AdjustStock {
                product_id,
                delta: credit,
                reason,
                occurred_at,
            }))
            .map_err(EngineError::Domain)?;

        self.append_and_publish(product_id.0, streams::PRODUCT, product_version, &credit_events)
    }

    fn append_and_publish<E>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        expected_version: u64,
        events: &[E],
    ) -> Result<(), EngineError>
    where
        E: Event + Serialize,
    {
        let uncommitted = events
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()
            .map_err(EngineError::Store)?;

        let committed = self
            .store
            .append(uncommitted, ExpectedVersion::Exact(expected_version))
            .map_err(EngineError::Store)?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| EngineError::Publish(format!("{e:?}")))?;
        }

        Ok(())
    }

    fn view_after(
        &self,
        mut ledger: IncidentLedger,
        events: &[IncidentLedgerEvent],
        incident_id: IncidentId,
    ) -> Result<IncidentView, EngineError> {
        for event in events {
            ledger.apply(event);
        }
        let order_id = ledger.order_id().ok_or(EngineError::IncidentNotFound)?;
        let product_id = ledger.product_id().ok_or(EngineError::IncidentNotFound)?;
        let entry = ledger
            .entry(incident_id)
            .ok_or(EngineError::IncidentNotFound)?
            .clone();

        Ok(IncidentView {
            line_item_id: ledger.id_typed(),
            order_id,
            product_id,
            entry,
        })
    }
}
