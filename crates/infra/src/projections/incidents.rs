use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use eventhire_catalog::{OpenIncidentQuery, ProductId};
use eventhire_events::EventEnvelope;
use eventhire_incidents::{
    DamageKind, IncidentId, IncidentLedgerEvent, IncidentOutcome, IncidentStatus,
};
use eventhire_rentals::{LineItemId, RentalOrderId};

use super::{CursorCheck, ProjectionError, StreamCursors};
use crate::incident_engine::IncidentDirectory;
use crate::read_model::KeyStore;
use crate::streams;

/// One incident entry, flattened for querying across ledgers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentRecord {
    pub incident_id: IncidentId,
    pub line_item_id: LineItemId,
    pub order_id: RentalOrderId,
    pub product_id: ProductId,
    pub status: IncidentStatus,
    pub damage_kind: DamageKind,
    pub affected_quantity: i64,
    pub outcome: IncidentOutcome,
    pub replaced_quantity: i64,
    pub description: String,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Incident read model over every ledger stream.
///
/// Doubles as the open-incident capability for the catalog retirement guard
/// and as the incident directory the workflow engine falls back to after a
/// restart.
#[derive(Debug)]
pub struct IncidentsProjection<S>
where
    S: KeyStore<IncidentId, IncidentRecord>,
{
    store: S,
    /// Open affected quantity per product, for the retirement guard.
    open_by_product: RwLock<HashMap<ProductId, i64>>,
    line_of: RwLock<HashMap<IncidentId, LineItemId>>,
    cursors: StreamCursors,
}

impl<S> IncidentsProjection<S>
where
    S: KeyStore<IncidentId, IncidentRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            open_by_product: RwLock::new(HashMap::new()),
            line_of: RwLock::new(HashMap::new()),
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, incident_id: &IncidentId) -> Option<IncidentRecord> {
        self.store.get(incident_id)
    }

    pub fn list(&self) -> Vec<IncidentRecord> {
        let mut records = self.store.list();
        records.sort_by_key(|r| r.opened_at);
        records
    }

    pub fn list_for_line(&self, line_item_id: LineItemId) -> Vec<IncidentRecord> {
        let mut records: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|r| r.line_item_id == line_item_id)
            .collect();
        records.sort_by_key(|r| r.opened_at);
        records
    }

    pub fn open_count(&self) -> usize {
        self.store
            .list()
            .iter()
            .filter(|r| r.status == IncidentStatus::Open)
            .count()
    }

    /// Whether any line of an order still has an open incident.
    ///
    /// Closing or cancelling an order is blocked while this holds.
    pub fn has_open_incidents_for_order(&self, order_id: RentalOrderId) -> bool {
        self.store
            .list()
            .iter()
            .any(|r| r.order_id == order_id && r.status == IncidentStatus::Open)
    }

    /// Open affected quantity across all lines of a product.
    pub fn open_quantity_for_product(&self, product_id: ProductId) -> i64 {
        self.open_by_product
            .read()
            .ok()
            .and_then(|m| m.get(&product_id).copied())
            .unwrap_or(0)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::INCIDENT_LEDGER {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(aggregate_id, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let event: IncidentLedgerEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let line_item_id = match &event {
            IncidentLedgerEvent::IncidentOpened(e) => e.line_item_id,
            IncidentLedgerEvent::IncidentResolved(e) => e.line_item_id,
            IncidentLedgerEvent::IncidentVoided(e) => e.line_item_id,
        };
        if line_item_id.0 != aggregate_id {
            return Err(ProjectionError::StreamMismatch(
                "event line_item_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            IncidentLedgerEvent::IncidentOpened(e) => {
                self.store.upsert(
                    e.incident_id,
                    IncidentRecord {
                        incident_id: e.incident_id,
                        line_item_id: e.line_item_id,
                        order_id: e.order_id,
                        product_id: e.product_id,
                        status: IncidentStatus::Open,
                        damage_kind: e.damage_kind,
                        affected_quantity: e.affected_quantity,
                        outcome: IncidentOutcome::NoAction,
                        replaced_quantity: 0,
                        description: e.description,
                        opened_at: e.occurred_at,
                        resolved_at: None,
                    },
                );
                self.adjust_open(e.product_id, e.affected_quantity);
                if let Ok(mut index) = self.line_of.write() {
                    index.insert(e.incident_id, e.line_item_id);
                }
            }
            IncidentLedgerEvent::IncidentResolved(e) => {
                if let Some(mut record) = self.store.get(&e.incident_id) {
                    if record.status == IncidentStatus::Open {
                        self.adjust_open(record.product_id, -record.affected_quantity);
                    }
                    record.status = IncidentStatus::Resolved;
                    record.outcome = e.outcome;
                    record.replaced_quantity = e.replaced_quantity;
                    record.resolved_at = Some(e.occurred_at);
                    if let Some(description) = e.description {
                        record.description = description;
                    }
                    self.store.upsert(e.incident_id, record);
                }
            }
            IncidentLedgerEvent::IncidentVoided(e) => {
                if let Some(mut record) = self.store.get(&e.incident_id) {
                    if record.status == IncidentStatus::Open {
                        self.adjust_open(record.product_id, -record.affected_quantity);
                    }
                    record.status = IncidentStatus::Voided;
                    self.store.upsert(e.incident_id, record);
                }
            }
        }

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    fn adjust_open(&self, product_id: ProductId, delta: i64) {
        if let Ok(mut m) = self.open_by_product.write() {
            let slot = m.entry(product_id).or_insert(0);
            *slot += delta;
            if *slot <= 0 {
                m.remove(&product_id);
            }
        }
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.cursors.clear();
        self.store.clear();
        if let Ok(mut m) = self.open_by_product.write() {
            m.clear();
        }
        if let Ok(mut index) = self.line_of.write() {
            index.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}

impl<S> OpenIncidentQuery for IncidentsProjection<S>
where
    S: KeyStore<IncidentId, IncidentRecord>,
{
    fn has_open_incidents(&self, product_id: ProductId) -> bool {
        self.open_quantity_for_product(product_id) > 0
    }
}

impl<S> IncidentDirectory for IncidentsProjection<S>
where
    S: KeyStore<IncidentId, IncidentRecord>,
{
    fn line_item_for(&self, incident_id: IncidentId) -> Option<LineItemId> {
        self.line_of.read().ok()?.get(&incident_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    use eventhire_core::AggregateId;
    use eventhire_incidents::ledger::{IncidentOpened, IncidentResolved, IncidentVoided};

    use crate::read_model::InMemoryKeyStore;

    fn envelope(
        line_item_id: LineItemId,
        seq: u64,
        event: &IncidentLedgerEvent,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            line_item_id.0,
            streams::INCIDENT_LEDGER,
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    fn opened(
        line_item_id: LineItemId,
        incident_id: IncidentId,
        product_id: ProductId,
        affected: i64,
    ) -> IncidentLedgerEvent {
        IncidentLedgerEvent::IncidentOpened(IncidentOpened {
            line_item_id,
            incident_id,
            order_id: RentalOrderId::new(AggregateId::new()),
            product_id,
            line_quantity: 5,
            damage_kind: DamageKind::Repairable,
            affected_quantity: affected,
            description: "scratched".to_string(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn open_incidents_feed_the_retirement_guard() {
        let projection = IncidentsProjection::new(InMemoryKeyStore::new());
        let line_item_id = LineItemId::new(AggregateId::new());
        let incident_id = IncidentId::new(AggregateId::new());
        let product_id = ProductId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(
                line_item_id,
                1,
                &opened(line_item_id, incident_id, product_id, 3),
            ))
            .unwrap();

        assert!(projection.has_open_incidents(product_id));
        assert_eq!(projection.open_quantity_for_product(product_id), 3);

        projection
            .apply_envelope(&envelope(
                line_item_id,
                2,
                &IncidentLedgerEvent::IncidentResolved(IncidentResolved {
                    line_item_id,
                    incident_id,
                    outcome: IncidentOutcome::Restocked,
                    replaced_quantity: 0,
                    description: None,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        assert!(!projection.has_open_incidents(product_id));
        let record = projection.get(&incident_id).unwrap();
        assert_eq!(record.status, IncidentStatus::Resolved);
        assert!(record.resolved_at.is_some());
    }

    #[test]
    fn voided_incidents_release_the_guard() {
        let projection = IncidentsProjection::new(InMemoryKeyStore::new());
        let line_item_id = LineItemId::new(AggregateId::new());
        let incident_id = IncidentId::new(AggregateId::new());
        let product_id = ProductId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(
                line_item_id,
                1,
                &opened(line_item_id, incident_id, product_id, 2),
            ))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                line_item_id,
                2,
                &IncidentLedgerEvent::IncidentVoided(IncidentVoided {
                    line_item_id,
                    incident_id,
                    reason: "reported in error".to_string(),
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        assert!(!projection.has_open_incidents(product_id));
        assert_eq!(
            projection.get(&incident_id).unwrap().status,
            IncidentStatus::Voided
        );
    }

    #[test]
    fn open_incidents_block_their_order_until_resolved() {
        let projection = IncidentsProjection::new(InMemoryKeyStore::new());
        let line_item_id = LineItemId::new(AggregateId::new());
        let incident_id = IncidentId::new(AggregateId::new());
        let order_id = RentalOrderId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(
                line_item_id,
                1,
                &IncidentLedgerEvent::IncidentOpened(IncidentOpened {
                    line_item_id,
                    incident_id,
                    order_id,
                    product_id: ProductId::new(AggregateId::new()),
                    line_quantity: 5,
                    damage_kind: DamageKind::Repairable,
                    affected_quantity: 2,
                    description: "chipped".to_string(),
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        assert!(projection.has_open_incidents_for_order(order_id));
        assert!(!projection.has_open_incidents_for_order(RentalOrderId::new(AggregateId::new())));

        projection
            .apply_envelope(&envelope(
                line_item_id,
                2,
                &IncidentLedgerEvent::IncidentResolved(IncidentResolved {
                    line_item_id,
                    incident_id,
                    outcome: IncidentOutcome::NoAction,
                    replaced_quantity: 0,
                    description: None,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        assert!(!projection.has_open_incidents_for_order(order_id));
    }

    #[test]
    fn directory_resolves_incidents_to_their_line() {
        let projection = IncidentsProjection::new(InMemoryKeyStore::new());
        let line_item_id = LineItemId::new(AggregateId::new());
        let incident_id = IncidentId::new(AggregateId::new());
        let product_id = ProductId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(
                line_item_id,
                1,
                &opened(line_item_id, incident_id, product_id, 1),
            ))
            .unwrap();

        assert_eq!(projection.line_item_for(incident_id), Some(line_item_id));
        assert_eq!(
            projection.line_item_for(IncidentId::new(AggregateId::new())),
            None
        );
    }
}
