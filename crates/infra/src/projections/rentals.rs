use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use eventhire_catalog::ProductId;
use eventhire_customers::CustomerId;
use eventhire_events::EventEnvelope;
use eventhire_rentals::{LineItemId, RentalOrderEvent, RentalOrderId, RentalOrderStatus};

use super::{CursorCheck, ProjectionError, StreamCursors};
use crate::read_model::KeyStore;
use crate::streams;

/// One line of a rental order as seen by the read side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentalLineRecord {
    pub line_item_id: LineItemId,
    pub order_id: RentalOrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: u64,
}

/// Queryable rental order read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentalOrderReadModel {
    pub order_id: RentalOrderId,
    pub customer_id: CustomerId,
    pub event_date: Option<NaiveDate>,
    pub status: RentalOrderStatus,
    pub lines: Vec<RentalLineRecord>,
}

/// Rental orders projection.
///
/// Besides the per-order read model it keeps a line item index, since incident
/// workflows address lines directly by their globally unique id.
#[derive(Debug)]
pub struct RentalsProjection<S>
where
    S: KeyStore<RentalOrderId, RentalOrderReadModel>,
{
    store: S,
    line_index: RwLock<HashMap<LineItemId, RentalOrderId>>,
    cursors: StreamCursors,
}

impl<S> RentalsProjection<S>
where
    S: KeyStore<RentalOrderId, RentalOrderReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            line_index: RwLock::new(HashMap::new()),
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, order_id: &RentalOrderId) -> Option<RentalOrderReadModel> {
        self.store.get(order_id)
    }

    pub fn list(&self) -> Vec<RentalOrderReadModel> {
        let mut orders = self.store.list();
        orders.sort_by_key(|o| *o.order_id.0.as_uuid().as_bytes());
        orders
    }

    /// Resolve a line item to its order and line record.
    pub fn line_item(&self, line_item_id: LineItemId) -> Option<RentalLineRecord> {
        let order_id = *self.line_index.read().ok()?.get(&line_item_id)?;
        let order = self.store.get(&order_id)?;
        order
            .lines
            .into_iter()
            .find(|l| l.line_item_id == line_item_id)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::RENTAL_ORDER {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(aggregate_id, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let event: RentalOrderEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let order_id = match &event {
            RentalOrderEvent::RentalOpened(e) => e.order_id,
            RentalOrderEvent::LineAdded(e) => e.order_id,
            RentalOrderEvent::LineQuantityUpdated(e) => e.order_id,
            RentalOrderEvent::LineRemoved(e) => e.order_id,
            RentalOrderEvent::RentalConfirmed(e) => e.order_id,
            RentalOrderEvent::RentalClosed(e) => e.order_id,
            RentalOrderEvent::RentalCancelled(e) => e.order_id,
        };
        if order_id.0 != aggregate_id {
            return Err(ProjectionError::StreamMismatch(
                "event order_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            RentalOrderEvent::RentalOpened(e) => {
                self.store.upsert(
                    e.order_id,
                    RentalOrderReadModel {
                        order_id: e.order_id,
                        customer_id: e.customer_id,
                        event_date: e.event_date,
                        status: RentalOrderStatus::Draft,
                        lines: Vec::new(),
                    },
                );
            }
            RentalOrderEvent::LineAdded(e) => {
                if let Some(mut rm) = self.store.get(&e.order_id) {
                    rm.lines.push(RentalLineRecord {
                        line_item_id: e.line_item_id,
                        order_id: e.order_id,
                        product_id: e.product_id,
                        quantity: e.quantity,
                        unit_price: e.unit_price,
                    });
                    self.store.upsert(e.order_id, rm);
                }
                if let Ok(mut index) = self.line_index.write() {
                    index.insert(e.line_item_id, e.order_id);
                }
            }
            RentalOrderEvent::LineQuantityUpdated(e) => {
                if let Some(mut rm) = self.store.get(&e.order_id) {
                    if let Some(line) =
                        rm.lines.iter_mut().find(|l| l.line_item_id == e.line_item_id)
                    {
                        line.quantity = e.quantity;
                    }
                    self.store.upsert(e.order_id, rm);
                }
            }
            RentalOrderEvent::LineRemoved(e) => {
                if let Some(mut rm) = self.store.get(&e.order_id) {
                    rm.lines.retain(|l| l.line_item_id != e.line_item_id);
                    self.store.upsert(e.order_id, rm);
                }
                if let Ok(mut index) = self.line_index.write() {
                    index.remove(&e.line_item_id);
                }
            }
            RentalOrderEvent::RentalConfirmed(e) => {
                self.set_status(e.order_id, RentalOrderStatus::Confirmed);
            }
            RentalOrderEvent::RentalClosed(e) => {
                self.set_status(e.order_id, RentalOrderStatus::Closed);
            }
            RentalOrderEvent::RentalCancelled(e) => {
                self.set_status(e.order_id, RentalOrderStatus::Cancelled);
            }
        }

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    fn set_status(&self, order_id: RentalOrderId, status: RentalOrderStatus) {
        if let Some(mut rm) = self.store.get(&order_id) {
            rm.status = status;
            self.store.upsert(order_id, rm);
        }
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.cursors.clear();
        self.store.clear();
        if let Ok(mut index) = self.line_index.write() {
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use eventhire_core::AggregateId;
    use eventhire_rentals::order::{LineAdded, RentalConfirmed, RentalOpened};

    use crate::read_model::InMemoryKeyStore;

    fn envelope(order_id: RentalOrderId, seq: u64, event: &RentalOrderEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            order_id.0,
            streams::RENTAL_ORDER,
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    #[test]
    fn line_items_resolve_through_the_index() {
        let projection = RentalsProjection::new(InMemoryKeyStore::new());
        let order_id = RentalOrderId::new(AggregateId::new());
        let line_item_id = LineItemId::new(AggregateId::new());
        let product_id = ProductId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(
                order_id,
                1,
                &RentalOrderEvent::RentalOpened(RentalOpened {
                    order_id,
                    customer_id: CustomerId::new(AggregateId::new()),
                    event_date: None,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                order_id,
                2,
                &RentalOrderEvent::LineAdded(LineAdded {
                    order_id,
                    line_item_id,
                    product_id,
                    quantity: 5,
                    unit_price: 150,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                order_id,
                3,
                &RentalOrderEvent::RentalConfirmed(RentalConfirmed {
                    order_id,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        let line = projection.line_item(line_item_id).unwrap();
        assert_eq!(line.order_id, order_id);
        assert_eq!(line.product_id, product_id);
        assert_eq!(line.quantity, 5);
        assert_eq!(
            projection.get(&order_id).unwrap().status,
            RentalOrderStatus::Confirmed
        );
    }

    #[test]
    fn unknown_line_items_resolve_to_none() {
        let projection: RentalsProjection<InMemoryKeyStore<_, _>> =
            RentalsProjection::new(InMemoryKeyStore::new());
        assert!(projection.line_item(LineItemId::new(AggregateId::new())).is_none());
    }
}
