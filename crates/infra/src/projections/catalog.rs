use serde_json::Value as JsonValue;

use eventhire_catalog::{ProductCategory, ProductEvent, ProductId, ProductStatus};
use eventhire_events::EventEnvelope;

use super::{CursorCheck, ProjectionError, StreamCursors};
use crate::read_model::KeyStore;
use crate::streams;

/// Queryable catalog read model: one row per product, current stock included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductReadModel {
    pub product_id: ProductId,
    pub name: String,
    pub category: ProductCategory,
    pub unit_price: u64,
    pub stock: i64,
    pub status: ProductStatus,
}

/// Catalog projection over the published envelope feed.
#[derive(Debug)]
pub struct CatalogProjection<S>
where
    S: KeyStore<ProductId, ProductReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> CatalogProjection<S>
where
    S: KeyStore<ProductId, ProductReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, product_id: &ProductId) -> Option<ProductReadModel> {
        self.store.get(product_id)
    }

    pub fn list(&self) -> Vec<ProductReadModel> {
        let mut products = self.store.list();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        products
    }

    /// Apply a published envelope into the projection.
    ///
    /// Envelopes for other aggregate types are skipped; replays at or below
    /// the cursor are ignored.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::PRODUCT {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(aggregate_id, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let event: ProductEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let product_id = match &event {
            ProductEvent::ProductCreated(e) => e.product_id,
            ProductEvent::ProductUpdated(e) => e.product_id,
            ProductEvent::StockAdjusted(e) => e.product_id,
            ProductEvent::ProductRetired(e) => e.product_id,
        };
        if product_id.0 != aggregate_id {
            return Err(ProjectionError::StreamMismatch(
                "event product_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            ProductEvent::ProductCreated(e) => {
                self.store.upsert(
                    e.product_id,
                    ProductReadModel {
                        product_id: e.product_id,
                        name: e.name,
                        category: e.category,
                        unit_price: e.unit_price,
                        stock: e.initial_stock,
                        status: ProductStatus::Active,
                    },
                );
            }
            ProductEvent::ProductUpdated(e) => {
                if let Some(mut rm) = self.store.get(&e.product_id) {
                    rm.name = e.name;
                    rm.category = e.category;
                    rm.unit_price = e.unit_price;
                    self.store.upsert(e.product_id, rm);
                }
            }
            ProductEvent::StockAdjusted(e) => {
                if let Some(mut rm) = self.store.get(&e.product_id) {
                    rm.stock += e.delta;
                    self.store.upsert(e.product_id, rm);
                }
            }
            ProductEvent::ProductRetired(e) => {
                if let Some(mut rm) = self.store.get(&e.product_id) {
                    rm.status = ProductStatus::Retired;
                    self.store.upsert(e.product_id, rm);
                }
            }
        }

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.cursors.clear();
        self.store.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        // Deterministic replay order: aggregate, then sequence.
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

    use eventhire_catalog::{ProductCreated, StockAdjusted, StockMovementReason};
    use eventhire_core::AggregateId;
    use eventhire_events::Event;

    use crate::read_model::InMemoryKeyStore;

    fn envelope(product_id: ProductId, seq: u64, event: &ProductEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            product_id.0,
            streams::PRODUCT,
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    fn created(product_id: ProductId, initial_stock: i64) -> ProductEvent {
        ProductEvent::ProductCreated(ProductCreated {
            product_id,
            name: "Linen tablecloth".to_string(),
            category: ProductCategory::Linens,
            unit_price: 400,
            initial_stock,
            occurred_at: Utc::now(),
        })
    }

    fn adjusted(product_id: ProductId, delta: i64) -> ProductEvent {
        ProductEvent::StockAdjusted(StockAdjusted {
            product_id,
            delta,
            reason: StockMovementReason::IncidentDebit,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn created_then_adjusted_tracks_stock() {
        let projection = CatalogProjection::new(InMemoryKeyStore::new());
        let product_id = ProductId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(product_id, 1, &created(product_id, 20)))
            .unwrap();
        projection
            .apply_envelope(&envelope(product_id, 2, &adjusted(product_id, -3)))
            .unwrap();

        let rm = projection.get(&product_id).unwrap();
        assert_eq!(rm.stock, 17);
        assert_eq!(rm.status, ProductStatus::Active);
    }

    #[test]
    fn duplicate_envelopes_are_ignored() {
        let projection = CatalogProjection::new(InMemoryKeyStore::new());
        let product_id = ProductId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(product_id, 1, &created(product_id, 20)))
            .unwrap();
        let debit = envelope(product_id, 2, &adjusted(product_id, -3));
        projection.apply_envelope(&debit).unwrap();
        projection.apply_envelope(&debit).unwrap();

        assert_eq!(projection.get(&product_id).unwrap().stock, 17);
    }

    #[test]
    fn unrelated_aggregate_types_are_skipped() {
        let projection = CatalogProjection::new(InMemoryKeyStore::new());
        let id = AggregateId::new();

        let env = EventEnvelope::new(
            Uuid::now_v7(),
            id,
            streams::CUSTOMER,
            1,
            serde_json::json!({"anything": true}),
        );
        projection.apply_envelope(&env).unwrap();

        assert!(projection.list().is_empty());
    }

    #[test]
    fn sequence_gaps_are_rejected() {
        let projection = CatalogProjection::new(InMemoryKeyStore::new());
        let product_id = ProductId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(product_id, 1, &created(product_id, 20)))
            .unwrap();
        let err = projection
            .apply_envelope(&envelope(product_id, 3, &adjusted(product_id, -3)))
            .unwrap_err();

        assert!(matches!(
            err,
            ProjectionError::NonMonotonicSequence { last: 1, found: 3 }
        ));
    }

    #[test]
    fn rebuild_replays_out_of_order_input_deterministically() {
        let projection = CatalogProjection::new(InMemoryKeyStore::new());
        let product_id = ProductId::new(AggregateId::new());

        let envs = vec![
            envelope(product_id, 2, &adjusted(product_id, -5)),
            envelope(product_id, 1, &created(product_id, 20)),
        ];
        projection.rebuild_from_scratch(envs).unwrap();

        assert_eq!(projection.get(&product_id).unwrap().stock, 15);
    }

    #[test]
    fn event_types_match_the_stream_label() {
        let product_id = ProductId::new(AggregateId::new());
        assert!(created(product_id, 1).event_type().starts_with(streams::PRODUCT));
    }
}
