use serde_json::Value as JsonValue;

use eventhire_customers::{ContactInfo, CustomerEvent, CustomerId, CustomerStatus};
use eventhire_events::EventEnvelope;

use super::{CursorCheck, ProjectionError, StreamCursors};
use crate::read_model::KeyStore;
use crate::streams;

/// Queryable customer read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerReadModel {
    pub customer_id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub national_id: Option<String>,
    pub contact: ContactInfo,
    pub notes: Option<String>,
    pub status: CustomerStatus,
}

/// Customer directory projection.
#[derive(Debug)]
pub struct CustomersProjection<S>
where
    S: KeyStore<CustomerId, CustomerReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> CustomersProjection<S>
where
    S: KeyStore<CustomerId, CustomerReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, customer_id: &CustomerId) -> Option<CustomerReadModel> {
        self.store.get(customer_id)
    }

    pub fn list(&self) -> Vec<CustomerReadModel> {
        let mut customers = self.store.list();
        customers.sort_by(|a, b| (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name)));
        customers
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::CUSTOMER {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(aggregate_id, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let event: CustomerEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let customer_id = match &event {
            CustomerEvent::CustomerRegistered(e) => e.customer_id,
            CustomerEvent::ContactUpdated(e) => e.customer_id,
            CustomerEvent::CustomerArchived(e) => e.customer_id,
        };
        if customer_id.0 != aggregate_id {
            return Err(ProjectionError::StreamMismatch(
                "event customer_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            CustomerEvent::CustomerRegistered(e) => {
                self.store.upsert(
                    e.customer_id,
                    CustomerReadModel {
                        customer_id: e.customer_id,
                        first_name: e.first_name,
                        last_name: e.last_name,
                        national_id: e.national_id,
                        contact: e.contact,
                        notes: e.notes,
                        status: CustomerStatus::Active,
                    },
                );
            }
            CustomerEvent::ContactUpdated(e) => {
                if let Some(mut rm) = self.store.get(&e.customer_id) {
                    rm.contact = e.contact;
                    rm.notes = e.notes;
                    self.store.upsert(e.customer_id, rm);
                }
            }
            CustomerEvent::CustomerArchived(e) => {
                if let Some(mut rm) = self.store.get(&e.customer_id) {
                    rm.status = CustomerStatus::Archived;
                    self.store.upsert(e.customer_id, rm);
                }
            }
        }

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.cursors.clear();
        self.store.clear();

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
    use eventhire_customers::{CustomerArchived, CustomerRegistered};

    use crate::read_model::InMemoryKeyStore;

    fn envelope(customer_id: CustomerId, seq: u64, event: &CustomerEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            customer_id.0,
            streams::CUSTOMER,
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    fn registered(customer_id: CustomerId) -> CustomerEvent {
        CustomerEvent::CustomerRegistered(CustomerRegistered {
            customer_id,
            first_name: "Nadia".to_string(),
            last_name: "Haddad".to_string(),
            national_id: None,
            contact: ContactInfo {
                email: Some("nadia@example.com".to_string()),
                phone: None,
                address: None,
            },
            notes: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn registered_customers_are_listed() {
        let projection = CustomersProjection::new(InMemoryKeyStore::new());
        let customer_id = CustomerId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(customer_id, 1, &registered(customer_id)))
            .unwrap();

        let listed = projection.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].first_name, "Nadia");
        assert_eq!(listed[0].status, CustomerStatus::Active);
    }

    #[test]
    fn archive_flips_status() {
        let projection = CustomersProjection::new(InMemoryKeyStore::new());
        let customer_id = CustomerId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(customer_id, 1, &registered(customer_id)))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                customer_id,
                2,
                &CustomerEvent::CustomerArchived(CustomerArchived {
                    customer_id,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        assert_eq!(
            projection.get(&customer_id).unwrap().status,
            CustomerStatus::Archived
        );
    }
}
