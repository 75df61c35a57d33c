use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eventhire_catalog::ProductId;
use eventhire_core::{Aggregate, AggregateId, AggregateRoot};
use eventhire_events::Event;
use eventhire_rentals::{LineItemId, RentalOrderId};

use crate::error::IncidentError;

/// Incident entry identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(pub AggregateId);

impl IncidentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for IncidentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Kind of damage reported against rented units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageKind {
    Irreparable,
    Repairable,
}

/// Incident entry status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Resolved,
    Voided,
}

/// Resolution outcome for an incident entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentOutcome {
    NoAction,
    Restocked,
    Replaced,
}

/// What voiding an open entry does to the stock debit taken at creation.
///
/// The workflow engine is constructed with one policy for the whole process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoidPolicy {
    /// Credit the full affected quantity back; the void undoes the debit.
    #[default]
    RestoreStock,
    /// Keep the units written off; the debit stands.
    WriteOff,
}

/// Stock credit owed when an entry resolves with the given outcome.
///
/// Restocked returns the full affected amount, replaced only the substituted
/// units, no-action nothing.
pub fn stock_credit_for(outcome: IncidentOutcome, affected: i64, replaced: i64) -> i64 {
    match outcome {
        IncidentOutcome::Restocked => affected,
        IncidentOutcome::Replaced => replaced,
        IncidentOutcome::NoAction => 0,
    }
}

/// One damage/loss record on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentEntry {
    pub incident_id: IncidentId,
    pub description: String,
    pub status: IncidentStatus,
    pub damage_kind: DamageKind,
    pub affected_quantity: i64,
    pub outcome: IncidentOutcome,
    pub replaced_quantity: i64,
    pub opened_at: DateTime<Utc>,
    /// Set exactly once, at the transition into `Resolved`.
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Aggregate root: IncidentLedger (one per rental line item).
///
/// The stream key is the line item id, which is what serializes all capacity
/// accounting for a line through one version counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentLedger {
    id: LineItemId,
    order_id: Option<RentalOrderId>,
    product_id: Option<ProductId>,
    line_quantity: i64,
    entries: Vec<IncidentEntry>,
    version: u64,
}

impl IncidentLedger {
    /// Create an empty ledger for rehydration. A ledger has no explicit
    /// "create" command; it is bound to order/product on the first entry.
    pub fn empty(id: LineItemId) -> Self {
        Self {
            id,
            order_id: None,
            product_id: None,
            line_quantity: 0,
            entries: Vec::new(),
            version: 0,
        }
    }

    pub fn id_typed(&self) -> LineItemId {
        self.id
    }

    pub fn order_id(&self) -> Option<RentalOrderId> {
        self.order_id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn line_quantity(&self) -> i64 {
        self.line_quantity
    }

    pub fn entries(&self) -> &[IncidentEntry] {
        &self.entries
    }

    pub fn entry(&self, incident_id: IncidentId) -> Option<&IncidentEntry> {
        self.entries.iter().find(|e| e.incident_id == incident_id)
    }

    /// Units currently tied up in open entries.
    ///
    /// Voided and resolved entries no longer count toward capacity.
    pub fn open_quantity(&self) -> i64 {
        self.entries
            .iter()
            .filter(|e| e.status == IncidentStatus::Open)
            .map(|e| e.affected_quantity)
            .sum()
    }

    /// Units still available for new incidents on this line.
    pub fn available_capacity(&self) -> i64 {
        self.line_quantity - self.open_quantity()
    }

    pub fn has_open_entries(&self) -> bool {
        self.entries.iter().any(|e| e.status == IncidentStatus::Open)
    }
}

impl AggregateRoot for IncidentLedger {
    type Id = LineItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenIncident.
///
/// `order_id`/`product_id`/`line_quantity` are resolved from the confirmed
/// rental order by the workflow engine before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenIncident {
    pub line_item_id: LineItemId,
    pub incident_id: IncidentId,
    pub order_id: RentalOrderId,
    pub product_id: ProductId,
    pub line_quantity: i64,
    pub damage_kind: DamageKind,
    pub affected_quantity: i64,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResolveIncident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveIncident {
    pub line_item_id: LineItemId,
    pub incident_id: IncidentId,
    pub outcome: IncidentOutcome,
    pub replaced_quantity: Option<i64>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VoidIncident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidIncident {
    pub line_item_id: LineItemId,
    pub incident_id: IncidentId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentLedgerCommand {
    OpenIncident(OpenIncident),
    ResolveIncident(ResolveIncident),
    VoidIncident(VoidIncident),
}

/// Event: IncidentOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentOpened {
    pub line_item_id: LineItemId,
    pub incident_id: IncidentId,
    pub order_id: RentalOrderId,
    pub product_id: ProductId,
    pub line_quantity: i64,
    pub damage_kind: DamageKind,
    pub affected_quantity: i64,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: IncidentResolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentResolved {
    pub line_item_id: LineItemId,
    pub incident_id: IncidentId,
    pub outcome: IncidentOutcome,
    pub replaced_quantity: i64,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: IncidentVoided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentVoided {
    pub line_item_id: LineItemId,
    pub incident_id: IncidentId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentLedgerEvent {
    IncidentOpened(IncidentOpened),
    IncidentResolved(IncidentResolved),
    IncidentVoided(IncidentVoided),
}

impl Event for IncidentLedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            IncidentLedgerEvent::IncidentOpened(_) => "incidents.ledger.opened",
            IncidentLedgerEvent::IncidentResolved(_) => "incidents.ledger.resolved",
            IncidentLedgerEvent::IncidentVoided(_) => "incidents.ledger.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            IncidentLedgerEvent::IncidentOpened(e) => e.occurred_at,
            IncidentLedgerEvent::IncidentResolved(e) => e.occurred_at,
            IncidentLedgerEvent::IncidentVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for IncidentLedger {
    type Command = IncidentLedgerCommand;
    type Event = IncidentLedgerEvent;
    type Error = IncidentError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            IncidentLedgerEvent::IncidentOpened(e) => {
                self.id = e.line_item_id;
                self.order_id = Some(e.order_id);
                self.product_id = Some(e.product_id);
                self.line_quantity = e.line_quantity;
                self.entries.push(IncidentEntry {
                    incident_id: e.incident_id,
                    description: e.description.clone(),
                    status: IncidentStatus::Open,
                    damage_kind: e.damage_kind,
                    affected_quantity: e.affected_quantity,
                    outcome: IncidentOutcome::NoAction,
                    replaced_quantity: 0,
                    opened_at: e.occurred_at,
                    resolved_at: None,
                });
            }
            IncidentLedgerEvent::IncidentResolved(e) => {
                if let Some(entry) = self
                    .entries
                    .iter_mut()
                    .find(|entry| entry.incident_id == e.incident_id)
                {
                    entry.status = IncidentStatus::Resolved;
                    entry.outcome = e.outcome;
                    entry.replaced_quantity = e.replaced_quantity;
                    entry.resolved_at = Some(e.occurred_at);
                    if let Some(description) = &e.description {
                        entry.description = description.clone();
                    }
                }
            }
            IncidentLedgerEvent::IncidentVoided(e) => {
                if let Some(entry) = self
                    .entries
                    .iter_mut()
                    .find(|entry| entry.incident_id == e.incident_id)
                {
                    entry.status = IncidentStatus::Voided;
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            IncidentLedgerCommand::OpenIncident(cmd) => self.handle_open(cmd),
            IncidentLedgerCommand::ResolveIncident(cmd) => self.handle_resolve(cmd),
            IncidentLedgerCommand::VoidIncident(cmd) => self.handle_void(cmd),
        }
    }
}

impl IncidentLedger {
    fn ensure_line_item_id(&self, line_item_id: LineItemId) -> Result<(), IncidentError> {
        if self.id != line_item_id {
            return Err(IncidentError::Conflict("line_item_id mismatch".to_string()));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenIncident) -> Result<Vec<IncidentLedgerEvent>, IncidentError> {
        self.ensure_line_item_id(cmd.line_item_id)?;

        if cmd.affected_quantity < 1 {
            return Err(IncidentError::Validation(
                "affected_quantity must be at least 1".to_string(),
            ));
        }
        if cmd.line_quantity < 1 {
            return Err(IncidentError::Validation(
                "line_quantity must be at least 1".to_string(),
            ));
        }
        if cmd.description.trim().is_empty() {
            return Err(IncidentError::Validation(
                "description cannot be empty".to_string(),
            ));
        }
        if self.entry(cmd.incident_id).is_some() {
            return Err(IncidentError::Conflict(
                "incident_id already exists on this ledger".to_string(),
            ));
        }

        // Once bound, the ledger stays pinned to the line's order and product.
        if let Some(order_id) = self.order_id {
            if order_id != cmd.order_id
                || self.product_id != Some(cmd.product_id)
                || self.line_quantity != cmd.line_quantity
            {
                return Err(IncidentError::Conflict(
                    "ledger binding mismatch for this line item".to_string(),
                ));
            }
        }

        // Capacity counts open entries only; voided entries left the pool.
        let available = if self.order_id.is_some() {
            self.available_capacity()
        } else {
            cmd.line_quantity
        };
        if cmd.affected_quantity > available {
            return Err(IncidentError::CapacityExceeded {
                requested: cmd.affected_quantity,
                available,
            });
        }

        Ok(vec![IncidentLedgerEvent::IncidentOpened(IncidentOpened {
            line_item_id: cmd.line_item_id,
            incident_id: cmd.incident_id,
            order_id: cmd.order_id,
            product_id: cmd.product_id,
            line_quantity: cmd.line_quantity,
            damage_kind: cmd.damage_kind,
            affected_quantity: cmd.affected_quantity,
            description: cmd.description.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_resolve(
        &self,
        cmd: &ResolveIncident,
    ) -> Result<Vec<IncidentLedgerEvent>, IncidentError> {
        self.ensure_line_item_id(cmd.line_item_id)?;

        let entry = self
            .entry(cmd.incident_id)
            .ok_or(IncidentError::EntryNotFound)?;

        if entry.status != IncidentStatus::Open {
            return Err(IncidentError::InvalidTransition {
                status: entry.status,
            });
        }

        // Validation strictly precedes the emitted transition.
        if cmd.outcome == IncidentOutcome::Restocked && entry.damage_kind == DamageKind::Irreparable
        {
            return Err(IncidentError::IllegalOutcome);
        }

        if cmd.outcome == IncidentOutcome::Replaced {
            match cmd.replaced_quantity {
                None => return Err(IncidentError::MissingReplacementQuantity),
                Some(q) if q <= 0 => return Err(IncidentError::MissingReplacementQuantity),
                Some(_) => {}
            }
        }

        if let Some(replaced) = cmd.replaced_quantity {
            if replaced > entry.affected_quantity {
                return Err(IncidentError::ReplacementExceedsAffected {
                    replaced,
                    affected: entry.affected_quantity,
                });
            }
        }

        let replaced_quantity = match cmd.outcome {
            IncidentOutcome::Replaced => cmd.replaced_quantity.unwrap_or(0),
            _ => 0,
        };

        Ok(vec![IncidentLedgerEvent::IncidentResolved(
            IncidentResolved {
                line_item_id: cmd.line_item_id,
                incident_id: cmd.incident_id,
                outcome: cmd.outcome,
                replaced_quantity,
                description: cmd.description.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_void(&self, cmd: &VoidIncident) -> Result<Vec<IncidentLedgerEvent>, IncidentError> {
        self.ensure_line_item_id(cmd.line_item_id)?;

        let entry = self
            .entry(cmd.incident_id)
            .ok_or(IncidentError::EntryNotFound)?;

        if entry.status != IncidentStatus::Open {
            return Err(IncidentError::InvalidTransition {
                status: entry.status,
            });
        }
        if cmd.reason.trim().is_empty() {
            return Err(IncidentError::Validation("reason cannot be empty".to_string()));
        }

        Ok(vec![IncidentLedgerEvent::IncidentVoided(IncidentVoided {
            line_item_id: cmd.line_item_id,
            incident_id: cmd.incident_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventhire_core::AggregateId;

    fn test_line_item_id() -> LineItemId {
        LineItemId::new(AggregateId::new())
    }

    fn test_incident_id() -> IncidentId {
        IncidentId::new(AggregateId::new())
    }

    fn test_order_id() -> RentalOrderId {
        RentalOrderId::new(AggregateId::new())
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn open_cmd(
        ledger: &IncidentLedger,
        incident_id: IncidentId,
        affected: i64,
        damage_kind: DamageKind,
    ) -> OpenIncident {
        OpenIncident {
            line_item_id: ledger.id_typed(),
            incident_id,
            order_id: ledger.order_id().unwrap_or_else(test_order_id),
            product_id: ledger.product_id().unwrap_or_else(test_product_id),
            line_quantity: if ledger.order_id().is_some() {
                ledger.line_quantity()
            } else {
                5
            },
            damage_kind,
            affected_quantity: affected,
            description: "chipped on return".to_string(),
            occurred_at: test_time(),
        }
    }

    fn ledger_with_open_entry(affected: i64, damage_kind: DamageKind) -> (IncidentLedger, IncidentId) {
        let mut ledger = IncidentLedger::empty(test_line_item_id());
        let incident_id = test_incident_id();
        let events = ledger
            .handle(&IncidentLedgerCommand::OpenIncident(open_cmd(
                &ledger,
                incident_id,
                affected,
                damage_kind,
            )))
            .unwrap();
        for event in &events {
            ledger.apply(event);
        }
        (ledger, incident_id)
    }

    #[test]
    fn open_entry_starts_open_with_no_action_outcome() {
        let (ledger, incident_id) = ledger_with_open_entry(3, DamageKind::Repairable);
        let entry = ledger.entry(incident_id).unwrap();

        assert_eq!(entry.status, IncidentStatus::Open);
        assert_eq!(entry.outcome, IncidentOutcome::NoAction);
        assert_eq!(entry.replaced_quantity, 0);
        assert!(entry.resolved_at.is_none());
        assert_eq!(ledger.open_quantity(), 3);
        assert_eq!(ledger.available_capacity(), 2);
    }

    #[test]
    fn second_entry_beyond_capacity_is_rejected() {
        let (ledger, _) = ledger_with_open_entry(3, DamageKind::Repairable);

        let err = ledger
            .handle(&IncidentLedgerCommand::OpenIncident(open_cmd(
                &ledger,
                test_incident_id(),
                3,
                DamageKind::Repairable,
            )))
            .unwrap_err();

        assert_eq!(
            err,
            IncidentError::CapacityExceeded {
                requested: 3,
                available: 2
            }
        );
    }

    #[test]
    fn zero_affected_quantity_is_rejected_not_clamped() {
        let ledger = IncidentLedger::empty(test_line_item_id());
        let err = ledger
            .handle(&IncidentLedgerCommand::OpenIncident(open_cmd(
                &ledger,
                test_incident_id(),
                0,
                DamageKind::Repairable,
            )))
            .unwrap_err();
        assert!(matches!(err, IncidentError::Validation(_)));
    }

    #[test]
    fn resolve_replaced_records_quantity_and_timestamp() {
        let (mut ledger, incident_id) = ledger_with_open_entry(3, DamageKind::Repairable);

        let events = ledger
            .handle(&IncidentLedgerCommand::ResolveIncident(ResolveIncident {
                line_item_id: ledger.id_typed(),
                incident_id,
                outcome: IncidentOutcome::Replaced,
                replaced_quantity: Some(2),
                description: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        for event in &events {
            ledger.apply(event);
        }

        let entry = ledger.entry(incident_id).unwrap();
        assert_eq!(entry.status, IncidentStatus::Resolved);
        assert_eq!(entry.outcome, IncidentOutcome::Replaced);
        assert_eq!(entry.replaced_quantity, 2);
        assert!(entry.resolved_at.is_some());
        assert_eq!(ledger.open_quantity(), 0);
    }

    #[test]
    fn double_resolve_fails_with_invalid_transition() {
        let (mut ledger, incident_id) = ledger_with_open_entry(2, DamageKind::Repairable);

        let resolve = IncidentLedgerCommand::ResolveIncident(ResolveIncident {
            line_item_id: ledger.id_typed(),
            incident_id,
            outcome: IncidentOutcome::Restocked,
            replaced_quantity: None,
            description: None,
            occurred_at: test_time(),
        });

        let events = ledger.handle(&resolve).unwrap();
        for event in &events {
            ledger.apply(event);
        }

        let err = ledger.handle(&resolve).unwrap_err();
        assert_eq!(
            err,
            IncidentError::InvalidTransition {
                status: IncidentStatus::Resolved
            }
        );
    }

    #[test]
    fn irreparable_cannot_be_restocked() {
        let (ledger, incident_id) = ledger_with_open_entry(1, DamageKind::Irreparable);

        let err = ledger
            .handle(&IncidentLedgerCommand::ResolveIncident(ResolveIncident {
                line_item_id: ledger.id_typed(),
                incident_id,
                outcome: IncidentOutcome::Restocked,
                replaced_quantity: None,
                description: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, IncidentError::IllegalOutcome);
    }

    #[test]
    fn replaced_requires_positive_quantity() {
        let (ledger, incident_id) = ledger_with_open_entry(3, DamageKind::Repairable);

        for replaced_quantity in [None, Some(0), Some(-1)] {
            let err = ledger
                .handle(&IncidentLedgerCommand::ResolveIncident(ResolveIncident {
                    line_item_id: ledger.id_typed(),
                    incident_id,
                    outcome: IncidentOutcome::Replaced,
                    replaced_quantity,
                    description: None,
                    occurred_at: test_time(),
                }))
                .unwrap_err();
            assert_eq!(err, IncidentError::MissingReplacementQuantity);
        }
    }

    #[test]
    fn replacement_cannot_exceed_affected() {
        let (ledger, incident_id) = ledger_with_open_entry(3, DamageKind::Repairable);

        let err = ledger
            .handle(&IncidentLedgerCommand::ResolveIncident(ResolveIncident {
                line_item_id: ledger.id_typed(),
                incident_id,
                outcome: IncidentOutcome::Replaced,
                replaced_quantity: Some(4),
                description: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(
            err,
            IncidentError::ReplacementExceedsAffected {
                replaced: 4,
                affected: 3
            }
        );
    }

    #[test]
    fn voided_entries_leave_the_capacity_pool() {
        let (mut ledger, incident_id) = ledger_with_open_entry(3, DamageKind::Repairable);
        assert_eq!(ledger.available_capacity(), 2);

        let events = ledger
            .handle(&IncidentLedgerCommand::VoidIncident(VoidIncident {
                line_item_id: ledger.id_typed(),
                incident_id,
                reason: "reported in error".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap();
        for event in &events {
            ledger.apply(event);
        }

        assert_eq!(ledger.available_capacity(), 5);
        assert!(!ledger.has_open_entries());

        // Full capacity is usable again after the void.
        let events = ledger
            .handle(&IncidentLedgerCommand::OpenIncident(open_cmd(
                &ledger,
                test_incident_id(),
                5,
                DamageKind::Repairable,
            )))
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn void_of_resolved_entry_is_invalid() {
        let (mut ledger, incident_id) = ledger_with_open_entry(1, DamageKind::Repairable);

        let events = ledger
            .handle(&IncidentLedgerCommand::ResolveIncident(ResolveIncident {
                line_item_id: ledger.id_typed(),
                incident_id,
                outcome: IncidentOutcome::NoAction,
                replaced_quantity: None,
                description: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        for event in &events {
            ledger.apply(event);
        }

        let err = ledger
            .handle(&IncidentLedgerCommand::VoidIncident(VoidIncident {
                line_item_id: ledger.id_typed(),
                incident_id,
                reason: "too late".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(
            err,
            IncidentError::InvalidTransition {
                status: IncidentStatus::Resolved
            }
        );
    }

    #[test]
    fn open_entry_sums_never_exceed_line_quantity() {
        let (mut ledger, _) = ledger_with_open_entry(2, DamageKind::Repairable);

        for affected in [1, 1, 1, 1] {
            let cmd = IncidentLedgerCommand::OpenIncident(open_cmd(
                &ledger,
                test_incident_id(),
                affected,
                DamageKind::Repairable,
            ));
            if let Ok(events) = ledger.handle(&cmd) {
                for event in &events {
                    ledger.apply(event);
                }
            }
            assert!(ledger.open_quantity() <= ledger.line_quantity());
        }

        assert_eq!(ledger.open_quantity(), 5);
    }

    #[test]
    fn stock_credit_follows_outcome() {
        assert_eq!(stock_credit_for(IncidentOutcome::Restocked, 3, 0), 3);
        assert_eq!(stock_credit_for(IncidentOutcome::Replaced, 3, 2), 2);
        assert_eq!(stock_credit_for(IncidentOutcome::NoAction, 3, 0), 0);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let (ledger, incident_id) = ledger_with_open_entry(2, DamageKind::Repairable);
        let before = ledger.clone();

        let _ = ledger.handle(&IncidentLedgerCommand::ResolveIncident(ResolveIncident {
            line_item_id: ledger.id_typed(),
            incident_id,
            outcome: IncidentOutcome::Restocked,
            replaced_quantity: None,
            description: None,
            occurred_at: test_time(),
        }));

        assert_eq!(ledger, before);
    }

    #[test]
    fn apply_is_deterministic() {
        let line_item_id = test_line_item_id();
        let incident_id = test_incident_id();
        let at = test_time();

        let events = vec![
            IncidentLedgerEvent::IncidentOpened(IncidentOpened {
                line_item_id,
                incident_id,
                order_id: test_order_id(),
                product_id: test_product_id(),
                line_quantity: 5,
                damage_kind: DamageKind::Repairable,
                affected_quantity: 3,
                description: "cracked".to_string(),
                occurred_at: at,
            }),
            IncidentLedgerEvent::IncidentResolved(IncidentResolved {
                line_item_id,
                incident_id,
                outcome: IncidentOutcome::Replaced,
                replaced_quantity: 2,
                description: None,
                occurred_at: at,
            }),
        ];

        let mut a = IncidentLedger::empty(line_item_id);
        let mut b = IncidentLedger::empty(line_item_id);
        for event in &events {
            a.apply(event);
            b.apply(event);
        }

        assert_eq!(a, b);
        assert_eq!(a.version(), 2);
    }
}
