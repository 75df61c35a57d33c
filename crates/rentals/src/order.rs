use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use eventhire_catalog::ProductId;
use eventhire_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use eventhire_customers::CustomerId;
use eventhire_events::Event;

/// Rental order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RentalOrderId(pub AggregateId);

impl RentalOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RentalOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Line item identifier, unique across orders.
///
/// Incident ledgers are keyed by this id, so it has to be stable and global
/// rather than an order-local ordinal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineItemId(pub AggregateId);

impl LineItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LineItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Rental order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalOrderStatus {
    Draft,
    Confirmed,
    Closed,
    Cancelled,
}

/// Rental line: product, committed quantity, unit price snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalLine {
    pub line_item_id: LineItemId,
    pub product_id: ProductId,
    /// Units of the product committed to this rental. Once the order is
    /// confirmed this is the capacity ceiling for incidents on the line.
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
}

/// Aggregate root: RentalOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentalOrder {
    id: RentalOrderId,
    customer_id: Option<CustomerId>,
    event_date: Option<NaiveDate>,
    status: RentalOrderStatus,
    lines: Vec<RentalLine>,
    version: u64,
    created: bool,
}

impl RentalOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: RentalOrderId) -> Self {
        Self {
            id,
            customer_id: None,
            event_date: None,
            status: RentalOrderStatus::Draft,
            lines: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> RentalOrderId {
        self.id
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn event_date(&self) -> Option<NaiveDate> {
        self.event_date
    }

    pub fn status(&self) -> RentalOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[RentalLine] {
        &self.lines
    }

    pub fn line(&self, line_item_id: LineItemId) -> Option<&RentalLine> {
        self.lines.iter().find(|l| l.line_item_id == line_item_id)
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(self.status, RentalOrderStatus::Draft)
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.status, RentalOrderStatus::Confirmed)
    }
}

impl AggregateRoot for RentalOrder {
    type Id = RentalOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenRental.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRental {
    pub order_id: RentalOrderId,
    pub customer_id: CustomerId,
    pub event_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub order_id: RentalOrderId,
    pub line_item_id: LineItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLineQuantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLineQuantity {
    pub order_id: RentalOrderId,
    pub line_item_id: LineItemId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLine {
    pub order_id: RentalOrderId,
    pub line_item_id: LineItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmRental.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmRental {
    pub order_id: RentalOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseRental.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRental {
    pub order_id: RentalOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelRental.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRental {
    pub order_id: RentalOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RentalOrderCommand {
    OpenRental(OpenRental),
    AddLine(AddLine),
    UpdateLineQuantity(UpdateLineQuantity),
    RemoveLine(RemoveLine),
    ConfirmRental(ConfirmRental),
    CloseRental(CloseRental),
    CancelRental(CancelRental),
}

/// Event: RentalOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalOpened {
    pub order_id: RentalOrderId,
    pub customer_id: CustomerId,
    pub event_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub order_id: RentalOrderId,
    pub line_item_id: LineItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineQuantityUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineQuantityUpdated {
    pub order_id: RentalOrderId,
    pub line_item_id: LineItemId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRemoved {
    pub order_id: RentalOrderId,
    pub line_item_id: LineItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RentalConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalConfirmed {
    pub order_id: RentalOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RentalClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalClosed {
    pub order_id: RentalOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RentalCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalCancelled {
    pub order_id: RentalOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RentalOrderEvent {
    RentalOpened(RentalOpened),
    LineAdded(LineAdded),
    LineQuantityUpdated(LineQuantityUpdated),
    LineRemoved(LineRemoved),
    RentalConfirmed(RentalConfirmed),
    RentalClosed(RentalClosed),
    RentalCancelled(RentalCancelled),
}

impl Event for RentalOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RentalOrderEvent::RentalOpened(_) => "rentals.order.opened",
            RentalOrderEvent::LineAdded(_) => "rentals.order.line_added",
            RentalOrderEvent::LineQuantityUpdated(_) => "rentals.order.line_quantity_updated",
            RentalOrderEvent::LineRemoved(_) => "rentals.order.line_removed",
            RentalOrderEvent::RentalConfirmed(_) => "rentals.order.confirmed",
            RentalOrderEvent::RentalClosed(_) => "rentals.order.closed",
            RentalOrderEvent::RentalCancelled(_) => "rentals.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RentalOrderEvent::RentalOpened(e) => e.occurred_at,
            RentalOrderEvent::LineAdded(e) => e.occurred_at,
            RentalOrderEvent::LineQuantityUpdated(e) => e.occurred_at,
            RentalOrderEvent::LineRemoved(e) => e.occurred_at,
            RentalOrderEvent::RentalConfirmed(e) => e.occurred_at,
            RentalOrderEvent::RentalClosed(e) => e.occurred_at,
            RentalOrderEvent::RentalCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for RentalOrder {
    type Command = RentalOrderCommand;
    type Event = RentalOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RentalOrderEvent::RentalOpened(e) => {
                self.id = e.order_id;
                self.customer_id = Some(e.customer_id);
                self.event_date = e.event_date;
                self.status = RentalOrderStatus::Draft;
                self.lines.clear();
                self.created = true;
            }
            RentalOrderEvent::LineAdded(e) => {
                self.lines.push(RentalLine {
                    line_item_id: e.line_item_id,
                    product_id: e.product_id,
                    quantity: e.quantity,
                    unit_price: e.unit_price,
                });
            }
            RentalOrderEvent::LineQuantityUpdated(e) => {
                if let Some(line) = self
                    .lines
                    .iter_mut()
                    .find(|l| l.line_item_id == e.line_item_id)
                {
                    line.quantity = e.quantity;
                }
            }
            RentalOrderEvent::LineRemoved(e) => {
                self.lines.retain(|l| l.line_item_id != e.line_item_id);
            }
            RentalOrderEvent::RentalConfirmed(_) => {
                self.status = RentalOrderStatus::Confirmed;
            }
            RentalOrderEvent::RentalClosed(_) => {
                self.status = RentalOrderStatus::Closed;
            }
            RentalOrderEvent::RentalCancelled(_) => {
                self.status = RentalOrderStatus::Cancelled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RentalOrderCommand::OpenRental(cmd) => self.handle_open(cmd),
            RentalOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            RentalOrderCommand::UpdateLineQuantity(cmd) => self.handle_update_line(cmd),
            RentalOrderCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            RentalOrderCommand::ConfirmRental(cmd) => self.handle_confirm(cmd),
            RentalOrderCommand::CloseRental(cmd) => self.handle_close(cmd),
            RentalOrderCommand::CancelRental(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl RentalOrder {
    fn ensure_order_id(&self, order_id: RentalOrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_modifiable(&self) -> Result<(), DomainError> {
        if !self.is_modifiable() {
            return Err(DomainError::invariant(
                "lines can only be changed while the rental is a draft",
            ));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenRental) -> Result<Vec<RentalOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("rental order already exists"));
        }

        Ok(vec![RentalOrderEvent::RentalOpened(RentalOpened {
            order_id: cmd.order_id,
            customer_id: cmd.customer_id,
            event_date: cmd.event_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<RentalOrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_modifiable()?;

        if cmd.quantity < 1 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if cmd.unit_price == 0 {
            return Err(DomainError::validation("unit_price must be positive"));
        }
        if self.line(cmd.line_item_id).is_some() {
            return Err(DomainError::conflict("line_item_id already used on this order"));
        }

        Ok(vec![RentalOrderEvent::LineAdded(LineAdded {
            order_id: cmd.order_id,
            line_item_id: cmd.line_item_id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            unit_price: cmd.unit_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_line(
        &self,
        cmd: &UpdateLineQuantity,
    ) -> Result<Vec<RentalOrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_modifiable()?;

        if cmd.quantity < 1 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if self.line(cmd.line_item_id).is_none() {
            return Err(DomainError::not_found());
        }

        Ok(vec![RentalOrderEvent::LineQuantityUpdated(
            LineQuantityUpdated {
                order_id: cmd.order_id,
                line_item_id: cmd.line_item_id,
                quantity: cmd.quantity,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_remove_line(&self, cmd: &RemoveLine) -> Result<Vec<RentalOrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_modifiable()?;

        if self.line(cmd.line_item_id).is_none() {
            return Err(DomainError::not_found());
        }

        Ok(vec![RentalOrderEvent::LineRemoved(LineRemoved {
            order_id: cmd.order_id,
            line_item_id: cmd.line_item_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmRental) -> Result<Vec<RentalOrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;

        if self.status != RentalOrderStatus::Draft {
            return Err(DomainError::invariant("only draft rentals can be confirmed"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot confirm rental without lines"));
        }

        Ok(vec![RentalOrderEvent::RentalConfirmed(RentalConfirmed {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(&self, cmd: &CloseRental) -> Result<Vec<RentalOrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;

        if self.status != RentalOrderStatus::Confirmed {
            return Err(DomainError::invariant("only confirmed rentals can be closed"));
        }

        Ok(vec![RentalOrderEvent::RentalClosed(RentalClosed {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelRental) -> Result<Vec<RentalOrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;

        if !matches!(
            self.status,
            RentalOrderStatus::Draft | RentalOrderStatus::Confirmed
        ) {
            return Err(DomainError::invariant(
                "only draft or confirmed rentals can be cancelled",
            ));
        }

        Ok(vec![RentalOrderEvent::RentalCancelled(RentalCancelled {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
