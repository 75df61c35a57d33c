//! `eventhire-rentals` — rental orders and their line items.

pub mod order;

pub use order::{
    AddLine, CancelRental, CloseRental, ConfirmRental, LineItemId, OpenRental, RemoveLine,
    RentalLine, RentalOrder, RentalOrderCommand, RentalOrderEvent, RentalOrderId,
    RentalOrderStatus, UpdateLineQuantity,
};
