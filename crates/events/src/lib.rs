//! `eventhire-events` — event abstractions shared by domain and infrastructure.
//!
//! Domain crates implement [`Event`] on their event enums; infrastructure wraps
//! stored events in [`EventEnvelope`]s and distributes them over an [`EventBus`].

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
