//! Domain events, the per-entity pending-event ledger and event distribution.

pub mod bus;
pub mod event;
pub mod in_memory_bus;
pub mod ledger;

pub use bus::{EventBus, Subscription};
pub use event::DomainEvent;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use ledger::{EventEmitter, EventLedger};
