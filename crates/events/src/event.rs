use chrono::{DateTime, Utc};

use contactstore_core::{EntityId, EventId};

/// A domain event raised by an entity mutation.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **attributed** to the entity that raised them
/// - **classified** by an action tag, which is also the ledger's dedup key
pub trait DomainEvent: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Identity of this occurrence.
    fn event_id(&self) -> EventId;

    /// Stable action tag (e.g. "contacts.contact.name_updated").
    fn action(&self) -> &str;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Entity that raised the event.
    fn entity_id(&self) -> EntityId;
}
