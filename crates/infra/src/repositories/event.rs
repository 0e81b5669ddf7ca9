//! Event repository: domain events stored as short-lived documents.

use std::sync::Arc;

use contactstore_events::DomainEvent;

use crate::context::ChangeTracker;
use crate::document::{DocumentPayload, EntityState, TrackedDocument};

/// Document `type` of stored domain events.
pub const EVENT_TYPE_TAG: &str = "domainEvent";

/// Queues domain events as documents on the shared change tracker.
///
/// Event documents live in their entity's partition so that an entity and the
/// events it raised commit in one atomic batch. They expire after `ttl`
/// seconds.
pub struct EventRepository<S: ?Sized, B, P> {
    context: Arc<ChangeTracker<S, B, P>>,
    ttl: i32,
}

impl<S: ?Sized, B, P> EventRepository<S, B, P> {
    pub fn new(context: Arc<ChangeTracker<S, B, P>>, ttl: i32) -> Self {
        Self { context, ttl }
    }

    pub fn ttl(&self) -> i32 {
        self.ttl
    }

    /// Queue `event` for insertion. Returns `false` if it is already queued.
    pub fn create<E>(&self, event: E) -> bool
    where
        E: DomainEvent,
        P: DocumentPayload + From<E>,
    {
        let document = TrackedDocument::new(
            event.event_id().to_string(),
            event.entity_id().to_string(),
            EVENT_TYPE_TAG,
            P::from(event),
            "",
            self.ttl,
            EntityState::Created,
        );
        self.context.add(document)
    }

    /// Queue every event of `events`, in order. Returns how many were added.
    pub fn create_all<E, I>(&self, events: I) -> usize
    where
        E: DomainEvent,
        I: IntoIterator<Item = E>,
        P: DocumentPayload + From<E>,
    {
        events.into_iter().map(|e| self.create(e)).filter(|added| *added).count()
    }
}
