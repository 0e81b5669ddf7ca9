//! Pending-event ledger carried by event-emitting entities.
//!
//! The ledger holds at most one event per action tag. Adding an event whose
//! action is already pending replaces the pending one **at the same position**,
//! so repeated mutations of one kind coalesce into their latest value while the
//! relative order of distinct kinds is kept.

use crate::event::DomainEvent;

/// Ordered, dedup-by-action collection of pending events.
#[derive(Debug, Clone)]
pub struct EventLedger<E> {
    events: Vec<E>,
}

impl<E> Default for EventLedger<E> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<E: DomainEvent> EventLedger<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `event`, or replace the pending event with the same action in place.
    pub fn add(&mut self, event: E) {
        match self.events.iter().position(|e| e.action() == event.action()) {
            Some(idx) => self.events[idx] = event,
            None => self.events.push(event),
        }
    }

    /// Remove the event with the same identity; no-op if absent.
    pub fn remove(&mut self, event: &E) {
        let id = event.event_id();
        if let Some(idx) = self.events.iter().position(|e| e.event_id() == id) {
            self.events.remove(idx);
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn list(&self) -> &[E] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Capability of an entity that records domain events for later publication.
pub trait EventEmitter {
    type Event: DomainEvent;

    fn add_event(&mut self, event: Self::Event);

    fn remove_event(&mut self, event: &Self::Event);

    fn clear_events(&mut self);

    fn events(&self) -> &[Self::Event];
}
