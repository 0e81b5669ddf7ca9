//! Repositories over the shared change tracker.

pub mod entity;
pub mod event;
pub mod partition;

use serde::{Deserialize, Serialize};

use contactstore_contacts::{Contact, ContactEvent};
use contactstore_events::EventEmitter;

use crate::context::ChangeTracker;
use crate::document::DocumentPayload;

pub use entity::{EntityPage, EntityRepository, StoredEntity};
pub use event::{EVENT_TYPE_TAG, EventRepository};
pub use partition::{IdPartitionKey, PartitionKeyProvider};

/// Every payload the contact store persists.
///
/// Stored `data` bodies carry no explicit discriminator; a raw document body
/// of either kind decodes back into the matching variant (contacts require
/// `name` and `deleted`, which event bodies never have together).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContactDocument {
    Contact(Contact),
    Event(ContactEvent),
}

impl DocumentPayload for ContactDocument {
    type Event = ContactEvent;

    fn pending_events(&self) -> &[ContactEvent] {
        match self {
            ContactDocument::Contact(contact) => contact.events(),
            ContactDocument::Event(_) => &[],
        }
    }
}

impl From<Contact> for ContactDocument {
    fn from(value: Contact) -> Self {
        ContactDocument::Contact(value)
    }
}

impl From<ContactEvent> for ContactDocument {
    fn from(value: ContactEvent) -> Self {
        ContactDocument::Event(value)
    }
}

/// Change tracker over [`ContactDocument`]s.
pub type ContactContext<S, B> = ChangeTracker<S, B, ContactDocument>;

pub type ContactRepository<S, B> = EntityRepository<Contact, S, B, ContactDocument>;

pub type ContactEventRepository<S, B> = EventRepository<S, B, ContactDocument>;
