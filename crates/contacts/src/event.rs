use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use contactstore_core::{EntityId, EventId};
use contactstore_events::DomainEvent;

use crate::contact::{Company, Contact, ContactId, Email, Name};

/// What changed on a contact. The serde tag doubles as the ledger action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ContactChange {
    #[serde(rename = "contacts.contact.created")]
    Created { contact: Box<Contact> },
    #[serde(rename = "contacts.contact.name_updated")]
    NameUpdated { name: Name },
    #[serde(rename = "contacts.contact.description_updated")]
    DescriptionUpdated { description: String },
    #[serde(rename = "contacts.contact.email_updated")]
    EmailUpdated { email: Email },
    #[serde(rename = "contacts.contact.company_updated")]
    CompanyUpdated { company: Company },
    #[serde(rename = "contacts.contact.deleted")]
    Deleted,
}

impl ContactChange {
    pub fn action(&self) -> &'static str {
        match self {
            ContactChange::Created { .. } => "contacts.contact.created",
            ContactChange::NameUpdated { .. } => "contacts.contact.name_updated",
            ContactChange::DescriptionUpdated { .. } => "contacts.contact.description_updated",
            ContactChange::EmailUpdated { .. } => "contacts.contact.email_updated",
            ContactChange::CompanyUpdated { .. } => "contacts.contact.company_updated",
            ContactChange::Deleted => "contacts.contact.deleted",
        }
    }
}

/// Event raised by a contact mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactEvent {
    pub id: EventId,
    pub contact_id: ContactId,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub change: ContactChange,
}

impl ContactEvent {
    pub fn new(contact_id: ContactId, change: ContactChange, created_at: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            contact_id,
            created_at,
            change,
        }
    }
}

impl DomainEvent for ContactEvent {
    fn event_id(&self) -> EventId {
        self.id
    }

    fn action(&self) -> &str {
        self.change.action()
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn entity_id(&self) -> EntityId {
        self.contact_id.0
    }
}
