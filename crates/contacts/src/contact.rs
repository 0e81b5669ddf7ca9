use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use contactstore_core::{DomainError, DomainResult, Entity, EntityId, EntityMetadata, ValueObject};
use contactstore_events::{EventEmitter, EventLedger};

use crate::event::{ContactChange, ContactEvent};

/// Contact identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(pub EntityId);

impl ContactId {
    pub fn new() -> Self {
        Self(EntityId::new())
    }
}

impl Default for ContactId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ContactId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<ContactId> for EntityId {
    fn from(value: ContactId) -> Self {
        value.0
    }
}

impl core::str::FromStr for ContactId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

fn require(field: &str, value: impl Into<String>) -> DomainResult<String> {
    let value = value.into();
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(value.trim().to_string())
}

/// Person name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Name {
    first_name: String,
    last_name: String,
}

impl Name {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> DomainResult<Self> {
        Ok(Self {
            first_name: require("first name", first_name)?,
            last_name: require("last name", last_name)?,
        })
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }
}

impl ValueObject for Name {}

/// E-mail address (shape check only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn new(value: impl Into<String>) -> DomainResult<Self> {
        let value = require("email", value)?;
        match value.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(Self(value)),
            _ => Err(DomainError::validation(format!("'{value}' is not an email address"))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for Email {}

/// Employer of a contact, with its postal address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    name: String,
    street: String,
    house_number: String,
    postal_code: String,
    city: String,
    country: String,
}

impl Company {
    pub fn new(
        name: impl Into<String>,
        street: impl Into<String>,
        house_number: impl Into<String>,
        postal_code: impl Into<String>,
        city: impl Into<String>,
        country: impl Into<String>,
    ) -> DomainResult<Self> {
        Ok(Self {
            name: require("company name", name)?,
            street: require("street", street)?,
            house_number: require("house number", house_number)?,
            postal_code: require("postal code", postal_code)?,
            city: require("city", city)?,
            country: require("country", country)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn country(&self) -> &str {
        &self.country
    }
}

impl ValueObject for Company {}

/// Contact entity.
///
/// The pending-event ledger is transient: it is not part of the stored payload
/// and is ignored by equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    id: ContactId,
    name: Name,
    description: Option<String>,
    email: Option<Email>,
    company: Option<Company>,
    #[serde(flatten)]
    metadata: EntityMetadata,
    #[serde(skip)]
    events: EventLedger<ContactEvent>,
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.description == other.description
            && self.email == other.email
            && self.company == other.company
            && self.metadata == other.metadata
    }
}

impl Contact {
    /// Create a new contact and record `contacts.contact.created`.
    pub fn create(id: ContactId, name: Name) -> Self {
        Self::create_at(id, name, Utc::now())
    }

    pub fn create_at(id: ContactId, name: Name, at: DateTime<Utc>) -> Self {
        let mut contact = Self {
            id,
            name,
            description: None,
            email: None,
            company: None,
            metadata: EntityMetadata::new(at),
            events: EventLedger::new(),
        };
        let snapshot = contact.clone();
        contact.record(
            ContactChange::Created {
                contact: Box::new(snapshot),
            },
            at,
        );
        contact
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn email(&self) -> Option<&Email> {
        self.email.as_ref()
    }

    pub fn company(&self) -> Option<&Company> {
        self.company.as_ref()
    }

    pub fn set_name(&mut self, name: Name) {
        self.name = name.clone();
        self.touch_and_record(ContactChange::NameUpdated { name });
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        let description = description.into();
        self.description = Some(description.clone());
        self.touch_and_record(ContactChange::DescriptionUpdated { description });
    }

    pub fn set_email(&mut self, email: Email) {
        self.email = Some(email.clone());
        self.touch_and_record(ContactChange::EmailUpdated { email });
    }

    pub fn set_company(&mut self, company: Company) {
        self.company = Some(company.clone());
        self.touch_and_record(ContactChange::CompanyUpdated { company });
    }

    /// Soft-delete the contact and record `contacts.contact.deleted`.
    pub fn set_deleted(&mut self) {
        let now = Utc::now();
        self.metadata.mark_deleted(now);
        self.record(ContactChange::Deleted, now);
    }

    fn touch_and_record(&mut self, change: ContactChange) {
        let now = Utc::now();
        self.metadata.touch(now);
        self.record(change, now);
    }

    fn record(&mut self, change: ContactChange, at: DateTime<Utc>) {
        let event = ContactEvent::new(self.id, change, at);
        self.events.add(event);
    }
}

impl Entity for Contact {
    type Id = ContactId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut EntityMetadata {
        &mut self.metadata
    }
}

impl EventEmitter for Contact {
    type Event = ContactEvent;

    fn add_event(&mut self, event: ContactEvent) {
        self.events.add(event);
    }

    fn remove_event(&mut self, event: &ContactEvent) {
        self.events.remove(event);
    }

    fn clear_events(&mut self) {
        self.events.clear();
    }

    fn events(&self) -> &[ContactEvent] {
        self.events.list()
    }
}
