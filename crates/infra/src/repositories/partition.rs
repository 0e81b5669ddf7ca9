//! Partition key derivation.

use contactstore_core::Entity;

/// Derives the partition key of an entity's documents.
///
/// Keys must depend on identity only, never on mutable fields: a document
/// whose key changed could no longer be read or replaced.
pub trait PartitionKeyProvider<T: Entity>: Send + Sync {
    fn for_id(&self, id: &T::Id) -> String;

    fn for_entity(&self, entity: &T) -> String {
        self.for_id(entity.id())
    }
}

/// One partition per entity: the key is the entity id itself.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IdPartitionKey;

impl<T: Entity> PartitionKeyProvider<T> for IdPartitionKey {
    fn for_id(&self, id: &T::Id) -> String {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contactstore_contacts::{Contact, ContactId, Name};

    #[test]
    fn key_survives_mutation() {
        let mut contact = Contact::create(ContactId::new(), Name::new("Grace", "Hopper").unwrap());
        let before = PartitionKeyProvider::<Contact>::for_entity(&IdPartitionKey, &contact);

        contact.set_description("rear admiral");

        assert_eq!(PartitionKeyProvider::<Contact>::for_entity(&IdPartitionKey, &contact), before);
        assert_eq!(before, contact.id().to_string());
    }
}
