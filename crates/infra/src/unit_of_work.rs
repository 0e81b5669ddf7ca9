//! Unit of work: the contact repositories over one change tracker.

use std::sync::Arc;

use contactstore_contacts::ContactEvent;
use contactstore_events::EventBus;

use crate::config::PersistenceConfig;
use crate::context::ChangeTracker;
use crate::document::TrackedDocument;
use crate::document_store::DocumentStore;
use crate::error::PersistenceResult;
use crate::repositories::{
    ContactContext, ContactDocument, ContactEventRepository, ContactRepository, EntityRepository, EventRepository,
};

/// One logical batch of contact mutations, committed together.
///
/// Both repositories queue onto the same context, so a contact and the events
/// recorded for it land in one commit. Create one per request; it is not meant
/// to be shared between concurrent callers.
pub struct UnitOfWork<S: ?Sized, B> {
    context: Arc<ContactContext<S, B>>,
    contacts: ContactRepository<S, B>,
    events: ContactEventRepository<S, B>,
}

impl<S: ?Sized, B> UnitOfWork<S, B> {
    pub fn new(store: Arc<S>, bus: B, config: &PersistenceConfig) -> Self {
        let context = Arc::new(ChangeTracker::new(store, bus).with_publish_order(config.publish_order));
        Self {
            contacts: EntityRepository::new(context.clone()),
            events: EventRepository::new(context.clone(), config.event_ttl_seconds),
            context,
        }
    }

    pub fn contacts(&self) -> &ContactRepository<S, B> {
        &self.contacts
    }

    pub fn events(&self) -> &ContactEventRepository<S, B> {
        &self.events
    }

    pub fn context(&self) -> &ContactContext<S, B> {
        &self.context
    }
}

impl<S, B> UnitOfWork<S, B>
where
    S: DocumentStore + ?Sized,
    B: EventBus<ContactEvent>,
{
    /// Commit everything queued through either repository.
    pub async fn commit(&self) -> PersistenceResult<Vec<TrackedDocument<ContactDocument>>> {
        self.context.commit().await
    }
}
