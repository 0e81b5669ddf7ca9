//! Change tracking and commit (unit-of-work engine).
//!
//! Repositories hand tracked documents to a [`ChangeTracker`]; nothing is
//! written until [`ChangeTracker::commit`] runs. A commit:
//!
//! ```text
//! drain pending documents
//!   ↓
//! publish pending domain events (fire-and-forget)
//!   ↓
//! 0 docs → nothing | 1 doc → single create/replace | n docs → atomic batch
//!   ↓
//! copy the new etags onto the committed documents
//! ```
//!
//! The pending set is taken out before the first `.await`, so it is empty once
//! `commit` returns, fails, or is dropped mid-flight. A failed commit is never
//! retried here and its documents are discarded: re-applying "just the failed
//! items" could silently re-apply batch members that already succeeded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, instrument, warn};

use contactstore_events::{DomainEvent, EventBus};

use crate::config::PublishOrder;
use crate::document::{DocumentPayload, EntityState, TrackedDocument};
use crate::document_store::{BatchItemResult, BatchOperation, DocumentStore, StoreStatus};
use crate::error::{DocumentRef, PersistenceError, PersistenceResult};

/// Accumulates the tracked documents of one logical unit of work.
///
/// Not meant to be shared by concurrent units of work: create one per request
/// or transaction scope and serialize mutate+commit cycles on it. Optimistic
/// concurrency is enforced by the store's etag preconditions, not by locking.
pub struct ChangeTracker<S: ?Sized, B, P> {
    store: Arc<S>,
    bus: B,
    publish_order: PublishOrder,
    pending: Mutex<Vec<TrackedDocument<P>>>,
}

impl<S, B, P> core::fmt::Debug for ChangeTracker<S, B, P>
where
    S: ?Sized,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("publish_order", &self.publish_order)
            .field("pending", &self.lock().len())
            .finish_non_exhaustive()
    }
}

impl<S: ?Sized, B, P> ChangeTracker<S, B, P> {
    pub fn new(store: Arc<S>, bus: B) -> Self {
        Self {
            store,
            bus,
            publish_order: PublishOrder::default(),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn with_publish_order(mut self, publish_order: PublishOrder) -> Self {
        self.publish_order = publish_order;
        self
    }

    /// The store repositories use for immediate reads.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Track `document` for the next commit.
    ///
    /// A document whose `(id, partition key)` is already tracked is ignored; the
    /// first submission wins. Returns whether the document was added.
    pub fn add(&self, document: TrackedDocument<P>) -> bool {
        let mut pending = self.lock();
        if pending.iter().any(|d| d.same_document(&document)) {
            debug!(id = document.id(), "document already tracked, ignoring");
            return false;
        }
        pending.push(document);
        true
    }

    /// Drop every pending document without writing anything.
    pub fn reset(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the pending documents, in submission order.
    pub fn pending(&self) -> Vec<TrackedDocument<P>>
    where
        P: Clone,
    {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TrackedDocument<P>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_pending(&self) -> Vec<TrackedDocument<P>> {
        std::mem::take(&mut *self.lock())
    }
}

impl<S, B, P> ChangeTracker<S, B, P>
where
    S: DocumentStore + ?Sized,
    B: EventBus<P::Event>,
    P: DocumentPayload,
{
    /// Write every pending document and return the committed documents.
    ///
    /// The result owns its documents, detached from anything the caller still
    /// holds; their etags are the ones the store just issued.
    #[instrument(skip(self), fields(pending = tracing::field::Empty), err)]
    pub async fn commit(&self) -> PersistenceResult<Vec<TrackedDocument<P>>> {
        let documents = self.take_pending();
        tracing::Span::current().record("pending", documents.len());

        if self.publish_order == PublishOrder::BeforeWrite {
            self.publish_events(&documents);
        }

        let mut documents = documents;
        let committed = if documents.len() > 1 {
            self.save_batch(documents).await?
        } else if let Some(document) = documents.pop() {
            self.save_single(document).await?
        } else {
            return Ok(Vec::new());
        };

        if self.publish_order == PublishOrder::AfterCommit {
            self.publish_events(&committed);
        }

        debug!(committed = committed.len(), "commit finished");
        Ok(committed)
    }

    fn publish_events(&self, documents: &[TrackedDocument<P>]) {
        for document in documents {
            for event in document.data().pending_events() {
                if let Err(err) = self.bus.publish(event.clone()) {
                    warn!(
                        action = event.action(),
                        document_id = document.id(),
                        error = ?err,
                        "failed to publish domain event"
                    );
                }
            }
        }
    }

    #[instrument(skip_all, fields(id = document.id(), state = ?document.state()))]
    async fn save_single(&self, mut document: TrackedDocument<P>) -> PersistenceResult<Vec<TrackedDocument<P>>> {
        let body = serde_json::to_value(&document)?;
        let partition_key = document.partition_key().to_string();

        let written = match document.state() {
            EntityState::Created => self.store.create(&partition_key, body).await,
            EntityState::Updated | EntityState::Deleted => {
                self.store
                    .replace(&partition_key, document.id(), body, document.if_match())
                    .await
            }
            EntityState::Unmodified => return Ok(Vec::new()),
        };

        let etag = written.map_err(|err| {
            PersistenceError::from_store(err, DocumentRef::new(document.id(), document.if_match()))
        })?;

        document.set_etag(etag);
        Ok(vec![document])
    }

    #[instrument(skip_all, fields(documents = documents.len()))]
    async fn save_batch(&self, mut documents: Vec<TrackedDocument<P>>) -> PersistenceResult<Vec<TrackedDocument<P>>> {
        let Some(partition_key) = documents.first().map(|d| d.partition_key().to_string()) else {
            return Ok(documents);
        };

        if let Some(stray) = documents.iter().find(|d| d.partition_key() != partition_key) {
            return Err(PersistenceError::store(format!(
                "atomic batch spans partitions '{partition_key}' and '{}' (document {})",
                stray.partition_key(),
                stray.id()
            )));
        }

        documents.retain(|d| d.state() != EntityState::Unmodified);
        if documents.is_empty() {
            return Ok(documents);
        }

        let mut operations = Vec::with_capacity(documents.len());
        for document in &documents {
            let body = serde_json::to_value(document)?;
            operations.push(match document.state() {
                EntityState::Created => BatchOperation::Create { document: body },
                _ => BatchOperation::Replace {
                    id: document.id().to_string(),
                    document: body,
                    if_match: document.if_match().map(str::to_string),
                },
            });
        }

        let response = self
            .store
            .execute_batch(&partition_key, operations)
            .await
            .map_err(|err| PersistenceError::from_store(err, DocumentRef::default()))?;

        if response.results.len() != documents.len() {
            return Err(PersistenceError::store(format!(
                "batch returned {} results for {} operations",
                response.results.len(),
                documents.len()
            )));
        }

        if !response.is_success() {
            let root_cause = response.results.iter().enumerate().find_map(|(idx, r)| {
                r.status()
                    .filter(|s| *s != StoreStatus::FailedDependency)
                    .map(|s| (idx, s))
            });
            return Err(match root_cause {
                Some((idx, status)) => {
                    let failed = &documents[idx];
                    warn!(id = failed.id(), %status, "batch rolled back");
                    PersistenceError::from_status(status, DocumentRef::new(failed.id(), failed.if_match()))
                }
                None => PersistenceError::Store {
                    status: Some(StoreStatus::FailedDependency),
                    message: "batch rolled back without a reported cause".to_string(),
                },
            });
        }

        for (document, result) in documents.iter_mut().zip(response.results) {
            if let BatchItemResult::Succeeded { etag } = result {
                document.set_etag(etag);
            }
        }

        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use contactstore_contacts::{Contact, ContactEvent, ContactId, Name};
    use contactstore_core::Entity;
    use contactstore_events::{EventEmitter, InMemoryEventBus};
    use proptest::prelude::*;

    use crate::document::NO_EXPIRY;
    use crate::document_store::{
        BatchResponse, DocumentQuery, InMemoryDocumentStore, QueryPage, ReadResponse, StoreError,
    };
    use serde_json::Value as JsonValue;
    use crate::repositories::ContactDocument;

    type Tracker = ChangeTracker<InMemoryDocumentStore, Arc<InMemoryEventBus<ContactEvent>>, ContactDocument>;

    fn setup() -> (Arc<InMemoryDocumentStore>, Arc<InMemoryEventBus<ContactEvent>>, Tracker) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let tracker = ChangeTracker::new(store.clone(), bus.clone());
        (store, bus, tracker)
    }

    fn contact() -> Contact {
        Contact::create(ContactId::new(), Name::new("Ada", "Lovelace").unwrap())
    }

    fn doc_for(contact: Contact, pk: &str, state: EntityState) -> TrackedDocument<ContactDocument> {
        TrackedDocument::new(
            contact.id().to_string(),
            pk,
            "contact",
            ContactDocument::Contact(contact),
            "",
            NO_EXPIRY,
            state,
        )
    }

    fn created(contact: Contact) -> TrackedDocument<ContactDocument> {
        let pk = contact.id().to_string();
        doc_for(contact, &pk, EntityState::Created)
    }

    #[test]
    fn duplicate_submission_keeps_first() {
        let (_, _, tracker) = setup();
        let mut original = contact();
        let first = created(original.clone());
        original.set_description("changed");
        let second = created(original);

        assert!(tracker.add(first.clone()));
        assert!(!tracker.add(second));
        assert_eq!(tracker.pending(), vec![first]);
    }

    #[test]
    fn reset_discards_pending() {
        let (_, _, tracker) = setup();
        tracker.add(created(contact()));
        tracker.reset();
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn empty_commit_touches_nothing() {
        let (store, _, tracker) = setup();
        let committed = tracker.commit().await.unwrap();
        assert!(committed.is_empty());
        assert_eq!(store.calls().total(), 0);
    }

    #[tokio::test]
    async fn single_document_uses_point_write() {
        let (store, bus, tracker) = setup();
        let sub = bus.subscribe();
        tracker.add(created(contact()));

        let committed = tracker.commit().await.unwrap();

        assert_eq!(committed.len(), 1);
        assert!(!committed[0].etag().is_empty());
        assert_eq!(store.calls().creates, 1);
        assert_eq!(store.calls().batches, 0);
        assert!(tracker.is_empty());
        assert_eq!(sub.drain().len(), 1);
    }

    #[tokio::test]
    async fn single_document_failure_still_clears() {
        let (store, _, tracker) = setup();
        let c = contact();
        tracker.add(created(c.clone()));
        tracker.commit().await.unwrap();

        tracker.add(created(c));
        let err = tracker.commit().await.unwrap_err();

        assert!(matches!(err, PersistenceError::Conflict(_)));
        assert!(tracker.is_empty());
        assert_eq!(store.calls().batches, 0);
    }

    #[tokio::test]
    async fn stale_etag_is_a_mid_air_collision() {
        let (_, _, tracker) = setup();
        let c = contact();
        tracker.add(created(c.clone()));
        tracker.commit().await.unwrap();

        let mut update = doc_for(c.clone(), &c.id().to_string(), EntityState::Updated);
        update.set_etag("stale");
        tracker.add(update);

        let err = tracker.commit().await.unwrap_err();
        assert!(matches!(err, PersistenceError::PreconditionFailed(_)));
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn batch_updates_every_etag() {
        let (store, _, tracker) = setup();
        let pk = "shared";
        for _ in 0..3 {
            tracker.add(doc_for(contact(), pk, EntityState::Created));
        }

        let committed = tracker.commit().await.unwrap();

        assert_eq!(store.calls().batches, 1);
        assert_eq!(store.calls().creates, 0);
        assert_eq!(committed.len(), 3);
        for doc in &committed {
            let stored = store.raw(pk, doc.id()).unwrap();
            assert_eq!(stored["_etag"].as_str(), Some(doc.etag()));
        }
    }

    #[tokio::test]
    async fn batch_failure_reports_root_cause_and_clears() {
        let (store, _, tracker) = setup();
        let pk = "shared";
        let existing = contact();
        tracker.add(doc_for(existing.clone(), pk, EntityState::Created));
        tracker.commit().await.unwrap();

        tracker.add(doc_for(contact(), pk, EntityState::Created));
        let mut stale = doc_for(existing, pk, EntityState::Updated);
        stale.set_etag("stale");
        tracker.add(stale);
        tracker.add(doc_for(contact(), pk, EntityState::Created));

        let err = tracker.commit().await.unwrap_err();

        assert!(matches!(err, PersistenceError::PreconditionFailed(_)));
        assert!(tracker.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn batch_across_partitions_is_rejected_without_store_call() {
        let (store, _, tracker) = setup();
        tracker.add(created(contact()));
        tracker.add(created(contact()));

        let err = tracker.commit().await.unwrap_err();

        assert!(matches!(err, PersistenceError::Store { .. }));
        assert_eq!(store.calls().total(), 0);
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn store_outage_clears_pending() {
        let (store, _, tracker) = setup();
        tracker.add(doc_for(contact(), "p", EntityState::Created));
        tracker.add(doc_for(contact(), "p", EntityState::Created));
        store.fail_next(StoreError::new(StoreStatus::TooManyRequests, "throttled"));

        let err = tracker.commit().await.unwrap_err();

        assert!(err.is_transient());
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn events_publish_in_ledger_then_accumulation_order() {
        let (_, bus, tracker) = setup();
        let sub = bus.subscribe();

        let mut first = contact();
        first.set_description("first");
        let second = contact();
        let pk = "p";
        tracker.add(doc_for(first.clone(), pk, EntityState::Created));
        tracker.add(doc_for(second.clone(), pk, EntityState::Created));

        tracker.commit().await.unwrap();

        let published: Vec<_> = sub.drain().into_iter().map(|e| e.id).collect();
        let expected: Vec<_> = first
            .events()
            .iter()
            .chain(second.events())
            .map(|e| e.id)
            .collect();
        assert_eq!(published, expected);
    }

    #[tokio::test]
    async fn before_write_publishes_even_when_write_fails() {
        let (store, bus, tracker) = setup();
        let sub = bus.subscribe();
        tracker.add(created(contact()));
        store.fail_next(StoreError::new(StoreStatus::Other(503), "unavailable"));

        assert!(tracker.commit().await.is_err());
        assert_eq!(sub.drain().len(), 1);
    }

    #[tokio::test]
    async fn after_commit_withholds_events_of_failed_writes() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let tracker: Tracker =
            ChangeTracker::new(store.clone(), bus.clone()).with_publish_order(PublishOrder::AfterCommit);
        let sub = bus.subscribe();

        tracker.add(created(contact()));
        store.fail_next(StoreError::new(StoreStatus::Other(503), "unavailable"));
        assert!(tracker.commit().await.is_err());
        assert!(sub.drain().is_empty());

        tracker.add(created(contact()));
        tracker.commit().await.unwrap();
        assert_eq!(sub.drain().len(), 1);
    }

    /// Store that answers every batch with a fixed response.
    struct FixedBatchStore {
        response: BatchResponse,
        batches: std::sync::atomic::AtomicUsize,
    }

    impl FixedBatchStore {
        fn new(results: Vec<BatchItemResult>) -> Self {
            Self {
                response: BatchResponse { results },
                batches: Default::default(),
            }
        }

        fn unsupported() -> StoreError {
            StoreError::new(StoreStatus::BadRequest, "batch-only store")
        }
    }

    #[async_trait::async_trait]
    impl DocumentStore for FixedBatchStore {
        async fn read(&self, _: &str, _: &str, _: Option<&str>) -> Result<ReadResponse, StoreError> {
            Err(Self::unsupported())
        }

        async fn create(&self, _: &str, _: JsonValue) -> Result<String, StoreError> {
            Err(Self::unsupported())
        }

        async fn replace(&self, _: &str, _: &str, _: JsonValue, _: Option<&str>) -> Result<String, StoreError> {
            Err(Self::unsupported())
        }

        async fn query(&self, _: &DocumentQuery, _: u32, _: Option<&str>) -> Result<QueryPage, StoreError> {
            Err(Self::unsupported())
        }

        async fn execute_batch(&self, _: &str, _: Vec<BatchOperation>) -> Result<BatchResponse, StoreError> {
            self.batches.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    fn fixed_tracker(
        results: Vec<BatchItemResult>,
    ) -> (Arc<FixedBatchStore>, ChangeTracker<FixedBatchStore, Arc<InMemoryEventBus<ContactEvent>>, ContactDocument>) {
        let store = Arc::new(FixedBatchStore::new(results));
        let tracker = ChangeTracker::new(store.clone(), Arc::new(InMemoryEventBus::new()));
        (store, tracker)
    }

    #[tokio::test]
    async fn batch_with_only_skip_markers_is_a_store_failure() {
        let skipped = BatchItemResult::Failed {
            status: StoreStatus::FailedDependency,
        };
        let (store, tracker) = fixed_tracker(vec![skipped.clone(), skipped.clone(), skipped]);
        for _ in 0..3 {
            tracker.add(doc_for(contact(), "p", EntityState::Created));
        }

        let err = tracker.commit().await.unwrap_err();

        assert!(matches!(
            err,
            PersistenceError::Store {
                status: Some(StoreStatus::FailedDependency),
                ..
            }
        ));
        assert_eq!(store.batches.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn short_batch_response_is_a_store_failure() {
        let (_, tracker) = fixed_tracker(vec![BatchItemResult::Succeeded {
            etag: "only-one".to_string(),
        }]);
        tracker.add(doc_for(contact(), "p", EntityState::Created));
        tracker.add(doc_for(contact(), "p", EntityState::Created));

        let err = tracker.commit().await.unwrap_err();

        assert!(matches!(err, PersistenceError::Store { status: None, .. }));
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn single_unmodified_document_is_not_written() {
        let (store, _, tracker) = setup();
        tracker.add(doc_for(contact(), "p", EntityState::Unmodified));

        let committed = tracker.commit().await.unwrap();

        assert!(committed.is_empty());
        assert_eq!(store.calls().total(), 0);
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn unmodified_documents_are_dropped_from_batch() {
        let (store, _, tracker) = setup();
        let untouched = doc_for(contact(), "p", EntityState::Unmodified);
        tracker.add(doc_for(contact(), "p", EntityState::Created));
        tracker.add(untouched.clone());
        tracker.add(doc_for(contact(), "p", EntityState::Created));

        let committed = tracker.commit().await.unwrap();

        assert_eq!(committed.len(), 2);
        assert!(committed.iter().all(|d| !d.same_document(&untouched)));
        assert_eq!(store.calls().batches, 1);
        assert_eq!(store.len(), 2);
        assert!(store.raw("p", untouched.id()).is_none());
    }

    proptest! {
        /// Property: however documents are resubmitted, each (id, partition)
        /// is tracked once, in first-submission order.
        #[test]
        fn tracked_documents_are_unique(picks in prop::collection::vec(0usize..6, 0..30)) {
            let (_, _, tracker) = setup();
            let pool: Vec<Contact> = (0..6).map(|_| contact()).collect();
            let mut expected: Vec<String> = Vec::new();

            for idx in picks {
                let c = pool[idx].clone();
                let id = c.id().to_string();
                tracker.add(created(c));
                if !expected.contains(&id) {
                    expected.push(id);
                }
            }

            let ids: Vec<String> = tracker.pending().iter().map(|d| d.id().to_string()).collect();
            prop_assert_eq!(ids, expected);
        }
    }
}
