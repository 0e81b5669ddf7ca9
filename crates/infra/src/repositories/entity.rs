//! Entity repository: entities in, tracked documents out.
//!
//! Mutations (`create`, `update`, `delete`) only queue documents on the shared
//! change tracker; reads go straight to the store.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use contactstore_contacts::Contact;
use contactstore_core::Entity;

use crate::context::ChangeTracker;
use crate::document::{DocumentPayload, EntityState, NO_EXPIRY, TrackedDocument};
use crate::document_store::{DocumentQuery, DocumentStore, ReadResponse};
use crate::error::{DocumentRef, PersistenceError, PersistenceResult};

use super::partition::{IdPartitionKey, PartitionKeyProvider};

/// An entity that can be stored as a tracked document.
pub trait StoredEntity: Entity + Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Value of the document `type` field.
    const TYPE_TAG: &'static str;

    /// Flag the entity as soft-deleted, recording whatever the entity records
    /// for a deletion.
    fn mark_deleted(&mut self);
}

impl StoredEntity for Contact {
    const TYPE_TAG: &'static str = "contact";

    fn mark_deleted(&mut self) {
        self.set_deleted();
    }
}

/// One page of a `read_page` query.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityPage<T> {
    /// Entities with their current etags, in store order.
    pub items: Vec<(T, String)>,
    pub has_more: bool,
    /// Opaque token to resume from; `None` once the last page was returned.
    pub continuation: Option<String>,
}

impl<T> EntityPage<T> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            has_more: false,
            continuation: None,
        }
    }
}

/// Repository for one entity type, sharing a change tracker with its siblings.
pub struct EntityRepository<T, S: ?Sized, B, P, K = IdPartitionKey> {
    context: Arc<ChangeTracker<S, B, P>>,
    partition: K,
    _entity: PhantomData<fn() -> T>,
}

impl<T, S: ?Sized, B, P> EntityRepository<T, S, B, P, IdPartitionKey> {
    pub fn new(context: Arc<ChangeTracker<S, B, P>>) -> Self {
        Self::with_partition(context, IdPartitionKey)
    }
}

impl<T, S: ?Sized, B, P, K> EntityRepository<T, S, B, P, K> {
    pub fn with_partition(context: Arc<ChangeTracker<S, B, P>>, partition: K) -> Self {
        Self {
            context,
            partition,
            _entity: PhantomData,
        }
    }

    pub fn context(&self) -> &Arc<ChangeTracker<S, B, P>> {
        &self.context
    }
}

impl<T, S, B, P, K> EntityRepository<T, S, B, P, K>
where
    T: StoredEntity,
    S: DocumentStore + ?Sized,
    P: DocumentPayload + From<T>,
    K: PartitionKeyProvider<T>,
{
    /// Queue `entity` for insertion.
    pub fn create(&self, entity: T) -> TrackedDocument<T> {
        self.track(entity, "", EntityState::Created)
    }

    /// Queue `entity` for replacement, guarded by `etag`.
    pub fn update(&self, entity: T, etag: &str) -> TrackedDocument<T> {
        self.track(entity, etag, EntityState::Updated)
    }

    /// Read the entity, soft-delete it and queue the replacement.
    ///
    /// A blank `etag` falls back to the etag just read. The replace stays
    /// conditional either way.
    #[instrument(skip(self), fields(entity = T::TYPE_TAG), err)]
    pub async fn delete(&self, id: &T::Id, etag: Option<&str>) -> PersistenceResult<TrackedDocument<T>> {
        let (mut entity, current) = self.read_live(id, None).await?;

        let etag = etag
            .filter(|e| !e.trim().is_empty())
            .map_or(current, str::to_string);
        entity.mark_deleted();

        Ok(self.track(entity, &etag, EntityState::Deleted))
    }

    /// Read one live entity and its etag.
    ///
    /// With `etag` set the read is conditional: an unchanged document fails
    /// with [`PersistenceError::NotModified`].
    #[instrument(skip(self), fields(entity = T::TYPE_TAG), err)]
    pub async fn read_one(&self, id: &T::Id, etag: Option<&str>) -> PersistenceResult<(T, String)> {
        self.read_live(id, etag).await
    }

    /// One page of live entities of this repository's type.
    ///
    /// A blank `continuation` starts from the first page.
    #[instrument(skip(self), fields(entity = T::TYPE_TAG), err)]
    pub async fn read_page(&self, page_size: u32, continuation: Option<&str>) -> PersistenceResult<EntityPage<T>> {
        let query = DocumentQuery::new()
            .field_eq("type", T::TYPE_TAG)
            .field_eq("data.deleted", false);

        let page = self
            .context
            .store()
            .query(&query, page_size, continuation.filter(|c| !c.trim().is_empty()))
            .await
            .map_err(|err| PersistenceError::from_store(err, DocumentRef::default()))?;

        if page.documents.is_empty() && page.continuation.is_none() {
            return Ok(EntityPage::empty());
        }

        let mut items = Vec::with_capacity(page.documents.len());
        for body in page.documents {
            let document: TrackedDocument<T> = serde_json::from_value(body)?;
            let etag = document.etag().to_string();
            items.push((document.into_data(), etag));
        }

        debug!(count = items.len(), has_more = page.continuation.is_some(), "read page");
        Ok(EntityPage {
            items,
            has_more: page.continuation.is_some(),
            continuation: page.continuation,
        })
    }

    async fn read_live(&self, id: &T::Id, if_none_match: Option<&str>) -> PersistenceResult<(T, String)> {
        let id_str = id.to_string();
        let partition_key = self.partition.for_id(id);

        let ReadResponse { document, etag } = self
            .context
            .store()
            .read(&partition_key, &id_str, if_none_match.filter(|e| !e.trim().is_empty()))
            .await
            .map_err(|err| PersistenceError::from_store(err, DocumentRef::new(id_str.as_str(), if_none_match)))?;

        let entity = serde_json::from_value::<TrackedDocument<T>>(document)?.into_data();
        if entity.is_deleted() {
            return Err(PersistenceError::NotFound(DocumentRef::new(id_str, Some(&etag))));
        }

        Ok((entity, etag))
    }

    fn track(&self, entity: T, etag: &str, state: EntityState) -> TrackedDocument<T> {
        let document = TrackedDocument::new(
            entity.id().to_string(),
            self.partition.for_entity(&entity),
            T::TYPE_TAG,
            entity,
            etag,
            NO_EXPIRY,
            state,
        );
        self.context.add(document.clone().map_data(P::from));
        document
    }
}
