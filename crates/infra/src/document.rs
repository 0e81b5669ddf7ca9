//! Tracked documents: entities wrapped with their storage metadata.

use serde::{Deserialize, Serialize};

use contactstore_events::DomainEvent;

/// Time-to-live marker for documents that never expire.
pub const NO_EXPIRY: i32 = -1;

/// Pending write state of a tracked document. Never persisted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum EntityState {
    Created,
    Updated,
    /// Soft delete: written as a replace carrying a deleted payload.
    Deleted,
    #[default]
    Unmodified,
}

/// Storage envelope for one payload.
///
/// Persisted as `{ id, partitionKey, type, data, _etag, ttl }`. The etag is
/// empty for documents that were never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedDocument<T> {
    id: String,
    partition_key: String,
    #[serde(rename = "type")]
    doc_type: String,
    data: T,
    #[serde(rename = "_etag", default)]
    etag: String,
    ttl: i32,
    #[serde(skip)]
    state: EntityState,
}

impl<T> TrackedDocument<T> {
    pub fn new(
        id: impl Into<String>,
        partition_key: impl Into<String>,
        doc_type: impl Into<String>,
        data: T,
        etag: impl Into<String>,
        ttl: i32,
        state: EntityState,
    ) -> Self {
        Self {
            id: id.into(),
            partition_key: partition_key.into(),
            doc_type: doc_type.into(),
            data,
            etag: etag.into(),
            ttl,
            state,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// The etag as a write precondition; blank etags impose none.
    pub fn if_match(&self) -> Option<&str> {
        Some(self.etag.as_str()).filter(|e| !e.trim().is_empty())
    }

    pub fn set_etag(&mut self, etag: impl Into<String>) {
        self.etag = etag.into();
    }

    pub fn ttl(&self) -> i32 {
        self.ttl
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn set_state(&mut self, state: EntityState) {
        self.state = state;
    }

    /// Same identity, a different payload (e.g. lifting into a payload sum type).
    pub fn map_data<U>(self, f: impl FnOnce(T) -> U) -> TrackedDocument<U> {
        TrackedDocument {
            id: self.id,
            partition_key: self.partition_key,
            doc_type: self.doc_type,
            data: f(self.data),
            etag: self.etag,
            ttl: self.ttl,
            state: self.state,
        }
    }

    /// Whether `other` addresses the same stored document.
    pub fn same_document<U>(&self, other: &TrackedDocument<U>) -> bool {
        self.id == other.id && self.partition_key == other.partition_key
    }
}

/// Payloads the change tracker can persist.
///
/// Payloads of event-emitting entities expose their pending ledger so that a
/// commit can publish it; everything else returns an empty slice.
pub trait DocumentPayload: Serialize + Clone + Send + Sync + 'static {
    type Event: DomainEvent;

    fn pending_events(&self) -> &[Self::Event];
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_storage_shape_without_state() {
        let doc = TrackedDocument::new("1", "1", "contact", json!({"deleted": false}), "", NO_EXPIRY, EntityState::Created);
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "1",
                "partitionKey": "1",
                "type": "contact",
                "data": {"deleted": false},
                "_etag": "",
                "ttl": -1
            })
        );
    }

    #[test]
    fn deserialized_documents_are_unmodified() {
        let doc: TrackedDocument<serde_json::Value> = serde_json::from_value(json!({
            "id": "1", "partitionKey": "1", "type": "contact", "data": {}, "_etag": "abc", "ttl": -1
        }))
        .unwrap();
        assert_eq!(doc.state(), EntityState::Unmodified);
        assert_eq!(doc.if_match(), Some("abc"));
    }

    #[test]
    fn blank_etag_is_no_precondition() {
        let doc = TrackedDocument::new("1", "1", "contact", (), " ", NO_EXPIRY, EntityState::Updated);
        assert_eq!(doc.if_match(), None);
    }
}
