use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::r#trait::{
    BatchItemResult, BatchOperation, BatchResponse, DocumentQuery, DocumentStore, QueryPage,
    ReadResponse, StoreError, StoreStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct DocumentKey {
    partition_key: String,
    id: String,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    document: JsonValue,
    etag: String,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredDocument {
    fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    /// The document as a reader sees it, with the system `_etag` filled in.
    fn to_response(&self) -> ReadResponse {
        let mut document = self.document.clone();
        if let Some(obj) = document.as_object_mut() {
            obj.insert("_etag".to_string(), JsonValue::String(self.etag.clone()));
        }
        ReadResponse {
            document,
            etag: self.etag.clone(),
        }
    }
}

/// Number of store round trips, per operation kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub reads: usize,
    pub creates: usize,
    pub replaces: usize,
    pub queries: usize,
    pub batches: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.reads + self.creates + self.replaces + self.queries + self.batches
    }
}

#[derive(Debug, Default)]
struct Counters {
    reads: AtomicUsize,
    creates: AtomicUsize,
    replaces: AtomicUsize,
    queries: AtomicUsize,
    batches: AtomicUsize,
}

/// In-memory partitioned document store.
///
/// Intended for tests/dev. Honours etag preconditions, per-document TTL and
/// atomic single-partition batches. Expired documents are invisible to reads
/// and queries until [`purge_expired`](Self::purge_expired) evicts them.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<BTreeMap<DocumentKey, StoredDocument>>,
    counters: Counters,
    injected_failure: Mutex<Option<StoreError>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            reads: self.counters.reads.load(Ordering::SeqCst),
            creates: self.counters.creates.load(Ordering::SeqCst),
            replaces: self.counters.replaces.load(Ordering::SeqCst),
            queries: self.counters.queries.load(Ordering::SeqCst),
            batches: self.counters.batches.load(Ordering::SeqCst),
        }
    }

    /// Make the next store operation fail with `error` (throttling, outages).
    pub fn fail_next(&self, error: StoreError) {
        *self
            .injected_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Number of physically stored documents, expired or not.
    pub fn len(&self) -> usize {
        self.read_documents().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored body of a document regardless of TTL or soft-delete state.
    pub fn raw(&self, partition_key: &str, id: &str) -> Option<JsonValue> {
        self.read_documents()
            .get(&key(partition_key, id))
            .map(|d| d.to_response().document)
    }

    /// Physically remove every document whose TTL has elapsed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut documents = self.write_documents();
        let before = documents.len();
        documents.retain(|_, d| d.is_live_at(now));
        let purged = before - documents.len();
        if purged > 0 {
            tracing::debug!(purged, "evicted expired documents");
        }
        purged
    }

    fn read_documents(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, BTreeMap<DocumentKey, StoredDocument>> {
        self.documents.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_documents(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, BTreeMap<DocumentKey, StoredDocument>> {
        self.documents.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, counter: &AtomicUsize) -> Result<(), StoreError> {
        counter.fetch_add(1, Ordering::SeqCst);
        match self
            .injected_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn key(partition_key: &str, id: &str) -> DocumentKey {
    DocumentKey {
        partition_key: partition_key.to_string(),
        id: id.to_string(),
    }
}

fn new_etag() -> String {
    Uuid::now_v7().to_string()
}

fn expiry(document: &JsonValue, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match document.get("ttl").and_then(JsonValue::as_i64) {
        Some(ttl) if ttl > 0 => Some(now + Duration::seconds(ttl)),
        _ => None,
    }
}

fn string_field<'a>(document: &'a JsonValue, field: &str) -> Option<&'a str> {
    document.get(field).and_then(JsonValue::as_str)
}

/// Validate one write against the current state and stage its result.
///
/// `lookup` sees earlier staged writes of the same batch.
fn stage_write(
    partition_key: &str,
    operation: &BatchOperation,
    lookup: impl Fn(&DocumentKey) -> Option<StoredDocument>,
    now: DateTime<Utc>,
) -> Result<(DocumentKey, StoredDocument), StoreStatus> {
    let (id, document, if_match, is_create) = match operation {
        BatchOperation::Create { document } => {
            let id = string_field(document, "id").ok_or(StoreStatus::BadRequest)?;
            (id, document, None, true)
        }
        BatchOperation::Replace {
            id,
            document,
            if_match,
        } => (id.as_str(), document, if_match.as_deref(), false),
    };

    if string_field(document, "id") != Some(id)
        || string_field(document, "partitionKey") != Some(partition_key)
    {
        return Err(StoreStatus::BadRequest);
    }

    let key = key(partition_key, id);
    let existing = lookup(&key).filter(|d| d.is_live_at(now));

    match (is_create, existing) {
        (true, Some(_)) => return Err(StoreStatus::Conflict),
        (false, None) => return Err(StoreStatus::NotFound),
        (false, Some(current)) => {
            if let Some(expected) = if_match {
                if expected != current.etag {
                    return Err(StoreStatus::PreconditionFailed);
                }
            }
        }
        (true, None) => {}
    }

    let mut document = document.clone();
    if let Some(obj) = document.as_object_mut() {
        obj.remove("_etag");
    }
    let stored = StoredDocument {
        expires_at: expiry(&document, now),
        document,
        etag: new_etag(),
    };
    Ok((key, stored))
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn read(
        &self,
        partition_key: &str,
        id: &str,
        if_none_match: Option<&str>,
    ) -> Result<ReadResponse, StoreError> {
        self.begin(&self.counters.reads)?;

        let documents = self.read_documents();
        let stored = documents
            .get(&key(partition_key, id))
            .filter(|d| d.is_live_at(Utc::now()))
            .ok_or_else(|| StoreError::new(StoreStatus::NotFound, format!("document '{id}' not found")))?;

        if if_none_match == Some(stored.etag.as_str()) {
            return Err(StoreError::new(
                StoreStatus::NotModified,
                format!("document '{id}' not modified"),
            ));
        }

        Ok(stored.to_response())
    }

    async fn create(&self, partition_key: &str, document: JsonValue) -> Result<String, StoreError> {
        self.begin(&self.counters.creates)?;

        let mut documents = self.write_documents();
        let operation = BatchOperation::Create { document };
        let (key, stored) = stage_write(partition_key, &operation, |k| documents.get(k).cloned(), Utc::now())
            .map_err(|status| StoreError::new(status, "create rejected"))?;

        let etag = stored.etag.clone();
        documents.insert(key, stored);
        Ok(etag)
    }

    async fn replace(
        &self,
        partition_key: &str,
        id: &str,
        document: JsonValue,
        if_match: Option<&str>,
    ) -> Result<String, StoreError> {
        self.begin(&self.counters.replaces)?;

        let mut documents = self.write_documents();
        let operation = BatchOperation::Replace {
            id: id.to_string(),
            document,
            if_match: if_match.map(str::to_string),
        };
        let (key, stored) = stage_write(partition_key, &operation, |k| documents.get(k).cloned(), Utc::now())
            .map_err(|status| StoreError::new(status, format!("replace of '{id}' rejected")))?;

        let etag = stored.etag.clone();
        documents.insert(key, stored);
        Ok(etag)
    }

    async fn query(
        &self,
        query: &DocumentQuery,
        page_size: u32,
        continuation: Option<&str>,
    ) -> Result<QueryPage, StoreError> {
        self.begin(&self.counters.queries)?;

        let offset = match continuation {
            None => 0,
            Some(token) => token.parse::<usize>().map_err(|_| {
                StoreError::new(StoreStatus::BadRequest, format!("malformed continuation '{token}'"))
            })?,
        };
        let page_size = page_size.max(1) as usize;

        let now = Utc::now();
        let documents = self.read_documents();
        let matching: Vec<ReadResponse> = documents
            .values()
            .filter(|d| d.is_live_at(now) && query.matches(&d.document))
            .map(StoredDocument::to_response)
            .collect();

        let page: Vec<JsonValue> = matching
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|r| r.document.clone())
            .collect();
        let next = offset + page.len();
        let continuation = (next < matching.len()).then(|| next.to_string());

        Ok(QueryPage {
            documents: page,
            continuation,
        })
    }

    async fn execute_batch(
        &self,
        partition_key: &str,
        operations: Vec<BatchOperation>,
    ) -> Result<BatchResponse, StoreError> {
        self.begin(&self.counters.batches)?;

        let now = Utc::now();
        let mut documents = self.write_documents();
        let mut staged: BTreeMap<DocumentKey, StoredDocument> = BTreeMap::new();
        let mut results = Vec::with_capacity(operations.len());

        for (idx, operation) in operations.iter().enumerate() {
            let lookup = |k: &DocumentKey| staged.get(k).or_else(|| documents.get(k)).cloned();
            match stage_write(partition_key, operation, lookup, now) {
                Ok((key, stored)) => {
                    results.push(BatchItemResult::Succeeded {
                        etag: stored.etag.clone(),
                    });
                    staged.insert(key, stored);
                }
                Err(status) => {
                    tracing::debug!(index = idx, %status, "batch operation failed, rolling back");
                    let results = (0..operations.len())
                        .map(|i| BatchItemResult::Failed {
                            status: if i == idx {
                                status
                            } else {
                                StoreStatus::FailedDependency
                            },
                        })
                        .collect();
                    return Ok(BatchResponse { results });
                }
            }
        }

        documents.extend(staged);
        Ok(BatchResponse { results })
    }
}
