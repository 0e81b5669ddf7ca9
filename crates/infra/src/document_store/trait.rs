use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use thiserror::Error;

/// Response status classes the store reports for failed operations.
///
/// Mirrors the HTTP status codes document stores commonly use, so adapters can
/// convert with [`StoreStatus::from_code`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StoreStatus {
    NotModified,
    BadRequest,
    NotFound,
    Conflict,
    PreconditionFailed,
    TooManyRequests,
    /// Batch item skipped because a sibling operation failed.
    FailedDependency,
    Other(u16),
}

impl StoreStatus {
    pub fn from_code(code: u16) -> Self {
        match code {
            304 => StoreStatus::NotModified,
            400 => StoreStatus::BadRequest,
            404 => StoreStatus::NotFound,
            409 => StoreStatus::Conflict,
            412 => StoreStatus::PreconditionFailed,
            424 => StoreStatus::FailedDependency,
            429 => StoreStatus::TooManyRequests,
            other => StoreStatus::Other(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            StoreStatus::NotModified => 304,
            StoreStatus::BadRequest => 400,
            StoreStatus::NotFound => 404,
            StoreStatus::Conflict => 409,
            StoreStatus::PreconditionFailed => 412,
            StoreStatus::FailedDependency => 424,
            StoreStatus::TooManyRequests => 429,
            StoreStatus::Other(code) => code,
        }
    }
}

impl core::fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({:?})", self.code(), self)
    }
}

/// Raw failure reported by a document store.
///
/// These never leave the repository/change-tracker boundary; they are
/// classified into `PersistenceError` first.
#[derive(Debug, Clone, Error)]
#[error("document store returned {status}: {message}")]
pub struct StoreError {
    pub status: StoreStatus,
    pub message: String,
    /// Server-suggested back-off for throttled requests.
    pub retry_after: Option<Duration>,
}

impl StoreError {
    pub fn new(status: StoreStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// A document as returned by a point read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResponse {
    pub document: JsonValue,
    pub etag: String,
}

/// Equality filter over dotted field paths (e.g. `data.deleted`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    filters: Vec<(String, JsonValue)>,
}

impl DocumentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_eq(mut self, path: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.filters.push((path.into(), value.into()));
        self
    }

    pub fn filters(&self) -> &[(String, JsonValue)] {
        &self.filters
    }

    /// Whether `document` satisfies every filter. Missing fields never match.
    pub fn matches(&self, document: &JsonValue) -> bool {
        self.filters.iter().all(|(path, expected)| {
            path.split('.')
                .try_fold(document, |node, segment| node.get(segment))
                .is_some_and(|actual| actual == expected)
        })
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    /// Matching documents, each carrying its `_etag`.
    pub documents: Vec<JsonValue>,
    /// Opaque token to resume from; `None` when there are no further pages.
    pub continuation: Option<String>,
}

/// One operation inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOperation {
    Create {
        document: JsonValue,
    },
    Replace {
        id: String,
        document: JsonValue,
        if_match: Option<String>,
    },
}

/// Per-operation outcome of a batch, in request order.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchItemResult {
    Succeeded { etag: String },
    Failed { status: StoreStatus },
}

impl BatchItemResult {
    pub fn status(&self) -> Option<StoreStatus> {
        match self {
            BatchItemResult::Succeeded { .. } => None,
            BatchItemResult::Failed { status } => Some(*status),
        }
    }
}

/// Result of executing an atomic batch.
///
/// A batch is all-or-nothing: if any item failed, none were applied and the
/// items that were not at fault carry [`StoreStatus::FailedDependency`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResponse {
    pub results: Vec<BatchItemResult>,
}

impl BatchResponse {
    pub fn is_success(&self) -> bool {
        self.results
            .iter()
            .all(|r| matches!(r, BatchItemResult::Succeeded { .. }))
    }
}

/// Partitioned document store client.
///
/// Documents are JSON objects carrying at least `id` and `partitionKey`; an
/// integer `ttl` (seconds, `-1` = never) asks the store to expire them. The
/// store owns the `_etag` of every document and returns the new value from
/// every write.
///
/// Implementations must:
/// - reject `create` of an existing `(partition_key, id)` with `Conflict`
/// - reject `replace` with a stale `if_match` with `PreconditionFailed`
/// - answer `read` with a current `if_none_match` with `NotModified`
/// - apply batches atomically within a single partition
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read(
        &self,
        partition_key: &str,
        id: &str,
        if_none_match: Option<&str>,
    ) -> Result<ReadResponse, StoreError>;

    async fn create(&self, partition_key: &str, document: JsonValue) -> Result<String, StoreError>;

    async fn replace(
        &self,
        partition_key: &str,
        id: &str,
        document: JsonValue,
        if_match: Option<&str>,
    ) -> Result<String, StoreError>;

    async fn query(
        &self,
        query: &DocumentQuery,
        page_size: u32,
        continuation: Option<&str>,
    ) -> Result<QueryPage, StoreError>;

    async fn execute_batch(
        &self,
        partition_key: &str,
        operations: Vec<BatchOperation>,
    ) -> Result<BatchResponse, StoreError>;
}

#[async_trait::async_trait]
impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    async fn read(
        &self,
        partition_key: &str,
        id: &str,
        if_none_match: Option<&str>,
    ) -> Result<ReadResponse, StoreError> {
        (**self).read(partition_key, id, if_none_match).await
    }

    async fn create(&self, partition_key: &str, document: JsonValue) -> Result<String, StoreError> {
        (**self).create(partition_key, document).await
    }

    async fn replace(
        &self,
        partition_key: &str,
        id: &str,
        document: JsonValue,
        if_match: Option<&str>,
    ) -> Result<String, StoreError> {
        (**self).replace(partition_key, id, document, if_match).await
    }

    async fn query(
        &self,
        query: &DocumentQuery,
        page_size: u32,
        continuation: Option<&str>,
    ) -> Result<QueryPage, StoreError> {
        (**self).query(query, page_size, continuation).await
    }

    async fn execute_batch(
        &self,
        partition_key: &str,
        operations: Vec<BatchOperation>,
    ) -> Result<BatchResponse, StoreError> {
        (**self).execute_batch(partition_key, operations).await
    }
}
