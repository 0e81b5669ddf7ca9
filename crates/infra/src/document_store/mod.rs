//! Partitioned document store boundary.
//!
//! Defines what the persistence layer needs from a document database (point
//! reads and writes with etag preconditions, filtered paged queries, atomic
//! single-partition batches) without committing to a particular client.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{CallCounts, InMemoryDocumentStore};
pub use r#trait::{
    BatchItemResult, BatchOperation, BatchResponse, DocumentQuery, DocumentStore, QueryPage,
    ReadResponse, StoreError, StoreStatus,
};
