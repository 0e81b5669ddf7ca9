//! Persistence error taxonomy.
//!
//! Every store failure is classified here before it reaches a caller. Nothing
//! below this boundary retries: after `PreconditionFailed` or `TooManyRequests`
//! the caller decides whether to re-read, re-apply or resubmit.
//!
//! | Store status | PersistenceError |
//! |--------------|------------------|
//! | 404 | `NotFound` |
//! | 304 | `NotModified` |
//! | 409 | `Conflict` |
//! | 412 | `PreconditionFailed` |
//! | 429 | `TooManyRequests` |
//! | anything else | `Store` |

use std::time::Duration;

use thiserror::Error;

use crate::document_store::{StoreError, StoreStatus};

/// Result type used by repositories and the change tracker.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// The document an error refers to, when known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentRef {
    pub id: Option<String>,
    pub etag: Option<String>,
}

impl DocumentRef {
    pub fn new(id: impl Into<String>, etag: Option<&str>) -> Self {
        Self {
            id: Some(id.into()),
            etag: etag.filter(|e| !e.trim().is_empty()).map(str::to_string),
        }
    }
}

impl core::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "id: {} / etag: {}",
            self.id.as_deref().unwrap_or(""),
            self.etag.as_deref().unwrap_or("")
        )
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("domain object not found for {0}")]
    NotFound(DocumentRef),

    #[error("domain object not modified ({0})")]
    NotModified(DocumentRef),

    #[error("domain object conflict detected ({0})")]
    Conflict(DocumentRef),

    #[error("domain object mid-air collision detected ({0})")]
    PreconditionFailed(DocumentRef),

    #[error("too many requests occurred, try again later (retry after: {retry_after:?})")]
    TooManyRequests { retry_after: Option<Duration> },

    #[error("document store failure: {message}")]
    Store {
        status: Option<StoreStatus>,
        message: String,
    },

    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PersistenceError {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            status: None,
            message: message.into(),
        }
    }

    /// Classify a failed store response.
    pub fn from_status(status: StoreStatus, document: DocumentRef) -> Self {
        match status {
            StoreStatus::NotFound => Self::NotFound(document),
            StoreStatus::NotModified => Self::NotModified(document),
            StoreStatus::Conflict => Self::Conflict(document),
            StoreStatus::PreconditionFailed => Self::PreconditionFailed(document),
            StoreStatus::TooManyRequests => Self::TooManyRequests { retry_after: None },
            other => Self::Store {
                status: Some(other),
                message: format!("store returned {other} for {document}"),
            },
        }
    }

    /// Classify a store error, keeping the retry hint and message where useful.
    pub fn from_store(error: StoreError, document: DocumentRef) -> Self {
        match error.status {
            StoreStatus::TooManyRequests => Self::TooManyRequests {
                retry_after: error.retry_after,
            },
            StoreStatus::NotFound
            | StoreStatus::NotModified
            | StoreStatus::Conflict
            | StoreStatus::PreconditionFailed => Self::from_status(error.status, document),
            other => Self::Store {
                status: Some(other),
                message: error.message,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether retrying the same request later may succeed as is.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TooManyRequests { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> DocumentRef {
        DocumentRef::new("42", Some("etag-1"))
    }

    #[test]
    fn statuses_map_to_domain_kinds() {
        assert!(matches!(
            PersistenceError::from_status(StoreStatus::NotFound, doc()),
            PersistenceError::NotFound(_)
        ));
        assert!(matches!(
            PersistenceError::from_status(StoreStatus::NotModified, doc()),
            PersistenceError::NotModified(_)
        ));
        assert!(matches!(
            PersistenceError::from_status(StoreStatus::Conflict, doc()),
            PersistenceError::Conflict(_)
        ));
        assert!(matches!(
            PersistenceError::from_status(StoreStatus::PreconditionFailed, doc()),
            PersistenceError::PreconditionFailed(_)
        ));
        assert!(matches!(
            PersistenceError::from_status(StoreStatus::TooManyRequests, doc()),
            PersistenceError::TooManyRequests { .. }
        ));
        assert!(matches!(
            PersistenceError::from_status(StoreStatus::Other(503), doc()),
            PersistenceError::Store {
                status: Some(StoreStatus::Other(503)),
                ..
            }
        ));
    }

    #[test]
    fn throttling_keeps_retry_hint() {
        let err = StoreError::new(StoreStatus::TooManyRequests, "slow down")
            .with_retry_after(Duration::from_millis(250));
        let mapped = PersistenceError::from_store(err, DocumentRef::default());
        assert!(mapped.is_transient());
        assert!(matches!(
            mapped,
            PersistenceError::TooManyRequests {
                retry_after: Some(d)
            } if d == Duration::from_millis(250)
        ));
    }

    #[test]
    fn message_names_document_and_etag() {
        let err = PersistenceError::from_status(StoreStatus::PreconditionFailed, doc());
        assert_eq!(
            err.to_string(),
            "domain object mid-air collision detected (id: 42 / etag: etag-1)"
        );
    }

    #[test]
    fn blank_etag_is_dropped() {
        assert_eq!(DocumentRef::new("1", Some("  ")).etag, None);
    }
}
