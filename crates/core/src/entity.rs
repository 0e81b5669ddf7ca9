//! Entity trait: identity + continuity across state changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Lifecycle timestamps and soft-delete state.
    fn metadata(&self) -> &EntityMetadata;

    fn metadata_mut(&mut self) -> &mut EntityMetadata;

    fn is_deleted(&self) -> bool {
        self.metadata().deleted
    }
}

/// Lifecycle bookkeeping shared by every entity.
///
/// A soft-deleted entity stays physically stored until the store's
/// time-to-live evicts it; readers must treat it as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMetadata {
    pub created_at: DateTime<Utc>,
    pub modified_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted: bool,
}

impl EntityMetadata {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            modified_at: None,
            deleted_at: None,
            deleted: false,
        }
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.modified_at = Some(at);
    }

    /// Flag as soft-deleted. Idempotent: the first deletion time is kept.
    pub fn mark_deleted(&mut self, at: DateTime<Utc>) {
        if !self.deleted {
            self.deleted = true;
            self.deleted_at = Some(at);
        }
        self.modified_at = Some(at);
    }
}
