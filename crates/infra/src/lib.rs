//! Infrastructure layer: document persistence for the contact store.
//!
//! Repositories turn entities into [`TrackedDocument`]s and queue them on a
//! shared [`ChangeTracker`]; a [`UnitOfWork`] commits the queue against a
//! [`DocumentStore`](document_store::DocumentStore) as one point write or one
//! atomic batch, and publishes the domain events the entities recorded.

pub mod config;
pub mod context;
pub mod document;
pub mod document_store;
pub mod error;
pub mod repositories;
pub mod unit_of_work;

pub use config::{PersistenceConfig, PublishOrder};
pub use context::ChangeTracker;
pub use document::{DocumentPayload, EntityState, NO_EXPIRY, TrackedDocument};
pub use error::{DocumentRef, PersistenceError, PersistenceResult};
pub use repositories::{
    ContactDocument, ContactRepository, EntityPage, EntityRepository, EventRepository, StoredEntity,
};
pub use unit_of_work::UnitOfWork;
