//! Contacts domain module.
//!
//! Business rules for contacts implemented as deterministic domain logic (no IO,
//! no storage). Every mutation records a domain event in the contact's ledger.

pub mod contact;
pub mod event;

pub use contact::{Company, Contact, ContactId, Email, Name};
pub use event::{ContactChange, ContactEvent};
