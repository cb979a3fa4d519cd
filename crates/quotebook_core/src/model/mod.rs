//! Domain model for quote records.
//!
//! # Responsibility
//! - Define canonical data structures used by store, storage and sync.
//! - Keep one wire shape for persistence, export and remote transport.
//!
//! # Invariants
//! - Every record is identified by a stable `RecordId`.
//! - Content equality ignores timestamps and origin tags.

pub mod defaults;
pub mod record;
