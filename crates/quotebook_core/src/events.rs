//! Structured notifications emitted by the core for UI subscribers.
//!
//! # Responsibility
//! - Describe every observable store/sync transition as a typed event.
//! - Decouple the core from how notifications are rendered.
//!
//! # Invariants
//! - Events are emitted after the transition they describe has completed.

use crate::model::record::RecordId;
use crate::sync::merge::ResolutionPolicy;
use std::sync::Mutex;

/// Core notification payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    RecordAdded { id: RecordId },
    RecordUpdated { id: RecordId },
    RecordDeleted { id: RecordId },
    RecordsImported { accepted: usize, rejected: usize },
    SyncStarted,
    SyncCompleted { merged: usize, conflicts: usize },
    SyncFailed { reason: String },
    ConflictsResolved { policy: ResolutionPolicy },
    /// A durable write failed; in-memory state is unaffected.
    PersistFailed { key: String, reason: String },
}

impl CoreEvent {
    /// Stable event name used in structured logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RecordAdded { .. } => "record_added",
            Self::RecordUpdated { .. } => "record_updated",
            Self::RecordDeleted { .. } => "record_deleted",
            Self::RecordsImported { .. } => "records_imported",
            Self::SyncStarted => "sync_started",
            Self::SyncCompleted { .. } => "sync_completed",
            Self::SyncFailed { .. } => "sync_failed",
            Self::ConflictsResolved { .. } => "conflicts_resolved",
            Self::PersistFailed { .. } => "persist_failed",
        }
    }
}

/// Receiver for core notifications.
pub trait EventSink {
    fn emit(&self, event: &CoreEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &CoreEvent) {}
}

/// Sink that buffers events until drained.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<CoreEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns all buffered events in emission order.
    pub fn drain(&self) -> Vec<CoreEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: &CoreEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}
