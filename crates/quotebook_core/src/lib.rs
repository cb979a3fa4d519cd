//! Core domain logic for Quotebook.
//! Local-first quote records with remote reconciliation; this crate is the
//! single source of truth for record and sync invariants.

pub mod app;
pub mod clock;
pub mod config;
pub mod db;
pub mod events;
pub mod logging;
pub mod model;
pub mod persistence;
pub mod service;
pub mod sync;

pub use app::Quotebook;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, CoreConfig, RemoteConfig, StorageKeys};
pub use events::{CoreEvent, EventSink, MemoryEventSink, NoopEventSink};
pub use logging::{
    default_log_level, init_logging, init_logging_with, logging_status, LoggingError, LoggingOptions,
};
pub use model::record::{
    Record, RecordDraft, RecordId, RecordLimits, RecordOrigin, RecordPatch, RecordValidationError,
};
pub use persistence::{MemoryStorage, PersistenceAdapter, SqliteStorage, StorageError};
pub use service::interchange::{export_records, parse_records, ParsedBatch};
pub use service::record_store::{
    ImportReport, LoadReport, RecordStore, ReplaceReport, StoreContext, StoreError, StoreResult,
};
pub use service::session::{Preferences, SessionState, SessionStats};
pub use sync::{
    DisabledTransport, RemoteTransport, ResolutionPolicy, SyncEngine, SyncOutcome, SyncPhase,
    SyncState, SyncTimer, TransportError,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
