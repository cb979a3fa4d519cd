//! Remote reconciliation for the record store.
//!
//! # Responsibility
//! - Merge remote snapshots into local records deterministically.
//! - Drive fetch/commit/push rounds through a transport-agnostic engine.
//! - Schedule periodic rounds without owning a thread.
//!
//! # Invariants
//! - Network failures never corrupt or roll back local state.
//! - Conflicts are only applied through an explicit resolution policy.

pub mod engine;
#[cfg(feature = "http")]
pub mod http;
pub mod merge;
pub mod timer;
pub mod transport;

pub use engine::{
    ResolutionReport, SkipReason, SyncEngine, SyncError, SyncOutcome, SyncPhase, SyncRound,
    SyncState,
};
#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use merge::{apply_resolutions, merge, resolve, Conflict, MergeOutcome, ResolutionPolicy};
pub use timer::SyncTimer;
pub use transport::{
    decode_remote_payload, DisabledTransport, RemoteTransport, TransportError, TransportResult,
};
