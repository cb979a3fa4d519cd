//! Host-facing handle that wires store, session and sync together.
//!
//! # Responsibility
//! - Build every core component from one `CoreConfig`.
//! - Expose the viewer use-cases (show, add, filter, import/export, reset).
//! - Drive scheduled sync from the host's polling loop.
//!
//! # Invariants
//! - The handle owns the only `RecordStore`; sync commits go through it.
//! - `clear_all_data` leaves no persisted keys and no pending sync state.

use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::events::EventSink;
use crate::model::record::{Record, RecordDraft};
use crate::persistence::PersistenceAdapter;
use crate::service::interchange::{export_records, parse_records};
use crate::service::record_store::{
    ImportReport, LoadReport, RecordStore, StoreContext, StoreResult,
};
use crate::service::session::SessionState;
use crate::sync::engine::{ResolutionReport, SyncEngine, SyncError, SyncOutcome};
use crate::sync::merge::ResolutionPolicy;
use crate::sync::timer::SyncTimer;
use crate::sync::transport::RemoteTransport;
use log::info;
use std::sync::Arc;

/// Single-owner facade over the quote core.
pub struct Quotebook<T: RemoteTransport> {
    store: RecordStore,
    session: SessionState,
    engine: SyncEngine<T>,
    timer: SyncTimer,
    clock: Arc<dyn Clock>,
}

impl<T: RemoteTransport> Quotebook<T> {
    /// Loads stored state and starts the sync timer.
    ///
    /// `durable` holds the record snapshot and preferences; `session` holds
    /// the last viewed record and counters.
    pub fn init(
        config: &CoreConfig,
        durable: Arc<dyn PersistenceAdapter>,
        session: Arc<dyn PersistenceAdapter>,
        transport: T,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> (Self, LoadReport) {
        let ctx = StoreContext {
            storage: durable.clone(),
            clock: clock.clone(),
            events: events.clone(),
        };
        let (store, report) = RecordStore::open(config, ctx);
        let now = clock.now_ms();
        let session = SessionState::load(durable, session, config.storage_keys(), now);
        let engine = SyncEngine::new(
            transport,
            clock.clone(),
            events,
            config.merge_separator.as_str(),
        );
        let mut timer = SyncTimer::new(config.sync_interval_ms);
        timer.start(now);

        info!(
            "event=quotebook_init module=app status=ok records={} interval_ms={}",
            store.len(),
            timer.interval_ms()
        );

        (
            Self {
                store,
                session,
                engine,
                timer,
                clock,
            },
            report,
        )
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut RecordStore {
        &mut self.store
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn engine(&self) -> &SyncEngine<T> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SyncEngine<T> {
        &mut self.engine
    }

    pub fn timer(&self) -> &SyncTimer {
        &self.timer
    }

    /// Picks a random record and records the view.
    pub fn show_random(&mut self, filter: Option<&str>) -> StoreResult<Record> {
        let record = self.store.pick_random(filter)?;
        self.session.record_view(&record);
        Ok(record)
    }

    /// Adds a record and counts it in session stats.
    pub fn add(&mut self, draft: RecordDraft) -> StoreResult<Record> {
        let record = self.store.add(draft)?;
        self.session.record_added();
        Ok(record)
    }

    /// Remembers the category filter; `None` selects all.
    pub fn select_filter(&mut self, category: Option<&str>) {
        let now = self.clock.now_ms();
        self.session.select_filter(category, now);
    }

    /// Runs one sync tick if the timer is due at `now_ms`.
    pub fn poll(&mut self, now_ms: i64) -> Option<SyncOutcome> {
        if !self.timer.poll(now_ms) {
            return None;
        }
        Some(self.engine.tick(&mut self.store))
    }

    pub fn force_sync(&mut self) -> SyncOutcome {
        self.engine.force_sync(&mut self.store)
    }

    /// Resolves pending conflicts with `policy`.
    pub fn resolve(&mut self, policy: ResolutionPolicy) -> Result<ResolutionReport, SyncError> {
        self.engine.apply_resolution(policy, &mut self.store)
    }

    /// Encodes the whole collection for download.
    pub fn export(&self) -> serde_json::Result<Vec<u8>> {
        export_records(&self.store.snapshot())
    }

    /// Decodes `bytes` and appends the accepted records.
    pub fn import(&mut self, bytes: &[u8]) -> StoreResult<ImportReport> {
        let batch = parse_records(bytes, self.clock.now_ms())?;
        self.store.import(batch)
    }

    /// Removes every record, preference and session key.
    ///
    /// Pending conflicts are dropped and in-flight rounds are discarded.
    pub fn clear_all_data(&mut self) {
        self.store.clear();
        self.session.clear(self.clock.now_ms());
        self.engine.reset();
        info!("event=quotebook_clear module=app status=ok");
    }

    /// Stops scheduled sync and flushes session state.
    pub fn shutdown(&mut self) {
        self.timer.stop();
        self.session.flush();
        info!("event=quotebook_shutdown module=app status=ok");
    }
}
