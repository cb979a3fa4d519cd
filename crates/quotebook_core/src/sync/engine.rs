//! Sync engine state machine.
//!
//! # Responsibility
//! - Fetch remote snapshots, reconcile them against the record store and
//!   commit clean merges atomically.
//! - Hold conflicting merges out-of-band until a resolution policy arrives.
//! - Push locally authored changes upstream after each commit.
//!
//! # Invariants
//! - At most one round is in flight (`Syncing`); extra ticks are no-ops.
//! - While `AwaitingResolution`, ticks are deferred and pending conflicts
//!   are kept.
//! - Transport failures never escape the engine and never touch the store.
//! - A round started before `reset` is discarded on completion.
//!
//! # State machine
//! `Idle -> Syncing -> { Idle, AwaitingResolution }`,
//! `AwaitingResolution -> Idle` via `apply_resolution`.

use super::merge::{apply_resolutions, merge, Conflict, MergeOutcome, ResolutionPolicy};
use super::transport::{RemoteTransport, TransportResult};
use crate::clock::Clock;
use crate::events::{CoreEvent, EventSink};
use crate::model::record::{Record, RecordId, RecordOrigin};
use crate::service::record_store::RecordStore;
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Engine lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Syncing,
    AwaitingResolution,
}

impl SyncPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::AwaitingResolution => "awaiting_resolution",
        }
    }
}

/// Status snapshot for UI display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    pub last_sync_timestamp: Option<i64>,
    pub online: bool,
    pub phase: SyncPhase,
    pub last_error: Option<String>,
}

/// Why a tick did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    AwaitingResolution,
}

/// Result of one tick or round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    /// Network absent; no fetch attempted.
    Offline,
    Failed {
        reason: String,
    },
    Completed {
        applied: usize,
        pushed: usize,
        push_failures: usize,
    },
    ConflictsPending {
        count: usize,
    },
    /// The engine was reset while this round was in flight.
    Discarded,
}

/// Ticket for one in-flight round.
#[derive(Debug, PartialEq, Eq)]
pub struct SyncRound {
    epoch: u64,
}

/// Outcome of applying a resolution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionReport {
    pub policy: ResolutionPolicy,
    pub resolved: usize,
    pub pushed: usize,
    pub push_failures: usize,
}

/// Caller misuse of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    NothingToResolve { phase: SyncPhase },
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NothingToResolve { phase } => {
                write!(f, "no pending conflicts to resolve (phase={})", phase.as_str())
            }
        }
    }
}

impl Error for SyncError {}

struct PendingMerge {
    /// Local snapshot the merge was computed against.
    base: Vec<Record>,
    outcome: MergeOutcome,
}

#[derive(Debug, Default, Clone, Copy)]
struct PushReport {
    pushed: usize,
    failures: usize,
}

/// Reconciles a `RecordStore` with a remote transport.
pub struct SyncEngine<T: RemoteTransport> {
    transport: T,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    merge_separator: String,
    phase: SyncPhase,
    online: bool,
    epoch: u64,
    last_sync_ms: Option<i64>,
    push_watermark_ms: Option<i64>,
    last_error: Option<String>,
    pending: Option<PendingMerge>,
}

impl<T: RemoteTransport> SyncEngine<T> {
    pub fn new(
        transport: T,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        merge_separator: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            clock,
            events,
            merge_separator: merge_separator.into(),
            phase: SyncPhase::Idle,
            online: true,
            epoch: 0,
            last_sync_ms: None,
            push_watermark_ms: None,
            last_error: None,
            pending: None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn state(&self) -> SyncState {
        SyncState {
            last_sync_timestamp: self.last_sync_ms,
            online: self.online,
            phase: self.phase,
            last_error: self.last_error.clone(),
        }
    }

    /// Updates network reachability as reported by the host.
    pub fn set_online(&mut self, online: bool) {
        if self.online != online {
            info!("event=sync_network module=sync status=ok online={online}");
        }
        self.online = online;
    }

    /// Conflicts awaiting a resolution policy.
    pub fn pending_conflicts(&self) -> &[Conflict] {
        self.pending
            .as_ref()
            .map_or(&[], |pending| pending.outcome.conflicts.as_slice())
    }

    /// Scheduled sync entry point.
    pub fn tick(&mut self, store: &mut RecordStore) -> SyncOutcome {
        self.run(store, "timer")
    }

    /// User-requested sync; same guards as `tick`.
    pub fn force_sync(&mut self, store: &mut RecordStore) -> SyncOutcome {
        self.run(store, "manual")
    }

    /// Starts a round, moving to `Syncing`.
    ///
    /// Returns the skip outcome instead when offline, already syncing, or
    /// awaiting resolution.
    pub fn begin_round(&mut self) -> Result<SyncRound, SyncOutcome> {
        match self.phase {
            SyncPhase::Syncing => return Err(SyncOutcome::Skipped(SkipReason::InFlight)),
            SyncPhase::AwaitingResolution => {
                return Err(SyncOutcome::Skipped(SkipReason::AwaitingResolution));
            }
            SyncPhase::Idle => {}
        }
        if !self.online {
            debug!("event=sync_round module=sync status=skip reason=offline");
            return Err(SyncOutcome::Offline);
        }

        self.phase = SyncPhase::Syncing;
        self.emit(CoreEvent::SyncStarted);
        Ok(SyncRound { epoch: self.epoch })
    }

    /// Completes a round with the fetched remote snapshot.
    pub fn finish_round(
        &mut self,
        round: SyncRound,
        fetched: TransportResult<Vec<Record>>,
        store: &mut RecordStore,
    ) -> SyncOutcome {
        if round.epoch != self.epoch {
            info!(
                "event=sync_round module=sync status=skip reason=stale_epoch round_epoch={} epoch={}",
                round.epoch, self.epoch
            );
            return SyncOutcome::Discarded;
        }

        let remote = match fetched {
            Ok(remote) => sanitize_remote(remote),
            Err(err) => {
                let reason = err.to_string();
                error!("event=sync_round module=sync status=error stage=fetch error={reason}");
                self.phase = SyncPhase::Idle;
                self.last_error = Some(reason.clone());
                self.emit(CoreEvent::SyncFailed {
                    reason: reason.clone(),
                });
                return SyncOutcome::Failed { reason };
            }
        };

        let base = store.snapshot();
        let outcome = merge(&base, &remote);
        self.emit(CoreEvent::SyncCompleted {
            merged: outcome.applied,
            conflicts: outcome.conflicts.len(),
        });

        if !outcome.is_clean() {
            let count = outcome.conflicts.len();
            warn!(
                "event=sync_round module=sync status=ok result=conflicts conflicts={count} applied={}",
                outcome.applied
            );
            self.phase = SyncPhase::AwaitingResolution;
            self.pending = Some(PendingMerge { base, outcome });
            return SyncOutcome::ConflictsPending { count };
        }

        let applied = outcome.applied;
        if applied > 0 {
            store.replace_all(outcome.merged);
        }
        let push = self.push_dirty(store);
        self.complete(push);
        info!(
            "event=sync_round module=sync status=ok result=clean applied={applied} pushed={} push_failures={}",
            push.pushed, push.failures
        );

        SyncOutcome::Completed {
            applied,
            pushed: push.pushed,
            push_failures: push.failures,
        }
    }

    /// Resolves every pending conflict with `policy` and commits the full
    /// merged set in one swap.
    ///
    /// Local changes made while awaiting resolution are kept: additions are
    /// appended, newer edits win, deletions stay deleted.
    ///
    /// # Errors
    /// - `NothingToResolve` unless the engine is `AwaitingResolution`.
    pub fn apply_resolution(
        &mut self,
        policy: ResolutionPolicy,
        store: &mut RecordStore,
    ) -> Result<ResolutionReport, SyncError> {
        if self.phase != SyncPhase::AwaitingResolution {
            return Err(SyncError::NothingToResolve { phase: self.phase });
        }
        let Some(pending) = self.pending.take() else {
            self.phase = SyncPhase::Idle;
            return Err(SyncError::NothingToResolve { phase: self.phase });
        };

        let now = self.clock.now_ms();
        let full = apply_resolutions(
            &pending.outcome.merged,
            &pending.outcome.conflicts,
            policy,
            now,
            &self.merge_separator,
        );
        let rebased = rebase(&pending.base, full, &store.snapshot());
        store.replace_all(rebased);

        let resolved = pending.outcome.conflicts.len();
        self.emit(CoreEvent::ConflictsResolved { policy });
        let push = self.push_dirty(store);
        self.complete(push);
        info!(
            "event=sync_resolve module=sync status=ok policy={policy} resolved={resolved} pushed={}",
            push.pushed
        );

        Ok(ResolutionReport {
            policy,
            resolved,
            pushed: push.pushed,
            push_failures: push.failures,
        })
    }

    /// Drops pending conflicts and invalidates any in-flight round.
    pub fn reset(&mut self) {
        self.epoch += 1;
        self.phase = SyncPhase::Idle;
        self.pending = None;
        self.last_error = None;
        self.last_sync_ms = None;
        self.push_watermark_ms = None;
        info!("event=sync_reset module=sync status=ok epoch={}", self.epoch);
    }

    fn run(&mut self, store: &mut RecordStore, trigger: &'static str) -> SyncOutcome {
        let round = match self.begin_round() {
            Ok(round) => round,
            Err(skipped) => {
                debug!("event=sync_round module=sync status=skip trigger={trigger} outcome={skipped:?}");
                return skipped;
            }
        };
        debug!("event=sync_round module=sync status=start trigger={trigger}");
        let fetched = self.transport.fetch_all();
        self.finish_round(round, fetched, store)
    }

    fn complete(&mut self, push: PushReport) {
        self.phase = SyncPhase::Idle;
        self.last_sync_ms = Some(self.clock.now_ms());
        self.last_error = None;
        if push.failures > 0 {
            let reason = format!("{} of {} uploads failed", push.failures, push.pushed + push.failures);
            self.last_error = Some(reason.clone());
            self.emit(CoreEvent::SyncFailed { reason });
        }
    }

    /// Posts local records modified after the watermark.
    ///
    /// The watermark only advances when every post succeeds, so failed
    /// uploads are retried on the next round.
    fn push_dirty(&mut self, store: &RecordStore) -> PushReport {
        let watermark = self.push_watermark_ms;
        let dirty: Vec<Record> = store
            .snapshot()
            .into_iter()
            .filter(|record| record.origin == RecordOrigin::Local)
            .filter(|record| watermark.map_or(true, |mark| record.last_modified > mark))
            .collect();

        let mut report = PushReport::default();
        for record in &dirty {
            match self.transport.post(record) {
                Ok(()) => report.pushed += 1,
                Err(err) => {
                    report.failures += 1;
                    warn!(
                        "event=sync_push module=sync status=error id={} error={err}",
                        record.id
                    );
                }
            }
        }

        if report.failures == 0 {
            if let Some(newest) = dirty.iter().map(|record| record.last_modified).max() {
                self.push_watermark_ms = Some(watermark.map_or(newest, |mark| mark.max(newest)));
            }
        }
        report
    }

    fn emit(&self, event: CoreEvent) {
        self.events.emit(&event);
    }
}

/// Drops malformed remote records and tags the rest as remote-sourced.
fn sanitize_remote(remote: Vec<Record>) -> Vec<Record> {
    let offered = remote.len();
    let kept: Vec<Record> = remote
        .into_iter()
        .filter(Record::has_valid_shape)
        .map(|mut record| {
            record.origin = RecordOrigin::Remote;
            record
        })
        .collect();
    if kept.len() < offered {
        warn!(
            "event=sync_round module=sync status=ok dropped_remote={}",
            offered - kept.len()
        );
    }
    kept
}

/// Replays local changes made after `base` on top of a resolved merge.
fn rebase(base: &[Record], resolved: Vec<Record>, current: &[Record]) -> Vec<Record> {
    let base_by_id: HashMap<&RecordId, &Record> =
        base.iter().map(|record| (&record.id, record)).collect();
    let current_by_id: HashMap<&RecordId, &Record> =
        current.iter().map(|record| (&record.id, record)).collect();

    let mut seen: HashSet<RecordId> = HashSet::new();
    let mut rebased = Vec::with_capacity(resolved.len());
    for record in resolved {
        seen.insert(record.id.clone());
        match (base_by_id.get(&record.id), current_by_id.get(&record.id)) {
            // Deleted locally while awaiting resolution.
            (Some(_), None) => {}
            // Edited locally while awaiting resolution.
            (Some(before), Some(now)) if before != now => rebased.push((*now).clone()),
            _ => rebased.push(record),
        }
    }

    rebased.extend(
        current
            .iter()
            .filter(|record| !base_by_id.contains_key(&record.id) && !seen.contains(&record.id))
            .cloned(),
    );
    rebased
}
