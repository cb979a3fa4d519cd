use quotebook_core::service::interchange::parse_records;
use quotebook_core::sync::engine::{SkipReason, SyncError};
use quotebook_core::sync::merge::merge;
use quotebook_core::sync::transport::TransportResult;
use quotebook_core::{
    CoreConfig, CoreEvent, ManualClock, MemoryEventSink, MemoryStorage, Record, RecordDraft,
    RecordId, RecordOrigin, RecordPatch, RecordStore, RemoteTransport, ResolutionPolicy,
    StoreContext, SyncEngine, SyncOutcome, SyncPhase, TransportError,
};
use serde_json::Map;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Transport replaying queued fetch results and recording posts.
#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<VecDeque<TransportResult<Vec<Record>>>>,
    fetches: AtomicUsize,
    posted: Mutex<Vec<Record>>,
    fail_posts: AtomicBool,
}

impl ScriptedTransport {
    fn respond(&self, result: TransportResult<Vec<Record>>) {
        self.responses.lock().unwrap().push_back(result);
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn take_posted(&self) -> Vec<RecordId> {
        std::mem::take(&mut *self.posted.lock().unwrap())
            .into_iter()
            .map(|record| record.id)
            .collect()
    }

    fn set_fail_posts(&self, fail: bool) {
        self.fail_posts.store(fail, Ordering::SeqCst);
    }
}

impl RemoteTransport for ScriptedTransport {
    fn fetch_all(&self) -> TransportResult<Vec<Record>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn post(&self, record: &Record) -> TransportResult<()> {
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                code: 503,
                body: String::new(),
            });
        }
        self.posted.lock().unwrap().push(record.clone());
        Ok(())
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    events: Arc<MemoryEventSink>,
    store: RecordStore,
    engine: SyncEngine<ScriptedTransport>,
}

impl Harness {
    fn new(local: Vec<Record>) -> Self {
        let clock = Arc::new(ManualClock::new(1_000));
        let events = Arc::new(MemoryEventSink::new());
        let ctx = StoreContext {
            storage: Arc::new(MemoryStorage::new()),
            clock: clock.clone(),
            events: events.clone(),
        };
        let mut store = RecordStore::new(&CoreConfig::default(), ctx);
        store.replace_all(local);
        let engine = SyncEngine::new(
            ScriptedTransport::default(),
            clock.clone(),
            events.clone(),
            " | ",
        );
        Self {
            clock,
            events,
            store,
            engine,
        }
    }

    fn transport(&self) -> &ScriptedTransport {
        self.engine.transport()
    }

    fn tick(&mut self) -> SyncOutcome {
        self.engine.tick(&mut self.store)
    }

    fn resolve(&mut self, policy: ResolutionPolicy) -> Result<(), SyncError> {
        self.engine
            .apply_resolution(policy, &mut self.store)
            .map(|_| ())
    }

    fn text_of(&self, id: &str) -> Option<String> {
        self.store
            .get(&RecordId::from(id))
            .map(|record| record.text.clone())
    }
}

fn record(id: &str, text: &str, last_modified: i64) -> Record {
    Record {
        id: RecordId::from(id),
        text: text.to_string(),
        category: "General".to_string(),
        author: None,
        last_modified,
        origin: RecordOrigin::Local,
        extra: Map::new(),
    }
}

#[test]
fn merge_flags_newer_remote_with_different_content_as_conflict() {
    let outcome = merge(&[record("1", "A", 100)], &[record("1", "B", 200)]);

    assert_eq!(outcome.conflicts.len(), 1);
    assert_eq!(outcome.conflicts[0].id, RecordId::from("1"));
    assert_eq!(outcome.conflicts[0].local.text, "A");
    assert_eq!(outcome.conflicts[0].remote.text, "B");
    assert!(outcome.merged.is_empty());
    assert_eq!(outcome.applied, 0);
}

#[test]
fn merge_keeps_newer_local_silently() {
    let local = vec![record("1", "A", 200)];
    let outcome = merge(&local, &[record("1", "B", 100)]);

    assert!(outcome.is_clean());
    assert_eq!(outcome.merged, local);
}

#[test]
fn merge_keeps_local_on_equal_timestamps() {
    let local = vec![record("1", "A", 100)];
    let outcome = merge(&local, &[record("1", "B", 100)]);

    assert!(outcome.is_clean());
    assert_eq!(outcome.merged, local);
}

#[test]
fn merge_appends_remote_addition_verbatim() {
    let local = vec![record("1", "A", 100)];
    let mut addition = record("2", "B", 50);
    addition.author = Some("Remote author".to_string());
    addition
        .extra
        .insert("userId".to_string(), serde_json::json!(7));

    let outcome = merge(&local, &[addition.clone()]);

    assert!(outcome.is_clean());
    assert_eq!(outcome.merged, vec![local[0].clone(), addition]);
    assert_eq!(outcome.applied, 1);
}

#[test]
fn merge_adopts_same_content_with_other_timestamp() {
    let outcome = merge(&[record("1", "A", 100)], &[record("1", "A", 300)]);

    assert!(outcome.is_clean());
    assert_eq!(outcome.merged[0].last_modified, 300);
    assert_eq!(outcome.applied, 1);
}

#[test]
fn merge_is_deterministic() {
    let local = vec![record("1", "A", 100), record("2", "B", 100), record("3", "C", 400)];
    let remote = vec![
        record("4", "D", 1),
        record("2", "B2", 300),
        record("3", "C2", 300),
        record("1", "A", 500),
    ];

    let first = merge(&local, &remote);
    let second = merge(&local, &remote);
    assert_eq!(first, second);
}

#[test]
fn clean_round_commits_remote_additions() {
    let mut harness = Harness::new(vec![record("1", "A", 100)]);
    harness
        .transport()
        .respond(Ok(vec![record("1", "A", 100), record("2", "B", 150)]));

    let outcome = harness.tick();

    assert_eq!(
        outcome,
        SyncOutcome::Completed {
            applied: 1,
            pushed: 1,
            push_failures: 0
        }
    );
    assert_eq!(harness.store.len(), 2);
    let added = harness.store.get(&RecordId::from("2")).unwrap();
    assert_eq!(added.origin, RecordOrigin::Remote);
    assert_eq!(harness.transport().take_posted(), vec![RecordId::from("1")]);

    let state = harness.engine.state();
    assert_eq!(state.phase, SyncPhase::Idle);
    assert_eq!(state.last_sync_timestamp, Some(1_000));
    assert_eq!(state.last_error, None);
    assert_eq!(
        harness.events.drain(),
        vec![
            CoreEvent::SyncStarted,
            CoreEvent::SyncCompleted {
                merged: 1,
                conflicts: 0
            },
        ]
    );
}

#[test]
fn remote_records_failing_shape_check_are_dropped() {
    let mut harness = Harness::new(Vec::new());
    harness
        .transport()
        .respond(Ok(vec![record("1", "  ", 10), record("2", "Valid", 10)]));

    harness.tick();

    assert_eq!(harness.store.len(), 1);
    assert!(harness.store.get(&RecordId::from("2")).is_some());
}

#[test]
fn conflicts_are_held_until_resolution() {
    let mut harness = Harness::new(vec![record("1", "A", 100), record("5", "E", 100)]);
    harness.transport().respond(Ok(vec![
        record("1", "B", 200),
        record("7", "New remote", 10),
    ]));

    let outcome = harness.tick();

    assert_eq!(outcome, SyncOutcome::ConflictsPending { count: 1 });
    assert_eq!(harness.engine.phase(), SyncPhase::AwaitingResolution);
    assert_eq!(harness.engine.pending_conflicts().len(), 1);
    assert_eq!(harness.text_of("1").as_deref(), Some("A"));
    assert_eq!(harness.store.len(), 2);
    assert!(harness.transport().take_posted().is_empty());

    let deferred = harness.tick();
    assert_eq!(
        deferred,
        SyncOutcome::Skipped(SkipReason::AwaitingResolution)
    );
    assert_eq!(harness.transport().fetch_count(), 1);
    assert_eq!(harness.engine.pending_conflicts().len(), 1);
}

#[test]
fn server_policy_adopts_remote_fields() {
    let mut harness = Harness::new(vec![record("1", "A", 100)]);
    let mut remote = record("1", "B", 200);
    remote.author = Some("Server".to_string());
    harness.transport().respond(Ok(vec![remote]));
    harness.tick();
    harness.events.drain();

    harness.resolve(ResolutionPolicy::Server).unwrap();

    let resolved = harness.store.get(&RecordId::from("1")).unwrap();
    assert_eq!(resolved.text, "B");
    assert_eq!(resolved.author.as_deref(), Some("Server"));
    assert_eq!(resolved.last_modified, 200);
    assert_eq!(resolved.origin, RecordOrigin::Remote);
    assert!(harness.engine.pending_conflicts().is_empty());
    assert_eq!(harness.engine.phase(), SyncPhase::Idle);
    assert!(harness.transport().take_posted().is_empty());
    assert_eq!(
        harness.events.drain(),
        vec![CoreEvent::ConflictsResolved {
            policy: ResolutionPolicy::Server
        }]
    );
}

#[test]
fn merge_policy_concatenates_text() {
    let mut harness = Harness::new(vec![record("1", "A", 100)]);
    harness.transport().respond(Ok(vec![record("1", "B", 200)]));
    harness.tick();
    harness.clock.set(5_000);

    harness.resolve(ResolutionPolicy::Merge).unwrap();

    let resolved = harness.store.get(&RecordId::from("1")).unwrap();
    assert_eq!(resolved.text, "A | B");
    assert_eq!(resolved.category, "General");
    assert_eq!(resolved.last_modified, 5_000);
    assert_eq!(resolved.origin, RecordOrigin::Local);
    assert_eq!(harness.transport().take_posted(), vec![RecordId::from("1")]);
}

#[test]
fn local_policy_keeps_local_and_refreshes_timestamp() {
    let mut harness = Harness::new(vec![record("1", "A", 100)]);
    harness.transport().respond(Ok(vec![record("1", "B", 200)]));
    harness.tick();
    harness.clock.set(5_000);

    harness.resolve(ResolutionPolicy::Local).unwrap();

    let resolved = harness.store.get(&RecordId::from("1")).unwrap();
    assert_eq!(resolved.text, "A");
    assert_eq!(resolved.last_modified, 5_000);

    // The refreshed local version now wins the next round.
    harness.transport().respond(Ok(vec![record("1", "B", 200)]));
    assert!(matches!(harness.tick(), SyncOutcome::Completed { .. }));
    assert_eq!(harness.text_of("1").as_deref(), Some("A"));
}

#[test]
fn resolution_keeps_local_changes_made_while_awaiting() {
    let mut harness = Harness::new(vec![record("1", "A", 100), record("2", "Doomed", 100)]);
    harness.transport().respond(Ok(vec![
        record("1", "B", 200),
        record("9", "Remote addition", 10),
    ]));
    harness.tick();

    let added = harness
        .store
        .add(RecordDraft::new("Written meanwhile", "Life"))
        .unwrap();
    harness.store.delete(&RecordId::from("2")).unwrap();

    harness.resolve(ResolutionPolicy::Server).unwrap();

    let texts: Vec<_> = harness
        .store
        .list(None)
        .into_iter()
        .map(|record| record.text)
        .collect();
    assert_eq!(texts, vec!["B", "Remote addition", "Written meanwhile"]);
    assert!(harness.store.get(&added.id).is_some());
}

#[test]
fn resolution_prefers_edit_made_while_awaiting() {
    let mut harness = Harness::new(vec![record("1", "A", 100)]);
    harness.transport().respond(Ok(vec![record("1", "B", 200)]));
    harness.tick();

    harness.clock.set(9_000);
    harness
        .store
        .update(
            &RecordId::from("1"),
            RecordPatch {
                text: Some("A edited".to_string()),
                ..RecordPatch::default()
            },
        )
        .unwrap();

    harness.resolve(ResolutionPolicy::Server).unwrap();
    assert_eq!(harness.text_of("1").as_deref(), Some("A edited"));
}

#[test]
fn apply_resolution_without_pending_conflicts_fails() {
    let mut harness = Harness::new(vec![record("1", "A", 100)]);

    let err = harness.resolve(ResolutionPolicy::Merge).unwrap_err();
    assert_eq!(
        err,
        SyncError::NothingToResolve {
            phase: SyncPhase::Idle
        }
    );
}

#[test]
fn fetch_failure_reports_and_leaves_store_untouched() {
    let mut harness = Harness::new(vec![record("1", "A", 100)]);
    let before = harness.store.snapshot();
    harness
        .transport()
        .respond(Err(TransportError::Network("connection refused".to_string())));

    let outcome = harness.tick();

    let SyncOutcome::Failed { reason } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(reason.contains("connection refused"));
    assert_eq!(harness.store.snapshot(), before);
    let state = harness.engine.state();
    assert_eq!(state.phase, SyncPhase::Idle);
    assert_eq!(state.last_sync_timestamp, None);
    assert_eq!(state.last_error.as_deref(), Some(reason.as_str()));
    assert!(harness
        .events
        .drain()
        .contains(&CoreEvent::SyncFailed { reason }));

    // The next tick retries.
    harness.transport().respond(Ok(vec![record("2", "B", 1)]));
    assert!(matches!(harness.tick(), SyncOutcome::Completed { .. }));
    assert_eq!(harness.store.len(), 2);
    assert_eq!(harness.engine.state().last_error, None);
}

#[test]
fn offline_short_circuits_without_fetch() {
    let mut harness = Harness::new(Vec::new());
    harness.engine.set_online(false);

    assert_eq!(harness.tick(), SyncOutcome::Offline);
    assert_eq!(harness.engine.force_sync(&mut harness.store), SyncOutcome::Offline);
    assert_eq!(harness.transport().fetch_count(), 0);
    assert!(!harness.engine.state().online);

    harness.engine.set_online(true);
    assert!(matches!(harness.tick(), SyncOutcome::Completed { .. }));
    assert_eq!(harness.transport().fetch_count(), 1);
}

#[test]
fn tick_while_syncing_is_a_no_op() {
    let mut harness = Harness::new(Vec::new());
    let round = harness.engine.begin_round().unwrap();
    assert_eq!(harness.engine.phase(), SyncPhase::Syncing);

    assert_eq!(harness.tick(), SyncOutcome::Skipped(SkipReason::InFlight));
    assert_eq!(
        harness.engine.force_sync(&mut harness.store),
        SyncOutcome::Skipped(SkipReason::InFlight)
    );
    assert_eq!(harness.transport().fetch_count(), 0);

    let outcome = harness
        .engine
        .finish_round(round, Ok(vec![record("1", "A", 1)]), &mut harness.store);
    assert!(matches!(outcome, SyncOutcome::Completed { applied: 1, .. }));
    assert_eq!(harness.engine.phase(), SyncPhase::Idle);
}

#[test]
fn round_started_before_reset_is_discarded() {
    let mut harness = Harness::new(vec![record("1", "A", 100)]);
    let round = harness.engine.begin_round().unwrap();

    harness.engine.reset();
    let outcome = harness
        .engine
        .finish_round(round, Ok(vec![record("2", "B", 1)]), &mut harness.store);

    assert_eq!(outcome, SyncOutcome::Discarded);
    assert_eq!(harness.store.len(), 1);
    assert_eq!(harness.engine.phase(), SyncPhase::Idle);
}

#[test]
fn reset_drops_pending_conflicts() {
    let mut harness = Harness::new(vec![record("1", "A", 100)]);
    harness.transport().respond(Ok(vec![record("1", "B", 200)]));
    harness.tick();

    harness.engine.reset();

    assert_eq!(harness.engine.phase(), SyncPhase::Idle);
    assert!(harness.engine.pending_conflicts().is_empty());
    assert_eq!(harness.text_of("1").as_deref(), Some("A"));
}

#[test]
fn push_watermark_only_sends_new_local_changes() {
    let mut harness = Harness::new(vec![record("1", "A", 100), record("2", "B", 200)]);

    harness.tick();
    let mut first = harness.transport().take_posted();
    first.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(first, vec![RecordId::from("1"), RecordId::from("2")]);

    harness.tick();
    assert!(harness.transport().take_posted().is_empty());

    harness.clock.set(2_000);
    let added = harness
        .store
        .add(RecordDraft::new("Fresh", "Life"))
        .unwrap();
    harness.tick();
    assert_eq!(harness.transport().take_posted(), vec![added.id]);
}

#[test]
fn failed_pushes_are_retried_next_round() {
    let mut harness = Harness::new(vec![record("1", "A", 100)]);
    harness.transport().set_fail_posts(true);

    let outcome = harness.tick();

    assert_eq!(
        outcome,
        SyncOutcome::Completed {
            applied: 0,
            pushed: 0,
            push_failures: 1
        }
    );
    assert!(harness.engine.state().last_error.is_some());
    assert!(harness
        .events
        .drain()
        .iter()
        .any(|event| matches!(event, CoreEvent::SyncFailed { .. })));

    harness.transport().set_fail_posts(false);
    harness.tick();
    assert_eq!(harness.transport().take_posted(), vec![RecordId::from("1")]);
}

#[test]
fn remote_sourced_records_are_not_pushed_back() {
    let mut harness = Harness::new(Vec::new());
    harness.transport().respond(Ok(vec![record("1", "A", 100)]));

    harness.tick();

    assert!(harness.transport().take_posted().is_empty());
}

#[test]
fn edited_remote_record_is_pushed_as_local_change() {
    let mut harness = Harness::new(Vec::new());
    harness.transport().respond(Ok(vec![record("1", "A", 100)]));
    harness.tick();
    assert!(harness.transport().take_posted().is_empty());

    harness.clock.set(5_000);
    let edited = harness
        .store
        .update(
            &RecordId::from("1"),
            RecordPatch {
                text: Some("A edited".to_string()),
                ..RecordPatch::default()
            },
        )
        .unwrap();
    assert_eq!(edited.origin, RecordOrigin::Local);
    assert_eq!(edited.last_modified, 5_000);

    let outcome = harness.tick();

    assert_eq!(
        outcome,
        SyncOutcome::Completed {
            applied: 0,
            pushed: 1,
            push_failures: 0
        }
    );
    assert_eq!(harness.transport().take_posted(), vec![RecordId::from("1")]);
}

#[test]
fn imported_records_older_than_watermark_are_still_pushed() {
    let mut harness = Harness::new(vec![record("1", "A", 500)]);
    harness.tick();
    assert_eq!(harness.transport().take_posted(), vec![RecordId::from("1")]);

    harness.clock.set(3_000);
    let batch = parse_records(
        br#"[{"id":"imp","text":"Imported","category":"Books","lastModified":10}]"#,
        3_000,
    )
    .unwrap();
    harness.store.import(batch).unwrap();
    harness.tick();

    assert_eq!(harness.transport().take_posted(), vec![RecordId::from("imp")]);
}
