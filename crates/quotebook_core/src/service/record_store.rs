//! Authoritative in-memory record collection.
//!
//! # Responsibility
//! - Own every `Record` and expose CRUD, filtering and random selection.
//! - Persist the full snapshot after each mutation (fire-and-forget).
//! - Emit `CoreEvent`s for UI subscribers.
//!
//! # Invariants
//! - `id` values are unique within the collection.
//! - Failed operations leave the collection unchanged.
//! - Persistence failures never roll back in-memory mutations.
//! - Collection order is insertion order.

use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::events::{CoreEvent, EventSink};
use crate::model::defaults::default_records;
use crate::model::record::{
    dedup_key, Record, RecordDraft, RecordId, RecordLimits, RecordOrigin, RecordPatch,
    RecordValidationError,
};
use crate::persistence::{save_json, PersistenceAdapter};
use crate::service::interchange::{parse_records, ParsedBatch};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Filter value that selects every category.
pub const ALL_CATEGORIES: &str = "all";

pub type StoreResult<T> = Result<T, StoreError>;

/// Record store operation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    ValidationFailed(RecordValidationError),
    DuplicateRecord { existing: RecordId },
    NotFound(RecordId),
    EmptyResult { filter: Option<String> },
    /// Import input is not a sequence, or no element passed the shape check.
    ImportMalformed { reason: String, rejected: usize },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ValidationFailed(err) => write!(f, "{err}"),
            Self::DuplicateRecord { existing } => {
                write!(f, "quote already exists: {existing}")
            }
            Self::NotFound(id) => write!(f, "quote not found: {id}"),
            Self::EmptyResult { filter: Some(filter) } => {
                write!(f, "no quotes available in category `{filter}`")
            }
            Self::EmptyResult { filter: None } => write!(f, "no quotes available"),
            Self::ImportMalformed { reason, rejected } => {
                write!(f, "import rejected ({rejected} invalid entries): {reason}")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ValidationFailed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RecordValidationError> for StoreError {
    fn from(value: RecordValidationError) -> Self {
        Self::ValidationFailed(value)
    }
}

/// Outcome of an atomic collection swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceReport {
    pub kept: usize,
    /// Records dropped by the shape check or as duplicate ids.
    pub dropped: usize,
}

/// Outcome of an append-style import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub accepted: usize,
    pub rejected: usize,
}

/// Where the startup collection came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadReport {
    Stored { kept: usize, dropped: usize },
    Defaults,
    /// Stored data was unreadable; defaults were used instead.
    DefaultsAfterError { reason: String },
}

/// Collaborators shared by the store.
#[derive(Clone)]
pub struct StoreContext {
    pub storage: Arc<dyn PersistenceAdapter>,
    pub clock: Arc<dyn Clock>,
    pub events: Arc<dyn EventSink>,
}

/// In-memory record collection with write-through persistence.
pub struct RecordStore {
    records: Vec<Record>,
    limits: RecordLimits,
    snapshot_key: String,
    ctx: StoreContext,
    rng: StdRng,
    last_pick: Option<RecordId>,
}

impl RecordStore {
    /// Creates an empty store without touching storage.
    pub fn new(config: &CoreConfig, ctx: StoreContext) -> Self {
        Self {
            records: Vec::new(),
            limits: config.limits(),
            snapshot_key: config.storage_keys().quotes,
            ctx,
            rng: StdRng::from_entropy(),
            last_pick: None,
        }
    }

    /// Creates a store populated from durable storage.
    ///
    /// Falls back to the built-in quote set when nothing is stored or the
    /// stored snapshot cannot be decoded.
    pub fn open(config: &CoreConfig, ctx: StoreContext) -> (Self, LoadReport) {
        let mut store = Self::new(config, ctx);
        let report = store.load();
        (store, report)
    }

    /// Replaces the random source with a seeded one.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn limits(&self) -> RecordLimits {
        self.limits
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.iter().find(|record| &record.id == id)
    }

    /// Validates and appends a new local record.
    ///
    /// # Errors
    /// - `ValidationFailed` for empty, too short or too long fields.
    /// - `DuplicateRecord` when the text already exists (case-insensitive).
    pub fn add(&mut self, draft: RecordDraft) -> StoreResult<Record> {
        let normalized = draft.normalize(&self.limits)?;
        if let Some(existing) = self.find_duplicate(&normalized.text, None) {
            return Err(StoreError::DuplicateRecord {
                existing: existing.clone(),
            });
        }

        let record = Record::from_draft(RecordId::generate(), normalized, self.ctx.clock.now_ms());
        self.records.push(record.clone());
        info!(
            "event=record_add module=store status=ok id={} total={}",
            record.id,
            self.records.len()
        );

        self.persist();
        self.emit(CoreEvent::RecordAdded {
            id: record.id.clone(),
        });
        Ok(record)
    }

    /// Overwrites the given fields, bumps `last_modified` and marks the
    /// record as locally changed.
    ///
    /// # Errors
    /// - `NotFound` when `id` is absent.
    /// - `ValidationFailed` / `DuplicateRecord` as for `add`.
    pub fn update(&mut self, id: &RecordId, patch: RecordPatch) -> StoreResult<Record> {
        let index = self.position(id)?;
        let normalized = patch.apply_to(&self.records[index], &self.limits)?;
        if let Some(existing) = self.find_duplicate(&normalized.text, Some(id)) {
            return Err(StoreError::DuplicateRecord {
                existing: existing.clone(),
            });
        }

        let now = self.ctx.clock.now_ms();
        let record = &mut self.records[index];
        record.text = normalized.text;
        record.category = normalized.category;
        record.author = normalized.author;
        record.last_modified = now.max(record.last_modified);
        record.origin = RecordOrigin::Local;
        let updated = record.clone();
        debug!("event=record_update module=store status=ok id={id}");

        self.persist();
        self.emit(CoreEvent::RecordUpdated { id: id.clone() });
        Ok(updated)
    }

    /// Removes one record.
    pub fn delete(&mut self, id: &RecordId) -> StoreResult<Record> {
        let index = self.position(id)?;
        let removed = self.records.remove(index);
        if self.last_pick.as_ref() == Some(id) {
            self.last_pick = None;
        }
        info!(
            "event=record_delete module=store status=ok id={id} total={}",
            self.records.len()
        );

        self.persist();
        self.emit(CoreEvent::RecordDeleted { id: id.clone() });
        Ok(removed)
    }

    /// Returns records matching `filter` in insertion order.
    ///
    /// `None` and `"all"` select every record.
    pub fn list(&self, filter: Option<&str>) -> Vec<Record> {
        match normalize_filter(filter) {
            Some(category) => self
                .records
                .iter()
                .filter(|record| record.in_category(&category))
                .cloned()
                .collect(),
            None => self.records.clone(),
        }
    }

    /// Like `list`, stably sorted by case-insensitive category for display.
    pub fn list_sorted_by_category(&self, filter: Option<&str>) -> Vec<Record> {
        let mut records = self.list(filter);
        records.sort_by_cached_key(|record| record.category.to_lowercase());
        records
    }

    /// Returns distinct categories in stored casing, sorted for display.
    ///
    /// Categories differing only by case collapse to the first-seen casing.
    pub fn categories(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut categories: Vec<String> = self
            .records
            .iter()
            .filter(|record| seen.insert(record.category.to_lowercase()))
            .map(|record| record.category.clone())
            .collect();
        categories.sort_by_key(|category| category.to_lowercase());
        categories
    }

    /// Picks one record uniformly from the filtered set.
    ///
    /// When the set has more than one member and the pick repeats the
    /// previous one, rolls once more.
    pub fn pick_random(&mut self, filter: Option<&str>) -> StoreResult<Record> {
        let filter = normalize_filter(filter);
        let candidates: Vec<usize> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| {
                filter
                    .as_deref()
                    .map_or(true, |category| record.in_category(category))
            })
            .map(|(index, _)| index)
            .collect();

        if candidates.is_empty() {
            return Err(StoreError::EmptyResult { filter });
        }

        let mut chosen = candidates[self.rng.gen_range(0..candidates.len())];
        if candidates.len() > 1 && self.last_pick.as_ref() == Some(&self.records[chosen].id) {
            chosen = candidates[self.rng.gen_range(0..candidates.len())];
        }

        let record = self.records[chosen].clone();
        self.last_pick = Some(record.id.clone());
        Ok(record)
    }

    /// Returns an immutable copy of the full collection.
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.clone()
    }

    /// Atomically swaps the whole collection.
    ///
    /// Only the structural shape is checked; failing records and repeated
    /// ids are dropped and counted.
    pub fn replace_all(&mut self, records: Vec<Record>) -> ReplaceReport {
        let offered = records.len();
        let mut ids = HashSet::new();
        let kept: Vec<Record> = records
            .into_iter()
            .filter(|record| record.has_valid_shape() && ids.insert(record.id.clone()))
            .collect();

        let report = ReplaceReport {
            kept: kept.len(),
            dropped: offered - kept.len(),
        };
        self.records = kept;
        if let Some(last) = &self.last_pick {
            if self.get(last).is_none() {
                self.last_pick = None;
            }
        }
        if report.dropped > 0 {
            warn!(
                "event=records_replace module=store status=ok kept={} dropped={}",
                report.kept, report.dropped
            );
        } else {
            info!(
                "event=records_replace module=store status=ok kept={}",
                report.kept
            );
        }

        self.persist();
        report
    }

    /// Appends decoded records to the collection.
    ///
    /// Records duplicating existing text are rejected; records whose id is
    /// already taken receive a fresh id. Accepted records count as local
    /// changes stamped no earlier than now.
    ///
    /// # Errors
    /// - `ImportMalformed` when no element has a valid shape.
    pub fn import(&mut self, batch: ParsedBatch) -> StoreResult<ImportReport> {
        let now = self.ctx.clock.now_ms();
        let mut rejected = batch.rejected;
        let mut well_formed = 0usize;
        let mut ids: HashSet<RecordId> = self.records.iter().map(|r| r.id.clone()).collect();
        let mut texts: HashSet<String> = self.records.iter().map(Record::dedup_key).collect();
        let mut accepted = Vec::new();

        for mut record in batch.records {
            if !record.has_valid_shape() {
                rejected += 1;
                continue;
            }
            well_formed += 1;
            if !texts.insert(record.dedup_key()) {
                rejected += 1;
                continue;
            }
            record.text = record.text.trim().to_string();
            record.category = record.category.trim().to_string();
            record.last_modified = now.max(record.last_modified);
            record.origin = RecordOrigin::Local;
            if !ids.insert(record.id.clone()) {
                record.id = RecordId::generate();
                ids.insert(record.id.clone());
            }
            accepted.push(record);
        }

        if well_formed == 0 {
            warn!("event=records_import module=store status=error accepted=0 rejected={rejected}");
            return Err(StoreError::ImportMalformed {
                reason: "no valid quotes found".to_string(),
                rejected,
            });
        }

        let report = ImportReport {
            accepted: accepted.len(),
            rejected,
        };
        self.records.extend(accepted);
        info!(
            "event=records_import module=store status=ok accepted={} rejected={}",
            report.accepted, report.rejected
        );

        self.persist();
        self.emit(CoreEvent::RecordsImported {
            accepted: report.accepted,
            rejected: report.rejected,
        });
        Ok(report)
    }

    /// Removes every record and the persisted snapshot.
    pub fn clear(&mut self) {
        self.records.clear();
        self.last_pick = None;
        if let Err(err) = self.ctx.storage.remove(&self.snapshot_key) {
            self.report_persist_error(err.to_string());
        }
        info!("event=records_clear module=store status=ok");
    }

    fn load(&mut self) -> LoadReport {
        let now = self.ctx.clock.now_ms();
        let stored = match self.ctx.storage.get(&self.snapshot_key) {
            Ok(stored) => stored,
            Err(err) => return self.fall_back_to_defaults(now, err.to_string()),
        };

        let Some(bytes) = stored else {
            self.replace_all(default_records(now));
            info!("event=records_load module=store status=ok source=defaults");
            return LoadReport::Defaults;
        };

        match parse_records(&bytes, now) {
            Ok(batch) => {
                let rejected = batch.rejected;
                let report = self.replace_all(batch.records);
                info!(
                    "event=records_load module=store status=ok source=storage kept={}",
                    report.kept
                );
                LoadReport::Stored {
                    kept: report.kept,
                    dropped: report.dropped + rejected,
                }
            }
            Err(err) => self.fall_back_to_defaults(now, err.to_string()),
        }
    }

    fn fall_back_to_defaults(&mut self, now: i64, reason: String) -> LoadReport {
        error!("event=records_load module=store status=error source=storage error={reason}");
        self.replace_all(default_records(now));
        LoadReport::DefaultsAfterError { reason }
    }

    fn position(&self, id: &RecordId) -> StoreResult<usize> {
        self.records
            .iter()
            .position(|record| &record.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn find_duplicate(&self, text: &str, exclude: Option<&RecordId>) -> Option<&RecordId> {
        let key = dedup_key(text);
        self.records
            .iter()
            .filter(|record| Some(&record.id) != exclude)
            .find(|record| record.dedup_key() == key)
            .map(|record| &record.id)
    }

    fn persist(&self) {
        if let Err(err) = save_json(self.ctx.storage.as_ref(), &self.snapshot_key, &self.records) {
            self.report_persist_error(err.to_string());
        }
    }

    fn report_persist_error(&self, reason: String) {
        error!(
            "event=records_persist module=store status=error key={} error={reason}",
            self.snapshot_key
        );
        self.emit(CoreEvent::PersistFailed {
            key: self.snapshot_key.clone(),
            reason,
        });
    }

    fn emit(&self, event: CoreEvent) {
        self.ctx.events.emit(&event);
    }
}

fn normalize_filter(filter: Option<&str>) -> Option<String> {
    filter
        .map(str::trim)
        .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case(ALL_CATEGORIES))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::normalize_filter;

    #[test]
    fn normalize_filter_treats_all_and_blank_as_unfiltered() {
        assert_eq!(normalize_filter(None), None);
        assert_eq!(normalize_filter(Some("  ")), None);
        assert_eq!(normalize_filter(Some("ALL")), None);
        assert_eq!(normalize_filter(Some(" Life ")), Some("Life".to_string()));
    }
}
