//! Viewer session state: preferences, last viewed record and counters.
//!
//! # Responsibility
//! - Persist the last selected category filter in durable storage.
//! - Track the last viewed record and view/add counters in session storage.
//!
//! # Invariants
//! - Read failures fall back to defaults and are logged, never surfaced.
//! - Write failures are logged and never affect in-memory state.

use crate::config::StorageKeys;
use crate::model::record::Record;
use crate::persistence::{load_json, save_json, PersistenceAdapter};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Durable viewer preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub last_category: Option<String>,
    #[serde(default)]
    pub last_updated: i64,
}

/// Per-session usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    #[serde(default, alias = "quotesViewed")]
    pub records_viewed: u64,
    #[serde(default, alias = "quotesAdded")]
    pub records_added: u64,
    #[serde(default)]
    pub session_start: i64,
}

/// Session-level viewer state over durable and session adapters.
pub struct SessionState {
    durable: Arc<dyn PersistenceAdapter>,
    session: Arc<dyn PersistenceAdapter>,
    keys: StorageKeys,
    preferences: Preferences,
    stats: SessionStats,
    last_viewed: Option<Record>,
}

impl SessionState {
    /// Loads preferences, counters and last viewed record.
    ///
    /// A fresh session starts its counters at `now_ms`.
    pub fn load(
        durable: Arc<dyn PersistenceAdapter>,
        session: Arc<dyn PersistenceAdapter>,
        keys: StorageKeys,
        now_ms: i64,
    ) -> Self {
        let preferences = read_or_default::<Preferences>(durable.as_ref(), &keys.preferences)
            .unwrap_or_default();
        let stats = read_or_default::<SessionStats>(session.as_ref(), &keys.session_stats)
            .unwrap_or(SessionStats {
                session_start: now_ms,
                ..SessionStats::default()
            });
        let last_viewed = read_or_default::<Record>(session.as_ref(), &keys.last_quote);

        debug!(
            "event=session_load module=session status=ok has_filter={} has_last_viewed={}",
            preferences.last_category.is_some(),
            last_viewed.is_some()
        );

        Self {
            durable,
            session,
            keys,
            preferences,
            stats,
            last_viewed,
        }
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn last_viewed(&self) -> Option<&Record> {
        self.last_viewed.as_ref()
    }

    /// Returns the remembered filter, if any.
    pub fn selected_filter(&self) -> Option<&str> {
        self.preferences.last_category.as_deref()
    }

    /// Remembers the selected filter durably; `None` selects all.
    pub fn select_filter(&mut self, category: Option<&str>, now_ms: i64) {
        self.preferences.last_category = category
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        self.preferences.last_updated = now_ms;
        write_logged(self.durable.as_ref(), &self.keys.preferences, &self.preferences);
    }

    /// Records that `record` was shown to the viewer.
    pub fn record_view(&mut self, record: &Record) {
        self.stats.records_viewed += 1;
        self.last_viewed = Some(record.clone());
        write_logged(self.session.as_ref(), &self.keys.last_quote, record);
        self.save();
    }

    /// Records that the viewer added a record.
    pub fn record_added(&mut self) {
        self.stats.records_added += 1;
        self.save();
    }

    /// Flushes session counters.
    pub fn save(&self) {
        write_logged(self.session.as_ref(), &self.keys.session_stats, &self.stats);
    }

    /// Flushes everything, including durable preferences.
    pub fn flush(&self) {
        self.save();
        write_logged(self.durable.as_ref(), &self.keys.preferences, &self.preferences);
    }

    /// Drops all session and preference keys and resets counters.
    pub fn clear(&mut self, now_ms: i64) {
        for (adapter, key) in [
            (self.durable.as_ref(), self.keys.preferences.as_str()),
            (self.session.as_ref(), self.keys.session_stats.as_str()),
            (self.session.as_ref(), self.keys.last_quote.as_str()),
        ] {
            if let Err(err) = adapter.remove(key) {
                warn!("event=session_clear module=session status=error key={key} error={err}");
            }
        }
        self.preferences = Preferences::default();
        self.stats = SessionStats {
            session_start: now_ms,
            ..SessionStats::default()
        };
        self.last_viewed = None;
    }
}

fn read_or_default<T: serde::de::DeserializeOwned>(
    adapter: &dyn PersistenceAdapter,
    key: &str,
) -> Option<T> {
    match load_json::<T>(adapter, key) {
        Ok(value) => value,
        Err(err) => {
            warn!("event=session_read module=session status=error key={key} error={err}");
            None
        }
    }
}

fn write_logged<T: Serialize + ?Sized>(adapter: &dyn PersistenceAdapter, key: &str, value: &T) {
    if let Err(err) = save_json(adapter, key, value) {
        warn!("event=session_write module=session status=error key={key} error={err}");
    }
}
