//! Deterministic reconciliation of local and remote record collections.
//!
//! # Responsibility
//! - Join local and remote records by id and classify each pair.
//! - Produce resolved records for conflicts under a caller-chosen policy.
//!
//! # Invariants
//! - Same inputs always yield the same `MergeOutcome`.
//! - A local record is only replaced by a remote version that has the same
//!   content, or by an explicit resolution.
//! - Equal timestamps with differing content keep the local version.
//!
//! # Algorithm
//! For each remote record `r`:
//! 1. no local record with `r.id`: append `r` (pure addition).
//! 2. same content as local `l`: adopt `r` when its timestamp or extra
//!    fields differ (refresh); otherwise keep `l`.
//! 3. `l.last_modified >= r.last_modified`: keep `l` silently.
//! 4. otherwise: conflict; neither side is applied.
//!
//! Local records without a remote counterpart are kept unchanged. Remote
//! records are taken verbatim; callers stamp their origin beforehand.

use crate::model::record::{Record, RecordId, RecordOrigin};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Rule applied uniformly to a batch of pending conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Adopt the remote version.
    Server,
    /// Keep the local version and stamp it as current.
    Local,
    /// Concatenate local and remote text into a new local version.
    Merge,
}

impl ResolutionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Local => "local",
            Self::Merge => "merge",
        }
    }
}

impl Display for ResolutionPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "server" | "remote" => Ok(Self::Server),
            "local" => Ok(Self::Local),
            "merge" => Ok(Self::Merge),
            other => Err(format!(
                "unsupported resolution policy `{other}`; expected server|local|merge"
            )),
        }
    }
}

/// Same-id divergence that timestamps alone cannot settle.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub id: RecordId,
    pub local: Record,
    pub remote: Record,
    /// Index the resolved record takes in the full merged sequence.
    pub position: usize,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Every non-conflicted record, in merged order.
    pub merged: Vec<Record>,
    pub conflicts: Vec<Conflict>,
    /// Remote additions plus timestamp refreshes taken from remote.
    pub applied: usize,
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

enum Slot {
    Settled(Record),
    Conflicted(usize),
}

/// Reconciles `local` against `remote`.
///
/// Output order is local order with in-place replacements, followed by
/// remote additions in remote order. Repeated remote ids keep their first
/// occurrence.
pub fn merge(local: &[Record], remote: &[Record]) -> MergeOutcome {
    let local_index: HashMap<&RecordId, usize> = local
        .iter()
        .enumerate()
        .map(|(index, record)| (&record.id, index))
        .collect();

    let mut slots: Vec<Slot> = local.iter().cloned().map(Slot::Settled).collect();
    let mut conflicts = Vec::new();
    let mut seen_remote = HashSet::new();
    let mut applied = 0;

    for remote_record in remote {
        if !seen_remote.insert(&remote_record.id) {
            continue;
        }

        let Some(&index) = local_index.get(&remote_record.id) else {
            slots.push(Slot::Settled(remote_record.clone()));
            applied += 1;
            continue;
        };

        let local_record = &local[index];
        if local_record.same_content(remote_record) {
            if local_record.last_modified != remote_record.last_modified
                || local_record.extra != remote_record.extra
            {
                applied += 1;
                slots[index] = Slot::Settled(remote_record.clone());
            }
        } else if local_record.last_modified >= remote_record.last_modified {
            // Local is at least as recent.
        } else {
            slots[index] = Slot::Conflicted(conflicts.len());
            conflicts.push(Conflict {
                id: remote_record.id.clone(),
                local: local_record.clone(),
                remote: remote_record.clone(),
                position: 0,
            });
        }
    }

    let mut merged = Vec::with_capacity(slots.len());
    for (position, slot) in slots.into_iter().enumerate() {
        match slot {
            Slot::Settled(record) => merged.push(record),
            Slot::Conflicted(conflict_index) => conflicts[conflict_index].position = position,
        }
    }
    conflicts.sort_by_key(|conflict| conflict.position);

    MergeOutcome {
        merged,
        conflicts,
        applied,
    }
}

/// Produces the record that replaces one conflict under `policy`.
pub fn resolve(
    conflict: &Conflict,
    policy: ResolutionPolicy,
    now_ms: i64,
    separator: &str,
) -> Record {
    match policy {
        ResolutionPolicy::Server => conflict.remote.clone(),
        ResolutionPolicy::Local => {
            let mut record = conflict.local.clone();
            record.last_modified = now_ms.max(record.last_modified);
            record.origin = RecordOrigin::Local;
            record
        }
        ResolutionPolicy::Merge => {
            let mut record = conflict.local.clone();
            record.text = format!("{}{separator}{}", conflict.local.text, conflict.remote.text);
            record.last_modified = now_ms.max(record.last_modified);
            record.origin = RecordOrigin::Local;
            record
        }
    }
}

/// Builds the full merged sequence by resolving every conflict.
pub fn apply_resolutions(
    merged: &[Record],
    conflicts: &[Conflict],
    policy: ResolutionPolicy,
    now_ms: i64,
    separator: &str,
) -> Vec<Record> {
    let mut ordered: Vec<&Conflict> = conflicts.iter().collect();
    ordered.sort_by_key(|conflict| conflict.position);

    let mut full = merged.to_vec();
    for conflict in ordered {
        let position = conflict.position.min(full.len());
        full.insert(position, resolve(conflict, policy, now_ms, separator));
    }
    full
}

#[cfg(test)]
mod tests {
    use super::{apply_resolutions, merge, ResolutionPolicy};
    use crate::model::record::{Record, RecordId, RecordOrigin};
    use serde_json::Map;

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
    fn conflict_positions_follow_local_order() {
        let local = vec![record("a", "A", 1), record("b", "B", 1), record("c", "C", 1)];
        let remote = vec![record("c", "C2", 5), record("a", "A2", 5)];

        let outcome = merge(&local, &remote);
        let positions: Vec<_> = outcome.conflicts.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 2]);
        assert_eq!(outcome.merged.len(), 1);

        let full = apply_resolutions(
            &outcome.merged,
            &outcome.conflicts,
            ResolutionPolicy::Server,
            9,
            " | ",
        );
        let texts: Vec<_> = full.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["A2", "B", "C2"]);
    }

    #[test]
    fn repeated_remote_ids_keep_first_occurrence() {
        let outcome = merge(&[], &[record("x", "first", 1), record("x", "second", 2)]);
        assert_eq!(outcome.merged.len(), 1);
        assert_eq!(outcome.merged[0].text, "first");
        assert_eq!(outcome.applied, 1);
    }

    #[test]
    fn policy_parses_from_str() {
        assert_eq!("Server".parse::<ResolutionPolicy>(), Ok(ResolutionPolicy::Server));
        assert_eq!(" merge ".parse::<ResolutionPolicy>(), Ok(ResolutionPolicy::Merge));
        assert!("newest".parse::<ResolutionPolicy>().is_err());
    }
}
