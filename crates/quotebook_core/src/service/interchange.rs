//! Import/export wire format for record collections.
//!
//! # Responsibility
//! - Encode snapshots as a JSON array of record objects.
//! - Decode loosely-shaped input (legacy `{text, category}` objects, JSON
//!   arrays or JSON Lines) into records, counting rejected elements.
//!
//! # Invariants
//! - Every accepted record has non-empty trimmed `text` and `category`.
//! - Unknown fields on accepted elements are preserved in `Record::extra`.

use crate::model::record::{Record, RecordId, RecordOrigin};
use crate::service::record_store::StoreError;
use serde_json::{Map, Value};

/// Records decoded from an import source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBatch {
    pub records: Vec<Record>,
    /// Elements that failed the shape check.
    pub rejected: usize,
}

/// Encodes records as a pretty-printed JSON array.
pub fn export_records(records: &[Record]) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec_pretty(records)
}

/// Decodes an import payload.
///
/// Accepts one JSON array, or JSON Lines where each non-empty line is one
/// object. Elements missing `id` get a fresh one; missing `lastModified`
/// becomes `now_ms`.
///
/// # Errors
/// - `ImportMalformed` when the payload is neither form.
pub fn parse_records(bytes: &[u8], now_ms: i64) -> Result<ParsedBatch, StoreError> {
    let elements = decode_elements(bytes)?;

    let mut batch = ParsedBatch::default();
    for element in elements {
        match record_from_value(element, now_ms) {
            Some(record) => batch.records.push(record),
            None => batch.rejected += 1,
        }
    }
    Ok(batch)
}

/// Converts one JSON element into a record, or `None` if it fails the
/// shape check.
pub fn record_from_value(value: Value, now_ms: i64) -> Option<Record> {
    let Value::Object(mut object) = value else {
        return None;
    };

    let text = take_non_empty_string(&mut object, "text")?;
    let category = take_non_empty_string(&mut object, "category")?;
    let author = take_non_empty_string(&mut object, "author");

    let id = match object.remove("id") {
        None | Some(Value::Null) => RecordId::generate(),
        Some(raw) => serde_json::from_value::<RecordId>(raw).ok()?,
    };
    let last_modified = match object.remove("lastModified") {
        None | Some(Value::Null) => now_ms,
        Some(raw) => raw.as_i64()?,
    };
    let origin = match object.remove("origin") {
        None | Some(Value::Null) => RecordOrigin::Local,
        Some(raw) => serde_json::from_value(raw).ok()?,
    };

    Some(Record {
        id,
        text,
        category,
        author,
        last_modified,
        origin,
        extra: object,
    })
}

fn decode_elements(bytes: &[u8]) -> Result<Vec<Value>, StoreError> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Array(elements)) => return Ok(elements),
        Ok(_) => {
            return Err(StoreError::ImportMalformed {
                reason: "expected a json array of quotes".to_string(),
                rejected: 0,
            });
        }
        // Not a single document; fall through to JSON Lines.
        Err(_) => {}
    }

    let text = std::str::from_utf8(bytes).map_err(|_| StoreError::ImportMalformed {
        reason: "input is not utf-8".to_string(),
        rejected: 0,
    })?;

    let mut elements = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value = serde_json::from_str::<Value>(line).map_err(|err| {
            StoreError::ImportMalformed {
                reason: format!("line {} is not valid json: {err}", index + 1),
                rejected: 0,
            }
        })?;
        elements.push(value);
    }

    if elements.is_empty() {
        return Err(StoreError::ImportMalformed {
            reason: "input contains no quotes".to_string(),
            rejected: 0,
        });
    }
    Ok(elements)
}

fn take_non_empty_string(object: &mut Map<String, Value>, key: &str) -> Option<String> {
    match object.remove(key) {
        Some(Value::String(value)) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        _ => None,
    }
}
