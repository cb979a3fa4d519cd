//! Built-in quote set used when no stored collection exists.

use crate::model::record::{Record, RecordId, RecordOrigin};
use serde_json::Map;

const DEFAULT_QUOTES: &[(&str, &str)] = &[
    (
        "The only way to do great work is to love what you do.",
        "Motivation",
    ),
    (
        "Life is what happens to you while you're busy making other plans.",
        "Life",
    ),
    (
        "The future belongs to those who believe in the beauty of their dreams.",
        "Dreams",
    ),
    (
        "It is during our darkest moments that we must focus to see the light.",
        "Inspiration",
    ),
    (
        "Success is not final, failure is not fatal: it is the courage to continue that counts.",
        "Success",
    ),
    (
        "The only impossible journey is the one you never begin.",
        "Motivation",
    ),
    (
        "In the end, we will remember not the words of our enemies, but the silence of our friends.",
        "Friendship",
    ),
    (
        "The way to get started is to quit talking and begin doing.",
        "Action",
    ),
    (
        "Don't be afraid to give up the good to go for the great.",
        "Success",
    ),
    (
        "Innovation distinguishes between a leader and a follower.",
        "Leadership",
    ),
];

/// Returns the built-in quote set stamped with `now_ms`.
pub fn default_records(now_ms: i64) -> Vec<Record> {
    DEFAULT_QUOTES
        .iter()
        .map(|(text, category)| Record {
            id: RecordId::generate(),
            text: (*text).to_string(),
            category: (*category).to_string(),
            author: None,
            last_modified: now_ms,
            origin: RecordOrigin::Local,
            extra: Map::new(),
        })
        .collect()
}
