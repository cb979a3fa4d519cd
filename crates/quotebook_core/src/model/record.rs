//! Record domain model.
//!
//! # Responsibility
//! - Define the canonical quote record shared by store, storage and sync.
//! - Normalize and validate user-entered candidates.
//!
//! # Invariants
//! - `id` is stable and is the join key for remote reconciliation.
//! - `text` and `category` are non-empty after trimming.
//! - `last_modified` never decreases for one id under local mutation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Stable record identifier.
///
/// Local records use UUID v4 strings. Remote peers may use integers, which
/// are kept as their decimal string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    /// Generates a fresh unique id for a locally created record.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordIdVisitor;

        impl Visitor<'_> for RecordIdVisitor {
            type Value = RecordId;

            fn expecting(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str("a non-empty string or integer record id")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<RecordId, E> {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(E::custom("record id cannot be empty"));
                }
                Ok(RecordId(trimmed.to_string()))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<RecordId, E> {
                Ok(RecordId(value.to_string()))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<RecordId, E> {
                Ok(RecordId(value.to_string()))
            }
        }

        deserializer.deserialize_any(RecordIdVisitor)
    }
}

/// Where a record version was authored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    #[default]
    Local,
    Remote,
}

/// Canonical quote record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub text: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Unix epoch milliseconds of the last mutation.
    #[serde(default)]
    pub last_modified: i64,
    #[serde(default)]
    pub origin: RecordOrigin,
    /// Unrecognized wire fields, carried through round-trips untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    /// Builds a local record from an already-normalized draft.
    pub fn from_draft(id: RecordId, draft: NormalizedDraft, last_modified: i64) -> Self {
        Self {
            id,
            text: draft.text,
            category: draft.category,
            author: draft.author,
            last_modified,
            origin: RecordOrigin::Local,
            extra: Map::new(),
        }
    }

    /// Returns whether both versions carry the same user-visible content.
    ///
    /// `last_modified`, `origin` and `extra` are not content.
    pub fn same_content(&self, other: &Self) -> bool {
        self.text == other.text && self.category == other.category && self.author == other.author
    }

    /// Returns whether this record matches a category filter.
    pub fn in_category(&self, category: &str) -> bool {
        self.category.to_lowercase() == category.trim().to_lowercase()
    }

    /// Returns whether this record passes the structural shape check.
    pub fn has_valid_shape(&self) -> bool {
        !self.text.trim().is_empty() && !self.category.trim().is_empty()
    }

    /// Key used for case-insensitive duplicate detection.
    pub fn dedup_key(&self) -> String {
        dedup_key(&self.text)
    }
}

/// Candidate fields for a new record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordDraft {
    pub text: String,
    pub category: String,
    pub author: Option<String>,
}

impl RecordDraft {
    pub fn new(text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: category.into(),
            author: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Trims all fields and checks them against `limits`.
    pub fn normalize(&self, limits: &RecordLimits) -> Result<NormalizedDraft, RecordValidationError> {
        let text = self.text.trim();
        let category = self.category.trim();
        limits.check(text, category)?;

        Ok(NormalizedDraft {
            text: text.to_string(),
            category: category.to_string(),
            author: normalize_author(self.author.as_deref()),
        })
    }
}

/// Draft fields after trimming and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDraft {
    pub text: String,
    pub category: String,
    pub author: Option<String>,
}

/// Partial field update for an existing record.
///
/// `author: Some(None)` clears the author.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub text: Option<String>,
    pub category: Option<String>,
    pub author: Option<Option<String>>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.category.is_none() && self.author.is_none()
    }

    /// Applies this patch over `current` and returns the normalized result.
    pub fn apply_to(
        &self,
        current: &Record,
        limits: &RecordLimits,
    ) -> Result<NormalizedDraft, RecordValidationError> {
        let draft = RecordDraft {
            text: self.text.clone().unwrap_or_else(|| current.text.clone()),
            category: self
                .category
                .clone()
                .unwrap_or_else(|| current.category.clone()),
            author: match &self.author {
                Some(author) => author.clone(),
                None => current.author.clone(),
            },
        };
        draft.normalize(limits)
    }
}

/// Length limits applied to user-entered records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLimits {
    pub min_text_chars: usize,
    pub max_text_chars: usize,
    pub max_category_chars: usize,
}

impl Default for RecordLimits {
    fn default() -> Self {
        Self {
            min_text_chars: 1,
            max_text_chars: 500,
            max_category_chars: 64,
        }
    }
}

impl RecordLimits {
    fn check(&self, text: &str, category: &str) -> Result<(), RecordValidationError> {
        if text.is_empty() {
            return Err(RecordValidationError::EmptyText);
        }
        if category.is_empty() {
            return Err(RecordValidationError::EmptyCategory);
        }

        let text_chars = text.chars().count();
        if text_chars < self.min_text_chars {
            return Err(RecordValidationError::TextTooShort {
                min: self.min_text_chars,
                actual: text_chars,
            });
        }
        if text_chars > self.max_text_chars {
            return Err(RecordValidationError::TextTooLong {
                max: self.max_text_chars,
                actual: text_chars,
            });
        }

        let category_chars = category.chars().count();
        if category_chars > self.max_category_chars {
            return Err(RecordValidationError::CategoryTooLong {
                max: self.max_category_chars,
                actual: category_chars,
            });
        }

        Ok(())
    }
}

/// Validation failures for user-entered record fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    EmptyText,
    EmptyCategory,
    TextTooShort { min: usize, actual: usize },
    TextTooLong { max: usize, actual: usize },
    CategoryTooLong { max: usize, actual: usize },
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyText => write!(f, "quote text cannot be empty"),
            Self::EmptyCategory => write!(f, "quote category cannot be empty"),
            Self::TextTooShort { min, actual } => {
                write!(f, "quote text is too short ({actual} < {min} chars)")
            }
            Self::TextTooLong { max, actual } => {
                write!(f, "quote text is too long ({actual} > {max} chars)")
            }
            Self::CategoryTooLong { max, actual } => {
                write!(f, "quote category is too long ({actual} > {max} chars)")
            }
        }
    }
}

impl Error for RecordValidationError {}

/// Lowercased, whitespace-collapsed form of `text`.
pub fn dedup_key(text: &str) -> String {
    WHITESPACE_RE
        .replace_all(text.trim(), " ")
        .to_lowercase()
}

fn normalize_author(author: Option<&str>) -> Option<String> {
    author
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::{dedup_key, Record, RecordDraft, RecordId, RecordLimits, RecordValidationError};

    #[test]
    fn dedup_key_collapses_case_and_whitespace() {
        assert_eq!(dedup_key("  Stay   HUNGRY\tstay foolish "), "stay hungry stay foolish");
    }

    #[test]
    fn normalize_trims_and_drops_blank_author() {
        let draft = RecordDraft::new("  text  ", " Life ").with_author("   ");
        let normalized = draft.normalize(&RecordLimits::default()).unwrap();
        assert_eq!(normalized.text, "text");
        assert_eq!(normalized.category, "Life");
        assert_eq!(normalized.author, None);
    }

    #[test]
    fn normalize_enforces_limits() {
        let limits = RecordLimits {
            min_text_chars: 3,
            max_text_chars: 5,
            max_category_chars: 4,
        };
        assert_eq!(
            RecordDraft::new("ab", "x").normalize(&limits),
            Err(RecordValidationError::TextTooShort { min: 3, actual: 2 })
        );
        assert_eq!(
            RecordDraft::new("abcdef", "x").normalize(&limits),
            Err(RecordValidationError::TextTooLong { max: 5, actual: 6 })
        );
        assert_eq!(
            RecordDraft::new("abc", "  ").normalize(&limits),
            Err(RecordValidationError::EmptyCategory)
        );
        assert_eq!(
            RecordDraft::new("abc", "long!").normalize(&limits),
            Err(RecordValidationError::CategoryTooLong { max: 4, actual: 5 })
        );
    }

    #[test]
    fn record_id_accepts_string_and_integer_wire_forms() {
        let from_int: RecordId = serde_json::from_str("42").unwrap();
        let from_str: RecordId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(from_int, from_str);
        assert!(serde_json::from_str::<RecordId>("\"  \"").is_err());
    }

    #[test]
    fn record_wire_form_is_camel_case_and_keeps_unknown_fields() {
        let json = r#"{"id":7,"text":"t","category":"c","lastModified":5,"origin":"remote","likes":3}"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.id.as_str(), "7");
        assert_eq!(record.last_modified, 5);
        assert_eq!(record.extra.get("likes"), Some(&serde_json::json!(3)));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["lastModified"], 5);
        assert_eq!(value["origin"], "remote");
        assert_eq!(value["likes"], 3);
        assert!(value.get("author").is_none());
    }
}
