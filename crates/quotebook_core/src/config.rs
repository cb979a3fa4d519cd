//! Core runtime configuration.
//!
//! # Responsibility
//! - Hold validation limits, merge and sync tuning, and storage key naming.
//! - Parse host-provided JSON configuration with per-field defaults.
//!
//! # Invariants
//! - A validated config has `min_text_chars <= max_text_chars`.
//! - `sync_interval_ms` is strictly positive.

use crate::model::record::RecordLimits;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

const DEFAULT_STORAGE_PREFIX: &str = "dynamicQuoteGenerator";
const DEFAULT_MERGE_SEPARATOR: &str = " | ";
const DEFAULT_SYNC_INTERVAL_MS: u64 = 30_000;
const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 10_000;

/// Configuration parse/validation errors.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Remote endpoint settings for HTTP transports.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
        }
    }
}

/// Top-level core configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoreConfig {
    pub min_text_chars: usize,
    pub max_text_chars: usize,
    pub max_category_chars: usize,
    /// Inserted between local and remote text by the `merge` policy.
    pub merge_separator: String,
    pub sync_interval_ms: u64,
    pub storage_prefix: String,
    pub remote: Option<RemoteConfig>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let limits = RecordLimits::default();
        Self {
            min_text_chars: limits.min_text_chars,
            max_text_chars: limits.max_text_chars,
            max_category_chars: limits.max_category_chars,
            merge_separator: DEFAULT_MERGE_SEPARATOR.to_string(),
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
            storage_prefix: DEFAULT_STORAGE_PREFIX.to_string(),
            remote: None,
        }
    }
}

impl CoreConfig {
    /// Parses and validates a JSON config document.
    ///
    /// Missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_text_chars == 0 {
            return Err(ConfigError::Invalid(
                "minTextChars must be at least 1".to_string(),
            ));
        }
        if self.min_text_chars > self.max_text_chars {
            return Err(ConfigError::Invalid(format!(
                "minTextChars ({}) exceeds maxTextChars ({})",
                self.min_text_chars, self.max_text_chars
            )));
        }
        if self.max_category_chars == 0 {
            return Err(ConfigError::Invalid(
                "maxCategoryChars must be at least 1".to_string(),
            ));
        }
        if self.sync_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "syncIntervalMs must be positive".to_string(),
            ));
        }
        if self.storage_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "storagePrefix cannot be empty".to_string(),
            ));
        }
        if let Some(remote) = &self.remote {
            if remote.base_url.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "remote.baseUrl cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn limits(&self) -> RecordLimits {
        RecordLimits {
            min_text_chars: self.min_text_chars,
            max_text_chars: self.max_text_chars,
            max_category_chars: self.max_category_chars,
        }
    }

    pub fn storage_keys(&self) -> StorageKeys {
        StorageKeys::with_prefix(self.storage_prefix.trim())
    }
}

/// Key names used against persistence adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    /// Durable: full record snapshot.
    pub quotes: String,
    /// Durable: last selected filter.
    pub preferences: String,
    /// Session: last viewed record.
    pub last_quote: String,
    /// Session: view/add counters.
    pub session_stats: String,
}

impl StorageKeys {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            quotes: format!("{prefix}_quotes"),
            preferences: format!("{prefix}_preferences"),
            last_quote: format!("{prefix}_lastQuote"),
            session_stats: format!("{prefix}_sessionStats"),
        }
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_STORAGE_PREFIX)
    }
}
