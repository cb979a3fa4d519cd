//! Key-value persistence contracts used by the record store and session.
//!
//! # Responsibility
//! - Define the byte-oriented `get/set/remove` adapter contract.
//! - Provide JSON helpers layered over raw bytes.
//!
//! # Invariants
//! - Adapters never interpret stored bytes.
//! - Durable and session scopes are separate adapter instances.

use crate::db::DbError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

pub type StorageResult<T> = Result<T, StorageError>;

/// Storage adapter failures.
#[derive(Debug)]
pub enum StorageError {
    Db(DbError),
    Serialization(serde_json::Error),
    /// An in-process lock was poisoned by a panicking writer.
    Poisoned,
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "stored value is not valid json: {err}"),
            Self::Poisoned => write!(f, "storage lock poisoned"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::Poisoned => None,
        }
    }
}

impl From<DbError> for StorageError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Byte-oriented durable or session key-value store.
pub trait PersistenceAdapter {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()>;
    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Reads and decodes one JSON value; `Ok(None)` when the key is absent.
pub fn load_json<T: DeserializeOwned>(
    adapter: &dyn PersistenceAdapter,
    key: &str,
) -> StorageResult<Option<T>> {
    match adapter.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Encodes and writes one JSON value.
pub fn save_json<T: Serialize + ?Sized>(
    adapter: &dyn PersistenceAdapter,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let bytes = serde_json::to_vec(value)?;
    adapter.set(key, &bytes)
}
