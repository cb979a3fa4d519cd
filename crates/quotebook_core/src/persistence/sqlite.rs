//! SQLite-backed persistence adapter.
//!
//! # Responsibility
//! - Persist key-value entries in the `kv_entries` table.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Entries are keyed by `(scope, key)`; scopes never see each other.
//! - `set` is an upsert; `remove` of a missing key is a no-op.

use super::{PersistenceAdapter, StorageResult};
use crate::db::{open_db, open_db_in_memory};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const DURABLE_SCOPE: &str = "durable";

/// Key-value adapter over a migrated SQLite connection.
pub struct SqliteStorage {
    conn: Connection,
    scope: String,
}

impl SqliteStorage {
    /// Opens (and migrates) a database file using the durable scope.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    /// Opens an in-memory database using the durable scope.
    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps an already-migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            scope: DURABLE_SCOPE.to_string(),
        }
    }

    /// Returns this adapter bound to another scope on the same database.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Returns stored keys for this scope in sorted order.
    pub fn keys(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv_entries WHERE scope = ?1 ORDER BY key ASC;")?;
        let keys = stmt
            .query_map([self.scope.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

impl PersistenceAdapter for SqliteStorage {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_entries WHERE scope = ?1 AND key = ?2;",
                params![self.scope.as_str(), key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO kv_entries (scope, key, value)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(scope, key) DO UPDATE SET
                value = excluded.value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![self.scope.as_str(), key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM kv_entries WHERE scope = ?1 AND key = ?2;",
            params![self.scope.as_str(), key],
        )?;
        Ok(())
    }
}
