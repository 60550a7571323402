//! Durable table of confirmed transfers.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::TrackerError;

/// SQLite-backed store mapping relative paths to the size of their last
/// confirmed successful transfer.
///
/// One row per path; every successful sync replaces the row wholesale with a
/// fresh timestamp. The connection runs in autocommit mode, so each update is
/// durable on its own: a crash mid-walk leaves already-synced files correctly
/// marked and pending files correctly pending. Rows are never deleted here;
/// removed local files simply leave stale records behind.
pub struct RecordStore {
    conn: Connection,
}

impl RecordStore {
    /// Opens (creating if necessary) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, TrackerError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> Result<Self, TrackerError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, TrackerError> {
        // Idempotent: safe to run against an already-initialized database.
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS synchronized(
                 pathname TEXT PRIMARY KEY,
                 size INTEGER NOT NULL,
                 synced_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
             );",
        )?;
        Ok(Self { conn })
    }

    /// Size of the last confirmed transfer for `pathname`, if any.
    pub fn recorded_size(&self, pathname: &str) -> Result<Option<u64>, TrackerError> {
        let size: Option<i64> = self
            .conn
            .query_row(
                "SELECT size FROM synchronized WHERE pathname = ?1",
                params![pathname],
                |row| row.get(0),
            )
            .optional()?;
        Ok(size.and_then(|s| u64::try_from(s).ok()))
    }

    /// Records a confirmed transfer of `size` bytes for `pathname`,
    /// replacing any previous record and refreshing its timestamp.
    pub fn record(&mut self, pathname: &str, size: u64) -> Result<(), TrackerError> {
        debug!(pathname, size, "recording confirmed transfer");
        self.conn.execute(
            "INSERT INTO synchronized(pathname, size, synced_at)
             VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(pathname) DO UPDATE
             SET size = excluded.size, synced_at = excluded.synced_at",
            params![pathname, i64::try_from(size).unwrap_or(i64::MAX)],
        )?;
        Ok(())
    }
}
