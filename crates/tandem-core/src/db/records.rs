//! Sync record repository implementation

use rusqlite::{params, Row};

use crate::error::{Error, Result};
use crate::models::{SyncDirection, SyncRecord, SyncStatus};
use crate::util::now_ms;

use super::Database;

/// Tally of sync records by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: i64,
    pub pending: i64,
    pub synced: i64,
    pub error: i64,
    pub failed: i64,
    pub conflict: i64,
}

/// Trait for sync record storage operations
pub trait SyncRecordRepository {
    /// Fetch the record for a key, if one exists
    fn get(&self, doctype: &str, docname: &str) -> Result<Option<SyncRecord>>;

    /// Fetch the record for a key, creating a pending one if absent
    fn get_or_create(&self, doctype: &str, docname: &str) -> Result<SyncRecord>;

    /// Claim a key by flipping `is_syncing` from 0 to 1
    ///
    /// Creates the record if absent. Returns false when another operation
    /// already holds the claim.
    fn claim(&self, doctype: &str, docname: &str) -> Result<bool>;

    /// Release a claim without changing status
    fn release(&self, doctype: &str, docname: &str) -> Result<()>;

    /// Record a successful sync: both hashes equal, status synced,
    /// retry count and error cleared, claim released
    #[allow(clippy::too_many_arguments)]
    fn mark_synced(
        &self,
        doctype: &str,
        docname: &str,
        content_hash: &str,
        direction: SyncDirection,
        cloud_modified: Option<&str>,
        local_modified: Option<&str>,
    ) -> Result<()>;

    /// Record a failed sync and release the claim
    ///
    /// Increments `retry_count`; beyond `max_attempts` the record becomes
    /// terminally failed. Returns the resulting status.
    fn mark_error(
        &self,
        doctype: &str,
        docname: &str,
        message: &str,
        max_attempts: i64,
    ) -> Result<SyncStatus>;

    /// Record an unresolved divergence and release the claim
    fn mark_conflict(&self, doctype: &str, docname: &str) -> Result<()>;

    /// Clear the failed status so the executor will pick the key up again
    fn clear_failure(&self, doctype: &str, docname: &str) -> Result<()>;

    /// Clear every persisted claim; called on startup when no in-process
    /// lock can correspond to them
    fn clear_stale_claims(&self) -> Result<usize>;

    /// Tally records by status
    fn status_counts(&self) -> Result<StatusCounts>;
}

/// SQLite implementation of `SyncRecordRepository`
pub struct SqliteSyncRecordRepository {
    db: Database,
}

impl SqliteSyncRecordRepository {
    /// Create a new repository on the given store
    #[must_use]
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    fn parse_record(row: &Row<'_>) -> rusqlite::Result<SyncRecord> {
        let direction: String = row.get(8)?;
        let status: String = row.get(10)?;
        Ok(SyncRecord {
            id: row.get(0)?,
            doctype: row.get(1)?,
            docname: row.get(2)?,
            cloud_hash: row.get(3)?,
            local_hash: row.get(4)?,
            cloud_modified: row.get(5)?,
            local_modified: row.get(6)?,
            last_synced: row.get(7)?,
            last_direction: direction.parse().map_err(|error: String| {
                rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, error.into())
            })?,
            is_syncing: row.get::<_, i64>(9)? != 0,
            status: status.parse().map_err(|error: String| {
                rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, error.into())
            })?,
            error_message: row.get(11)?,
            retry_count: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    fn ensure_exists(conn: &rusqlite::Connection, doctype: &str, docname: &str) -> Result<()> {
        let now = now_ms();
        conn.execute(
            "INSERT OR IGNORE INTO sync_records (doctype, docname, created_at, updated_at)
             VALUES (?, ?, ?, ?)",
            params![doctype, docname, now, now],
        )?;
        Ok(())
    }
}

const SELECT_COLUMNS: &str = "id, doctype, docname, cloud_hash, local_hash, cloud_modified,
     local_modified, last_synced, last_direction, is_syncing, status, error_message,
     retry_count, created_at, updated_at";

impl SyncRecordRepository for SqliteSyncRecordRepository {
    fn get(&self, doctype: &str, docname: &str) -> Result<Option<SyncRecord>> {
        let conn = self.db.lock();
        let result = conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM sync_records WHERE doctype = ? AND docname = ?"),
            params![doctype, docname],
            Self::parse_record,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get_or_create(&self, doctype: &str, docname: &str) -> Result<SyncRecord> {
        {
            let conn = self.db.lock();
            Self::ensure_exists(&conn, doctype, docname)?;
        }
        self.get(doctype, docname)?
            .ok_or_else(|| Error::NotFound(format!("{doctype}/{docname}")))
    }

    fn claim(&self, doctype: &str, docname: &str) -> Result<bool> {
        let conn = self.db.lock();
        Self::ensure_exists(&conn, doctype, docname)?;
        let claimed = conn.execute(
            "UPDATE sync_records SET is_syncing = 1, updated_at = ?
             WHERE doctype = ? AND docname = ? AND is_syncing = 0",
            params![now_ms(), doctype, docname],
        )?;
        Ok(claimed == 1)
    }

    fn release(&self, doctype: &str, docname: &str) -> Result<()> {
        self.db.lock().execute(
            "UPDATE sync_records SET is_syncing = 0, updated_at = ?
             WHERE doctype = ? AND docname = ?",
            params![now_ms(), doctype, docname],
        )?;
        Ok(())
    }

    fn mark_synced(
        &self,
        doctype: &str,
        docname: &str,
        content_hash: &str,
        direction: SyncDirection,
        cloud_modified: Option<&str>,
        local_modified: Option<&str>,
    ) -> Result<()> {
        let now = now_ms();
        self.db.lock().execute(
            "UPDATE sync_records SET
                cloud_hash = ?, local_hash = ?, cloud_modified = ?, local_modified = ?,
                last_synced = ?, last_direction = ?, status = 'synced',
                error_message = NULL, retry_count = 0, is_syncing = 0, updated_at = ?
             WHERE doctype = ? AND docname = ?",
            params![
                content_hash,
                content_hash,
                cloud_modified,
                local_modified,
                now,
                direction.as_str(),
                now,
                doctype,
                docname
            ],
        )?;
        Ok(())
    }

    fn mark_error(
        &self,
        doctype: &str,
        docname: &str,
        message: &str,
        max_attempts: i64,
    ) -> Result<SyncStatus> {
        let conn = self.db.lock();
        conn.execute(
            "UPDATE sync_records SET
                status = CASE WHEN retry_count + 1 > ? THEN 'failed' ELSE 'error' END,
                error_message = ?, retry_count = retry_count + 1,
                is_syncing = 0, updated_at = ?
             WHERE doctype = ? AND docname = ?",
            params![max_attempts, message, now_ms(), doctype, docname],
        )?;
        let status: String = conn.query_row(
            "SELECT status FROM sync_records WHERE doctype = ? AND docname = ?",
            params![doctype, docname],
            |row| row.get(0),
        )?;
        status.parse().map_err(Error::InvalidInput)
    }

    fn mark_conflict(&self, doctype: &str, docname: &str) -> Result<()> {
        self.db.lock().execute(
            "UPDATE sync_records SET status = 'conflict', is_syncing = 0, updated_at = ?
             WHERE doctype = ? AND docname = ?",
            params![now_ms(), doctype, docname],
        )?;
        Ok(())
    }

    fn clear_failure(&self, doctype: &str, docname: &str) -> Result<()> {
        self.db.lock().execute(
            "UPDATE sync_records SET status = 'pending', error_message = NULL,
                retry_count = 0, updated_at = ?
             WHERE doctype = ? AND docname = ? AND status = 'failed'",
            params![now_ms(), doctype, docname],
        )?;
        Ok(())
    }

    fn clear_stale_claims(&self) -> Result<usize> {
        let cleared = self.db.lock().execute(
            "UPDATE sync_records SET is_syncing = 0, updated_at = ? WHERE is_syncing = 1",
            params![now_ms()],
        )?;
        if cleared > 0 {
            tracing::warn!(cleared, "cleared stale sync claims left by a previous run");
        }
        Ok(cleared)
    }

    fn status_counts(&self) -> Result<StatusCounts> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM sync_records GROUP BY status")?;
        let mut counts = StatusCounts::default();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            counts.total += count;
            match status.as_str() {
                "pending" => counts.pending = count,
                "synced" => counts.synced = count,
                "error" => counts.error = count,
                "failed" => counts.failed = count,
                "conflict" => counts.conflict = count,
                _ => {}
            }
        }
        Ok(counts)
    }
}
