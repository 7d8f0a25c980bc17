//! Conflict record repository implementation

use rusqlite::{params, Row};

use crate::error::Result;
use crate::models::ConflictRecord;
use crate::util::now_ms;

use super::Database;

/// Trait for conflict record storage operations
///
/// Conflict rows are an audit trail: they are created for every detected
/// divergence and never deleted, only marked resolved.
pub trait ConflictRepository {
    /// Record a divergence; returns the row id
    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        doctype: &str,
        docname: &str,
        cloud_data: &str,
        local_data: &str,
        cloud_modified: Option<&str>,
        local_modified: Option<&str>,
    ) -> Result<i64>;

    /// Mark a conflict resolved with the winning side's tag
    fn mark_resolved(&self, id: i64, resolution: &str) -> Result<()>;

    /// List unresolved conflicts, oldest first
    fn list_unresolved(&self, limit: usize) -> Result<Vec<ConflictRecord>>;

    /// Whether a key currently has an unresolved conflict
    fn has_unresolved(&self, doctype: &str, docname: &str) -> Result<bool>;

    /// Number of unresolved conflicts
    fn count_unresolved(&self) -> Result<i64>;
}

/// SQLite implementation of `ConflictRepository`
pub struct SqliteConflictRepository {
    db: Database,
}

impl SqliteConflictRepository {
    /// Create a new repository on the given store
    #[must_use]
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    fn parse_conflict(row: &Row<'_>) -> rusqlite::Result<ConflictRecord> {
        Ok(ConflictRecord {
            id: row.get(0)?,
            doctype: row.get(1)?,
            docname: row.get(2)?,
            cloud_data: row.get(3)?,
            local_data: row.get(4)?,
            cloud_modified: row.get(5)?,
            local_modified: row.get(6)?,
            resolved: row.get::<_, i64>(7)? != 0,
            resolution: row.get(8)?,
            resolved_at: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}

const SELECT_COLUMNS: &str = "id, doctype, docname, cloud_data, local_data, cloud_modified,
     local_modified, resolved, resolution, resolved_at, created_at";

impl ConflictRepository for SqliteConflictRepository {
    fn record(
        &self,
        doctype: &str,
        docname: &str,
        cloud_data: &str,
        local_data: &str,
        cloud_modified: Option<&str>,
        local_modified: Option<&str>,
    ) -> Result<i64> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO conflict_records
                (doctype, docname, cloud_data, local_data, cloud_modified, local_modified, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                doctype,
                docname,
                cloud_data,
                local_data,
                cloud_modified,
                local_modified,
                now_ms()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn mark_resolved(&self, id: i64, resolution: &str) -> Result<()> {
        self.db.lock().execute(
            "UPDATE conflict_records SET resolved = 1, resolution = ?, resolved_at = ?
             WHERE id = ?",
            params![resolution, now_ms(), id],
        )?;
        Ok(())
    }

    fn list_unresolved(&self, limit: usize) -> Result<Vec<ConflictRecord>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM conflict_records
             WHERE resolved = 0
             ORDER BY created_at ASC, id ASC
             LIMIT ?"
        ))?;
        let conflicts = stmt
            .query_map(params![limit as i64], Self::parse_conflict)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(conflicts)
    }

    fn has_unresolved(&self, doctype: &str, docname: &str) -> Result<bool> {
        let found: bool = self.db.lock().query_row(
            "SELECT EXISTS(
                SELECT 1 FROM conflict_records
                WHERE doctype = ? AND docname = ? AND resolved = 0
             )",
            params![doctype, docname],
            |row| row.get::<_, i64>(0).map(|flag| flag != 0),
        )?;
        Ok(found)
    }

    fn count_unresolved(&self) -> Result<i64> {
        let count: i64 = self.db.lock().query_row(
            "SELECT COUNT(*) FROM conflict_records WHERE resolved = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
