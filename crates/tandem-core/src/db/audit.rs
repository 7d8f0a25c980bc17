//! Append-only audit log repository implementation

use rusqlite::{params, Row};

use crate::error::Result;
use crate::models::{LogAction, LogStatus, SyncDirection, SyncLogEntry};
use crate::util::now_ms;

use super::Database;

/// Trait for audit log operations
pub trait SyncLogRepository {
    /// Append one audit row
    fn append(
        &self,
        doctype: &str,
        docname: &str,
        action: LogAction,
        direction: SyncDirection,
        status: LogStatus,
        message: &str,
    ) -> Result<()>;

    /// Most recent rows, newest first
    fn recent(&self, limit: usize) -> Result<Vec<SyncLogEntry>>;
}

/// SQLite implementation of `SyncLogRepository`
pub struct SqliteSyncLogRepository {
    db: Database,
}

impl SqliteSyncLogRepository {
    /// Create a new repository on the given store
    #[must_use]
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    fn parse_entry(row: &Row<'_>) -> rusqlite::Result<SyncLogEntry> {
        let action: String = row.get(4)?;
        let direction: String = row.get(5)?;
        let status: String = row.get(6)?;
        Ok(SyncLogEntry {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            doctype: row.get(2)?,
            docname: row.get(3)?,
            action: action.parse().map_err(|error: String| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, error.into())
            })?,
            direction: direction.parse().map_err(|error: String| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, error.into())
            })?,
            status: status.parse().map_err(|error: String| {
                rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, error.into())
            })?,
            message: row.get(7)?,
        })
    }
}

impl SyncLogRepository for SqliteSyncLogRepository {
    fn append(
        &self,
        doctype: &str,
        docname: &str,
        action: LogAction,
        direction: SyncDirection,
        status: LogStatus,
        message: &str,
    ) -> Result<()> {
        self.db.lock().execute(
            "INSERT INTO sync_logs (timestamp, doctype, docname, action, direction, status, message)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                now_ms(),
                doctype,
                docname,
                action.as_str(),
                direction.as_str(),
                status.as_str(),
                message
            ],
        )?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<SyncLogEntry>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, doctype, docname, action, direction, status, message
             FROM sync_logs
             ORDER BY timestamp DESC, id DESC
             LIMIT ?",
        )?;
        let entries = stmt
            .query_map(params![limit as i64], Self::parse_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> SqliteSyncLogRepository {
        let db = Database::open_in_memory().unwrap();
        SqliteSyncLogRepository::new(&db)
    }

    #[test]
    fn append_and_read_back_newest_first() {
        let repo = setup();
        repo.append(
            "Customer",
            "C1",
            LogAction::Create,
            SyncDirection::CloudToLocal,
            LogStatus::Success,
            "created on local from cloud",
        )
        .unwrap();
        repo.append(
            "Customer",
            "C1",
            LogAction::Skip,
            SyncDirection::None,
            LogStatus::Skipped,
            "no changes",
        )
        .unwrap();

        let entries = repo.recent(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, LogAction::Skip);
        assert_eq!(entries[1].status, LogStatus::Success);
        assert_eq!(entries[1].direction, SyncDirection::CloudToLocal);
    }

    #[test]
    fn recent_respects_limit() {
        let repo = setup();
        for index in 0..5 {
            repo.append(
                "Customer",
                &format!("C{index}"),
                LogAction::Update,
                SyncDirection::LocalToCloud,
                LogStatus::Success,
                "",
            )
            .unwrap();
        }
        assert_eq!(repo.recent(3).unwrap().len(), 3);
    }
}
