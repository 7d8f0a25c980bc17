//! Durable webhook queue repository implementation

use std::time::Duration;

use rusqlite::{params, Row};

use crate::error::Result;
use crate::models::{WebhookEvent, WebhookQueueItem};
use crate::util::now_ms;

use super::Database;

/// Queue depth snapshot for the status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: i64,
    pub processing: i64,
}

/// Trait for webhook queue operations
pub trait WebhookQueueRepository {
    /// Insert a parsed webhook event; returns the queue row id
    fn enqueue(&self, event: &WebhookEvent) -> Result<i64>;

    /// Claim up to `limit` unclaimed items in FIFO order
    ///
    /// Claiming flips `processing` to 1 in the same transaction that
    /// selects the rows, so concurrent workers never claim the same item.
    fn claim_batch(&self, limit: usize) -> Result<Vec<WebhookQueueItem>>;

    /// Mark a claimed item successfully handled
    fn mark_processed(&self, id: i64) -> Result<()>;

    /// Return a claimed item to the queue after a failure
    ///
    /// Beyond `max_retries` the item is parked as processed with its error
    /// message so it cannot block the queue; the failure stays visible on
    /// the sync record.
    fn mark_failed(&self, id: i64, message: &str, max_retries: i64) -> Result<()>;

    /// Re-open claims older than `timeout` (crashed or shut-down workers)
    fn reclaim_stale(&self, timeout: Duration) -> Result<usize>;

    /// Delete processed rows older than `retention`
    fn purge_processed(&self, retention: Duration) -> Result<usize>;

    /// Pending and in-flight counts
    fn counts(&self) -> Result<QueueCounts>;

    /// Fetch one item by id
    fn get(&self, id: i64) -> Result<Option<WebhookQueueItem>>;
}

/// SQLite implementation of `WebhookQueueRepository`
pub struct SqliteWebhookQueueRepository {
    db: Database,
}

impl SqliteWebhookQueueRepository {
    /// Create a new repository on the given store
    #[must_use]
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    fn parse_item(row: &Row<'_>) -> rusqlite::Result<WebhookQueueItem> {
        let source: String = row.get(1)?;
        let action: String = row.get(4)?;
        Ok(WebhookQueueItem {
            id: row.get(0)?,
            source: source.parse().map_err(|error: String| {
                rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, error.into())
            })?,
            doctype: row.get(2)?,
            docname: row.get(3)?,
            action: action.parse().map_err(|error: String| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, error.into())
            })?,
            payload: row.get(5)?,
            processed: row.get::<_, i64>(6)? != 0,
            processing: row.get::<_, i64>(7)? != 0,
            created_at: row.get(8)?,
            processed_at: row.get(9)?,
            retry_count: row.get(10)?,
            error_message: row.get(11)?,
        })
    }
}

const SELECT_COLUMNS: &str = "id, source, doctype, docname, action, payload, processed,
     processing, created_at, processed_at, retry_count, error_message";

impl WebhookQueueRepository for SqliteWebhookQueueRepository {
    fn enqueue(&self, event: &WebhookEvent) -> Result<i64> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO webhook_queue (source, doctype, docname, action, payload, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                event.source.as_str(),
                event.doctype,
                event.docname,
                event.action.as_str(),
                event.raw,
                now_ms()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn claim_batch(&self, limit: usize) -> Result<Vec<WebhookQueueItem>> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let items = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM webhook_queue
                 WHERE processed = 0 AND processing = 0
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?"
            ))?;
            let items = stmt
                .query_map(params![limit as i64], Self::parse_item)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            drop(stmt);

            let now = now_ms();
            for item in &items {
                tx.execute(
                    "UPDATE webhook_queue SET processing = 1, claimed_at = ? WHERE id = ?",
                    params![now, item.id],
                )?;
            }
            items
        };
        tx.commit()?;
        Ok(items)
    }

    fn mark_processed(&self, id: i64) -> Result<()> {
        self.db.lock().execute(
            "UPDATE webhook_queue SET processed = 1, processing = 0, processed_at = ?,
                error_message = NULL
             WHERE id = ?",
            params![now_ms(), id],
        )?;
        Ok(())
    }

    fn mark_failed(&self, id: i64, message: &str, max_retries: i64) -> Result<()> {
        self.db.lock().execute(
            "UPDATE webhook_queue SET
                processing = 0,
                retry_count = retry_count + 1,
                error_message = ?,
                processed = CASE WHEN retry_count + 1 > ? THEN 1 ELSE 0 END,
                processed_at = CASE WHEN retry_count + 1 > ? THEN ? ELSE processed_at END
             WHERE id = ?",
            params![message, max_retries, max_retries, now_ms(), id],
        )?;
        Ok(())
    }

    fn reclaim_stale(&self, timeout: Duration) -> Result<usize> {
        let cutoff = now_ms() - timeout.as_millis() as i64;
        let reclaimed = self.db.lock().execute(
            "UPDATE webhook_queue SET processing = 0, claimed_at = NULL
             WHERE processed = 0 AND processing = 1 AND claimed_at <= ?",
            params![cutoff],
        )?;
        if reclaimed > 0 {
            tracing::warn!(reclaimed, "reclaimed stale webhook queue claims");
        }
        Ok(reclaimed)
    }

    fn purge_processed(&self, retention: Duration) -> Result<usize> {
        let cutoff = now_ms() - retention.as_millis() as i64;
        let purged = self.db.lock().execute(
            "DELETE FROM webhook_queue WHERE processed = 1 AND created_at <= ?",
            params![cutoff],
        )?;
        Ok(purged)
    }

    fn counts(&self) -> Result<QueueCounts> {
        let conn = self.db.lock();
        let pending: i64 = conn.query_row(
            "SELECT COUNT(*) FROM webhook_queue WHERE processed = 0",
            [],
            |row| row.get(0),
        )?;
        let processing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM webhook_queue WHERE processed = 0 AND processing = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(QueueCounts { pending, processing })
    }

    fn get(&self, id: i64) -> Result<Option<WebhookQueueItem>> {
        let conn = self.db.lock();
        let result = conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM webhook_queue WHERE id = ?"),
            params![id],
            Self::parse_item,
        );
        match result {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Source, WebhookAction};

    fn setup() -> SqliteWebhookQueueRepository {
        let db = Database::open_in_memory().unwrap();
        SqliteWebhookQueueRepository::new(&db)
    }

    fn event(docname: &str) -> WebhookEvent {
        WebhookEvent {
            source: Source::Cloud,
            doctype: "Customer".to_string(),
            docname: docname.to_string(),
            action: WebhookAction::Update,
            raw: format!(r#"{{"doctype":"Customer","name":"{docname}"}}"#),
        }
    }

    #[test]
    fn enqueue_and_claim_preserve_fifo_order() {
        let repo = setup();
        repo.enqueue(&event("C1")).unwrap();
        repo.enqueue(&event("C2")).unwrap();
        repo.enqueue(&event("C3")).unwrap();

        let batch = repo.claim_batch(2).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].docname, "C1");
        assert_eq!(batch[1].docname, "C2");
        assert!(batch.iter().all(|item| !item.processed));

        // Claimed rows are invisible to a second claim.
        let rest = repo.claim_batch(10).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].docname, "C3");
    }

    #[test]
    fn mark_processed_completes_an_item() {
        let repo = setup();
        let id = repo.enqueue(&event("C1")).unwrap();
        repo.claim_batch(1).unwrap();
        repo.mark_processed(id).unwrap();

        let item = repo.get(id).unwrap().unwrap();
        assert!(item.processed);
        assert!(!item.processing);
        assert!(item.processed_at.is_some());
        assert_eq!(repo.counts().unwrap().pending, 0);
    }

    #[test]
    fn mark_failed_returns_item_to_queue_until_ceiling() {
        let repo = setup();
        let id = repo.enqueue(&event("C1")).unwrap();

        repo.claim_batch(1).unwrap();
        repo.mark_failed(id, "network down", 2).unwrap();
        let item = repo.get(id).unwrap().unwrap();
        assert!(!item.processed);
        assert_eq!(item.retry_count, 1);
        assert_eq!(item.error_message.as_deref(), Some("network down"));

        // Retryable again.
        assert_eq!(repo.claim_batch(1).unwrap().len(), 1);
        repo.mark_failed(id, "still down", 2).unwrap();
        assert_eq!(repo.claim_batch(1).unwrap().len(), 1);

        // Third failure exceeds the ceiling: parked as processed.
        repo.mark_failed(id, "gave up", 2).unwrap();
        let item = repo.get(id).unwrap().unwrap();
        assert!(item.processed);
        assert_eq!(item.retry_count, 3);
        assert_eq!(item.error_message.as_deref(), Some("gave up"));
        assert!(repo.claim_batch(1).unwrap().is_empty());
    }

    #[test]
    fn reclaim_stale_reopens_old_claims() {
        let repo = setup();
        repo.enqueue(&event("C1")).unwrap();
        repo.claim_batch(1).unwrap();

        // A fresh claim is not stale.
        assert_eq!(repo.reclaim_stale(Duration::from_secs(300)).unwrap(), 0);

        // With a zero timeout every claim is stale.
        assert_eq!(repo.reclaim_stale(Duration::from_secs(0)).unwrap(), 1);
        assert_eq!(repo.claim_batch(1).unwrap().len(), 1);
    }

    #[test]
    fn purge_processed_respects_retention() {
        let repo = setup();
        let id = repo.enqueue(&event("C1")).unwrap();
        repo.claim_batch(1).unwrap();
        repo.mark_processed(id).unwrap();

        assert_eq!(repo.purge_processed(Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(repo.purge_processed(Duration::from_secs(0)).unwrap(), 1);
        assert!(repo.get(id).unwrap().is_none());
    }

    #[test]
    fn counts_track_pending_and_processing() {
        let repo = setup();
        repo.enqueue(&event("C1")).unwrap();
        repo.enqueue(&event("C2")).unwrap();
        assert_eq!(repo.counts().unwrap(), QueueCounts { pending: 2, processing: 0 });

        repo.claim_batch(1).unwrap();
        assert_eq!(repo.counts().unwrap(), QueueCounts { pending: 2, processing: 1 });
    }
}
