//! State store for Tandem
//!
//! A single SQLite file holds the sync records, the append-only audit log,
//! conflict records, and the durable webhook queue.

mod audit;
mod connection;
mod conflicts;
mod migrations;
mod queue;
mod records;

pub use audit::{SqliteSyncLogRepository, SyncLogRepository};
pub use connection::Database;
pub use conflicts::{ConflictRepository, SqliteConflictRepository};
pub use queue::{QueueCounts, SqliteWebhookQueueRepository, WebhookQueueRepository};
pub use records::{SqliteSyncRecordRepository, StatusCounts, SyncRecordRepository};
