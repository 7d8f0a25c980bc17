//! Data models for Tandem

mod conflict;
mod sync_log;
mod sync_record;
mod webhook_event;

pub use conflict::ConflictRecord;
pub use sync_log::{LogAction, LogStatus, SyncLogEntry};
pub use sync_record::{SyncDirection, SyncRecord, SyncStatus};
pub use webhook_event::{Source, WebhookAction, WebhookEvent, WebhookQueueItem};
