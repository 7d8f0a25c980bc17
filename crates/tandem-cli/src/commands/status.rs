use std::path::Path;

use serde::Serialize;

use tandem_core::db::{
    ConflictRepository, SqliteConflictRepository, SqliteSyncLogRepository,
    SqliteSyncRecordRepository, SqliteWebhookQueueRepository, SyncLogRepository,
    SyncRecordRepository, WebhookQueueRepository,
};

use crate::commands::common::{format_timestamp, load_settings, open_database};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StatusReport {
    total: i64,
    pending: i64,
    synced: i64,
    error: i64,
    failed: i64,
    conflict: i64,
    queue_pending: i64,
    queue_processing: i64,
    unresolved_conflicts: i64,
}

pub fn run_status(as_json: bool, config_path: Option<&Path>) -> Result<(), CliError> {
    let settings = load_settings(config_path)?;
    let db = open_database(&settings)?;

    let records = SqliteSyncRecordRepository::new(&db);
    let queue = SqliteWebhookQueueRepository::new(&db);
    let conflicts = SqliteConflictRepository::new(&db);
    let audit = SqliteSyncLogRepository::new(&db);

    let counts = records.status_counts()?;
    let queue_counts = queue.counts()?;
    let unresolved = conflicts.count_unresolved()?;

    if as_json {
        let report = StatusReport {
            total: counts.total,
            pending: counts.pending,
            synced: counts.synced,
            error: counts.error,
            failed: counts.failed,
            conflict: counts.conflict,
            queue_pending: queue_counts.pending,
            queue_processing: queue_counts.processing,
            unresolved_conflicts: unresolved,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Documents tracked: {}", counts.total);
    println!("  Pending:   {}", counts.pending);
    println!("  Synced:    {}", counts.synced);
    println!("  Errors:    {}", counts.error);
    println!("  Failed:    {}", counts.failed);
    println!("  Conflicts: {}", counts.conflict);
    println!(
        "Webhook queue: {} pending, {} processing",
        queue_counts.pending, queue_counts.processing
    );

    let recent = audit.recent(10)?;
    if !recent.is_empty() {
        println!("\nRecent operations:");
        for entry in recent {
            println!(
                "  [{}] {} - {}/{} ({}) {}",
                format_timestamp(entry.timestamp),
                entry.status,
                entry.doctype,
                entry.docname,
                entry.direction,
                entry.message
            );
        }
    }

    if unresolved > 0 {
        println!("\nWARNING: {unresolved} unresolved conflict(s); run `tandem conflicts`");
    }

    Ok(())
}
