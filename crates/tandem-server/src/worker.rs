//! Background queue worker.
//!
//! Pulls webhook queue items in FIFO order and drives the sync executor.
//! The worker is an explicit long-running task owned by the process entry
//! point, with a watch-channel shutdown signal observed between items.
//! Multiple workers may run; correctness rests on the executor's per-key
//! serialization, not on worker exclusivity.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use tandem_core::config::SyncSettings;
use tandem_core::db::{Database, SqliteWebhookQueueRepository, WebhookQueueRepository};
use tandem_core::engine::{Outcome, SyncEngine};
use tandem_core::models::{Source, SyncDirection, WebhookQueueItem};

/// Claims older than this are treated as abandoned by a dead worker.
const STALE_CLAIM_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How often the sweeper runs relative to the poll loop.
const SWEEP_EVERY_TICKS: u32 = 30;

pub struct QueueWorker {
    engine: Arc<SyncEngine>,
    queue: SqliteWebhookQueueRepository,
    poll_interval: Duration,
    claim_batch: usize,
    max_retries: i64,
    retention: Duration,
}

impl QueueWorker {
    /// Build a worker over the shared store and executor.
    #[must_use]
    pub fn new(engine: Arc<SyncEngine>, db: &Database, settings: &SyncSettings) -> Self {
        Self {
            engine,
            queue: SqliteWebhookQueueRepository::new(db),
            poll_interval: settings.worker.poll_interval(),
            claim_batch: settings.worker.claim_batch,
            max_retries: settings.retry.max_attempts,
            retention: Duration::from_secs(settings.queue_retention_days as u64 * 86_400),
        }
    }

    /// Run until the shutdown signal fires.
    ///
    /// An in-flight item finishes before the loop exits; anything still
    /// claimed at shutdown is reclaimed by the next startup's sweeper.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            claim_batch = self.claim_batch,
            "queue worker started"
        );

        let mut ticks = 0u32;
        loop {
            if *shutdown.borrow() {
                break;
            }

            if ticks % SWEEP_EVERY_TICKS == 0 {
                self.sweep();
            }
            ticks = ticks.wrapping_add(1);

            match self.process_batch(&shutdown).await {
                Ok(0) => {
                    // Idle; wait for the next poll or for shutdown.
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                Ok(processed) => {
                    tracing::debug!(processed, "processed webhook batch");
                }
                Err(error) => {
                    tracing::error!(%error, "queue worker iteration failed");
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        tracing::info!("queue worker stopped");
    }

    /// Claim one batch and process it; returns how many items were handled.
    ///
    /// Public so callers (and tests) can drain the queue without the loop.
    pub async fn process_batch(
        &self,
        shutdown: &watch::Receiver<bool>,
    ) -> tandem_core::Result<usize> {
        let items = self.queue.claim_batch(self.claim_batch)?;
        let mut handled = 0;

        for item in items {
            if *shutdown.borrow() {
                // Leave the rest claimed; the stale sweeper will reclaim
                // them if we never come back.
                break;
            }
            self.process_item(&item).await?;
            handled += 1;
        }

        Ok(handled)
    }

    async fn process_item(&self, item: &WebhookQueueItem) -> tandem_core::Result<()> {
        let hint = match item.source {
            Source::Cloud => SyncDirection::CloudToLocal,
            Source::Local => SyncDirection::LocalToCloud,
        };

        tracing::info!(
            id = item.id,
            source = %item.source,
            doctype = %item.doctype,
            docname = %item.docname,
            "processing webhook"
        );

        let outcome = self
            .engine
            .sync_one(&item.doctype, &item.docname, Some(hint))
            .await;

        match outcome {
            Outcome::Synced(direction) => {
                tracing::info!(id = item.id, %direction, "webhook synced");
                self.queue.mark_processed(item.id)
            }
            Outcome::Skipped(reason) => {
                tracing::debug!(id = item.id, %reason, "webhook skipped");
                self.queue.mark_processed(item.id)
            }
            Outcome::Conflict => {
                // The divergence is recorded on the sync record and in the
                // conflict table; the queue item itself is done.
                tracing::warn!(id = item.id, "webhook ended in conflict");
                self.queue.mark_processed(item.id)
            }
            Outcome::Failed(error) => {
                tracing::warn!(id = item.id, %error, "webhook sync failed");
                self.queue
                    .mark_failed(item.id, &error.to_string(), self.max_retries)
            }
        }
    }

    /// Reclaim abandoned claims and purge old processed rows.
    fn sweep(&self) {
        if let Err(error) = self.queue.reclaim_stale(STALE_CLAIM_TIMEOUT) {
            tracing::error!(%error, "stale claim sweep failed");
        }
        match self.queue.purge_processed(self.retention) {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, "purged processed queue rows"),
            Err(error) => tracing::error!(%error, "queue retention purge failed"),
        }
    }
}
