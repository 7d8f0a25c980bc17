use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;

use tandem_core::db::{SqliteSyncRecordRepository, SyncRecordRepository};
use tandem_server::{serve, AppState, QueueWorker};

use crate::commands::common::{build_engine, load_settings, open_database};
use crate::error::CliError;

/// Run the webhook intake server and one queue worker until ctrl-c.
pub async fn run_webhook(config_path: Option<&Path>) -> Result<(), CliError> {
    let settings = load_settings(config_path)?;
    let db = open_database(&settings)?;

    // Any persisted claim at startup belongs to a previous process.
    SqliteSyncRecordRepository::new(&db).clear_stale_claims()?;

    let engine = Arc::new(build_engine(&settings, &db)?);
    let worker = QueueWorker::new(Arc::clone(&engine), &db, &settings);
    let state = AppState::new(&db, &settings.webhook.secret, &settings.webhook.signature_header);

    let bind_addr = settings.webhook_bind_addr();
    println!("Webhook endpoints:");
    println!("  cloud -> http://{bind_addr}/webhook/cloud");
    println!("  local -> http://{bind_addr}/webhook/local");
    println!("  health -> http://{bind_addr}/health");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_shutdown = shutdown_rx.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_shutdown).await });

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = signal_tx.send(true);
        }
    });

    serve(state, &bind_addr, shutdown_rx).await?;

    // The server is down; make sure the worker stops too.
    let _ = shutdown_tx.send(true);
    if let Err(error) = worker_handle.await {
        tracing::error!(%error, "worker task ended abnormally");
    }

    Ok(())
}
