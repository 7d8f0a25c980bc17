//! tandem-server - Webhook intake and queue worker for Tandem
//!
//! The HTTP surface authenticates change notifications and defers all sync
//! work to the durable queue; the worker drains that queue through the
//! executor. Both are libraries here; their lifecycle is owned by the
//! process entry point (the `tandem webhook` command).

pub mod error;
pub mod payload;
pub mod routes;
pub mod signature;
pub mod worker;

use tokio::sync::watch;

pub use error::AppError;
pub use routes::{app_router, AppState};
pub use worker::QueueWorker;

/// Serve the intake router until the shutdown signal fires.
pub async fn serve(
    state: AppState,
    bind_addr: &str,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("webhook intake listening on {bind_addr}");
    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}
