//! Tandem CLI - bidirectional document sync between two remote endpoints
//!
//! The core engine, state store, and webhook server live in tandem-core and
//! tandem-server; this binary wires configuration to them.

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(error.exit_code());
    }
}

async fn run() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tandem=info".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init => commands::init::run_init(config_path)?,
        Commands::Test => commands::test::run_test(config_path).await?,
        Commands::Sync {
            doctype,
            docname,
            direction,
            limit,
        } => {
            commands::sync::run_sync(
                doctype.as_deref(),
                docname.as_deref(),
                direction,
                limit,
                config_path,
            )
            .await?;
        }
        Commands::Status { json } => commands::status::run_status(json, config_path)?,
        Commands::Conflicts { limit, json } => {
            commands::conflicts::run_conflicts(limit, json, config_path)?;
        }
        Commands::Webhook => commands::webhook::run_webhook(config_path).await?,
        Commands::SetupWebhook => commands::setup_webhook::run_setup_webhook(config_path)?,
    }

    Ok(())
}
