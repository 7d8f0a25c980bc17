use std::path::Path;

use tandem_core::engine::{Outcome, Summary};

use crate::cli::DirectionArg;
use crate::commands::common::{build_engine, load_settings, open_database};
use crate::error::CliError;

pub async fn run_sync(
    doctype: Option<&str>,
    docname: Option<&str>,
    direction: DirectionArg,
    limit: Option<usize>,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    let settings = load_settings(config_path)?;
    let db = open_database(&settings)?;
    let engine = build_engine(&settings, &db)?;

    match (doctype, docname) {
        (Some(doctype), Some(docname)) => {
            let outcome = engine.sync_one(doctype, docname, direction.hint()).await;
            match outcome {
                Outcome::Synced(direction) => {
                    println!("[OK] {doctype}/{docname} synced ({direction})");
                    Ok(())
                }
                Outcome::Skipped(reason) => {
                    println!("[SKIP] {doctype}/{docname}: {reason}");
                    Ok(())
                }
                Outcome::Conflict => {
                    println!(
                        "[CONFLICT] {doctype}/{docname}: divergence recorded; see `tandem conflicts`"
                    );
                    Ok(())
                }
                Outcome::Failed(error) => Err(CliError::SyncFailed(error.to_string())),
            }
        }
        (Some(doctype), None) => {
            println!("Syncing all {doctype} documents...");
            let summary = engine.sync_doctype(doctype, limit).await?;
            print_summary(&summary);
            Ok(())
        }
        _ => {
            println!("Syncing all configured doctypes...");
            let summary = engine.sync_all(limit).await;
            print_summary(&summary);
            Ok(())
        }
    }
}

fn print_summary(summary: &Summary) {
    println!("Total: {}", summary.total);
    println!("  Synced:    {}", summary.synced);
    println!("  Skipped:   {}", summary.skipped);
    println!("  Conflicts: {}", summary.conflicts);
    println!("  Failed:    {}", summary.failed);
}
