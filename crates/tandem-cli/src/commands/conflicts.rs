use std::path::Path;

use serde::Serialize;

use tandem_core::db::{ConflictRepository, SqliteConflictRepository};

use crate::commands::common::{format_timestamp, load_settings, open_database};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct ConflictItem {
    id: i64,
    doctype: String,
    docname: String,
    cloud_modified: Option<String>,
    local_modified: Option<String>,
    detected_at: String,
}

pub fn run_conflicts(limit: usize, as_json: bool, config_path: Option<&Path>) -> Result<(), CliError> {
    let settings = load_settings(config_path)?;
    let db = open_database(&settings)?;
    let repo = SqliteConflictRepository::new(&db);

    let conflicts = repo.list_unresolved(limit)?;

    if as_json {
        let items: Vec<ConflictItem> = conflicts
            .iter()
            .map(|conflict| ConflictItem {
                id: conflict.id,
                doctype: conflict.doctype.clone(),
                docname: conflict.docname.clone(),
                cloud_modified: conflict.cloud_modified.clone(),
                local_modified: conflict.local_modified.clone(),
                detected_at: format_timestamp(conflict.created_at),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No unresolved conflicts");
        return Ok(());
    }

    println!("Unresolved conflicts: {}", conflicts.len());
    for (index, conflict) in conflicts.iter().enumerate() {
        println!(
            "{}. {}/{} (detected {})",
            index + 1,
            conflict.doctype,
            conflict.docname,
            format_timestamp(conflict.created_at)
        );
        println!(
            "   cloud modified: {}",
            conflict.cloud_modified.as_deref().unwrap_or("unknown")
        );
        println!(
            "   local modified: {}",
            conflict.local_modified.as_deref().unwrap_or("unknown")
        );
    }

    Ok(())
}
