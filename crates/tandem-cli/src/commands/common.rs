use std::path::Path;

use chrono::{DateTime, Utc};

use tandem_core::config::SyncSettings;
use tandem_core::db::Database;
use tandem_core::engine::SyncEngine;
use tandem_core::remote::RemoteClient;

use crate::error::CliError;

/// Load settings from `--config` / `TANDEM_CONFIG` / the environment.
pub fn load_settings(config_path: Option<&Path>) -> Result<SyncSettings, CliError> {
    Ok(SyncSettings::load(config_path)?)
}

/// Open (and migrate) the state database named in the settings.
pub fn open_database(settings: &SyncSettings) -> Result<Database, CliError> {
    Ok(Database::open(&settings.db_path)?)
}

/// Construct both remote clients from the settings.
pub fn build_clients(settings: &SyncSettings) -> Result<(RemoteClient, RemoteClient), CliError> {
    let cloud = RemoteClient::new(&settings.cloud, "cloud")?;
    let local = RemoteClient::new(&settings.local, "local")?;
    Ok((cloud, local))
}

/// Construct the sync executor over an already-open database.
pub fn build_engine(settings: &SyncSettings, db: &Database) -> Result<SyncEngine, CliError> {
    let (cloud, local) = build_clients(settings)?;
    Ok(SyncEngine::new(cloud, local, db, settings))
}

/// Render a Unix-ms timestamp for terminal output.
pub fn format_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|timestamp| timestamp.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}
