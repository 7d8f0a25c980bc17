use std::path::Path;

use crate::commands::common::{load_settings, open_database};
use crate::error::CliError;

pub fn run_init(config_path: Option<&Path>) -> Result<(), CliError> {
    let settings = load_settings(config_path)?;
    open_database(&settings)?;
    println!("State database initialized at {}", settings.db_path.display());
    Ok(())
}
