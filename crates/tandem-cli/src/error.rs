use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tandem_core::Error),
    #[error(transparent)]
    Remote(#[from] tandem_core::RemoteError),
    #[error("Configuration error: {0}")]
    Config(#[from] tandem_core::ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Connection test failed: {0}")]
    Connectivity(String),
    #[error("Sync failed: {0}")]
    SyncFailed(String),
}

impl CliError {
    /// Process exit code: 0 success, 1 generic, 2 configuration,
    /// 3 connectivity.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Connectivity(_) => 3,
            _ => 1,
        }
    }
}
