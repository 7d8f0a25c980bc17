//! Error types for tandem-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using tandem-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tandem-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// State store error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Remote endpoint error
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
