//! tandem-core - Core library for Tandem
//!
//! This crate contains the shared models, state store, direction resolver,
//! conflict policy, remote document clients, and the sync executor used by
//! the Tandem server and CLI.

pub mod config;
pub mod db;
pub mod document;
pub mod engine;
pub mod error;
pub mod models;
pub mod policy;
pub mod remote;
pub mod resolver;
pub mod util;

pub use config::{ConfigError, SyncSettings};
pub use engine::{Outcome, Summary, SyncEngine};
pub use error::{Error, Result};
pub use models::{ConflictRecord, SyncLogEntry, SyncRecord, WebhookEvent, WebhookQueueItem};
pub use policy::ConflictPolicy;
pub use remote::{RemoteClient, RemoteError};
