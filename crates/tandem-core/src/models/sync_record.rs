//! Per-key sync state model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Direction of a completed or chosen sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// No write needed
    None,
    /// Cloud document copied onto the local endpoint
    CloudToLocal,
    /// Local document copied onto the cloud endpoint
    LocalToCloud,
}

impl SyncDirection {
    /// Stable string form used for persistence and logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::CloudToLocal => "cloud_to_local",
            Self::LocalToCloud => "local_to_cloud",
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "cloud_to_local" => Ok(Self::CloudToLocal),
            "local_to_cloud" => Ok(Self::LocalToCloud),
            other => Err(format!("unknown sync direction: {other}")),
        }
    }
}

/// Lifecycle status of a sync record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Observed but never synced
    Pending,
    /// Last executor run left both sides in agreement
    Synced,
    /// Last run failed; retried on the next opportunity
    Error,
    /// Retry limit exhausted; requires manual intervention
    Failed,
    /// Divergence awaiting resolution
    Conflict,
}

impl SyncStatus {
    /// Stable string form used for persistence and logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Error => "error",
            Self::Failed => "failed",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "error" => Ok(Self::Error),
            "failed" => Ok(Self::Failed),
            "conflict" => Ok(Self::Conflict),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// Persistent sync state for one (doctype, docname) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Row identifier
    pub id: i64,
    /// Document class on the remote endpoints
    pub doctype: String,
    /// Unique document identifier within its doctype
    pub docname: String,
    /// Canonical hash of the cloud document at last observation, empty if never seen
    pub cloud_hash: String,
    /// Canonical hash of the local document at last observation, empty if never seen
    pub local_hash: String,
    /// Raw `modified` value last observed on the cloud side
    pub cloud_modified: Option<String>,
    /// Raw `modified` value last observed on the local side
    pub local_modified: Option<String>,
    /// When the executor last recorded a successful state (Unix ms)
    pub last_synced: Option<i64>,
    /// Direction of the last successful sync
    pub last_direction: SyncDirection,
    /// True only while an executor operation holds this key
    pub is_syncing: bool,
    /// Lifecycle status
    pub status: SyncStatus,
    /// Last error message, cleared on success
    pub error_message: Option<String>,
    /// Consecutive error exits since the last success
    pub retry_count: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}
