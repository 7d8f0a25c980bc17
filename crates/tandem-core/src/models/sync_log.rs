//! Append-only audit log model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::SyncDirection;

/// What kind of write (or non-write) an audit row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Create,
    Update,
    Delete,
    Skip,
}

impl LogAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for LogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown log action: {other}")),
        }
    }
}

/// Outcome recorded in an audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Success,
    Failed,
    Conflict,
    Skipped,
}

impl LogStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Conflict => "conflict",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "conflict" => Ok(Self::Conflict),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown log status: {other}")),
        }
    }
}

/// One append-only audit row per executor operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// Row identifier
    pub id: i64,
    /// When the operation finished (Unix ms)
    pub timestamp: i64,
    pub doctype: String,
    pub docname: String,
    pub action: LogAction,
    pub direction: SyncDirection,
    pub status: LogStatus,
    /// Human-readable operation detail
    pub message: String,
}
