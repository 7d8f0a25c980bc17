//! Webhook queue models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which endpoint emitted a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Cloud,
    Local,
}

impl Source {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cloud" => Ok(Self::Cloud),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown webhook source: {other}")),
        }
    }
}

/// Change kind reported by a webhook emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAction {
    Create,
    Update,
    Delete,
}

impl WebhookAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Map an emitter-supplied action string; anything unrecognized is
    /// treated as an update.
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "create" | "after_insert" => Self::Create,
            "delete" | "after_delete" | "on_trash" => Self::Delete,
            _ => Self::Update,
        }
    }
}

impl fmt::Display for WebhookAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown webhook action: {other}")),
        }
    }
}

/// A parsed webhook notification, extracted once at intake.
///
/// Downstream components never re-parse the raw payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub source: Source,
    pub doctype: String,
    pub docname: String,
    pub action: WebhookAction,
    /// Raw request payload as received (JSON text)
    pub raw: String,
}

/// A durable queue row backing a [`WebhookEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookQueueItem {
    /// Row identifier
    pub id: i64,
    pub source: Source,
    pub doctype: String,
    pub docname: String,
    pub action: WebhookAction,
    /// Raw payload as received
    pub payload: String,
    /// Set once the item has been handled (or parked after too many retries)
    pub processed: bool,
    /// Set while a worker holds a claim on the item
    pub processing: bool,
    /// Enqueue timestamp (Unix ms)
    pub created_at: i64,
    /// Completion timestamp (Unix ms)
    pub processed_at: Option<i64>,
    /// Failed processing attempts so far
    pub retry_count: i64,
    /// Last processing error
    pub error_message: Option<String>,
}
