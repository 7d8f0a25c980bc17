//! Conflict record model

use serde::{Deserialize, Serialize};

/// Persistent audit of one divergence event.
///
/// Written whenever the resolver detects that both sides changed since the
/// last synced state, whether or not the active policy auto-resolved it.
/// Never silently deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Row identifier
    pub id: i64,
    pub doctype: String,
    pub docname: String,
    /// Full JSON snapshot of the cloud document at detection time
    pub cloud_data: String,
    /// Full JSON snapshot of the local document at detection time
    pub local_data: String,
    /// Raw `modified` value of the cloud document
    pub cloud_modified: Option<String>,
    /// Raw `modified` value of the local document
    pub local_modified: Option<String>,
    /// Whether the divergence has been resolved (automatically or externally)
    pub resolved: bool,
    /// Which side won, e.g. `local_wins_by_timestamp`
    pub resolution: Option<String>,
    /// When the divergence was resolved (Unix ms)
    pub resolved_at: Option<i64>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}
