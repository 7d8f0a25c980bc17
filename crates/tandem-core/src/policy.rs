//! Conflict resolution policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::{doc_modified, parse_modified, Document};
use crate::models::SyncDirection;

/// Configured rule for resolving divergence between the two sides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The side with the newer `modified` timestamp wins; ties go to cloud
    #[default]
    LatestTimestamp,
    /// The cloud document always wins
    CloudWins,
    /// The local document always wins
    LocalWins,
    /// Never auto-resolve; halt the key until an operator intervenes
    Manual,
}

impl ConflictPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LatestTimestamp => "latest_timestamp",
            Self::CloudWins => "cloud_wins",
            Self::LocalWins => "local_wins",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest_timestamp" => Ok(Self::LatestTimestamp),
            "cloud_wins" => Ok(Self::CloudWins),
            "local_wins" => Ok(Self::LocalWins),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown conflict policy: {other}")),
        }
    }
}

/// Outcome of applying a policy to a divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Proceed in `direction`; `resolution` tags the conflict record
    Apply {
        direction: SyncDirection,
        resolution: &'static str,
    },
    /// Halt the key for external resolution
    Manual,
}

/// Decide which side of a divergence wins under `policy`.
///
/// `latest_timestamp` degrades to [`PolicyDecision::Manual`] when either
/// `modified` value is missing or unparseable.
#[must_use]
pub fn decide(policy: ConflictPolicy, cloud: &Document, local: &Document) -> PolicyDecision {
    match policy {
        ConflictPolicy::CloudWins => PolicyDecision::Apply {
            direction: SyncDirection::CloudToLocal,
            resolution: "cloud_wins",
        },
        ConflictPolicy::LocalWins => PolicyDecision::Apply {
            direction: SyncDirection::LocalToCloud,
            resolution: "local_wins",
        },
        ConflictPolicy::Manual => PolicyDecision::Manual,
        ConflictPolicy::LatestTimestamp => {
            let cloud_modified = doc_modified(cloud).and_then(parse_modified);
            let local_modified = doc_modified(local).and_then(parse_modified);
            match (cloud_modified, local_modified) {
                (Some(cloud_at), Some(local_at)) if local_at > cloud_at => PolicyDecision::Apply {
                    direction: SyncDirection::LocalToCloud,
                    resolution: "local_wins_by_timestamp",
                },
                (Some(_), Some(_)) => PolicyDecision::Apply {
                    direction: SyncDirection::CloudToLocal,
                    resolution: "cloud_wins_by_timestamp",
                },
                _ => PolicyDecision::Manual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(modified: &str) -> Document {
        json!({"name": "C1", "modified": modified})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn latest_timestamp_picks_the_newer_side() {
        let cloud = doc("2025-01-02 09:00:00");
        let local = doc("2025-01-02 10:00:00");
        assert_eq!(
            decide(ConflictPolicy::LatestTimestamp, &cloud, &local),
            PolicyDecision::Apply {
                direction: SyncDirection::LocalToCloud,
                resolution: "local_wins_by_timestamp",
            }
        );
        assert_eq!(
            decide(ConflictPolicy::LatestTimestamp, &local, &cloud),
            PolicyDecision::Apply {
                direction: SyncDirection::CloudToLocal,
                resolution: "cloud_wins_by_timestamp",
            }
        );
    }

    #[test]
    fn latest_timestamp_ties_go_to_cloud() {
        let cloud = doc("2025-01-02 09:00:00");
        let local = doc("2025-01-02 09:00:00");
        assert_eq!(
            decide(ConflictPolicy::LatestTimestamp, &cloud, &local),
            PolicyDecision::Apply {
                direction: SyncDirection::CloudToLocal,
                resolution: "cloud_wins_by_timestamp",
            }
        );
    }

    #[test]
    fn latest_timestamp_without_parseable_times_goes_manual() {
        let cloud = doc("garbage");
        let local = doc("2025-01-02 10:00:00");
        assert_eq!(
            decide(ConflictPolicy::LatestTimestamp, &cloud, &local),
            PolicyDecision::Manual
        );

        let missing: Document = json!({"name": "C1"}).as_object().cloned().unwrap();
        assert_eq!(
            decide(ConflictPolicy::LatestTimestamp, &missing, &local),
            PolicyDecision::Manual
        );
    }

    #[test]
    fn fixed_policies_ignore_timestamps() {
        let cloud = doc("2025-01-01 00:00:00");
        let local = doc("2025-06-01 00:00:00");
        assert_eq!(
            decide(ConflictPolicy::CloudWins, &cloud, &local),
            PolicyDecision::Apply {
                direction: SyncDirection::CloudToLocal,
                resolution: "cloud_wins",
            }
        );
        assert_eq!(
            decide(ConflictPolicy::LocalWins, &cloud, &local),
            PolicyDecision::Apply {
                direction: SyncDirection::LocalToCloud,
                resolution: "local_wins",
            }
        );
        assert_eq!(decide(ConflictPolicy::Manual, &cloud, &local), PolicyDecision::Manual);
    }

    #[test]
    fn policy_parses_from_config_strings() {
        assert_eq!(
            "latest_timestamp".parse::<ConflictPolicy>(),
            Ok(ConflictPolicy::LatestTimestamp)
        );
        assert_eq!("manual".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Manual));
        assert!("newest".parse::<ConflictPolicy>().is_err());
    }
}
