//! Change-detection and direction resolution.
//!
//! Pure decisions over the canonical hashes of both sides and the persisted
//! sync record. Absent documents hash to the empty string.

use crate::models::SyncDirection;

/// What the executor should do with a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Document absent on both sides; nothing to do
    Skip,
    /// Hashes match the last synced state on both sides
    Unchanged,
    /// Cloud changed (or local is absent); copy cloud onto local
    CloudToLocal,
    /// Local changed (or cloud is absent); copy local onto cloud
    LocalToCloud,
    /// Both sides diverged from the last synced state
    Conflict,
}

impl Resolution {
    /// The write direction this resolution implies, if any.
    #[must_use]
    pub const fn direction(self) -> Option<SyncDirection> {
        match self {
            Self::CloudToLocal => Some(SyncDirection::CloudToLocal),
            Self::LocalToCloud => Some(SyncDirection::LocalToCloud),
            Self::Skip | Self::Unchanged | Self::Conflict => None,
        }
    }
}

/// Decide the sync direction for one key.
///
/// `cloud_hash` and `local_hash` are the canonical hashes of the current
/// documents (empty string when the document is absent);
/// `recorded_cloud_hash` and `recorded_local_hash` come from the sync record
/// (empty string when the side has never been observed).
#[must_use]
pub fn resolve(
    cloud_hash: &str,
    local_hash: &str,
    recorded_cloud_hash: &str,
    recorded_local_hash: &str,
) -> Resolution {
    match (cloud_hash.is_empty(), local_hash.is_empty()) {
        (true, true) => Resolution::Skip,
        (false, true) => Resolution::CloudToLocal,
        (true, false) => Resolution::LocalToCloud,
        (false, false) => {
            let cloud_changed = cloud_hash != recorded_cloud_hash;
            let local_changed = local_hash != recorded_local_hash;
            match (cloud_changed, local_changed) {
                (false, false) => Resolution::Unchanged,
                (true, false) => Resolution::CloudToLocal,
                (false, true) => Resolution::LocalToCloud,
                (true, true) => Resolution::Conflict,
            }
        }
    }
}

/// Apply a webhook- or caller-supplied direction hint.
///
/// The hint is accepted only when it agrees with the decision table, so a
/// spurious or replayed webhook can never force a wrong-direction write; the
/// table always wins.
#[must_use]
pub fn resolve_with_hint(
    cloud_hash: &str,
    local_hash: &str,
    recorded_cloud_hash: &str,
    recorded_local_hash: &str,
    hint: Option<SyncDirection>,
) -> Resolution {
    let resolved = resolve(cloud_hash, local_hash, recorded_cloud_hash, recorded_local_hash);
    if let Some(hint) = hint {
        if resolved.direction() != Some(hint) {
            tracing::debug!(
                hint = %hint,
                resolved = ?resolved,
                "direction hint inconsistent with decision table; table wins"
            );
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_absent_is_skip() {
        assert_eq!(resolve("", "", "", ""), Resolution::Skip);
    }

    #[test]
    fn one_sided_presence_creates_on_the_other_side() {
        assert_eq!(resolve("abc", "", "", ""), Resolution::CloudToLocal);
        assert_eq!(resolve("", "abc", "", ""), Resolution::LocalToCloud);
    }

    #[test]
    fn matching_hashes_are_unchanged() {
        assert_eq!(resolve("abc", "def", "abc", "def"), Resolution::Unchanged);
    }

    #[test]
    fn single_side_drift_follows_the_changed_side() {
        assert_eq!(resolve("NEW", "def", "abc", "def"), Resolution::CloudToLocal);
        assert_eq!(resolve("abc", "NEW", "abc", "def"), Resolution::LocalToCloud);
    }

    #[test]
    fn double_drift_is_a_conflict() {
        assert_eq!(resolve("NEW1", "NEW2", "abc", "def"), Resolution::Conflict);
    }

    #[test]
    fn first_observation_of_both_sides_is_a_conflict() {
        // Neither side has ever been recorded; we cannot prove agreement.
        assert_eq!(resolve("abc", "def", "", ""), Resolution::Conflict);
    }

    #[test]
    fn consistent_hint_is_accepted() {
        let resolved = resolve_with_hint("NEW", "def", "abc", "def", Some(SyncDirection::CloudToLocal));
        assert_eq!(resolved, Resolution::CloudToLocal);
    }

    #[test]
    fn inconsistent_hint_is_overridden_by_the_table() {
        // A cloud webhook arrives for a key where only local actually changed.
        let resolved = resolve_with_hint("abc", "NEW", "abc", "def", Some(SyncDirection::CloudToLocal));
        assert_eq!(resolved, Resolution::LocalToCloud);

        // An unchanged key stays unchanged regardless of the hint.
        let resolved = resolve_with_hint("abc", "def", "abc", "def", Some(SyncDirection::LocalToCloud));
        assert_eq!(resolved, Resolution::Unchanged);
    }
}
