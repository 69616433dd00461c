//! # Conflict Reconciliation
//!
//! Decides who wins when a queued local mutation and the remote disagree
//! about a record's version.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Conflict Resolution Flow                             │
//! │                                                                         │
//! │  push: update(id, draft, expected_version = 3)                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  remote: VersionConflict { current: 5 }                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  policy.resolve(conflict) ──► AcceptLocal   retarget and resend the     │
//! │                           │                 local draft at version 5    │
//! │                           ├► AcceptRemote   drop the mutation, pull     │
//! │                           │                 wins; local cache follows   │
//! │                           └► Manual         park the mutation and       │
//! │                                             surface to the caller       │
//! │                                                                         │
//! │  Conflicts are never resolved silently: every resolution is logged      │
//! │  and Manual ones are queryable until someone decides.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use curio_core::{CatalogRecord, MutationPayload};
use tracing::debug;

/// A detected version conflict, carrying both sides.
#[derive(Debug, Clone)]
pub struct VersionConflict {
    /// Remote id of the contested record.
    pub entity_id: String,
    /// Queue row that hit the conflict.
    pub sequence_id: i64,
    /// The local mutation that was rejected.
    pub local: MutationPayload,
    /// The record as the remote currently holds it.
    pub remote: CatalogRecord,
}

/// Outcome of a reconciliation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Resend the local mutation against the remote's current version.
    AcceptLocal,
    /// Drop the local mutation; the remote state stands.
    AcceptRemote,
    /// Don't decide automatically; hold the mutation for a human.
    Manual,
}

/// Strategy for deciding conflicts. Pure and synchronous so policies stay
/// trivially testable.
pub trait ReconcilePolicy: Send + Sync {
    fn resolve(&self, conflict: &VersionConflict) -> Resolution;
}

// =============================================================================
// Built-in Policies
// =============================================================================

/// Newest wall-clock timestamp wins. The default.
///
/// Ties go to the remote: with equal timestamps there is no basis to claim
/// the local edit is newer, and deferring to the remote keeps every device
/// converging on the same answer.
///
/// Wall clocks skew across devices, so "newest" is approximate. Deployments
/// that can't tolerate that use [`ManualOnly`] or a custom policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriteWins;

impl ReconcilePolicy for LastWriteWins {
    fn resolve(&self, conflict: &VersionConflict) -> Resolution {
        let local_at = conflict.local.modified_at();
        let remote_at = conflict.remote.last_modified_at;

        let resolution = if local_at > remote_at {
            Resolution::AcceptLocal
        } else {
            Resolution::AcceptRemote
        };

        debug!(
            entity_id = %conflict.entity_id,
            local_at = %local_at,
            remote_at = %remote_at,
            ?resolution,
            "Resolved version conflict by last-write-wins"
        );
        resolution
    }
}

/// Never decides automatically; every conflict waits for a human.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualOnly;

impl ReconcilePolicy for ManualOnly {
    fn resolve(&self, _conflict: &VersionConflict) -> Resolution {
        Resolution::Manual
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use curio_core::RecordDraft;

    fn conflict_with_offsets(local_offset_secs: i64, remote_offset_secs: i64) -> VersionConflict {
        let base = Utc::now();
        VersionConflict {
            entity_id: "srv-1".to_string(),
            sequence_id: 1,
            local: MutationPayload::Update {
                draft: RecordDraft::named("local edit"),
                expected_version: 3,
                modified_at: base + Duration::seconds(local_offset_secs),
                modified_by: "device-a".to_string(),
            },
            remote: CatalogRecord {
                id: "srv-1".to_string(),
                name: "remote edit".to_string(),
                description: None,
                attributes: serde_json::json!({}),
                image_url: None,
                version: 5,
                last_modified_at: base + Duration::seconds(remote_offset_secs),
                last_modified_by: "device-b".to_string(),
                deleted: false,
            },
        }
    }

    #[test]
    fn test_newer_local_wins() {
        let conflict = conflict_with_offsets(10, 0);
        assert_eq!(LastWriteWins.resolve(&conflict), Resolution::AcceptLocal);
    }

    #[test]
    fn test_newer_remote_wins() {
        let conflict = conflict_with_offsets(0, 10);
        assert_eq!(LastWriteWins.resolve(&conflict), Resolution::AcceptRemote);
    }

    #[test]
    fn test_ties_go_to_remote() {
        let conflict = conflict_with_offsets(0, 0);
        assert_eq!(LastWriteWins.resolve(&conflict), Resolution::AcceptRemote);
    }

    #[test]
    fn test_manual_only_never_decides() {
        let conflict = conflict_with_offsets(100, 0);
        assert_eq!(ManualOnly.resolve(&conflict), Resolution::Manual);
    }
}
