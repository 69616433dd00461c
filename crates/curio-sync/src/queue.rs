//! # Mutation Queue Manager
//!
//! Owns the durable pending-mutation queue: enqueue on local write, drain
//! in order on sync, park after repeated failure.
//!
//! ## Drain Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Queue Drain Pass                                │
//! │                                                                         │
//! │  for mutation in queue (oldest first, global insertion order):          │
//! │                                                                         │
//! │    cancelled?            → stop, leave the rest queued (skipped)        │
//! │    parked (Failed)?      → skip, needs an explicit retry                │
//! │                                                                         │
//! │    apply(mutation):                                                     │
//! │      Applied             → delete row                      (applied)    │
//! │      Superseded          → delete row, remote already won  (discarded)  │
//! │      Err(Conflict)       → retry_count += 1, continue      (conflicts)  │
//! │      Err(anything else)  → retry_count += 1, continue      (failed)     │
//! │                                                                         │
//! │  One failing entry never blocks the rest of the queue. Per-entity       │
//! │  replay order still holds because iteration is global insertion order   │
//! │  and a failed entry keeps its place for the next pass.                  │
//! │                                                                         │
//! │  Before a drain, delete mutations aimed at a `local-` id cancel out     │
//! │  against their own queued create: the record never reached the remote,  │
//! │  so the whole entity's queue is dropped without any network call.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::error::SyncResult;
use curio_core::{
    is_local_id, MutationAction, MutationPayload, MutationState, PendingMutation,
    RECORD_ENTITY_TYPE,
};
use curio_db::Database;

// =============================================================================
// Applier Seam
// =============================================================================

/// Result of replaying one mutation against the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The remote accepted the mutation.
    Applied,
    /// The mutation is moot (remote already deleted the record, or a
    /// conflict was resolved in the remote's favor). Drop it without replay.
    Superseded,
}

/// Replays a single queued mutation. Implemented by the synchronizer;
/// tests plug in scripted appliers.
#[async_trait]
pub trait MutationApplier: Send + Sync {
    async fn apply(&self, mutation: &PendingMutation) -> SyncResult<ApplyOutcome>;
}

// =============================================================================
// Drain Report
// =============================================================================

/// Tally of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Mutations accepted by the remote.
    pub applied: usize,
    /// Mutations that failed this pass (error recorded, still queued).
    pub failed: usize,
    /// Mutations not attempted (parked or cancelled).
    pub skipped: usize,
    /// Mutations that hit a version conflict this pass.
    pub conflicts: usize,
    /// Mutations dropped without replay (superseded or cancelled out).
    pub discarded: usize,
}

impl DrainReport {
    /// True when nothing was left behind.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.conflicts == 0 && self.skipped == 0
    }
}

// =============================================================================
// Queue Manager
// =============================================================================

/// Durable mutation queue with ordered, cancellable drain.
#[derive(Clone)]
pub struct MutationQueue {
    db: Database,
    retry_ceiling: u32,
}

impl MutationQueue {
    pub fn new(db: Database, retry_ceiling: u32) -> Self {
        MutationQueue { db, retry_ceiling }
    }

    /// Appends a mutation for a record.
    pub async fn enqueue(
        &self,
        entity_id: &str,
        payload: &MutationPayload,
    ) -> SyncResult<PendingMutation> {
        let mutation = self
            .db
            .mutations()
            .enqueue(RECORD_ENTITY_TYPE, entity_id, payload)
            .await?;
        Ok(mutation)
    }

    /// Drops every queued mutation for an entity.
    pub async fn discard_for_entity(&self, entity_id: &str) -> SyncResult<u64> {
        let removed = self.db.mutations().remove_for_entity(entity_id).await?;
        if removed > 0 {
            debug!(entity_id = %entity_id, removed, "Discarded queued mutations");
        }
        Ok(removed)
    }

    /// Cancels out create/delete pairs that never reached the remote.
    ///
    /// A Delete aimed at a `local-` id means the create that introduced the
    /// id is still sitting earlier in this same queue. Replaying either
    /// would be wasted (or wrong) remote traffic, so the entity's entire
    /// queue is dropped. Returns the number of mutations removed.
    pub async fn discard_local_tombstones(&self) -> SyncResult<u64> {
        let pending = self.db.mutations().list_pending().await?;

        let mut removed = 0;
        for mutation in &pending {
            if mutation.action == MutationAction::Delete && is_local_id(&mutation.entity_id) {
                removed += self.discard_for_entity(&mutation.entity_id).await?;
            }
        }

        if removed > 0 {
            info!(removed, "Cancelled out never-synced create/delete pairs");
        }
        Ok(removed)
    }

    /// Mutations still eligible for replay.
    pub async fn pending_count(&self) -> SyncResult<i64> {
        Ok(self.db.mutations().count_pending(self.retry_ceiling).await?)
    }

    /// Mutations parked at the retry ceiling.
    pub async fn failed_count(&self) -> SyncResult<i64> {
        Ok(self.db.mutations().count_failed(self.retry_ceiling).await?)
    }

    /// Un-parks every failed mutation. Returns how many were reset.
    pub async fn reset_failed(&self) -> SyncResult<u64> {
        let reset = self.db.mutations().reset_failed(self.retry_ceiling).await?;
        if reset > 0 {
            info!(reset, "Reset failed mutations for retry");
        }
        Ok(reset)
    }

    /// Replays queued mutations in order through `applier`.
    ///
    /// `cancel` is checked between mutations; setting it stops the pass
    /// without losing anything (unattempted mutations stay queued).
    pub async fn drain(
        &self,
        applier: &dyn MutationApplier,
        cancel: &AtomicBool,
    ) -> SyncResult<DrainReport> {
        let pending = self.db.mutations().list_pending().await?;
        if pending.is_empty() {
            return Ok(DrainReport::default());
        }

        info!(queued = pending.len(), "Draining mutation queue");

        let mut report = DrainReport::default();

        for (idx, snapshot) in pending.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                debug!("Drain cancelled");
                report.skipped += pending.len() - idx;
                break;
            }

            // An earlier replay in this same pass may have rekeyed this row
            // (create translating a `local-` id) or removed it outright, so
            // the snapshot is stale by now. Re-read the row and apply what
            // is actually queued.
            let mutation = match self.db.mutations().get(snapshot.sequence_id).await? {
                Some(current) => current,
                None => continue,
            };

            if mutation.state(self.retry_ceiling) == MutationState::Failed {
                report.skipped += 1;
                continue;
            }

            match applier.apply(&mutation).await {
                Ok(ApplyOutcome::Applied) => {
                    self.db.mutations().remove(mutation.sequence_id).await?;
                    report.applied += 1;
                }
                Ok(ApplyOutcome::Superseded) => {
                    debug!(
                        sequence_id = mutation.sequence_id,
                        entity_id = %mutation.entity_id,
                        "Mutation superseded by remote state"
                    );
                    self.db.mutations().remove(mutation.sequence_id).await?;
                    report.discarded += 1;
                }
                Err(err) => {
                    warn!(
                        sequence_id = mutation.sequence_id,
                        entity_id = %mutation.entity_id,
                        error = %err,
                        "Mutation replay failed"
                    );
                    self.db
                        .mutations()
                        .record_failure(mutation.sequence_id, &err.to_string())
                        .await?;
                    if err.is_conflict() {
                        report.conflicts += 1;
                    } else {
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            applied = report.applied,
            failed = report.failed,
            skipped = report.skipped,
            conflicts = report.conflicts,
            discarded = report.discarded,
            "Drain pass complete"
        );
        Ok(report)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use chrono::Utc;
    use curio_core::RecordDraft;
    use curio_db::DbConfig;
    use std::sync::Mutex;

    fn create_payload(name: &str) -> MutationPayload {
        MutationPayload::Create {
            draft: RecordDraft::named(name),
            modified_at: Utc::now(),
            modified_by: "device-a".to_string(),
        }
    }

    fn delete_payload() -> MutationPayload {
        MutationPayload::Delete {
            expected_version: 0,
            modified_at: Utc::now(),
            modified_by: "device-a".to_string(),
        }
    }

    async fn test_queue() -> MutationQueue {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        MutationQueue::new(db, 3)
    }

    /// Applier that replays a script of outcomes and records the order in
    /// which entities were attempted.
    struct ScriptedApplier {
        script: Mutex<Vec<SyncResult<ApplyOutcome>>>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedApplier {
        fn new(script: Vec<SyncResult<ApplyOutcome>>) -> Self {
            ScriptedApplier {
                script: Mutex::new(script),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn always_ok() -> Self {
            ScriptedApplier::new(Vec::new())
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MutationApplier for ScriptedApplier {
        async fn apply(&self, mutation: &PendingMutation) -> SyncResult<ApplyOutcome> {
            self.seen.lock().unwrap().push(mutation.entity_id.clone());
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(ApplyOutcome::Applied)
            } else {
                script.remove(0)
            }
        }
    }

    #[tokio::test]
    async fn test_drain_applies_in_enqueue_order() {
        let queue = test_queue().await;
        for id in ["a", "b", "c"] {
            queue.enqueue(id, &create_payload(id)).await.unwrap();
        }

        let applier = ScriptedApplier::always_ok();
        let cancel = AtomicBool::new(false);
        let report = queue.drain(&applier, &cancel).await.unwrap();

        assert_eq!(report.applied, 3);
        assert!(report.is_clean());
        assert_eq!(applier.seen(), vec!["a", "b", "c"]);
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failure_does_not_block_rest_of_queue() {
        let queue = test_queue().await;
        for id in ["a", "b", "c"] {
            queue.enqueue(id, &create_payload(id)).await.unwrap();
        }

        let applier = ScriptedApplier::new(vec![
            Ok(ApplyOutcome::Applied),
            Err(SyncError::Transient("gone".into())),
        ]);
        let cancel = AtomicBool::new(false);
        let report = queue.drain(&applier, &cancel).await.unwrap();

        assert_eq!(report.applied, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(applier.seen(), vec!["a", "b", "c"]);
        // "b" is still queued with its error recorded
        assert_eq!(queue.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_conflicts_counted_separately_from_failures() {
        let queue = test_queue().await;
        queue.enqueue("a", &create_payload("a1")).await.unwrap();
        queue.enqueue("b", &create_payload("b1")).await.unwrap();

        let applier = ScriptedApplier::new(vec![
            Err(SyncError::Conflict {
                entity_id: "a".into(),
                expected_version: 1,
                remote_version: 4,
            }),
            Err(SyncError::Validation("bad".into())),
        ]);
        let cancel = AtomicBool::new(false);
        let report = queue.drain(&applier, &cancel).await.unwrap();

        assert_eq!(report.conflicts, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(queue.pending_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_parked_mutations_are_skipped_until_reset() {
        let queue = test_queue().await;
        queue.enqueue("a", &create_payload("a1")).await.unwrap();

        let cancel = AtomicBool::new(false);

        // Three failures park the mutation at the ceiling.
        for _ in 0..3 {
            let applier =
                ScriptedApplier::new(vec![Err(SyncError::Transient("unreachable".into()))]);
            queue.drain(&applier, &cancel).await.unwrap();
        }
        assert_eq!(queue.failed_count().await.unwrap(), 1);

        // Parked: a clean applier never sees it.
        let applier = ScriptedApplier::always_ok();
        let report = queue.drain(&applier, &cancel).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert!(applier.seen().is_empty());

        // Reset un-parks it.
        assert_eq!(queue.reset_failed().await.unwrap(), 1);
        let applier = ScriptedApplier::always_ok();
        let report = queue.drain(&applier, &cancel).await.unwrap();
        assert_eq!(report.applied, 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_between_mutations() {
        let queue = test_queue().await;
        for id in ["a", "b", "c"] {
            queue.enqueue(id, &create_payload(id)).await.unwrap();
        }

        let cancel = AtomicBool::new(true);
        let applier = ScriptedApplier::always_ok();
        let report = queue.drain(&applier, &cancel).await.unwrap();

        assert_eq!(report.applied, 0);
        assert_eq!(report.skipped, 3);
        assert_eq!(queue.pending_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_superseded_mutations_are_discarded() {
        let queue = test_queue().await;
        queue.enqueue("a", &create_payload("a1")).await.unwrap();

        let applier = ScriptedApplier::new(vec![Ok(ApplyOutcome::Superseded)]);
        let cancel = AtomicBool::new(false);
        let report = queue.drain(&applier, &cancel).await.unwrap();

        assert_eq!(report.discarded, 1);
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }

    /// Applier that rekeys the entity's remaining queue when it applies a
    /// create, the way the synchronizer translates `local-` ids.
    struct RekeyingApplier {
        db: Database,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MutationApplier for RekeyingApplier {
        async fn apply(&self, mutation: &PendingMutation) -> SyncResult<ApplyOutcome> {
            self.seen.lock().unwrap().push(mutation.entity_id.clone());
            if mutation.action == MutationAction::Create && is_local_id(&mutation.entity_id) {
                self.db
                    .mutations()
                    .rekey_entity(&mutation.entity_id, "srv-9")
                    .await?;
            }
            Ok(ApplyOutcome::Applied)
        }
    }

    #[tokio::test]
    async fn test_drain_sees_rekey_from_earlier_replay() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let queue = MutationQueue::new(db.clone(), 3);

        queue
            .enqueue("local-x", &create_payload("x"))
            .await
            .unwrap();
        queue
            .enqueue(
                "local-x",
                &MutationPayload::Update {
                    draft: RecordDraft::named("x2"),
                    expected_version: 1,
                    modified_at: Utc::now(),
                    modified_by: "device-a".to_string(),
                },
            )
            .await
            .unwrap();

        let applier = RekeyingApplier {
            db,
            seen: Mutex::new(Vec::new()),
        };
        let cancel = AtomicBool::new(false);
        let report = queue.drain(&applier, &cancel).await.unwrap();

        // The update must replay against the rekeyed id, not the stale
        // snapshot taken at the start of the pass.
        assert_eq!(report.applied, 2);
        let seen = applier.seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["local-x", "srv-9"]);
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_local_tombstone_pair_cancels_out() {
        let queue = test_queue().await;
        queue
            .enqueue("local-x", &create_payload("x"))
            .await
            .unwrap();
        queue.enqueue("local-x", &delete_payload()).await.unwrap();
        queue.enqueue("srv-1", &delete_payload()).await.unwrap();

        let removed = queue.discard_local_tombstones().await.unwrap();
        assert_eq!(removed, 2);

        // The delete of an already-synced record is untouched.
        let remaining = queue.pending_count().await.unwrap();
        assert_eq!(remaining, 1);
    }
}
