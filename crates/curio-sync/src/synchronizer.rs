//! # Remote Synchronizer
//!
//! Replays the mutation queue against the remote store (push) and folds
//! remote changes back into the local cache (pull).
//!
//! ## Full Sync
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        full_sync() ordering                             │
//! │                                                                         │
//! │  1. PUSH                                                                │
//! │     • cancel out never-synced create/delete pairs                       │
//! │     • drain the queue oldest-first, replaying each mutation             │
//! │       - `local-` ids: remote create assigns the real id, then the       │
//! │         cache row and every later queued mutation are rekeyed           │
//! │       - inline images: uploaded first, the draft is sent with the URL   │
//! │       - version conflicts: routed through the ReconcilePolicy           │
//! │                                                                         │
//! │  2. PULL (only after push)                                              │
//! │     • list_since(last_sync_at), upsert everything as synced=true        │
//! │     • records older than the cached version are skipped                 │
//! │     • last_sync_at advances only after the pull succeeds                │
//! │                                                                         │
//! │  Push-before-pull means local edits reach the remote before the pull    │
//! │  can fetch them back, so a full sync converges in one pass.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::queue::{ApplyOutcome, DrainReport, MutationApplier, MutationQueue};
use crate::reconcile::{ReconcilePolicy, Resolution, VersionConflict};
use crate::remote::{RemoteError, RemoteStore};
use curio_core::{is_local_id, CachedRecord, CatalogRecord, MutationPayload, PendingMutation, RecordDraft};
use curio_db::Database;

// =============================================================================
// Reports
// =============================================================================

/// Tally of one pull pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Records the remote returned.
    pub fetched: usize,
    /// Records written into the cache.
    pub upserted: usize,
    /// Records skipped because the cache already held a newer version.
    pub skipped_stale: usize,
}

/// Tally of one full sync pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncReport {
    pub push: DrainReport,
    pub pull: Option<PullReport>,
}

// =============================================================================
// Synchronizer
// =============================================================================

/// Bidirectional synchronizer between the local store and a [`RemoteStore`].
#[derive(Clone)]
pub struct RemoteSynchronizer {
    db: Database,
    remote: Arc<dyn RemoteStore>,
    policy: Arc<dyn ReconcilePolicy>,
    queue: MutationQueue,
    conflicts: Arc<RwLock<Vec<VersionConflict>>>,
}

impl RemoteSynchronizer {
    pub fn new(
        db: Database,
        remote: Arc<dyn RemoteStore>,
        policy: Arc<dyn ReconcilePolicy>,
        retry_ceiling: u32,
    ) -> Self {
        let queue = MutationQueue::new(db.clone(), retry_ceiling);
        RemoteSynchronizer {
            db,
            remote,
            policy,
            queue,
            conflicts: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Unresolved conflicts held for manual resolution.
    pub fn conflicts(&self) -> Vec<VersionConflict> {
        self.conflicts
            .read()
            .map(|held| held.clone())
            .unwrap_or_default()
    }

    /// Replays the queue against the remote.
    pub async fn push_pending(&self, cancel: &AtomicBool) -> SyncResult<DrainReport> {
        let discarded = self.queue.discard_local_tombstones().await?;
        let mut report = self.queue.drain(self, cancel).await?;
        report.discarded += discarded as usize;
        Ok(report)
    }

    /// Folds remote changes since the last sync into the cache.
    ///
    /// On failure the cache is left exactly as it was and `last_sync_at`
    /// does not move; the next pull covers the same window again.
    pub async fn pull_remote(&self, cancel: &AtomicBool) -> SyncResult<PullReport> {
        if cancel.load(Ordering::SeqCst) {
            return Err(SyncError::Transient("sync cancelled before pull".into()));
        }

        let since = self.db.metadata().last_sync_at().await?;
        let started_at = Utc::now();

        let incoming = self
            .remote
            .list_since(since)
            .await
            .map_err(|e| self.map_remote_error("pull", e))?;

        let mut report = PullReport {
            fetched: incoming.len(),
            ..Default::default()
        };

        let mut to_upsert = Vec::new();
        for record in incoming {
            // Version only increases: never let an older remote snapshot
            // overwrite a newer cached one.
            if let Some(cached) = self.db.records().try_get(&record.id).await? {
                if cached.record.version >= record.version {
                    report.skipped_stale += 1;
                    continue;
                }
            }
            to_upsert.push(CachedRecord::from_remote(record));
        }

        report.upserted = to_upsert.len();
        self.db.records().upsert_many(&to_upsert).await?;
        self.db.metadata().set_last_sync_at(started_at).await?;

        info!(
            fetched = report.fetched,
            upserted = report.upserted,
            skipped_stale = report.skipped_stale,
            "Pull complete"
        );
        Ok(report)
    }

    /// Push, then pull. Strictly ordered.
    pub async fn full_sync(&self, cancel: &AtomicBool) -> SyncResult<SyncReport> {
        let push = self.push_pending(cancel).await?;

        if cancel.load(Ordering::SeqCst) {
            debug!("Sync cancelled between push and pull");
            return Ok(SyncReport { push, pull: None });
        }

        let pull = self.pull_remote(cancel).await?;
        Ok(SyncReport {
            push,
            pull: Some(pull),
        })
    }

    // -------------------------------------------------------------------------
    // Replay helpers
    // -------------------------------------------------------------------------

    fn map_remote_error(&self, context: &str, err: RemoteError) -> SyncError {
        match err {
            RemoteError::Unreachable(msg) => SyncError::Transient(format!("{context}: {msg}")),
            RemoteError::Validation(msg) => SyncError::Validation(msg),
            RemoteError::NotFound(id) => SyncError::NotFound(id),
            RemoteError::VersionConflict { current } => SyncError::Internal(format!(
                "{context}: unexpected version conflict (remote at {current})"
            )),
        }
    }

    /// Uploads inline image data and swaps the draft to the resulting URL.
    async fn resolve_image(
        &self,
        entity_id: &str,
        draft: &RecordDraft,
    ) -> SyncResult<RecordDraft> {
        let Some(curio_core::ImageData::Inline { base64 }) = &draft.image else {
            return Ok(draft.clone());
        };

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(base64)
            .map_err(|e| SyncError::Validation(format!("invalid base64 image data: {e}")))?;

        let url = self
            .remote
            .upload_image(entity_id, &bytes)
            .await
            .map_err(|e| self.map_remote_error("upload_image", e))?;

        debug!(entity_id = %entity_id, url = %url, "Uploaded inline image");

        let mut resolved = draft.clone();
        resolved.image = Some(curio_core::ImageData::Remote { url });
        Ok(resolved)
    }

    /// Writes the remote's accepted state back into the cache and clears any
    /// held conflict for the mutation.
    async fn settle(&self, sequence_id: i64, record: CatalogRecord) -> SyncResult<()> {
        self.db
            .records()
            .upsert(&CachedRecord::from_remote(record))
            .await?;
        self.forget_conflict(sequence_id);
        Ok(())
    }

    fn forget_conflict(&self, sequence_id: i64) {
        if let Ok(mut held) = self.conflicts.write() {
            held.retain(|c| c.sequence_id != sequence_id);
        }
    }

    fn hold_conflict(&self, conflict: VersionConflict) {
        if let Ok(mut held) = self.conflicts.write() {
            held.retain(|c| c.sequence_id != conflict.sequence_id);
            held.push(conflict);
        }
    }

    /// Routes a version conflict through the policy.
    async fn reconcile(
        &self,
        mutation: &PendingMutation,
        payload: MutationPayload,
        remote_version: i64,
    ) -> SyncResult<ApplyOutcome> {
        let remote_record = self
            .remote
            .get(&mutation.entity_id)
            .await
            .map_err(|e| self.map_remote_error("reconcile", e))?;

        let conflict = VersionConflict {
            entity_id: mutation.entity_id.clone(),
            sequence_id: mutation.sequence_id,
            local: payload.clone(),
            remote: remote_record.clone(),
        };

        match self.policy.resolve(&conflict) {
            Resolution::AcceptLocal => {
                info!(
                    entity_id = %mutation.entity_id,
                    remote_version = remote_record.version,
                    "Conflict resolved for local edit, replaying at current version"
                );
                let retargeted = self
                    .retarget(&payload, remote_record.version)
                    .ok_or_else(|| {
                        SyncError::Internal("create mutations cannot conflict".into())
                    })?;
                // Persist the retarget so a crash or second conflict retries
                // from the remote's version, not the stale one.
                self.db
                    .mutations()
                    .update_payload(mutation.sequence_id, &retargeted)
                    .await?;
                // replay() and reconcile() call each other; box this edge so
                // the future has a finite size.
                Box::pin(self.replay(mutation, retargeted)).await
            }
            Resolution::AcceptRemote => {
                info!(
                    entity_id = %mutation.entity_id,
                    "Conflict resolved for remote state, dropping local mutation"
                );
                self.settle(mutation.sequence_id, remote_record).await?;
                Ok(ApplyOutcome::Superseded)
            }
            Resolution::Manual => {
                warn!(
                    entity_id = %mutation.entity_id,
                    sequence_id = mutation.sequence_id,
                    "Conflict held for manual resolution"
                );
                self.hold_conflict(conflict);
                Err(SyncError::Conflict {
                    entity_id: mutation.entity_id.clone(),
                    expected_version: payload.expected_version().unwrap_or(0),
                    remote_version,
                })
            }
        }
    }

    /// Rewrites a payload's expected version. `None` for creates.
    fn retarget(&self, payload: &MutationPayload, version: i64) -> Option<MutationPayload> {
        match payload {
            MutationPayload::Create { .. } => None,
            MutationPayload::Update {
                draft,
                modified_at,
                modified_by,
                ..
            } => Some(MutationPayload::Update {
                draft: draft.clone(),
                expected_version: version,
                modified_at: *modified_at,
                modified_by: modified_by.clone(),
            }),
            MutationPayload::Delete {
                modified_at,
                modified_by,
                ..
            } => Some(MutationPayload::Delete {
                expected_version: version,
                modified_at: *modified_at,
                modified_by: modified_by.clone(),
            }),
        }
    }

    /// Replays one decoded mutation against the remote.
    async fn replay(
        &self,
        mutation: &PendingMutation,
        payload: MutationPayload,
    ) -> SyncResult<ApplyOutcome> {
        match payload {
            MutationPayload::Create {
                ref draft,
                modified_at,
                ref modified_by,
            } => {
                let draft = self.resolve_image(&mutation.entity_id, draft).await?;
                let record = self
                    .remote
                    .create(&draft, modified_at, modified_by)
                    .await
                    .map_err(|e| self.map_remote_error("create", e))?;

                if is_local_id(&mutation.entity_id) {
                    debug!(
                        local_id = %mutation.entity_id,
                        remote_id = %record.id,
                        "Remote assigned permanent id"
                    );
                    self.db.records().remove(&mutation.entity_id).await?;
                    self.db
                        .mutations()
                        .rekey_entity(&mutation.entity_id, &record.id)
                        .await?;
                }

                self.settle(mutation.sequence_id, record).await?;
                Ok(ApplyOutcome::Applied)
            }

            MutationPayload::Update {
                ref draft,
                expected_version,
                modified_at,
                ref modified_by,
            } => {
                let draft = self.resolve_image(&mutation.entity_id, draft).await?;
                match self
                    .remote
                    .update(
                        &mutation.entity_id,
                        &draft,
                        expected_version,
                        modified_at,
                        modified_by,
                    )
                    .await
                {
                    Ok(record) => {
                        self.settle(mutation.sequence_id, record).await?;
                        Ok(ApplyOutcome::Applied)
                    }
                    Err(RemoteError::VersionConflict { current }) => {
                        let payload = MutationPayload::Update {
                            draft,
                            expected_version,
                            modified_at,
                            modified_by: modified_by.clone(),
                        };
                        self.reconcile(mutation, payload, current).await
                    }
                    Err(RemoteError::NotFound(_)) => {
                        // The record is gone on the remote; an edit can't
                        // bring it back.
                        warn!(
                            entity_id = %mutation.entity_id,
                            "Update targets a record the remote no longer has"
                        );
                        self.db.records().remove(&mutation.entity_id).await?;
                        self.forget_conflict(mutation.sequence_id);
                        Ok(ApplyOutcome::Superseded)
                    }
                    Err(e) => Err(self.map_remote_error("update", e)),
                }
            }

            MutationPayload::Delete {
                expected_version,
                modified_at,
                ref modified_by,
            } => {
                match self
                    .remote
                    .delete(&mutation.entity_id, expected_version, modified_at, modified_by)
                    .await
                {
                    Ok(tombstone) => {
                        self.settle(mutation.sequence_id, tombstone).await?;
                        Ok(ApplyOutcome::Applied)
                    }
                    Err(RemoteError::VersionConflict { current }) => {
                        let payload = MutationPayload::Delete {
                            expected_version,
                            modified_at,
                            modified_by: modified_by.clone(),
                        };
                        self.reconcile(mutation, payload, current).await
                    }
                    Err(RemoteError::NotFound(_)) => {
                        // Already gone; nothing to delete.
                        self.db.records().remove(&mutation.entity_id).await?;
                        self.forget_conflict(mutation.sequence_id);
                        Ok(ApplyOutcome::Superseded)
                    }
                    Err(e) => Err(self.map_remote_error("delete", e)),
                }
            }
        }
    }
}

#[async_trait]
impl MutationApplier for RemoteSynchronizer {
    async fn apply(&self, mutation: &PendingMutation) -> SyncResult<ApplyOutcome> {
        let payload = mutation
            .decode_payload()
            .map_err(|e| SyncError::Payload(e.to_string()))?;
        self.replay(mutation, payload).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
