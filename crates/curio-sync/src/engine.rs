//! # Catalog Engine Facade
//!
//! The one type host applications talk to. Wires the store, connectivity
//! monitor, synchronizer, and orchestrator together and exposes the
//! offline-first record operations.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Offline-First Write Path                           │
//! │                                                                         │
//! │  create_record / update_record / delete_record                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate → upsert cache (synced = false) → enqueue mutation            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  return to caller  ←── durable locally, regardless of connectivity      │
//! │       │                                                                 │
//! │       └── online? nudge the orchestrator (best effort, never awaited)   │
//! │                                                                         │
//! │  Every write takes this path, even when online. One code path, one      │
//! │  ordering: the queue decides what the remote sees and when.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::connectivity::{ConnectivityMonitor, ConnectivityProbe};
use crate::error::{SyncError, SyncResult};
use crate::orchestrator::{EngineStatus, ObserverId, SyncOrchestrator};
use crate::queue::MutationQueue;
use crate::reconcile::{LastWriteWins, ReconcilePolicy, VersionConflict};
use crate::remote::{RemoteError, RemoteStore};
use crate::synchronizer::RemoteSynchronizer;
use curio_core::{
    new_local_id, validate_draft, CachedRecord, CatalogRecord, ImageData, ListFilter,
    MutationPayload, RecordDraft,
};
use curio_db::Database;

/// Offline-first catalog engine.
pub struct CatalogEngine {
    config: EngineConfig,
    db: Database,
    queue: MutationQueue,
    sync: RemoteSynchronizer,
    monitor: ConnectivityMonitor,
    orchestrator: SyncOrchestrator,
    remote: Arc<dyn RemoteStore>,
}

impl CatalogEngine {
    /// Starts the engine with the default last-write-wins conflict policy.
    pub fn start(
        config: EngineConfig,
        db: Database,
        remote: Arc<dyn RemoteStore>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> SyncResult<Self> {
        Self::start_with_policy(config, db, remote, probe, Arc::new(LastWriteWins))
    }

    /// Starts the engine with a custom conflict policy.
    pub fn start_with_policy(
        config: EngineConfig,
        db: Database,
        remote: Arc<dyn RemoteStore>,
        probe: Arc<dyn ConnectivityProbe>,
        policy: Arc<dyn ReconcilePolicy>,
    ) -> SyncResult<Self> {
        config.validate()?;

        if curio_db::cache_was_reset() {
            warn!("Local store was recreated; cache repopulates on the next full sync");
        }

        let monitor = ConnectivityMonitor::start(
            probe,
            Duration::from_secs(config.sync.connectivity_poll_secs),
        );

        let sync = RemoteSynchronizer::new(
            db.clone(),
            Arc::clone(&remote),
            policy,
            config.sync.retry_ceiling,
        );
        let queue = MutationQueue::new(db.clone(), config.sync.retry_ceiling);

        let orchestrator = SyncOrchestrator::start(
            db.clone(),
            sync.clone(),
            queue.clone(),
            &monitor,
            Duration::from_secs(config.sync.auto_sync_interval_secs),
        );

        info!(device_id = %config.device.id, "Catalog engine started");

        Ok(CatalogEngine {
            config,
            db,
            queue,
            sync,
            monitor,
            orchestrator,
            remote,
        })
    }

    // -------------------------------------------------------------------------
    // Record Operations
    // -------------------------------------------------------------------------

    /// Creates a record.
    ///
    /// Returns once the record and its queued mutation are durable locally.
    /// The returned record carries a `local-` placeholder id until the
    /// remote assigns the permanent one during sync.
    pub async fn create_record(&self, draft: RecordDraft) -> SyncResult<CachedRecord> {
        validate_draft(&draft).map_err(curio_core::CoreError::from)?;

        let now = Utc::now();
        let record = CatalogRecord {
            id: new_local_id(),
            name: draft.name.clone(),
            description: draft.description.clone(),
            attributes: draft.attributes.clone(),
            image_url: remote_image_url(&draft),
            version: 0,
            last_modified_at: now,
            last_modified_by: self.config.device.id.clone(),
            deleted: false,
        };
        let cached = CachedRecord::local(record, true);

        self.db.records().upsert(&cached).await?;
        self.queue
            .enqueue(
                &cached.record.id,
                &MutationPayload::Create {
                    draft,
                    modified_at: now,
                    modified_by: self.config.device.id.clone(),
                },
            )
            .await?;

        self.nudge().await;
        Ok(cached)
    }

    /// Updates a record, rejecting writes against a stale cached version.
    pub async fn update_record(
        &self,
        id: &str,
        draft: RecordDraft,
        expected_version: i64,
    ) -> SyncResult<CachedRecord> {
        validate_draft(&draft).map_err(curio_core::CoreError::from)?;

        let cached = self.require_live(id).await?;
        if cached.record.version != expected_version {
            return Err(SyncError::StaleWrite {
                entity_id: id.to_string(),
                given: expected_version,
                current: cached.record.version,
            });
        }

        let now = Utc::now();
        let mut updated = cached;
        updated.record.name = draft.name.clone();
        updated.record.description = draft.description.clone();
        updated.record.attributes = draft.attributes.clone();
        if let Some(url) = remote_image_url(&draft) {
            updated.record.image_url = Some(url);
        }
        updated.record.last_modified_at = now;
        updated.record.last_modified_by = self.config.device.id.clone();
        updated.synced = false;

        self.db.records().upsert(&updated).await?;
        self.queue
            .enqueue(
                id,
                &MutationPayload::Update {
                    draft,
                    expected_version,
                    modified_at: now,
                    modified_by: self.config.device.id.clone(),
                },
            )
            .await?;

        self.nudge().await;
        Ok(updated)
    }

    /// Soft-deletes a record.
    ///
    /// Deleting a record that never reached the remote cancels it out
    /// entirely: the cache row and its queued mutations vanish and the
    /// remote is never contacted about it.
    pub async fn delete_record(&self, id: &str) -> SyncResult<()> {
        let cached = self.require_live(id).await?;

        if cached.local_only {
            self.db.records().remove(id).await?;
            self.queue.discard_for_entity(id).await?;
            self.orchestrator.refresh_status().await;
            return Ok(());
        }

        let now = Utc::now();
        let mut tombstoned = cached.clone();
        tombstoned.record.deleted = true;
        tombstoned.record.last_modified_at = now;
        tombstoned.record.last_modified_by = self.config.device.id.clone();
        tombstoned.synced = false;

        self.db.records().upsert(&tombstoned).await?;
        self.queue
            .enqueue(
                id,
                &MutationPayload::Delete {
                    expected_version: cached.record.version,
                    modified_at: now,
                    modified_by: self.config.device.id.clone(),
                },
            )
            .await?;

        self.nudge().await;
        Ok(())
    }

    /// Fetches a record: cache first, read-through to the remote on a miss
    /// while online.
    pub async fn get_record(&self, id: &str) -> SyncResult<CachedRecord> {
        if let Some(cached) = self.db.records().try_get(id).await? {
            if cached.record.deleted {
                return Err(SyncError::NotFound(id.to_string()));
            }
            return Ok(cached);
        }

        if !self.monitor.is_online() {
            return Err(SyncError::NotFound(id.to_string()));
        }

        match self.remote.get(id).await {
            Ok(record) if record.deleted => Err(SyncError::NotFound(id.to_string())),
            Ok(record) => {
                let cached = CachedRecord::from_remote(record);
                self.db.records().upsert(&cached).await?;
                Ok(cached)
            }
            Err(RemoteError::NotFound(_)) => Err(SyncError::NotFound(id.to_string())),
            Err(RemoteError::Unreachable(msg)) => Err(SyncError::Transient(msg)),
            Err(e) => Err(SyncError::Internal(e.to_string())),
        }
    }

    /// Lists cached records.
    pub async fn list_records(&self, filter: &ListFilter) -> SyncResult<Vec<CachedRecord>> {
        Ok(self.db.records().list(filter).await?)
    }

    // -------------------------------------------------------------------------
    // Sync Control & Observation
    // -------------------------------------------------------------------------

    /// Current engine status snapshot.
    pub fn status(&self) -> EngineStatus {
        self.orchestrator.status()
    }

    /// Registers a status observer.
    pub fn subscribe_status(
        &self,
        observer: impl Fn(&EngineStatus) + Send + Sync + 'static,
    ) -> ObserverId {
        self.orchestrator.subscribe(observer)
    }

    /// Removes a status observer.
    pub fn unsubscribe_status(&self, id: ObserverId) {
        self.orchestrator.unsubscribe(id);
    }

    /// Requests an immediate sync pass.
    pub fn sync_now(&self) {
        self.orchestrator.trigger_sync();
    }

    /// Un-parks failed mutations and requests a sync pass.
    pub fn retry_failed(&self) {
        self.orchestrator.trigger_retry_failed();
    }

    /// Conflicts held for manual resolution.
    pub fn conflicts(&self) -> Vec<VersionConflict> {
        self.sync.conflicts()
    }

    /// True if the local store had to be wiped and recreated this process.
    pub fn cache_was_reset(&self) -> bool {
        curio_db::cache_was_reset()
    }

    /// Stops background tasks and closes the store.
    pub async fn shutdown(self) {
        info!("Catalog engine shutting down");
        self.orchestrator.shutdown().await;
        self.monitor.shutdown().await;
        self.db.close().await;
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    /// Fetches a record that must exist and not be tombstoned.
    async fn require_live(&self, id: &str) -> SyncResult<CachedRecord> {
        match self.db.records().try_get(id).await? {
            Some(cached) if !cached.record.deleted => Ok(cached),
            _ => Err(SyncError::NotFound(id.to_string())),
        }
    }

    /// Refreshes published counts and pokes the orchestrator when online.
    async fn nudge(&self) {
        self.orchestrator.refresh_status().await;
        if self.monitor.is_online() {
            self.orchestrator.trigger_sync();
        }
    }
}

/// Extracts an already-remote image URL from a draft, if any. Inline data
/// stays in the queued payload until sync uploads it.
fn remote_image_url(draft: &RecordDraft) -> Option<String> {
    match &draft.image {
        Some(ImageData::Remote { url }) => Some(url.clone()),
        _ => None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
