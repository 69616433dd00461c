//! # Sync Orchestrator
//!
//! Single event loop that decides *when* to sync. All sync passes run on
//! this loop, so they are serialized by construction.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Orchestrator State Machine                          │
//! │                                                                         │
//! │                    online event                                         │
//! │        ┌─────────┐ ───────────► ┌─────────┐                             │
//! │        │ Offline │              │ Syncing │ ◄── manual trigger,         │
//! │        └─────────┘ ◄─────────── └─────────┘     periodic timer          │
//! │             ▲       offline event     │                                 │
//! │             │                         │ pass complete                   │
//! │             │     offline event       ▼                                 │
//! │             └──────────────────── ┌─────────┐                           │
//! │                                   │  Idle   │                           │
//! │                                   └─────────┘                           │
//! │                                                                         │
//! │  Mid-sync offline: a connectivity listener (running on the monitor's   │
//! │  poll task, not this loop) sets the cancel flag, so the drain stops     │
//! │  before the next mutation. Finished mutations stand — no rollback.      │
//! │                                                                         │
//! │  Triggers arriving while a pass runs coalesce: the loop picks up the    │
//! │  channel after the pass and runs at most one more.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::queue::MutationQueue;
use crate::synchronizer::RemoteSynchronizer;
use curio_db::Database;

// =============================================================================
// Status Types
// =============================================================================

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Online, nothing in flight.
    Idle,
    /// A sync pass is running.
    Syncing,
    /// The remote is unreachable; writes queue locally.
    Offline,
}

/// Snapshot of the engine, readable at any time and broadcast on change.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub state: EngineState,
    pub online: bool,
    pub syncing: bool,
    pub pending_count: i64,
    pub failed_count: i64,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl Default for EngineStatus {
    fn default() -> Self {
        EngineStatus {
            state: EngineState::Offline,
            online: false,
            syncing: false,
            pending_count: 0,
            failed_count: 0,
            last_sync_at: None,
        }
    }
}

/// Handle returned by [`SyncOrchestrator::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type StatusObserver = Box<dyn Fn(&EngineStatus) + Send + Sync>;

// =============================================================================
// Internals
// =============================================================================

enum Trigger {
    Sync,
    RetryFailed,
}

struct OrchestratorInner {
    sync: RemoteSynchronizer,
    queue: MutationQueue,
    db: Database,
    status: Mutex<EngineStatus>,
    observers: Mutex<HashMap<u64, StatusObserver>>,
    next_observer_id: AtomicU64,
    /// Stops an in-flight drain between mutations. Set by the connectivity
    /// listener the moment the probe reports offline.
    cancel: Arc<AtomicBool>,
    online: Arc<AtomicBool>,
}

impl OrchestratorInner {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Recomputes counts, applies `update`, and broadcasts if anything
    /// changed.
    async fn publish(&self, update: impl FnOnce(&mut EngineStatus)) {
        let pending = self.queue.pending_count().await.unwrap_or(0);
        let failed = self.queue.failed_count().await.unwrap_or(0);
        let last_sync_at = self.db.metadata().last_sync_at().await.unwrap_or(None);

        let snapshot = {
            let mut status = match self.status.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            let before = status.clone();
            status.online = self.is_online();
            status.pending_count = pending;
            status.failed_count = failed;
            status.last_sync_at = last_sync_at;
            update(&mut *status);
            status.syncing = status.state == EngineState::Syncing;
            if *status == before {
                return;
            }
            status.clone()
        };

        if let Ok(observers) = self.observers.lock() {
            for observer in observers.values() {
                observer(&snapshot);
            }
        }
    }

    /// Runs one full sync pass if online.
    ///
    /// A trigger that lands while offline never enters `Syncing`: the pass
    /// would cancel before touching the first mutation, so the status is
    /// republished as `Offline` and the queue waits for the next online
    /// transition.
    async fn run_sync(&self) {
        if !self.is_online() {
            self.publish(|s| s.state = EngineState::Offline).await;
            return;
        }

        self.cancel.store(false, Ordering::SeqCst);
        self.publish(|s| s.state = EngineState::Syncing).await;

        match self.sync.full_sync(&self.cancel).await {
            Ok(report) => {
                debug!(
                    applied = report.push.applied,
                    pulled = report.pull.map(|p| p.upserted).unwrap_or(0),
                    "Sync pass finished"
                );
            }
            Err(err) if err.is_retryable() => {
                warn!(error = %err, "Sync pass hit a transient failure");
            }
            Err(err) => {
                error!(error = %err, "Sync pass failed");
            }
        }

        let next = if self.is_online() {
            EngineState::Idle
        } else {
            EngineState::Offline
        };
        self.publish(|s| s.state = next).await;
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Owns the sync event loop. Created by the engine facade.
pub struct SyncOrchestrator {
    inner: Arc<OrchestratorInner>,
    trigger_tx: mpsc::Sender<Trigger>,
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl SyncOrchestrator {
    /// Starts the loop and hooks connectivity transitions.
    pub fn start(
        db: Database,
        sync: RemoteSynchronizer,
        queue: MutationQueue,
        monitor: &ConnectivityMonitor,
        auto_sync_interval: Duration,
    ) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let online = Arc::new(AtomicBool::new(monitor.is_online()));

        // Runs on the monitor's poll task so an in-flight drain sees the
        // flag without waiting for this loop to become free.
        {
            let cancel = Arc::clone(&cancel);
            let online_flag = Arc::clone(&online);
            monitor.subscribe(move |is_online| {
                online_flag.store(is_online, Ordering::SeqCst);
                if !is_online {
                    cancel.store(true, Ordering::SeqCst);
                }
            });
        }

        let inner = Arc::new(OrchestratorInner {
            sync,
            queue,
            db,
            status: Mutex::new(EngineStatus::default()),
            observers: Mutex::new(HashMap::new()),
            next_observer_id: AtomicU64::new(1),
            cancel,
            online,
        });

        let (trigger_tx, mut trigger_rx) = mpsc::channel::<Trigger>(16);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let mut conn_rx: watch::Receiver<bool> = monitor.watch();

        let loop_inner = Arc::clone(&inner);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(auto_sync_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() fires immediately; skip that first tick so startup
            // sync is driven by the first online transition instead.
            ticker.tick().await;

            info!("Sync orchestrator started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let idle = loop_inner
                            .status
                            .lock()
                            .map(|s| s.state == EngineState::Idle)
                            .unwrap_or(false);
                        if idle && loop_inner.is_online() {
                            debug!("Periodic sync");
                            loop_inner.run_sync().await;
                        }
                    }

                    changed = conn_rx.changed() => {
                        if changed.is_err() {
                            // Monitor dropped; nothing left to react to.
                            break;
                        }
                        let is_online = *conn_rx.borrow_and_update();
                        if is_online {
                            info!("Back online, syncing");
                            loop_inner.run_sync().await;
                        } else {
                            info!("Went offline");
                            loop_inner
                                .publish(|s| s.state = EngineState::Offline)
                                .await;
                        }
                    }

                    trigger = trigger_rx.recv() => {
                        match trigger {
                            Some(Trigger::Sync) => loop_inner.run_sync().await,
                            Some(Trigger::RetryFailed) => {
                                if let Err(err) = loop_inner.queue.reset_failed().await {
                                    error!(error = %err, "Failed to reset parked mutations");
                                }
                                loop_inner.run_sync().await;
                            }
                            None => break,
                        }
                    }

                    _ = shutdown_rx.recv() => {
                        debug!("Sync orchestrator shutting down");
                        break;
                    }
                }
            }
        });

        SyncOrchestrator {
            inner,
            trigger_tx,
            shutdown_tx,
            task,
        }
    }

    /// Current status snapshot.
    pub fn status(&self) -> EngineStatus {
        self.inner
            .status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Registers a status observer, invoked on every published change.
    pub fn subscribe(&self, observer: impl Fn(&EngineStatus) + Send + Sync + 'static) -> ObserverId {
        let id = self.inner.next_observer_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut observers) = self.inner.observers.lock() {
            observers.insert(id, Box::new(observer));
        }
        ObserverId(id)
    }

    /// Removes a status observer. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ObserverId) {
        if let Ok(mut observers) = self.inner.observers.lock() {
            observers.remove(&id.0);
        }
    }

    /// Requests a sync pass. Coalesces if one is already queued.
    pub fn trigger_sync(&self) {
        let _ = self.trigger_tx.try_send(Trigger::Sync);
    }

    /// Un-parks failed mutations and requests a sync pass.
    pub fn trigger_retry_failed(&self) {
        let _ = self.trigger_tx.try_send(Trigger::RetryFailed);
    }

    /// Recomputes and broadcasts counts after a local write.
    pub async fn refresh_status(&self) {
        self.inner.publish(|_| {}).await;
    }

    /// Stops the loop.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::SharedProbe;
    use crate::reconcile::LastWriteWins;
    use crate::remote::MemoryRemote;
    use chrono::Utc;
    use curio_core::{MutationPayload, RecordDraft};
    use curio_db::DbConfig;

    struct Rig {
        db: Database,
        remote: MemoryRemote,
        probe: SharedProbe,
        monitor: ConnectivityMonitor,
        orchestrator: SyncOrchestrator,
    }

    async fn rig() -> Rig {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let remote = MemoryRemote::new();
        let probe = SharedProbe::new(false);
        let monitor = ConnectivityMonitor::start(
            Arc::new(probe.clone()),
            Duration::from_secs(3600),
        );
        let sync = RemoteSynchronizer::new(
            db.clone(),
            Arc::new(remote.clone()),
            Arc::new(LastWriteWins),
            3,
        );
        let queue = MutationQueue::new(db.clone(), 3);
        let orchestrator = SyncOrchestrator::start(
            db.clone(),
            sync,
            queue,
            &monitor,
            Duration::from_secs(3600),
        );
        Rig {
            db,
            remote,
            probe,
            monitor,
            orchestrator,
        }
    }

    async fn settle() {
        // Let the orchestrator loop process queued events.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn create_payload(name: &str) -> MutationPayload {
        MutationPayload::Create {
            draft: RecordDraft::named(name),
            modified_at: Utc::now(),
            modified_by: "device-a".to_string(),
        }
    }

    #[tokio::test]
    async fn test_coming_online_drains_queue() {
        let r = rig().await;
        r.db.mutations()
            .enqueue("RECORD", "local-a", &create_payload("Vase"))
            .await
            .unwrap();

        assert_eq!(r.orchestrator.status().state, EngineState::Offline);

        r.probe.set_online(true);
        r.monitor.refresh().await;
        settle().await;

        let status = r.orchestrator.status();
        assert_eq!(status.state, EngineState::Idle);
        assert!(status.online);
        assert_eq!(status.pending_count, 0);
        assert_eq!(r.remote.record_count(), 1);

        r.orchestrator.shutdown().await;
        r.monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_going_offline_flips_state() {
        let r = rig().await;
        r.probe.set_online(true);
        r.monitor.refresh().await;
        settle().await;
        assert_eq!(r.orchestrator.status().state, EngineState::Idle);

        r.probe.set_online(false);
        r.monitor.refresh().await;
        settle().await;
        assert_eq!(r.orchestrator.status().state, EngineState::Offline);

        r.orchestrator.shutdown().await;
        r.monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_manual_trigger_while_offline_stays_offline() {
        let r = rig().await;
        r.db.mutations()
            .enqueue("RECORD", "local-a", &create_payload("Vase"))
            .await
            .unwrap();

        r.orchestrator.trigger_sync();
        settle().await;

        // Nothing replayed, nothing lost
        assert_eq!(r.orchestrator.status().state, EngineState::Offline);
        assert_eq!(r.remote.record_count(), 0);
        assert_eq!(r.orchestrator.status().pending_count, 1);

        r.orchestrator.shutdown().await;
        r.monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_status_observers_fire_and_unsubscribe() {
        let r = rig().await;
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        let id = r.orchestrator.subscribe(move |status| {
            seen_clone.lock().unwrap().push(status.state);
        });

        r.probe.set_online(true);
        r.monitor.refresh().await;
        settle().await;

        let states = seen.lock().unwrap().clone();
        assert!(states.contains(&EngineState::Syncing));
        assert!(states.contains(&EngineState::Idle));

        r.orchestrator.unsubscribe(id);
        let before = seen.lock().unwrap().len();

        r.probe.set_online(false);
        r.monitor.refresh().await;
        settle().await;

        assert_eq!(seen.lock().unwrap().len(), before);

        r.orchestrator.shutdown().await;
        r.monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_retry_failed_resets_then_syncs() {
        let r = rig().await;
        let mutations = r.db.mutations();
        let m = mutations
            .enqueue("RECORD", "local-a", &create_payload("Vase"))
            .await
            .unwrap();
        for _ in 0..3 {
            mutations
                .record_failure(m.sequence_id, "remote unreachable")
                .await
                .unwrap();
        }

        r.probe.set_online(true);
        r.monitor.refresh().await;
        settle().await;

        // Parked: the online sync skipped it
        assert_eq!(r.orchestrator.status().failed_count, 1);
        assert_eq!(r.remote.record_count(), 0);

        r.orchestrator.trigger_retry_failed();
        settle().await;

        let status = r.orchestrator.status();
        assert_eq!(status.failed_count, 0);
        assert_eq!(status.pending_count, 0);
        assert_eq!(r.remote.record_count(), 1);

        r.orchestrator.shutdown().await;
        r.monitor.shutdown().await;
    }
}
