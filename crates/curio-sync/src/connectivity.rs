//! # Connectivity Monitor
//!
//! Polls a reachability probe and turns the raw signal into a deduplicated
//! online/offline state with observer fan-out.
//!
//! ## Design
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Connectivity Monitor                                │
//! │                                                                         │
//! │  ConnectivityProbe (trait)                                              │
//! │       │  is_online().await → bool                                           │
//! │       ▼                                                                 │
//! │  Poll task (tokio interval, MissedTickBehavior::Delay)                  │
//! │       │                                                                 │
//! │       ├── same as last state → no-op (dedup)                            │
//! │       │                                                                 │
//! │       └── state changed:                                                │
//! │             • update AtomicBool snapshot (is_online)                    │
//! │             • send on watch channel (orchestrator select loop)          │
//! │             • invoke registered listeners                               │
//! │                                                                         │
//! │  Listeners unsubscribe by id; dropping the monitor stops the task.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The probe is a trait so tests (and the in-memory remote) can flip
//! connectivity deterministically instead of touching a real network.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

// =============================================================================
// Probe Trait
// =============================================================================

/// Answers "can we reach the remote right now?".
///
/// Implementations must be cheap enough to call every poll tick.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// A probe backed by a shared flag.
///
/// Tests and demos flip the flag; production deployments would implement
/// [`ConnectivityProbe`] against a real health endpoint instead.
#[derive(Debug, Clone, Default)]
pub struct SharedProbe {
    online: Arc<AtomicBool>,
}

impl SharedProbe {
    /// Creates a probe with the given initial reachability.
    pub fn new(online: bool) -> Self {
        SharedProbe {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    /// Flips the reported reachability.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for SharedProbe {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// Handle returned by [`ConnectivityMonitor::subscribe`]; pass it back to
/// [`ConnectivityMonitor::unsubscribe`] to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn Fn(bool) + Send + Sync>;

struct MonitorInner {
    probe: Arc<dyn ConnectivityProbe>,
    online: AtomicBool,
    listeners: Mutex<HashMap<u64, Listener>>,
    next_listener_id: AtomicU64,
    state_tx: watch::Sender<bool>,
}

impl MonitorInner {
    /// Runs one probe cycle, dispatching only on state change.
    async fn poll_once(&self) {
        let observed = self.probe.is_online().await;
        let previous = self.online.swap(observed, Ordering::SeqCst);

        if observed == previous {
            return;
        }

        info!(online = observed, "Connectivity changed");
        let _ = self.state_tx.send(observed);

        let listeners = self.listeners.lock();
        if let Ok(listeners) = listeners {
            for listener in listeners.values() {
                listener(observed);
            }
        }
    }
}

/// Polls a [`ConnectivityProbe`] and publishes deduplicated transitions.
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl ConnectivityMonitor {
    /// Starts the monitor with an immediate first probe.
    ///
    /// The initial state is pessimistic (offline) until the first probe
    /// lands, so the engine never pushes into a void on startup.
    pub fn start(probe: Arc<dyn ConnectivityProbe>, poll_interval: Duration) -> Self {
        let (state_tx, _) = watch::channel(false);
        let inner = Arc::new(MonitorInner {
            probe,
            online: AtomicBool::new(false),
            listeners: Mutex::new(HashMap::new()),
            next_listener_id: AtomicU64::new(1),
            state_tx,
        });

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task_inner = Arc::clone(&inner);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        task_inner.poll_once().await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Connectivity monitor shutting down");
                        break;
                    }
                }
            }
        });

        ConnectivityMonitor {
            inner,
            shutdown_tx,
            task,
        }
    }

    /// Returns the last observed state.
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Probes immediately instead of waiting for the next tick.
    pub async fn refresh(&self) -> bool {
        self.inner.poll_once().await;
        self.is_online()
    }

    /// Returns a watch receiver that yields every state transition.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.inner.state_tx.subscribe()
    }

    /// Registers a listener invoked on every transition.
    pub fn subscribe(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> ListenerId {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.insert(id, Box::new(listener));
        }
        ListenerId(id)
    }

    /// Removes a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ListenerId) {
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.remove(&id.0);
        }
    }

    /// Stops the poll task.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
