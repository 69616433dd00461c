//! # curio-sync: Offline-First Sync Engine for Curio
//!
//! This crate provides the synchronization layer for Curio: local-first
//! reads and writes over the durable store, with background push/pull
//! against a remote catalog service.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Catalog Engine Architecture                       │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │                  CatalogEngine (collaborator facade)             │   │
//! │  │                                                                  │   │
//! │  │  create / update / delete → cache + queue, return immediately    │   │
//! │  │  get / list               → cache (read-through on online miss)  │   │
//! │  │  status / conflicts / sync_now / retry_failed / shutdown         │   │
//! │  └────────────────────────────┬─────────────────────────────────────┘   │
//! │                               │                                         │
//! │         ┌─────────────────────┼──────────────────────┐                  │
//! │         ▼                     ▼                      ▼                  │
//! │  ┌────────────────┐  ┌─────────────────┐  ┌────────────────────────┐    │
//! │  │ Connectivity   │  │ SyncOrchestrator│  │ RemoteSynchronizer     │    │
//! │  │ Monitor        │  │                 │  │                        │    │
//! │  │ probe polling, │  │ one select loop:│  │ push: drain queue with │    │
//! │  │ deduplicated   │─►│ online/offline, │─►│ id + image translation │    │
//! │  │ transitions    │  │ timer, triggers │  │ pull: list_since upsert│    │
//! │  └────────────────┘  └─────────────────┘  └───────────┬────────────┘    │
//! │                                                       │                 │
//! │                               ┌───────────────────────┼──────────┐      │
//! │                               ▼                       ▼          │      │
//! │                      ┌────────────────┐  ┌──────────────────┐    │      │
//! │                      │ MutationQueue  │  │ ReconcilePolicy  │    │      │
//! │                      │ (curio-db)     │  │ LastWriteWins /  │    │      │
//! │                      │ ordered drain  │  │ ManualOnly       │    │      │
//! │                      └────────────────┘  └──────────────────┘    │      │
//! │                                                                  ▼      │
//! │                                                      RemoteStore trait  │
//! │                                                      (MemoryRemote for  │
//! │                                                       tests and demos)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - `CatalogEngine` facade, the host-application entry point
//! - [`orchestrator`] - state machine and sync event loop
//! - [`synchronizer`] - push/pull replay against the remote
//! - [`queue`] - durable mutation queue manager
//! - [`reconcile`] - conflict detection and resolution policies
//! - [`connectivity`] - probe polling and online/offline fan-out
//! - [`remote`] - `RemoteStore` trait and the in-memory implementation
//! - [`config`] - TOML engine configuration
//! - [`error`] - sync error taxonomy
//!
//! ## Usage
//! ```rust,ignore
//! use curio_sync::{CatalogEngine, EngineConfig, MemoryRemote, SharedProbe};
//! use curio_db::{Database, DbConfig};
//! use std::sync::Arc;
//!
//! let db = Database::new(DbConfig::new("curio.db")).await?;
//! let engine = CatalogEngine::start(
//!     EngineConfig::default(),
//!     db,
//!     Arc::new(MemoryRemote::new()),
//!     Arc::new(SharedProbe::new(true)),
//! )?;
//!
//! let record = engine.create_record(RecordDraft::named("Ming vase")).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod queue;
pub mod reconcile;
pub mod remote;
pub mod synchronizer;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DeviceConfig, EngineConfig, SyncConfig};
pub use connectivity::{ConnectivityMonitor, ConnectivityProbe, ListenerId, SharedProbe};
pub use engine::CatalogEngine;
pub use error::{SyncError, SyncResult};
pub use orchestrator::{EngineState, EngineStatus, ObserverId, SyncOrchestrator};
pub use queue::{ApplyOutcome, DrainReport, MutationApplier, MutationQueue};
pub use reconcile::{LastWriteWins, ManualOnly, ReconcilePolicy, Resolution, VersionConflict};
pub use remote::{MemoryRemote, RemoteError, RemoteResult, RemoteStore};
pub use synchronizer::{PullReport, RemoteSynchronizer, SyncReport};
