//! # curio-db: Durable Local Store for Curio
//!
//! This crate provides the client-resident durable store: the record cache,
//! the pending-mutation queue, and sync metadata. It uses SQLite for local
//! storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Curio Data Flow                                 │
//! │                                                                         │
//! │  Engine operation (create_record, drain, pull)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     curio-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ RecordRepo     │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ MutationRepo   │    │ 001_init.sql │  │   │
//! │  │   │ WAL mode      │    │ MetadataRepo   │    │              │  │   │
//! │  │   │ wipe-once     │    │                │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (three tables: records / pending_mutations / metadata)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Durability
//! Every repository call commits before it returns; a process kill never
//! loses an acknowledged write. If the file is corrupted or its schema has
//! diverged from the embedded migrations, the store wipes and reinitializes
//! itself **once per process lifetime** and reports the loss through
//! [`pool::cache_was_reset`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use curio_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/curio.db")).await?;
//! let cached = db.records().get("rec-1").await?;
//! let queued = db.mutations().enqueue("RECORD", "rec-1", &payload).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{cache_was_reset, Database, DbConfig};

// Repository re-exports for convenience
pub use repository::metadata::MetadataRepository;
pub use repository::mutations::MutationRepository;
pub use repository::records::RecordRepository;
