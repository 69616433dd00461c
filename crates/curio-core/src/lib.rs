//! # curio-core: Pure Domain Types for Curio
//!
//! This crate is the **heart** of the Curio sync engine. It contains the
//! domain model and pure logic with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Curio Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │             UI Collaborator (external, out of scope)            │   │
//! │  │    createRecord ──► updateRecord ──► deleteRecord ──► status    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 curio-sync (engine facade)                      │   │
//! │  │    queue, synchronizer, reconciliation, orchestrator            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                ★ curio-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────────────────────┐ │   │
//! │  │   │   types   │  │ mutation  │  │        validation          │ │   │
//! │  │   │  Record   │  │  Payload  │  │     draft field rules      │ │   │
//! │  │   │  Cached   │  │  Action   │  │                            │ │   │
//! │  │   └───────────┘  └───────────┘  └────────────────────────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 curio-db (Durable Local Store)                  │   │
//! │  │          SQLite cache, mutation queue, sync metadata            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (CatalogRecord, CachedRecord, RecordDraft)
//! - [`mutation`] - The durable mutation model (actions, payloads, retry state)
//! - [`error`] - Domain error types
//! - [`validation`] - Draft field validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Typed Payloads**: Queued mutations are a tagged union, never opaque JSON blobs
//! 4. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod mutation;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, ValidationError};
pub use mutation::{MutationAction, MutationPayload, MutationState, PendingMutation};
pub use types::*;
pub use validation::{validate_draft, validate_name};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Entity type tag stored with every queued mutation.
///
/// ## Why a constant?
/// v0.1 synchronizes a single entity kind (catalog records), but the queue
/// schema is heterogeneous by design — the tag keeps payload decoding
/// unambiguous when further entity kinds are added.
pub const RECORD_ENTITY_TYPE: &str = "RECORD";

/// Prefix that marks a record id as local-only (never pushed remotely).
///
/// Offline creates are keyed with `local-{uuid}` placeholders. The remote
/// store assigns the canonical id at replay time, and the placeholder is
/// rewritten throughout the cache and queue.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Default number of failed replays before a mutation is excluded from
/// automatic retries and requires an explicit reset.
pub const DEFAULT_RETRY_CEILING: u32 = 3;

/// Generates a new local-only placeholder id.
pub fn new_local_id() -> String {
    format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::new_v4())
}

/// Returns true if the id is a local-only placeholder.
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}
