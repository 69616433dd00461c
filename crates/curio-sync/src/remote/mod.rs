//! # Remote Store Interface
//!
//! The engine talks to the backing catalog service through the
//! [`RemoteStore`] trait. Production deployments implement it over their
//! transport of choice; tests use the deterministic [`MemoryRemote`].
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        RemoteStore Contract                             │
//! │                                                                         │
//! │  create(draft)                → record with remote-assigned id, v = 1   │
//! │  update(id, draft, expected)  → record with v = expected + 1            │
//! │  delete(id, expected)         → tombstone record (deleted = true)       │
//! │  get(id)                      → current record (tombstones included)    │
//! │  list_since(since)            → records modified after `since`          │
//! │  upload_image(id, bytes)      → durable URL for the stored blob         │
//! │                                                                         │
//! │  Writes are optimistically concurrent: `expected_version` must match    │
//! │  the remote's current version or the call fails with VersionConflict.   │
//! │                                                                         │
//! │  Inline image data never crosses this boundary. The synchronizer        │
//! │  uploads blobs via upload_image() first and sends the resulting URL.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod memory;

pub use memory::MemoryRemote;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use curio_core::{CatalogRecord, RecordDraft};

// =============================================================================
// Errors
// =============================================================================

/// Errors from remote store operations.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote could not be reached. Retryable.
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    /// `expected_version` did not match the remote's current version.
    #[error("version conflict: remote holds version {current}")]
    VersionConflict { current: i64 },

    /// The remote rejected the payload. Not retryable.
    #[error("rejected by remote: {0}")]
    Validation(String),

    /// No record with the given id exists on the remote.
    #[error("record not found: {0}")]
    NotFound(String),
}

impl RemoteError {
    /// Returns true if retrying the same call later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Unreachable(_))
    }
}

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

// =============================================================================
// Trait
// =============================================================================

/// Authoritative record store the engine synchronizes against.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetches one record, tombstones included.
    async fn get(&self, id: &str) -> RemoteResult<CatalogRecord>;

    /// Lists records modified strictly after `since` (all records when
    /// `None`), tombstones included.
    async fn list_since(&self, since: Option<DateTime<Utc>>) -> RemoteResult<Vec<CatalogRecord>>;

    /// Creates a record. The remote assigns the permanent id and version 1.
    async fn create(
        &self,
        draft: &RecordDraft,
        modified_at: DateTime<Utc>,
        modified_by: &str,
    ) -> RemoteResult<CatalogRecord>;

    /// Updates a record if `expected_version` matches.
    async fn update(
        &self,
        id: &str,
        draft: &RecordDraft,
        expected_version: i64,
        modified_at: DateTime<Utc>,
        modified_by: &str,
    ) -> RemoteResult<CatalogRecord>;

    /// Soft-deletes a record if `expected_version` matches, returning the
    /// tombstone.
    async fn delete(
        &self,
        id: &str,
        expected_version: i64,
        modified_at: DateTime<Utc>,
        modified_by: &str,
    ) -> RemoteResult<CatalogRecord>;

    /// Stores an image blob and returns its durable URL.
    async fn upload_image(&self, entity_id: &str, bytes: &[u8]) -> RemoteResult<String>;
}
