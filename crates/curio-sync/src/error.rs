//! # Sync Error Types
//!
//! Error taxonomy for the sync engine.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Taxonomy                               │
//! │                                                                         │
//! │  TRANSIENT (retryable)                                                  │
//! │  • Remote unreachable, timeouts                                         │
//! │  • Mutation stays queued, retry_count increments                        │
//! │                                                                         │
//! │  CONFLICT                                                               │
//! │  • expected_version != remote version                                   │
//! │  • Routed through the ReconcilePolicy, never silently dropped           │
//! │                                                                         │
//! │  PERMANENT                                                              │
//! │  • Validation rejections, malformed payloads, bad config                │
//! │  • Retrying is pointless; surfaced to the caller immediately            │
//! │                                                                         │
//! │  STORAGE                                                                │
//! │  • Local store failures pass through from curio-db                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use curio_core::CoreError;
use curio_db::DbError;

/// Errors from sync engine operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote could not be reached or timed out. Retryable.
    #[error("remote unavailable: {0}")]
    Transient(String),

    /// Optimistic concurrency check failed on the remote.
    #[error("version conflict on '{entity_id}': sent {expected_version}, remote has {remote_version}")]
    Conflict {
        entity_id: String,
        expected_version: i64,
        remote_version: i64,
    },

    /// Input rejected before or by the remote. Not retryable.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A local write raced a newer local version of the same record.
    #[error("stale write on '{entity_id}': given version {given}, current is {current}")]
    StaleWrite {
        entity_id: String,
        given: i64,
        current: i64,
    },

    /// The record does not exist locally or remotely.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Local store failure.
    #[error("local store error: {0}")]
    Storage(#[from] DbError),

    /// A queued payload could not be decoded.
    #[error("malformed mutation payload: {0}")]
    Payload(String),

    /// Configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read or parsed.
    #[error("failed to load configuration: {0}")]
    ConfigLoadFailed(String),

    /// Configuration file could not be written.
    #[error("failed to save configuration: {0}")]
    ConfigSaveFailed(String),

    /// An internal channel closed unexpectedly, usually during shutdown.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// Internal invariant violation.
    #[error("internal sync error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Returns true if retrying the same operation later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient(_))
    }

    /// Returns true for optimistic-concurrency conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Conflict { .. })
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::RecordNotFound(id) => SyncError::NotFound(id),
            CoreError::StaleWrite {
                entity_id,
                given,
                current,
            } => SyncError::StaleWrite {
                entity_id,
                given,
                current,
            },
            CoreError::Validation(e) => SyncError::Validation(e.to_string()),
            CoreError::InvalidPayload(msg) => SyncError::Payload(msg),
            CoreError::UnknownAction(action) => {
                SyncError::Payload(format!("unknown action '{action}'"))
            }
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(SyncError::Transient("timeout".into()).is_retryable());
        assert!(!SyncError::Validation("bad name".into()).is_retryable());
        assert!(!SyncError::NotFound("r1".into()).is_retryable());
        assert!(!SyncError::Conflict {
            entity_id: "r1".into(),
            expected_version: 1,
            remote_version: 2,
        }
        .is_retryable());
    }

    #[test]
    fn test_core_error_mapping() {
        let err: SyncError = CoreError::RecordNotFound("r1".into()).into();
        assert!(matches!(err, SyncError::NotFound(_)));

        let err: SyncError = CoreError::StaleWrite {
            entity_id: "r1".into(),
            given: 1,
            current: 3,
        }
        .into();
        assert!(matches!(err, SyncError::StaleWrite { current: 3, .. }));
    }
}
