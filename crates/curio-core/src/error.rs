//! # Error Types
//!
//! Domain-specific error types for curio-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  curio-core errors (this file)                                          │
//! │  ├── CoreError        - General domain errors                           │
//! │  └── ValidationError  - Draft validation failures                       │
//! │                                                                         │
//! │  curio-db errors (separate crate)                                       │
//! │  └── DbError          - Local store failures                            │
//! │                                                                         │
//! │  curio-sync errors (separate crate)                                     │
//! │  └── SyncError        - Replay / conflict / connectivity failures       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → collaborator           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Record cannot be found.
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// A write carried an expected version that does not match the cached
    /// version. The version invariant rejects any write that would not
    /// increase the version.
    #[error("Stale write to {entity_id}: expected version {given}, cached version is {current}")]
    StaleWrite {
        entity_id: String,
        given: i64,
        current: i64,
    },

    /// Unknown mutation action string in the queue.
    #[error("Unknown mutation action: {0}")]
    UnknownAction(String),

    /// Mutation payload could not be decoded.
    #[error("Invalid mutation payload: {0}")]
    InvalidPayload(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Draft validation errors.
///
/// These occur when collaborator input doesn't meet requirements. Used for
/// early validation before anything is written locally.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., attributes not a JSON object).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::StaleWrite {
            entity_id: "rec-1".to_string(),
            given: 2,
            current: 5,
        };
        assert_eq!(
            err.to_string(),
            "Stale write to rec-1: expected version 2, cached version is 5"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "name".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
