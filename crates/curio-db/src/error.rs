//! # Database Error Types
//!
//! Error types for local store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncError (curio-sync) ← Storage failures during sync passes          │
//! │                                                                         │
//! │  Corruption is its own category: it is the only error class that       │
//! │  triggers the one-time destructive recreation path in pool.rs.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Local store operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Row not found for the given key.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed for a reason other than schema divergence.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// The storage medium is corrupted or its schema is incompatible with
    /// this build. Recovered by a one-time destructive recreation.
    #[error("Local storage corrupted: {0}")]
    Corrupted(String),

    /// Destructive recreation was already performed once this process; a
    /// second corruption is not recovered automatically.
    #[error("Local storage corrupted again after recreation: {0}")]
    RecreationExhausted(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Stored column could not be decoded into its domain type.
    #[error("Decode failed for {column}: {reason}")]
    DecodeFailed { column: String, reason: String },

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True when this error should trigger the destructive recreation path.
    pub fn is_corruption(&self) -> bool {
        matches!(self, DbError::Corrupted(_))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound            → DbError::NotFound
/// sqlx::Error::Database ("malformed") → DbError::Corrupted
/// sqlx::Error::PoolTimedOut           → DbError::PoolExhausted
/// decode errors                       → DbError::DecodeFailed
/// Other                               → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Row".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message().to_string();
                // SQLITE_CORRUPT / SQLITE_NOTADB surface with these texts
                if msg.contains("database disk image is malformed")
                    || msg.contains("file is not a database")
                {
                    DbError::Corrupted(msg)
                } else {
                    DbError::QueryFailed(msg)
                }
            }

            sqlx::Error::ColumnDecode { index, source } => DbError::DecodeFailed {
                column: index,
                reason: source.to_string(),
            },

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        match err {
            // A previously applied migration whose checksum no longer matches
            // the embedded one means the on-disk schema belongs to a
            // different build: incompatible, recreate.
            sqlx::migrate::MigrateError::VersionMismatch(v) => DbError::Corrupted(format!(
                "migration {} checksum mismatch (incompatible schema)",
                v
            )),
            sqlx::migrate::MigrateError::VersionMissing(v) => DbError::Corrupted(format!(
                "applied migration {} is unknown to this build",
                v
            )),
            other => DbError::MigrationFailed(other.to_string()),
        }
    }
}

/// Result type for local store operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_categorization() {
        assert!(DbError::Corrupted("malformed".into()).is_corruption());
        assert!(!DbError::QueryFailed("syntax".into()).is_corruption());
        assert!(!DbError::PoolExhausted.is_corruption());
    }
}
