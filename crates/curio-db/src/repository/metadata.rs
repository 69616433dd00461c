//! # Sync Metadata Repository
//!
//! Small key/value store for engine bookkeeping. Currently holds the
//! last-successful-sync timestamp; device identity lives in config, not here.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{DbError, DbResult};

/// Key under which the last-successful-sync timestamp is stored.
const LAST_SYNC_AT: &str = "last_sync_at";

/// Repository for sync metadata.
#[derive(Debug, Clone)]
pub struct MetadataRepository {
    pool: SqlitePool,
}

impl MetadataRepository {
    /// Creates a new MetadataRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MetadataRepository { pool }
    }

    /// Fetches a metadata value.
    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM metadata WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }

    /// Sets a metadata value.
    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns the timestamp of the last successful sync, if any.
    ///
    /// `None` means this store has never completed a pull; the next pull
    /// must fetch everything.
    pub async fn last_sync_at(&self) -> DbResult<Option<DateTime<Utc>>> {
        match self.get(LAST_SYNC_AT).await? {
            None => Ok(None),
            Some(raw) => {
                let parsed = DateTime::parse_from_rfc3339(&raw).map_err(|e| {
                    DbError::DecodeFailed {
                        column: LAST_SYNC_AT.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(Some(parsed.with_timezone(&Utc)))
            }
        }
    }

    /// Advances the last-successful-sync timestamp.
    pub async fn set_last_sync_at(&self, at: DateTime<Utc>) -> DbResult<()> {
        self.set(LAST_SYNC_AT, &at.to_rfc3339()).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let db = test_db().await;
        assert!(db.metadata().get("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let db = test_db().await;
        let repo = db.metadata();

        repo.set("k", "v1").await.unwrap();
        repo.set("k", "v2").await.unwrap();

        assert_eq!(repo.get("k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_last_sync_at_round_trip() {
        let db = test_db().await;
        let repo = db.metadata();

        assert!(repo.last_sync_at().await.unwrap().is_none());

        let now = Utc::now();
        repo.set_last_sync_at(now).await.unwrap();

        let read = repo.last_sync_at().await.unwrap().unwrap();
        assert_eq!(read.timestamp_millis(), now.timestamp_millis());
    }
}
