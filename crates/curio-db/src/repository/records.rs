//! # Record Cache Repository
//!
//! Manages the local cache of catalog records.
//!
//! ## Cache Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        records table                                    │
//! │                                                                         │
//! │  Rows come from two places:                                             │
//! │                                                                         │
//! │  1. PULLED from remote   → synced = 1, local_only = 0                   │
//! │  2. WRITTEN locally      → synced = 0                                   │
//! │     • created offline    → local_only = 1, id = "local-{uuid}"          │
//! │     • edited/deleted     → local_only = 0, id unchanged                 │
//! │                                                                         │
//! │  Deletes are SOFT: the row stays with deleted = 1 so that list views    │
//! │  and the pull phase can reconcile tombstones instead of resurrecting    │
//! │  removed records.                                                       │
//! │                                                                         │
//! │  When an offline create is replayed, the remote assigns the real id     │
//! │  and `rekey()` rewrites the cached row in place.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use curio_core::{CachedRecord, CatalogRecord, ListFilter, SortKey};

/// Raw row shape for the `records` table.
///
/// Kept separate from `CachedRecord` because the `attributes` column stores
/// JSON as TEXT and needs an explicit parse step.
#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    id: String,
    name: String,
    description: Option<String>,
    attributes: String,
    image_url: Option<String>,
    version: i64,
    last_modified_at: chrono::DateTime<chrono::Utc>,
    last_modified_by: String,
    deleted: bool,
    local_only: bool,
    synced: bool,
}

impl TryFrom<RecordRow> for CachedRecord {
    type Error = DbError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let attributes =
            serde_json::from_str(&row.attributes).map_err(|e| DbError::DecodeFailed {
                column: "attributes".to_string(),
                reason: e.to_string(),
            })?;

        Ok(CachedRecord {
            record: CatalogRecord {
                id: row.id,
                name: row.name,
                description: row.description,
                attributes,
                image_url: row.image_url,
                version: row.version,
                last_modified_at: row.last_modified_at,
                last_modified_by: row.last_modified_by,
                deleted: row.deleted,
            },
            local_only: row.local_only,
            synced: row.synced,
        })
    }
}

const SELECT_COLUMNS: &str = "id, name, description, attributes, image_url, version, \
     last_modified_at, last_modified_by, deleted, local_only, synced";

/// Repository for the local record cache.
#[derive(Debug, Clone)]
pub struct RecordRepository {
    pool: SqlitePool,
}

impl RecordRepository {
    /// Creates a new RecordRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RecordRepository { pool }
    }

    /// Fetches a record by id.
    ///
    /// Returns `DbError::NotFound` if no row exists. Tombstoned rows are
    /// returned; callers decide whether a deleted record counts.
    pub async fn get(&self, id: &str) -> DbResult<CachedRecord> {
        self.try_get(id)
            .await?
            .ok_or_else(|| DbError::not_found("record", id))
    }

    /// Fetches a record by id, returning `None` if absent.
    pub async fn try_get(&self, id: &str) -> DbResult<Option<CachedRecord>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM records WHERE id = ?1");

        let row: Option<RecordRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(CachedRecord::try_from).transpose()
    }

    /// Inserts or replaces a cached record.
    ///
    /// Upsert keyed on `id`: a pull overwrites the local copy, a local edit
    /// overwrites the pulled copy. Version policy lives above this layer.
    pub async fn upsert(&self, cached: &CachedRecord) -> DbResult<()> {
        let attributes = serde_json::to_string(&cached.record.attributes)
            .map_err(|e| DbError::Internal(format!("attributes not serializable: {e}")))?;

        debug!(
            record_id = %cached.record.id,
            version = cached.record.version,
            synced = cached.synced,
            "Upserting cached record"
        );

        sqlx::query(
            r#"
            INSERT INTO records (
                id, name, description, attributes, image_url,
                version, last_modified_at, last_modified_by,
                deleted, local_only, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                attributes = excluded.attributes,
                image_url = excluded.image_url,
                version = excluded.version,
                last_modified_at = excluded.last_modified_at,
                last_modified_by = excluded.last_modified_by,
                deleted = excluded.deleted,
                local_only = excluded.local_only,
                synced = excluded.synced
            "#,
        )
        .bind(&cached.record.id)
        .bind(&cached.record.name)
        .bind(&cached.record.description)
        .bind(&attributes)
        .bind(&cached.record.image_url)
        .bind(cached.record.version)
        .bind(cached.record.last_modified_at)
        .bind(&cached.record.last_modified_by)
        .bind(cached.record.deleted)
        .bind(cached.local_only)
        .bind(cached.synced)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upserts a batch of records in a single transaction.
    ///
    /// Used by the pull phase so a crash mid-pull can't leave a half-applied
    /// page visible.
    pub async fn upsert_many(&self, records: &[CachedRecord]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        for cached in records {
            let attributes = serde_json::to_string(&cached.record.attributes)
                .map_err(|e| DbError::Internal(format!("attributes not serializable: {e}")))?;

            sqlx::query(
                r#"
                INSERT INTO records (
                    id, name, description, attributes, image_url,
                    version, last_modified_at, last_modified_by,
                    deleted, local_only, synced
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    attributes = excluded.attributes,
                    image_url = excluded.image_url,
                    version = excluded.version,
                    last_modified_at = excluded.last_modified_at,
                    last_modified_by = excluded.last_modified_by,
                    deleted = excluded.deleted,
                    local_only = excluded.local_only,
                    synced = excluded.synced
                "#,
            )
            .bind(&cached.record.id)
            .bind(&cached.record.name)
            .bind(&cached.record.description)
            .bind(&attributes)
            .bind(&cached.record.image_url)
            .bind(cached.record.version)
            .bind(cached.record.last_modified_at)
            .bind(&cached.record.last_modified_by)
            .bind(cached.record.deleted)
            .bind(cached.local_only)
            .bind(cached.synced)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Hard-deletes a row.
    ///
    /// Only used for records that never reached the remote (a local-only
    /// create that was deleted again before syncing). Everything else is
    /// soft-deleted via `upsert` with `deleted = true`.
    pub async fn remove(&self, id: &str) -> DbResult<()> {
        debug!(record_id = %id, "Removing cached record");

        sqlx::query("DELETE FROM records WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Rewrites a record's id after the remote assigned the real one.
    ///
    /// Returns `DbError::NotFound` if no row carries `old_id`.
    pub async fn rekey(&self, old_id: &str, new_id: &str) -> DbResult<()> {
        debug!(old_id = %old_id, new_id = %new_id, "Rekeying cached record");

        let result = sqlx::query("UPDATE records SET id = ?1 WHERE id = ?2")
            .bind(new_id)
            .bind(old_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("record", old_id));
        }

        Ok(())
    }

    /// Lists cached records by filter.
    pub async fn list(&self, filter: &ListFilter) -> DbResult<Vec<CachedRecord>> {
        let mut sql = format!("SELECT {SELECT_COLUMNS} FROM records WHERE 1 = 1");

        if !filter.include_deleted {
            sql.push_str(" AND deleted = 0");
        }
        if filter.name_contains.is_some() {
            sql.push_str(" AND name LIKE ?1");
        }
        match filter.sort {
            SortKey::Name => sql.push_str(" ORDER BY name COLLATE NOCASE ASC"),
            SortKey::ModifiedAt => sql.push_str(" ORDER BY last_modified_at DESC"),
        }

        let mut query = sqlx::query_as::<_, RecordRow>(&sql);
        if let Some(needle) = &filter.name_contains {
            query = query.bind(format!("%{needle}%"));
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(CachedRecord::try_from).collect()
    }

    /// Counts non-tombstoned records.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE deleted = 0")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use curio_core::CatalogRecord;

    fn record(id: &str, name: &str, version: i64) -> CatalogRecord {
        CatalogRecord {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            attributes: serde_json::json!({}),
            image_url: None,
            version,
            last_modified_at: Utc::now(),
            last_modified_by: "test-device".to_string(),
            deleted: false,
        }
    }

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = test_db().await;
        let repo = db.records();

        repo.upsert(&CachedRecord::from_remote(record("r1", "Vase", 3)))
            .await
            .unwrap();

        let got = repo.get("r1").await.unwrap();
        assert_eq!(got.record.name, "Vase");
        assert_eq!(got.record.version, 3);
        assert!(got.synced);
        assert!(!got.local_only);
    }

    #[tokio::test]
    async fn test_get_missing_returns_not_found() {
        let db = test_db().await;
        let err = db.records().get("nope").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_row() {
        let db = test_db().await;
        let repo = db.records();

        repo.upsert(&CachedRecord::from_remote(record("r1", "Vase", 1)))
            .await
            .unwrap();
        repo.upsert(&CachedRecord::from_remote(record("r1", "Ming Vase", 2)))
            .await
            .unwrap();

        let got = repo.get("r1").await.unwrap();
        assert_eq!(got.record.name, "Ming Vase");
        assert_eq!(got.record.version, 2);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_attributes_survive_round_trip() {
        let db = test_db().await;
        let repo = db.records();

        let mut rec = record("r1", "Coin", 1);
        rec.attributes = serde_json::json!({"year": 1921, "grade": "MS-65"});
        repo.upsert(&CachedRecord::from_remote(rec)).await.unwrap();

        let got = repo.get("r1").await.unwrap();
        assert_eq!(got.record.attributes["year"], 1921);
        assert_eq!(got.record.attributes["grade"], "MS-65");
    }

    #[tokio::test]
    async fn test_list_excludes_tombstones_by_default() {
        let db = test_db().await;
        let repo = db.records();

        repo.upsert(&CachedRecord::from_remote(record("r1", "Alive", 1)))
            .await
            .unwrap();
        let mut dead = record("r2", "Dead", 2);
        dead.deleted = true;
        repo.upsert(&CachedRecord::from_remote(dead)).await.unwrap();

        let listed = repo.list(&ListFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].record.id, "r1");

        let all = repo
            .list(&ListFilter {
                include_deleted: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts_by_name() {
        let db = test_db().await;
        let repo = db.records();

        for (id, name) in [("r1", "zebra stamp"), ("r2", "Antique stamp"), ("r3", "coin")] {
            repo.upsert(&CachedRecord::from_remote(record(id, name, 1)))
                .await
                .unwrap();
        }

        let stamps = repo
            .list(&ListFilter {
                name_contains: Some("stamp".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(stamps.len(), 2);
        // Case-insensitive name sort
        assert_eq!(stamps[0].record.name, "Antique stamp");
        assert_eq!(stamps[1].record.name, "zebra stamp");
    }

    #[tokio::test]
    async fn test_rekey_moves_row() {
        let db = test_db().await;
        let repo = db.records();

        repo.upsert(&CachedRecord::local(record("local-abc", "Draft", 0), true))
            .await
            .unwrap();

        repo.rekey("local-abc", "srv-42").await.unwrap();

        assert!(repo.try_get("local-abc").await.unwrap().is_none());
        assert_eq!(repo.get("srv-42").await.unwrap().record.name, "Draft");

        let err = repo.rekey("local-abc", "srv-43").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove_hard_deletes() {
        let db = test_db().await;
        let repo = db.records();

        repo.upsert(&CachedRecord::local(record("local-x", "Gone", 0), true))
            .await
            .unwrap();
        repo.remove("local-x").await.unwrap();

        assert!(repo.try_get("local-x").await.unwrap().is_none());
    }
}
