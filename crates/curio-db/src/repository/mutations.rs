//! # Pending Mutation Repository
//!
//! Durable queue of local writes awaiting replay against the remote.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LOCAL WRITE (create/update/delete a record)                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                   SINGLE TRANSACTION                            │    │
//! │  │  1. Upsert the record in the local cache                        │    │
//! │  │  2. INSERT INTO pending_mutations (entity_id, action, payload)  │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DRAIN (when online, oldest first by sequence_id)                       │
//! │       │                                                                 │
//! │       ├─ replay succeeded  → DELETE the row                             │
//! │       ├─ transient failure → retry_count += 1, last_error = ...         │
//! │       └─ retry_count >= ceiling → row parks as Failed until a manual    │
//! │          retry resets it                                                │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                        │
//! │  • A local write is never lost while queued                             │
//! │  • Replay order is enqueue order (AUTOINCREMENT sequence_id)            │
//! │  • Offline? Entries queue up; back online, the drain replays them       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use curio_core::{MutationPayload, PendingMutation};

const SELECT_COLUMNS: &str =
    "sequence_id, entity_type, entity_id, action, payload, retry_count, last_error, created_at";

/// Repository for the pending-mutation queue.
#[derive(Debug, Clone)]
pub struct MutationRepository {
    pool: SqlitePool,
}

impl MutationRepository {
    /// Creates a new MutationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MutationRepository { pool }
    }

    /// Appends a mutation to the queue.
    ///
    /// The assigned `sequence_id` is SQLite's AUTOINCREMENT rowid, which is
    /// strictly increasing and never reused, so replay order is exactly
    /// enqueue order.
    pub async fn enqueue(
        &self,
        entity_type: &str,
        entity_id: &str,
        payload: &MutationPayload,
    ) -> DbResult<PendingMutation> {
        let action = payload.action();
        let encoded = serde_json::to_string(payload)
            .map_err(|e| DbError::Internal(format!("payload not serializable: {e}")))?;
        let now = Utc::now();

        debug!(
            entity_type = %entity_type,
            entity_id = %entity_id,
            action = %action,
            "Enqueuing mutation"
        );

        let result = sqlx::query(
            r#"
            INSERT INTO pending_mutations (
                entity_type, entity_id, action, payload,
                retry_count, last_error, created_at
            ) VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5)
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(action)
        .bind(&encoded)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(PendingMutation {
            sequence_id: result.last_insert_rowid(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action,
            payload: encoded,
            retry_count: 0,
            last_error: None,
            created_at: now,
        })
    }

    /// Lists all queued mutations, oldest first.
    pub async fn list_pending(&self) -> DbResult<Vec<PendingMutation>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM pending_mutations ORDER BY sequence_id ASC");

        let rows = sqlx::query_as::<_, PendingMutation>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Lists queued mutations for one entity, oldest first.
    pub async fn list_for_entity(&self, entity_id: &str) -> DbResult<Vec<PendingMutation>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM pending_mutations WHERE entity_id = ?1 ORDER BY sequence_id ASC"
        );

        let rows = sqlx::query_as::<_, PendingMutation>(&sql)
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Fetches one mutation by sequence id.
    pub async fn get(&self, sequence_id: i64) -> DbResult<Option<PendingMutation>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM pending_mutations WHERE sequence_id = ?1");

        let row = sqlx::query_as::<_, PendingMutation>(&sql)
            .bind(sequence_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    /// Removes a mutation after a successful (or superseded) replay.
    pub async fn remove(&self, sequence_id: i64) -> DbResult<()> {
        debug!(sequence_id, "Removing mutation");

        sqlx::query("DELETE FROM pending_mutations WHERE sequence_id = ?1")
            .bind(sequence_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Removes every queued mutation for an entity.
    ///
    /// Used when a local-only record is deleted before it ever synced: the
    /// queued create (and any edits behind it) are pointless.
    pub async fn remove_for_entity(&self, entity_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM pending_mutations WHERE entity_id = ?1")
            .bind(entity_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Records a failed replay attempt.
    pub async fn record_failure(&self, sequence_id: i64, error: &str) -> DbResult<()> {
        debug!(sequence_id, error = %error, "Recording mutation failure");

        sqlx::query(
            "UPDATE pending_mutations SET retry_count = retry_count + 1, last_error = ?1 \
             WHERE sequence_id = ?2",
        )
        .bind(error)
        .bind(sequence_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Resets all parked (failed) mutations back to pending.
    ///
    /// Returns the number of mutations reset.
    pub async fn reset_failed(&self, retry_ceiling: u32) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE pending_mutations SET retry_count = 0, last_error = NULL \
             WHERE retry_count >= ?1",
        )
        .bind(retry_ceiling as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Replaces a mutation's payload in place.
    ///
    /// Used by conflict resolution to retarget an update at the version the
    /// remote currently holds.
    pub async fn update_payload(
        &self,
        sequence_id: i64,
        payload: &MutationPayload,
    ) -> DbResult<()> {
        let encoded = serde_json::to_string(payload)
            .map_err(|e| DbError::Internal(format!("payload not serializable: {e}")))?;

        sqlx::query("UPDATE pending_mutations SET payload = ?1 WHERE sequence_id = ?2")
            .bind(&encoded)
            .bind(sequence_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Rewrites the entity id on every queued mutation for an entity.
    ///
    /// Called after a create replay when the remote assigns the permanent id
    /// in place of a `local-` placeholder; later queued edits must target
    /// the real id.
    pub async fn rekey_entity(&self, old_id: &str, new_id: &str) -> DbResult<u64> {
        debug!(old_id = %old_id, new_id = %new_id, "Rekeying queued mutations");

        let result = sqlx::query("UPDATE pending_mutations SET entity_id = ?1 WHERE entity_id = ?2")
            .bind(new_id)
            .bind(old_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Counts mutations still eligible for replay (below the retry ceiling).
    pub async fn count_pending(&self, retry_ceiling: u32) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pending_mutations WHERE retry_count < ?1")
                .bind(retry_ceiling as i64)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Counts mutations parked at or above the retry ceiling.
    pub async fn count_failed(&self, retry_ceiling: u32) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pending_mutations WHERE retry_count >= ?1")
                .bind(retry_ceiling as i64)
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
    use curio_core::{MutationAction, MutationState, RecordDraft, DEFAULT_RETRY_CEILING};

    fn create_payload(name: &str) -> MutationPayload {
        MutationPayload::Create {
            draft: RecordDraft::named(name),
            modified_at: Utc::now(),
            modified_by: "device-a".to_string(),
        }
    }

    fn update_payload(name: &str, expected_version: i64) -> MutationPayload {
        MutationPayload::Update {
            draft: RecordDraft::named(name),
            expected_version,
            modified_at: Utc::now(),
            modified_by: "device-a".to_string(),
        }
    }

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_assigns_increasing_sequence_ids() {
        let db = test_db().await;
        let repo = db.mutations();

        let a = repo
            .enqueue("RECORD", "r1", &create_payload("first"))
            .await
            .unwrap();
        let b = repo
            .enqueue("RECORD", "r2", &create_payload("second"))
            .await
            .unwrap();

        assert!(b.sequence_id > a.sequence_id);
        assert_eq!(a.action, MutationAction::Create);
    }

    #[tokio::test]
    async fn test_list_pending_preserves_enqueue_order() {
        let db = test_db().await;
        let repo = db.mutations();

        for name in ["one", "two", "three"] {
            repo.enqueue("RECORD", "r1", &update_payload(name, 1))
                .await
                .unwrap();
        }

        let pending = repo.list_pending().await.unwrap();
        let names: Vec<String> = pending
            .iter()
            .map(|m| match m.decode_payload().unwrap() {
                MutationPayload::Update { draft, .. } => draft.name,
                _ => panic!("expected update"),
            })
            .collect();

        assert_eq!(names, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_remove_after_replay() {
        let db = test_db().await;
        let repo = db.mutations();

        let m = repo
            .enqueue("RECORD", "r1", &create_payload("x"))
            .await
            .unwrap();
        repo.remove(m.sequence_id).await.unwrap();

        assert!(repo.list_pending().await.unwrap().is_empty());
        assert!(repo.get(m.sequence_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_counting_and_reset() {
        let db = test_db().await;
        let repo = db.mutations();

        let m = repo
            .enqueue("RECORD", "r1", &create_payload("x"))
            .await
            .unwrap();

        for _ in 0..DEFAULT_RETRY_CEILING {
            repo.record_failure(m.sequence_id, "remote unreachable")
                .await
                .unwrap();
        }

        let parked = repo.get(m.sequence_id).await.unwrap().unwrap();
        assert_eq!(parked.state(DEFAULT_RETRY_CEILING), MutationState::Failed);
        assert_eq!(parked.last_error.as_deref(), Some("remote unreachable"));
        assert_eq!(repo.count_failed(DEFAULT_RETRY_CEILING).await.unwrap(), 1);
        assert_eq!(repo.count_pending(DEFAULT_RETRY_CEILING).await.unwrap(), 0);

        let reset = repo.reset_failed(DEFAULT_RETRY_CEILING).await.unwrap();
        assert_eq!(reset, 1);

        let revived = repo.get(m.sequence_id).await.unwrap().unwrap();
        assert_eq!(revived.retry_count, 0);
        assert!(revived.last_error.is_none());
        assert_eq!(repo.count_pending(DEFAULT_RETRY_CEILING).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rekey_entity_rewrites_later_mutations() {
        let db = test_db().await;
        let repo = db.mutations();

        repo.enqueue("RECORD", "local-abc", &create_payload("x"))
            .await
            .unwrap();
        repo.enqueue("RECORD", "local-abc", &update_payload("y", 0))
            .await
            .unwrap();
        repo.enqueue("RECORD", "other", &create_payload("z"))
            .await
            .unwrap();

        let moved = repo.rekey_entity("local-abc", "srv-9").await.unwrap();
        assert_eq!(moved, 2);

        let for_new = repo.list_for_entity("srv-9").await.unwrap();
        assert_eq!(for_new.len(), 2);
        assert!(repo.list_for_entity("local-abc").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_for_entity_discards_queue() {
        let db = test_db().await;
        let repo = db.mutations();

        repo.enqueue("RECORD", "local-abc", &create_payload("x"))
            .await
            .unwrap();
        repo.enqueue("RECORD", "local-abc", &update_payload("y", 0))
            .await
            .unwrap();

        let removed = repo.remove_for_entity("local-abc").await.unwrap();
        assert_eq!(removed, 2);
        assert!(repo.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_payload_rewrites_expected_version() {
        let db = test_db().await;
        let repo = db.mutations();

        let m = repo
            .enqueue("RECORD", "r1", &update_payload("x", 1))
            .await
            .unwrap();

        repo.update_payload(m.sequence_id, &update_payload("x", 7))
            .await
            .unwrap();

        let stored = repo.get(m.sequence_id).await.unwrap().unwrap();
        match stored.decode_payload().unwrap() {
            MutationPayload::Update {
                expected_version, ..
            } => assert_eq!(expected_version, 7),
            _ => panic!("expected update"),
        }
    }
}
