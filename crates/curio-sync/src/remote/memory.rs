//! # In-Memory Remote Store
//!
//! A deterministic [`RemoteStore`] for tests and demos. Behaves like the
//! real service (version checks, tombstones, blob storage) with test-only
//! controls layered on top:
//!
//! - `set_offline(true)` makes every call fail with `Unreachable`
//! - `fail_next(msg)` injects a single transient failure
//! - `calls()` exposes the ordered call log for asserting replay order

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{RemoteError, RemoteResult, RemoteStore};
use curio_core::{CatalogRecord, ImageData, RecordDraft};

#[derive(Debug, Default)]
struct Inner {
    records: std::collections::HashMap<String, CatalogRecord>,
    blobs: std::collections::HashMap<String, Vec<u8>>,
    offline: bool,
    fail_next: Option<String>,
    calls: Vec<String>,
    next_id: u64,
    next_blob_id: u64,
}

impl Inner {
    /// Applies the offline flag and any one-shot injected failure.
    fn gate(&mut self, call: &str) -> RemoteResult<()> {
        self.calls.push(call.to_string());

        if self.offline {
            return Err(RemoteError::Unreachable("remote is offline".into()));
        }
        if let Some(msg) = self.fail_next.take() {
            return Err(RemoteError::Unreachable(msg));
        }
        Ok(())
    }

    fn image_url_from_draft(draft: &RecordDraft) -> RemoteResult<Option<String>> {
        match &draft.image {
            None => Ok(None),
            Some(ImageData::Remote { url }) => Ok(Some(url.clone())),
            Some(ImageData::Inline { .. }) => Err(RemoteError::Validation(
                "inline image data must be uploaded before create/update".into(),
            )),
        }
    }
}

/// In-memory implementation of [`RemoteStore`].
///
/// Cloning shares the underlying state, so a test can keep one handle for
/// assertions while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Mutex poisoning only happens if a holder panicked; tests want the
        // panic propagated, not masked.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -------------------------------------------------------------------------
    // Test controls
    // -------------------------------------------------------------------------

    /// Makes every subsequent call fail with `Unreachable` until re-enabled.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Injects one transient failure into the next call.
    pub fn fail_next(&self, msg: impl Into<String>) {
        self.lock().fail_next = Some(msg.into());
    }

    /// Returns the ordered log of calls made so far.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Seeds a record directly, bypassing version checks.
    pub fn seed(&self, record: CatalogRecord) {
        self.lock().records.insert(record.id.clone(), record);
    }

    /// Snapshot of one record, if present.
    pub fn record(&self, id: &str) -> Option<CatalogRecord> {
        self.lock().records.get(id).cloned()
    }

    /// Number of records held, tombstones included.
    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    /// Snapshot of one stored blob, if present.
    pub fn blob(&self, url: &str) -> Option<Vec<u8>> {
        self.lock().blobs.get(url).cloned()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn get(&self, id: &str) -> RemoteResult<CatalogRecord> {
        let mut inner = self.lock();
        inner.gate(&format!("get {id}"))?;

        inner
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn list_since(&self, since: Option<DateTime<Utc>>) -> RemoteResult<Vec<CatalogRecord>> {
        let mut inner = self.lock();
        inner.gate("list_since")?;

        let mut records: Vec<CatalogRecord> = inner
            .records
            .values()
            .filter(|r| match since {
                None => true,
                Some(cutoff) => r.last_modified_at > cutoff,
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn create(
        &self,
        draft: &RecordDraft,
        modified_at: DateTime<Utc>,
        modified_by: &str,
    ) -> RemoteResult<CatalogRecord> {
        let mut inner = self.lock();
        inner.gate(&format!("create {}", draft.name))?;

        let image_url = Inner::image_url_from_draft(draft)?;

        inner.next_id += 1;
        let id = format!("srv-{}", inner.next_id);

        let record = CatalogRecord {
            id: id.clone(),
            name: draft.name.clone(),
            description: draft.description.clone(),
            attributes: draft.attributes.clone(),
            image_url,
            version: 1,
            last_modified_at: modified_at,
            last_modified_by: modified_by.to_string(),
            deleted: false,
        };
        inner.records.insert(id, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: &str,
        draft: &RecordDraft,
        expected_version: i64,
        modified_at: DateTime<Utc>,
        modified_by: &str,
    ) -> RemoteResult<CatalogRecord> {
        let mut inner = self.lock();
        inner.gate(&format!("update {id}"))?;

        let image_url = Inner::image_url_from_draft(draft)?;

        let current = inner
            .records
            .get(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;

        if current.version != expected_version {
            return Err(RemoteError::VersionConflict {
                current: current.version,
            });
        }

        let updated = CatalogRecord {
            id: id.to_string(),
            name: draft.name.clone(),
            description: draft.description.clone(),
            attributes: draft.attributes.clone(),
            image_url: image_url.or_else(|| current.image_url.clone()),
            version: current.version + 1,
            last_modified_at: modified_at,
            last_modified_by: modified_by.to_string(),
            deleted: false,
        };
        inner.records.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn delete(
        &self,
        id: &str,
        expected_version: i64,
        modified_at: DateTime<Utc>,
        modified_by: &str,
    ) -> RemoteResult<CatalogRecord> {
        let mut inner = self.lock();
        inner.gate(&format!("delete {id}"))?;

        let current = inner
            .records
            .get(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;

        if current.version != expected_version {
            return Err(RemoteError::VersionConflict {
                current: current.version,
            });
        }

        let mut tombstone = current.clone();
        tombstone.deleted = true;
        tombstone.version += 1;
        tombstone.last_modified_at = modified_at;
        tombstone.last_modified_by = modified_by.to_string();

        inner.records.insert(id.to_string(), tombstone.clone());
        Ok(tombstone)
    }

    async fn upload_image(&self, entity_id: &str, bytes: &[u8]) -> RemoteResult<String> {
        let mut inner = self.lock();
        inner.gate(&format!("upload_image {entity_id}"))?;

        if bytes.is_empty() {
            return Err(RemoteError::Validation("empty image payload".into()));
        }

        inner.next_blob_id += 1;
        let url = format!("https://blobs.curio.test/{}", inner.next_blob_id);
        inner.blobs.insert(url.clone(), bytes.to_vec());
        Ok(url)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> RecordDraft {
        RecordDraft::named(name)
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_version_one() {
        let remote = MemoryRemote::new();

        let record = remote
            .create(&draft("Vase"), Utc::now(), "device-a")
            .await
            .unwrap();

        assert_eq!(record.id, "srv-1");
        assert_eq!(record.version, 1);
        assert!(!record.deleted);
    }

    #[tokio::test]
    async fn test_update_enforces_expected_version() {
        let remote = MemoryRemote::new();
        let created = remote
            .create(&draft("Vase"), Utc::now(), "device-a")
            .await
            .unwrap();

        let updated = remote
            .update(&created.id, &draft("Ming Vase"), 1, Utc::now(), "device-a")
            .await
            .unwrap();
        assert_eq!(updated.version, 2);

        let err = remote
            .update(&created.id, &draft("Qing Vase"), 1, Utc::now(), "device-b")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::VersionConflict { current: 2 }));
    }

    #[tokio::test]
    async fn test_delete_returns_tombstone() {
        let remote = MemoryRemote::new();
        let created = remote
            .create(&draft("Vase"), Utc::now(), "device-a")
            .await
            .unwrap();

        let tombstone = remote
            .delete(&created.id, 1, Utc::now(), "device-a")
            .await
            .unwrap();

        assert!(tombstone.deleted);
        assert_eq!(tombstone.version, 2);
        // Tombstones stay visible to get() and list_since()
        assert!(remote.get(&created.id).await.unwrap().deleted);
    }

    #[tokio::test]
    async fn test_offline_fails_everything() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);

        let err = remote
            .create(&draft("Vase"), Utc::now(), "device-a")
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        remote.set_offline(false);
        remote
            .create(&draft("Vase"), Utc::now(), "device-a")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fail_next_is_one_shot() {
        let remote = MemoryRemote::new();
        remote.fail_next("flaky network");

        assert!(remote.list_since(None).await.is_err());
        assert!(remote.list_since(None).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_since_filters_by_timestamp() {
        let remote = MemoryRemote::new();
        let early = Utc::now() - chrono::Duration::hours(2);
        let late = Utc::now();

        remote.create(&draft("Old"), early, "device-a").await.unwrap();
        remote.create(&draft("New"), late, "device-a").await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let changed = remote.list_since(Some(cutoff)).await.unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].name, "New");

        let all = remote.list_since(None).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_inline_image_rejected_at_write() {
        let remote = MemoryRemote::new();
        let mut d = draft("Vase");
        d.image = Some(ImageData::Inline {
            base64: "aGVsbG8=".to_string(),
        });

        let err = remote.create(&d, Utc::now(), "device-a").await.unwrap_err();
        assert!(matches!(err, RemoteError::Validation(_)));
    }

    #[tokio::test]
    async fn test_upload_image_stores_blob() {
        let remote = MemoryRemote::new();
        let url = remote.upload_image("srv-1", b"pixels").await.unwrap();

        assert_eq!(remote.blob(&url).unwrap(), b"pixels");
    }
}
