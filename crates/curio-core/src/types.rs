//! # Domain Types
//!
//! Core domain types for the Curio catalog.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │  CatalogRecord   │   │   CachedRecord   │   │   RecordDraft    │    │
//! │  │  ──────────────  │   │  ──────────────  │   │  ──────────────  │    │
//! │  │  id              │   │  record          │   │  name            │    │
//! │  │  name            │   │  local_only      │   │  description     │    │
//! │  │  version         │   │  synced          │   │  attributes      │    │
//! │  │  last_modified_* │   │                  │   │  image           │    │
//! │  │  deleted         │   │  (local flags)   │   │  (no identity)   │    │
//! │  └──────────────────┘   └──────────────────┘   └──────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Version Invariant
//! `version` is assigned by the remote store and only ever increases. Any
//! write that would not increase the version is rejected as stale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Catalog Record
// =============================================================================

/// A versioned catalog record, synchronized between the local cache and the
/// remote authoritative store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CatalogRecord {
    /// Unique identifier. Canonical ids are remote-assigned UUIDs; records
    /// created offline carry a `local-{uuid}` placeholder until their first
    /// successful push.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Optional free-text description.
    pub description: Option<String>,

    /// Free-form domain fields (JSON object).
    pub attributes: serde_json::Value,

    /// Remote representation of an attached image, if any.
    pub image_url: Option<String>,

    /// Monotonically increasing version, assigned by the remote store.
    /// A locally created record that has never been pushed is version 0.
    pub version: i64,

    /// When the record was last modified (wall clock of the writer).
    #[ts(as = "String")]
    pub last_modified_at: DateTime<Utc>,

    /// Actor that performed the last modification (device id).
    pub last_modified_by: String,

    /// Soft-delete flag. Deleted records remain as tombstones until the
    /// remote store permanently removes them.
    pub deleted: bool,
}

// =============================================================================
// Cached Record
// =============================================================================

/// A [`CatalogRecord`] as held in the local cache, plus two local-only flags.
///
/// ## Lifecycle
/// Created on first local read or local write; updated on every local or
/// remote write; the cache row is removed only when the record is permanently
/// removed remotely and that removal has been acknowledged locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CachedRecord {
    /// The record itself.
    #[serde(flatten)]
    pub record: CatalogRecord,

    /// True while the record has never been successfully pushed remotely.
    pub local_only: bool,

    /// True when the local copy matches the last known remote copy.
    pub synced: bool,
}

impl CachedRecord {
    /// Wraps a record freshly received from the remote store.
    pub fn from_remote(record: CatalogRecord) -> Self {
        CachedRecord {
            record,
            local_only: false,
            synced: true,
        }
    }

    /// Wraps a record created or edited locally and not yet pushed.
    pub fn local(record: CatalogRecord, local_only: bool) -> Self {
        CachedRecord {
            record,
            local_only,
            synced: false,
        }
    }
}

// =============================================================================
// Record Draft
// =============================================================================

/// Collaborator-supplied payload for creating or updating a record.
///
/// A draft carries no identity, version, or authorship — the engine assigns
/// those. It is also what gets captured inside a queued mutation, so it must
/// be self-contained (hence inline image bytes rather than file handles).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RecordDraft {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Free-form domain fields. Must be a JSON object.
    #[serde(default = "empty_object")]
    pub attributes: serde_json::Value,

    /// Optional attached image.
    #[serde(default)]
    pub image: Option<ImageData>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl RecordDraft {
    /// Creates a draft with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        RecordDraft {
            name: name.into(),
            description: None,
            attributes: empty_object(),
            image: None,
        }
    }
}

// =============================================================================
// Image Data
// =============================================================================

/// An image attached to a record.
///
/// Enqueue time captures the semantic change only: an image picked while
/// offline is carried inline (base64). The synchronizer translates inline
/// data into its remote representation at replay time, never at enqueue time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageData {
    /// Raw image bytes, base64-encoded, not yet uploaded.
    Inline { base64: String },

    /// Already-uploaded image referenced by its remote URL.
    Remote { url: String },
}

// =============================================================================
// List Filter
// =============================================================================

/// Sort key for [`ListFilter`]. The cache makes no ordering guarantee beyond
/// the caller-specified key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    ModifiedAt,
}

/// Filter for scanning cached records.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ListFilter {
    /// Include soft-deleted tombstones. Default: false.
    #[serde(default)]
    pub include_deleted: bool,

    /// Case-insensitive substring match on the name.
    #[serde(default)]
    pub name_contains: Option<String>,

    #[serde(default)]
    pub sort: SortKey,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(version: i64) -> CatalogRecord {
        CatalogRecord {
            id: "r-1".into(),
            name: "Brass astrolabe".into(),
            description: None,
            attributes: serde_json::json!({}),
            image_url: None,
            version,
            last_modified_at: Utc::now(),
            last_modified_by: "device-1".into(),
            deleted: false,
        }
    }

    #[test]
    fn test_from_remote_sets_flags() {
        let cached = CachedRecord::from_remote(record(3));
        assert!(cached.synced);
        assert!(!cached.local_only);
    }

    #[test]
    fn test_cached_record_serde_flattens() {
        let cached = CachedRecord::local(record(0), true);
        let value = serde_json::to_value(&cached).unwrap();
        // record fields sit at the top level next to the local flags
        assert_eq!(value["id"], "r-1");
        assert_eq!(value["local_only"], true);
        assert_eq!(value["synced"], false);
    }

    #[test]
    fn test_draft_defaults() {
        let draft: RecordDraft = serde_json::from_str(r#"{"name":"Sextant"}"#).unwrap();
        assert_eq!(draft.name, "Sextant");
        assert!(draft.attributes.is_object());
        assert!(draft.image.is_none());
    }

    #[test]
    fn test_image_data_tagged_serde() {
        let inline = ImageData::Inline {
            base64: "aGVsbG8=".into(),
        };
        let json = serde_json::to_string(&inline).unwrap();
        assert!(json.contains(r#""kind":"inline""#));
        let back: ImageData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, inline);
    }
}
