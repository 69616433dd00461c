//! # Mutation Model
//!
//! The durable mutation queue's domain model: actions, typed payloads, and
//! the per-mutation retry state machine.
//!
//! ## Queue Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     pending_mutations Queue                             │
//! │                                                                         │
//! │  seq | entity_id | action | payload              | retry | last_error  │
//! │  ────┼───────────┼────────┼──────────────────────┼───────┼──────────── │
//! │   1  │ local-a1  │ create │ {kind:create, ...}   │ 0     │ NULL        │
//! │   2  │ rec-b2    │ update │ {kind:update, v:1..} │ 2     │ "timeout"   │
//! │   3  │ rec-b2    │ update │ {kind:update, v:2..} │ 0     │ NULL        │
//! │   4  │ local-a1  │ delete │ {kind:delete, ...}   │ 0     │ NULL        │
//! │                                                                         │
//! │  • Replay order is ascending sequence_id (insertion order)             │
//! │  • Multiple mutations per entity are preserved, never coalesced —      │
//! │    later mutations logically supersede earlier ones when replayed      │
//! │  • An entry is removed only after its remote replay succeeds or the    │
//! │    conflict policy deliberately resolves it                            │
//! │  • create(local-a1) + delete(local-a1) with no sync in between is      │
//! │    discarded as a pair: the record never existed remotely             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Retry State Machine
//! Retry behavior is an explicit per-mutation state machine rather than
//! recursive async retries, so the ceiling and reset behavior are testable
//! in isolation:
//!
//! `Pending → Retrying → Failed → (reset) → Pending`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::RecordDraft;

// =============================================================================
// Mutation Action
// =============================================================================

/// The kind of change a queued mutation represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for MutationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationAction::Create => write!(f, "create"),
            MutationAction::Update => write!(f, "update"),
            MutationAction::Delete => write!(f, "delete"),
        }
    }
}

impl std::str::FromStr for MutationAction {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(MutationAction::Create),
            "update" => Ok(MutationAction::Update),
            "delete" => Ok(MutationAction::Delete),
            other => Err(crate::error::CoreError::UnknownAction(other.to_string())),
        }
    }
}

// =============================================================================
// Mutation Payload
// =============================================================================

/// The typed body of a queued mutation.
///
/// A tagged union keyed by action keeps the queue heterogeneous while
/// preserving compile-time safety — there is no `payload: any` here. Each
/// variant carries everything needed to replay the change remotely, captured
/// at enqueue time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationPayload {
    /// Create a record that does not yet exist remotely.
    Create {
        draft: RecordDraft,
        #[ts(as = "String")]
        modified_at: DateTime<Utc>,
        modified_by: String,
    },

    /// Update an existing record, expecting the given remote version.
    Update {
        draft: RecordDraft,
        expected_version: i64,
        #[ts(as = "String")]
        modified_at: DateTime<Utc>,
        modified_by: String,
    },

    /// Soft-delete an existing record, expecting the given remote version.
    Delete {
        expected_version: i64,
        #[ts(as = "String")]
        modified_at: DateTime<Utc>,
        modified_by: String,
    },
}

impl MutationPayload {
    /// The action this payload encodes.
    pub fn action(&self) -> MutationAction {
        match self {
            MutationPayload::Create { .. } => MutationAction::Create,
            MutationPayload::Update { .. } => MutationAction::Update,
            MutationPayload::Delete { .. } => MutationAction::Delete,
        }
    }

    /// The wall-clock timestamp of the local change, used by last-write-wins
    /// conflict arbitration.
    pub fn modified_at(&self) -> DateTime<Utc> {
        match self {
            MutationPayload::Create { modified_at, .. }
            | MutationPayload::Update { modified_at, .. }
            | MutationPayload::Delete { modified_at, .. } => *modified_at,
        }
    }

    /// The actor that made the local change.
    pub fn modified_by(&self) -> &str {
        match self {
            MutationPayload::Create { modified_by, .. }
            | MutationPayload::Update { modified_by, .. }
            | MutationPayload::Delete { modified_by, .. } => modified_by,
        }
    }

    /// The remote version this payload expects, `None` for creates.
    pub fn expected_version(&self) -> Option<i64> {
        match self {
            MutationPayload::Create { .. } => None,
            MutationPayload::Update {
                expected_version, ..
            }
            | MutationPayload::Delete {
                expected_version, ..
            } => Some(*expected_version),
        }
    }
}

// =============================================================================
// Pending Mutation
// =============================================================================

/// A durably queued, not-yet-confirmed local change.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PendingMutation {
    /// Insertion order; also the replay order.
    pub sequence_id: i64,

    /// Entity kind tag (see [`crate::RECORD_ENTITY_TYPE`]).
    pub entity_type: String,

    /// Id of the record this mutation targets. May be a local placeholder.
    pub entity_id: String,

    pub action: MutationAction,

    /// JSON-encoded [`MutationPayload`].
    pub payload: String,

    /// Number of failed replay attempts so far.
    pub retry_count: i64,

    /// Error recorded by the most recent failed replay.
    pub last_error: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl PendingMutation {
    /// Decodes the typed payload.
    pub fn decode_payload(&self) -> Result<MutationPayload, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }

    /// Current position in the retry state machine for the given ceiling.
    pub fn state(&self, ceiling: u32) -> MutationState {
        if self.retry_count >= i64::from(ceiling) {
            MutationState::Failed
        } else if self.retry_count > 0 {
            MutationState::Retrying
        } else {
            MutationState::Pending
        }
    }
}

// =============================================================================
// Mutation State
// =============================================================================

/// Explicit retry state of a queued mutation.
///
/// `Failed` mutations are excluded from automatic replays until an explicit
/// reset returns them to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    /// Never failed; replayed on the next drain.
    Pending,
    /// Failed at least once but still below the ceiling.
    Retrying,
    /// At or above the ceiling; requires an explicit reset.
    Failed,
}

// =============================================================================
// Unit Tests
// =============================================================================
