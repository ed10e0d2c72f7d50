//! Mutation types for the offline queue.
//!
//! A [`PendingMutation`] is the unit of queued work: a single create, update
//! or delete that could not be delivered to the backend yet. Its position in
//! the queue is fixed by `enqueued_at` and never changes.

use crate::{EntityType, MutationId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix carried by client-generated placeholder identifiers.
///
/// An entity created while offline gets an id of the form `local-<suffix>`,
/// valid only until the create syncs and the server assigns the real id.
pub const PLACEHOLDER_PREFIX: &str = "local-";

/// Check whether an identifier is a client-generated placeholder.
pub fn is_placeholder(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_PREFIX)
}

/// The kind of write a mutation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    /// Stable lowercase name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue-visible state of a mutation.
///
/// Absence from the store implies the terminal synced state; a stored
/// mutation is always in one of these three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Waiting for the next drain cycle.
    Pending,
    /// Claimed by a running drain cycle.
    Syncing,
    /// Out of automatic retries or hit a non-retryable error; kept visible
    /// until explicitly discarded or force-retried.
    Failed,
}

impl SyncState {
    /// Whether the state is terminal for automatic draining.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Failed)
    }

    /// Stable lowercase name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Syncing => "syncing",
            SyncState::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued write waiting to be replayed against the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    /// Locally generated queue-entry id, distinct from any entity id.
    pub id: MutationId,
    /// Domain collection the mutation targets (e.g. order, product).
    pub entity_type: EntityType,
    /// What the mutation does.
    pub action: Action,
    /// Domain data; updates and deletes carry the target entity id under
    /// the `id` key, which may itself be a placeholder.
    pub payload: serde_json::Value,
    /// Queue position; the store is ordered by this.
    pub enqueued_at: Timestamp,
    /// Current queue state.
    pub sync_state: SyncState,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Last failure description, if any.
    pub last_error: Option<String>,
}

impl PendingMutation {
    /// Create a fresh pending mutation with no attempts recorded.
    pub fn new(
        id: impl Into<MutationId>,
        entity_type: impl Into<EntityType>,
        action: Action,
        payload: serde_json::Value,
        enqueued_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            action,
            payload,
            enqueued_at,
            sync_state: SyncState::Pending,
            retry_count: 0,
            last_error: None,
        }
    }

    /// The entity id this mutation targets, read from the payload.
    pub fn target_id(&self) -> Option<&str> {
        self.payload.get("id").and_then(|v| v.as_str())
    }

    /// Whether the target id is still a client-generated placeholder.
    pub fn targets_placeholder(&self) -> bool {
        self.target_id().map(is_placeholder).unwrap_or(false)
    }
}
