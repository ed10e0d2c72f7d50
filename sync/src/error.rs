//! Unified error handling for the sync crate.

use satchel_engine::MutationId;

/// Errors surfaced by the sync client's public operations.
///
/// Note the narrow surface: once a mutation is queued, its failures never
/// propagate to the enqueueing caller - they are reported asynchronously via
/// the status facade. Only preconditions and local faults land here.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Cannot sync while offline")]
    Offline,

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] satchel_engine::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue is full and holds no evictable failed items")]
    QueueFull,

    #[error("No queued mutation with id {0}")]
    NotFound(MutationId),

    #[error("Mutation {0} is not in the failed state")]
    NotFailed(MutationId),
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
