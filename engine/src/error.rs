//! Error types for the Satchel engine.

use crate::{EntityId, EntityType, MutationId};
use thiserror::Error;

/// All possible errors from the Satchel engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Route configuration errors
    #[error("no route configured for {entity_type}/{action}")]
    UnconfiguredRoute {
        entity_type: EntityType,
        action: String,
    },

    #[error("route already configured for {entity_type}/{action}")]
    DuplicateRoute {
        entity_type: EntityType,
        action: String,
    },

    #[error("route template '{0}' must contain an {{id}} parameter")]
    InvalidRouteTemplate(String),

    #[error("path template '{0}' requires an id but none was supplied")]
    MissingPathParam(String),

    // Mutation errors
    #[error("mutation {0} carries no target id in its payload")]
    MissingTargetId(MutationId),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    // Reconciliation errors
    #[error("placeholder {placeholder} already mapped to {existing}, refusing remap to {requested}")]
    PlaceholderRemapped {
        placeholder: EntityId,
        existing: EntityId,
        requested: EntityId,
    },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
