//! Error types for the permission engine

use permrs_store::StoreError;
use uuid::Uuid;

use crate::expression::ExpressionError;

/// Error type for resolver, reader and writer operations
#[derive(Debug, thiserror::Error)]
pub enum PermsError {
    /// Engine used before `init()`
    #[error("Permission engine not initialized")]
    NotInitialized,

    /// Mutation would duplicate an existing row
    #[error("{what} is already set")]
    AlreadySet { what: String },

    /// Mutation would remove a row that does not exist
    #[error("{what} was not set")]
    NotSet { what: String },

    /// A world was given without a server
    #[error("World scope requires a server")]
    InvalidScope,

    /// Permission literal is empty or malformed
    #[error("Invalid permission: '{0}'")]
    InvalidPermission(String),

    /// Group name is empty
    #[error("Invalid group name: '{0}'")]
    InvalidGroup(String),

    /// User entity name is not a UUID
    #[error("Invalid player id: '{0}'")]
    InvalidPlayerId(String),

    /// Storage fault during a read or write
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Storage fault while loading a player snapshot
    #[error("Failed to load player {id}: {source}")]
    PlayerLoad {
        id: Uuid,
        #[source]
        source: StoreError,
    },

    /// Permission expression could not be parsed
    #[error("Invalid permission expression: {0}")]
    Expression(#[from] ExpressionError),
}

/// Result type for engine operations
pub type PermsResult<T> = Result<T, PermsError>;
