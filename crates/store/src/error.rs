//! Error types for entity store operations

/// Error type for store reads and writes
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend cannot serve requests
    #[error("Entity store unavailable")]
    Unavailable,

    /// A row violates a storage invariant
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// Failed to read a dataset file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a TOML dataset
    #[error("Failed to parse dataset: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
