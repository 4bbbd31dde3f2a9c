//! Error types for store operations.

use thiserror::Error;

/// Errors produced by store operations.
///
/// Data absence is never an error here: reads return `Option` and deletes of
/// missing keys are no-ops.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A path could not be constructed (empty key sequence).
    #[error("invalid path: {0}")]
    InvalidPath(#[from] tessera_types::TypeError),

    /// A snapshot root was not a mapping.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// A typed value could not be converted to or from the tree.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The asset collaborator has no asset at this path.
    #[error("asset not found: {0}")]
    AssetNotFound(String),

    /// The asset collaborator failed.
    #[error("asset I/O error: {0}")]
    AssetIo(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
