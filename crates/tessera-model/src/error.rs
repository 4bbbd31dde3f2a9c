//! Error types for model operations.

use tessera_store::StoreError;
use tessera_types::{Path, TypeError};
use thiserror::Error;

use crate::editor::ModelKind;

/// Errors produced by model writes and group operations.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid path: {0}")]
    InvalidPath(#[from] TypeError),

    #[error("no registry entry builds a {kind} for group {group}")]
    Unregistered { kind: ModelKind, group: Path },

    #[error("serialization error for property '{property}': {reason}")]
    Serialization { property: String, reason: String },
}

/// Why a path could not be turned into a typed model.
///
/// Both cases are expected in steady state: reference getters degrade them
/// to `None` and group enumeration skips the entry.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Nothing is stored at the referenced path.
    #[error("unresolved reference: {0}")]
    UnresolvedReference(Path),

    /// A node exists but no registry entry accepts it.
    #[error("no registry entry matches {0}")]
    NoRegistryMatch(Path),
}

/// Convenience type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
