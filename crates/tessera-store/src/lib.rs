//! Path-tree document store for Tessera.
//!
//! A [`Project`] owns a nested mapping of values that is only ever mutated by
//! appending a [`Transaction`] to its timeline. This crate provides:
//! - `Set` / `Delete` transactions and the pure tree operations applying them
//! - The `Project` document with its timeline, local state, and runtime sources
//! - Synchronous change routing to filtered listeners
//! - Deterministic replay of a timeline back into a tree
//! - The `AssetStore` collaborator contract used by models

pub mod asset;
pub mod error;
pub mod events;
pub mod project;
pub mod replay;
pub mod transaction;
pub mod tree;

pub use asset::{AssetStore, InMemoryAssetStore};
pub use error::{Result, StoreError};
pub use events::{ChangeFilter, EventKind, ListenerId, ProjectEvent};
pub use project::{Project, SourceHandle};
pub use replay::{ReplayEngine, ReplayResult};
pub use transaction::{Transaction, TransactionOp};
