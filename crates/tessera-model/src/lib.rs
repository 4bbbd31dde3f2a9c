//! Typed model projections over a Tessera project.
//!
//! A model is a lightweight handle binding a [`Project`](tessera_store::Project)
//! and a [`Path`](tessera_types::Path). Models never own tree data: they read
//! and write it through typed property descriptors, and they can be rebuilt
//! from raw tree data at any time through a [`SyncRegistry`].
//!
//! - [`ValueProperty`] / [`ReferenceProperty`]: typed accessors bound to a
//!   leaf under the model's path
//! - [`SyncRegistry`]: first-match prefix/predicate dispatch to constructors
//! - [`ReferenceGroup`]: live, ordered collection view over a path prefix
//! - [`VisitSet`]: explicit cycle guard for traversals over references
//! - [`editor`]: the editor's concrete model variants and [`AnyModel`]

pub mod context;
pub mod editor;
pub mod error;
pub mod group;
pub mod model;
pub mod property;
pub mod registry;
pub mod traverse;

pub use context::{ModelContext, ModelHandle};
pub use editor::{AnyModel, Composite, Image, ModelKind, Scene, Shape, Text};
pub use error::{ModelError, ResolveError, Result};
pub use group::ReferenceGroup;
pub use model::{BindModel, Model};
pub use property::{ReferenceProperty, ValueProperty};
pub use registry::{SyncEntry, SyncPredicate, SyncRegistry};
pub use traverse::{walk_references, VisitSet};
