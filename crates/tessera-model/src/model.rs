use tessera_types::Path;

use crate::context::ModelHandle;
use crate::editor::{AnyModel, ModelKind};
use crate::error::Result;

/// A typed projection of a subtree.
///
/// Implemented by every concrete model and by the [`AnyModel`] sum type, so
/// collections and references can be typed either precisely or as "any
/// registered model".
pub trait Model: Clone + Sized {
    fn handle(&self) -> &ModelHandle;

    fn path(&self) -> &Path {
        self.handle().path()
    }

    /// Narrow a resolved model to this type.
    fn from_any(model: AnyModel) -> Option<Self>;

    fn into_any(self) -> AnyModel;

    /// Models this one points at through reference properties or groups.
    ///
    /// Cycles are allowed; callers walking these edges must carry a
    /// [`VisitSet`](crate::VisitSet).
    fn references(&self) -> Vec<AnyModel> {
        Vec::new()
    }
}

/// A concrete model type that can be bound directly to a path.
pub trait BindModel: Model {
    const KIND: ModelKind;

    /// Wrap a handle. Never touches the tree.
    fn bind(handle: ModelHandle) -> Self;

    /// Soft-apply property defaults. Existing values are never overwritten.
    fn initialize(&self) -> Result<()> {
        Ok(())
    }
}
