//! Cycle-safe traversal over model references.
//!
//! Reference graphs may contain cycles (a composite embedding a scene that
//! embeds it back). Every recursive walk carries a [`VisitSet`] explicitly
//! instead of relying on hidden per-instance flags.

use std::collections::HashSet;

use tessera_types::Path;

use crate::editor::AnyModel;
use crate::model::Model;

/// The set of model paths currently being visited on a traversal stack.
#[derive(Debug, Default)]
pub struct VisitSet {
    active: HashSet<Path>,
}

impl VisitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `path` as being visited. Returns `false` if it already is, in
    /// which case the caller must not descend.
    pub fn enter(&mut self, path: &Path) -> bool {
        self.active.insert(path.clone())
    }

    /// Unmark `path` once its subtree is done.
    pub fn leave(&mut self, path: &Path) {
        self.active.remove(path);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.active.contains(path)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Depth-first, pre-order walk from `model` along [`Model::references`].
///
/// `visit` is called once per model reached on each acyclic path; a model
/// already on the current stack is not re-entered. Returns the number of
/// models visited.
pub fn walk_references<M, F>(model: &M, visited: &mut VisitSet, visit: &mut F) -> usize
where
    M: Model,
    F: FnMut(&AnyModel),
{
    let any = model.clone().into_any();
    walk(&any, visited, visit)
}

fn walk<F: FnMut(&AnyModel)>(model: &AnyModel, visited: &mut VisitSet, visit: &mut F) -> usize {
    if !visited.enter(model.path()) {
        return 0;
    }
    visit(model);
    let mut count = 1;
    for next in model.references() {
        count += walk(&next, visited, visit);
    }
    visited.leave(model.path());
    count
}
