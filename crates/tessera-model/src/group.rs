use std::fmt;
use std::marker::PhantomData;

use serde_json::Value;
use tracing::debug;

use tessera_store::StoreError;
use tessera_types::Path;

use crate::context::ModelContext;
use crate::error::{ModelError, Result};
use crate::model::{BindModel, Model};

/// Live, ordered collection of typed models under a path prefix.
///
/// Every key under `prefix` is one member. A member's node is either the
/// model itself, or a stored path (JSON array) pointing at a model that
/// lives elsewhere. Enumeration order is the key order of the underlying
/// mapping, which is insertion order.
pub struct ReferenceGroup<M> {
    context: ModelContext,
    prefix: Path,
    _marker: PhantomData<fn() -> M>,
}

impl<M> Clone for ReferenceGroup<M> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            prefix: self.prefix.clone(),
            _marker: PhantomData,
        }
    }
}

impl<M: Model> ReferenceGroup<M> {
    pub fn new(context: ModelContext, prefix: Path) -> Self {
        Self {
            context,
            prefix,
            _marker: PhantomData,
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Keys currently present under the prefix, in order.
    pub fn keys(&self) -> Vec<String> {
        self.context.project().child_keys(&self.prefix)
    }

    /// Number of keys under the prefix, resolvable or not.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve every member into a typed model, in key order.
    ///
    /// Members that are dangling, unmatched by the registry, or of another
    /// type are skipped.
    pub fn model_list(&self) -> Vec<M> {
        self.members()
            .into_iter()
            .filter_map(|(_, model)| model)
            .collect()
    }

    /// Add `model` to the group and return its member entry path.
    ///
    /// If the model is already a member (it lives directly under the prefix,
    /// or an entry already points at its path) the existing entry is
    /// returned and nothing is written. Otherwise the model's path is
    /// recorded under a freshly generated key.
    pub fn add_model(&self, model: &M) -> Result<Path> {
        self.record(model.path())
    }

    /// Remove the member pointing at `model`. Returns whether one was found.
    pub fn remove_model(&self, model: &M) -> bool {
        match self.entry_for(model.path()) {
            Some(entry) => {
                self.context.project().delete(&entry);
                true
            }
            None => false,
        }
    }

    /// Delete every key under the prefix.
    pub fn clear_models(&self) {
        for key in self.keys() {
            self.context.project().delete(&self.prefix.child(key));
        }
    }

    /// Returns `true` if a resolved member has the same path as `model`.
    pub fn has_model(&self, model: &M) -> bool {
        self.model_list()
            .iter()
            .any(|member| member.path() == model.path())
    }

    /// Every member entry with its resolved model, if any.
    fn members(&self) -> Vec<(Path, Option<M>)> {
        self.keys()
            .into_iter()
            .map(|key| {
                let entry = self.prefix.child(key);
                let target = self.target_of(&entry);
                let model = match self.context.resolve(&target) {
                    Ok(model) => M::from_any(model),
                    Err(err) => {
                        debug!(group = %self.prefix, %entry, error = %err, "skipping group member");
                        None
                    }
                };
                (entry, model)
            })
            .collect()
    }

    /// The path a member entry stands for: the stored path for a reference
    /// entry, the entry itself otherwise.
    fn target_of(&self, entry: &Path) -> Path {
        match self.context.project().get(entry) {
            Some(raw @ Value::Array(_)) => serde_json::from_value(raw).unwrap_or_else(|_| entry.clone()),
            _ => entry.clone(),
        }
    }

    fn record(&self, target: &Path) -> Result<Path> {
        if let Some(entry) = self.entry_for(target) {
            return Ok(entry);
        }
        let raw = serde_json::to_value(target).map_err(StoreError::from)?;
        let entry = self.prefix.child(self.context.project().generate_key());
        self.context.project().set(&entry, raw);
        debug!(group = %self.prefix, %entry, %target, "reference added to group");
        Ok(entry)
    }

    fn entry_for(&self, path: &Path) -> Option<Path> {
        self.keys().into_iter().find_map(|key| {
            let entry = self.prefix.child(key);
            (entry == *path || self.target_of(&entry) == *path).then_some(entry)
        })
    }

    /// Create a model of concrete type `N` under a freshly generated key,
    /// writing its default property set, then let `init` fill it in.
    ///
    /// When the registry builds `N` directly under this group's prefix the
    /// model is created in place. Otherwise it is created in the first
    /// collection registered for `N` and this group records a reference to
    /// it. Either way the new model is a member exactly once.
    ///
    /// Useful on heterogeneous groups such as `ReferenceGroup<AnyModel>`.
    pub fn add_new_of<N: BindModel>(&self, init: impl FnOnce(&N) -> Result<()>) -> Result<N> {
        let unregistered = || ModelError::Unregistered {
            kind: N::KIND,
            group: self.prefix.clone(),
        };
        let home = self
            .context
            .registry()
            .home_for(N::KIND, &self.prefix)
            .ok_or_else(unregistered)?;

        let path = home.child(self.context.project().generate_key());
        let model = self.context.create::<N>(path)?;
        match self.context.resolve(model.path()) {
            Ok(resolved) if resolved.kind() == N::KIND => {}
            _ => {
                self.context.project().delete(model.path());
                return Err(unregistered());
            }
        }
        init(&model)?;

        if home != self.prefix {
            self.record(model.path())?;
        }
        debug!(group = %self.prefix, path = %model.path(), kind = %N::KIND, "model created in group");
        Ok(model)
    }
}

impl<M: BindModel> ReferenceGroup<M> {
    /// Create a new member model. See [`add_new_of`](Self::add_new_of).
    pub fn add_new(&self, init: impl FnOnce(&M) -> Result<()>) -> Result<M> {
        self.add_new_of::<M>(init)
    }
}

impl<M> fmt::Debug for ReferenceGroup<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReferenceGroup({})", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tessera_store::Project;
    use tessera_types::KeyGenerator;

    use super::*;
    use crate::editor::{AnyModel, Scene, Shape, Text};
    use crate::registry::SyncRegistry;

    fn context() -> ModelContext {
        let project = Arc::new(Project::new(Arc::new(KeyGenerator::new())));
        ModelContext::new(project, Arc::new(SyncRegistry::editor()))
    }

    #[test]
    fn enumeration_follows_insertion_order() {
        let ctx = context();
        let scenes = ReferenceGroup::<Scene>::new(ctx.clone(), Path::root("scenes"));
        let a = scenes.add_new(|s| s.set_name("A")).unwrap();
        let b = scenes.add_new(|s| s.set_name("B")).unwrap();
        let c = scenes.add_new(|s| s.set_name("C")).unwrap();

        let names: Vec<String> = scenes.model_list().iter().filter_map(Scene::name).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        let paths: Vec<Path> = scenes.model_list().iter().map(|s| s.path().clone()).collect();
        assert_eq!(paths, vec![a.path().clone(), b.path().clone(), c.path().clone()]);
    }

    #[test]
    fn add_model_is_idempotent() {
        let ctx = context();
        let objects = ReferenceGroup::<AnyModel>::new(ctx.clone(), Path::root("objects"));
        let shape = objects.add_new_of::<Shape>(|_| Ok(())).unwrap().into_any();

        let layer = ReferenceGroup::<AnyModel>::new(ctx.clone(), Path::root("layer"));
        let first = layer.add_model(&shape).unwrap();
        let second = layer.add_model(&shape).unwrap();
        assert_eq!(first, second);

        let members = layer.model_list();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].path(), shape.path());
        assert!(layer.has_model(&shape));
    }

    #[test]
    fn add_model_already_under_prefix_writes_nothing() {
        let ctx = context();
        let objects = ReferenceGroup::<AnyModel>::new(ctx.clone(), Path::root("objects"));
        let text = objects.add_new_of::<Text>(|_| Ok(())).unwrap().into_any();
        let before = ctx.project().timeline_len();

        assert_eq!(objects.add_model(&text).unwrap(), text.path().clone());
        assert_eq!(ctx.project().timeline_len(), before);
    }

    #[test]
    fn unmatched_and_dangling_members_are_skipped() {
        let ctx = context();
        let objects = ReferenceGroup::<AnyModel>::new(ctx.clone(), Path::root("objects"));
        objects.add_new_of::<Shape>(|_| Ok(())).unwrap();
        ctx.project().set(&Path::root("objects").child("zz-video"), json!({"type": "video"}));
        objects.add_new_of::<Text>(|_| Ok(())).unwrap();

        let layer = ReferenceGroup::<AnyModel>::new(ctx.clone(), Path::root("layer"));
        layer.add_model(&objects.model_list()[0]).unwrap();
        ctx.project().set(&Path::root("layer").child("dangling"), json!(["objects", "missing"]));

        assert_eq!(objects.len(), 3);
        assert_eq!(objects.model_list().len(), 2);
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.model_list().len(), 1);
    }

    #[test]
    fn typed_group_filters_other_variants() {
        let ctx = context();
        let any = ReferenceGroup::<AnyModel>::new(ctx.clone(), Path::root("objects"));
        any.add_new_of::<Shape>(|_| Ok(())).unwrap();
        any.add_new_of::<Text>(|_| Ok(())).unwrap();

        let shapes = ReferenceGroup::<Shape>::new(ctx, Path::root("objects"));
        assert_eq!(shapes.model_list().len(), 1);
    }

    #[test]
    fn clear_and_remove() {
        let ctx = context();
        let objects = ReferenceGroup::<AnyModel>::new(ctx.clone(), Path::root("objects"));
        let shape = objects.add_new_of::<Shape>(|_| Ok(())).unwrap().into_any();
        let text = objects.add_new_of::<Text>(|_| Ok(())).unwrap().into_any();

        assert!(objects.remove_model(&shape));
        assert!(!objects.remove_model(&shape));
        assert!(!objects.has_model(&shape));
        assert!(objects.has_model(&text));

        objects.clear_models();
        assert!(objects.is_empty());
        assert_eq!(ctx.project().get(&Path::root("objects")), Some(json!({})));
    }

    #[test]
    fn add_new_outside_a_collection_records_a_reference() {
        let ctx = context();
        let scene = ReferenceGroup::<Scene>::new(ctx.clone(), Path::root("scenes"))
            .add_new(|_| Ok(()))
            .unwrap();

        let shape = scene.objects().add_new_of::<Shape>(|_| Ok(())).unwrap();
        assert!(shape.path().is_child_of(&Path::root("objects")));

        let members = scene.objects().model_list();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].path(), shape.path());
        assert!(scene.objects().has_model(&shape.clone().into_any()));
        assert_eq!(scene.objects().len(), 1);
    }

    #[test]
    fn add_new_without_registration_fails_cleanly() {
        let project = Arc::new(Project::new(Arc::new(KeyGenerator::new())));
        let ctx = ModelContext::new(project, Arc::new(SyncRegistry::new()));
        let scenes = ReferenceGroup::<Scene>::new(ctx.clone(), Path::root("scenes"));

        let err = scenes.add_new(|_| Ok(())).unwrap_err();
        assert!(matches!(err, ModelError::Unregistered { .. }));
        assert_eq!(ctx.project().timeline_len(), 0);
    }
}
