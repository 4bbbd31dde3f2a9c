use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use tessera_store::{Project, ProjectEvent};
use tessera_types::Path;

use crate::editor::AnyModel;
use crate::error::{ModelError, ResolveError, Result};
use crate::model::BindModel;
use crate::registry::SyncRegistry;

/// The shared environment every model handle is built over: one project and
/// the registry used to rebuild typed models from raw tree data.
#[derive(Clone)]
pub struct ModelContext {
    project: Arc<Project>,
    registry: Arc<SyncRegistry>,
}

impl ModelContext {
    pub fn new(project: Arc<Project>, registry: Arc<SyncRegistry>) -> Self {
        Self { project, registry }
    }

    pub fn project(&self) -> &Arc<Project> {
        &self.project
    }

    pub fn registry(&self) -> &Arc<SyncRegistry> {
        &self.registry
    }

    /// A fresh handle at `path`.
    pub fn handle(&self, path: Path) -> ModelHandle {
        ModelHandle {
            context: self.clone(),
            path,
            references: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Bind `M` at `path` without touching the tree.
    pub fn bind<M: BindModel>(&self, path: Path) -> M {
        M::bind(self.handle(path))
    }

    /// Bind `M` at `path` and soft-apply its property defaults.
    pub fn create<M: BindModel>(&self, path: Path) -> Result<M> {
        let model = self.bind::<M>(path);
        model.initialize()?;
        Ok(model)
    }

    /// Rebuild the typed model stored at `path` through the registry.
    pub fn resolve(&self, path: &Path) -> std::result::Result<AnyModel, ResolveError> {
        self.registry.resolve(self, path)
    }
}

impl fmt::Debug for ModelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelContext")
            .field("project", &self.project.id())
            .field("registry_entries", &self.registry.len())
            .finish()
    }
}

/// A model's binding to `(project, path)`.
///
/// Cheap to clone; clones share the cache of just-assigned reference
/// targets. The handle outlives the tree node it points at: once the node is
/// deleted every read through the handle observes absence.
#[derive(Clone)]
pub struct ModelHandle {
    context: ModelContext,
    path: Path,
    references: Arc<Mutex<HashMap<&'static str, AnyModel>>>,
}

impl ModelHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn context(&self) -> &ModelContext {
        &self.context
    }

    pub fn project(&self) -> &Arc<Project> {
        &self.context.project
    }

    /// Path of the leaf backing property `name`.
    pub fn property_path(&self, name: &str) -> Path {
        self.path.child(name)
    }

    /// Returns `true` if the model's node currently exists in the tree.
    pub fn exists(&self) -> bool {
        self.project().contains(&self.path)
    }

    /// The model's raw node.
    pub fn raw(&self) -> Option<Value> {
        self.project().get(&self.path)
    }

    /// Raw value of property `name`.
    pub fn read_raw(&self, name: &str) -> Option<Value> {
        self.project().get(&self.property_path(name))
    }

    /// Typed value of property `name`. A stored value of the wrong shape
    /// reads as absent.
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let raw = self.read_raw(name)?;
        match serde_json::from_value(raw) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(path = %self.path, property = name, error = %err, "property has unexpected shape");
                None
            }
        }
    }

    /// Write property `name`, then fire `event` for this model.
    pub fn write<T: Serialize + ?Sized>(&self, name: &str, value: &T, event: &str) -> Result<()> {
        let raw = to_raw(name, value)?;
        self.project().set(&self.property_path(name), raw);
        self.notify(event);
        Ok(())
    }

    /// Write property `name` only if nothing is stored there yet.
    pub fn soft_write<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<bool> {
        let raw = to_raw(name, value)?;
        Ok(self.project().soft_set(&self.property_path(name), raw))
    }

    /// Delete property `name`, then fire `event`.
    pub fn remove(&self, name: &str, event: &str) {
        self.project().delete(&self.property_path(name));
        self.notify(event);
    }

    /// Fire a model change notification for this handle's path.
    pub fn notify(&self, event: &str) {
        self.project().emit(ProjectEvent::ModelChanged {
            model_path: self.path.clone(),
            event: event.to_string(),
        });
    }

    pub(crate) fn cached_reference(&self, name: &'static str) -> Option<AnyModel> {
        self.references
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub(crate) fn cache_reference(&self, name: &'static str, target: AnyModel) {
        self.references
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, target);
    }

    pub(crate) fn forget_reference(&self, name: &'static str) {
        self.references
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }
}

fn to_raw<T: Serialize + ?Sized>(name: &str, value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|err| ModelError::Serialization {
        property: name.to_string(),
        reason: err.to_string(),
    })
}

impl PartialEq for ModelHandle {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && Arc::ptr_eq(&self.context.project, &other.context.project)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelHandle({})", self.path)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use tessera_store::{ChangeFilter, EventKind};
    use tessera_types::KeyGenerator;

    use super::*;

    fn context() -> ModelContext {
        let project = Arc::new(Project::new(Arc::new(KeyGenerator::new())));
        ModelContext::new(project, Arc::new(SyncRegistry::editor()))
    }

    #[test]
    fn write_fires_model_event_after_transaction() {
        let ctx = context();
        let order = Arc::new(Mutex::new(Vec::new()));
        {
            let order = Arc::clone(&order);
            ctx.project().subscribe(ChangeFilter::all(), move |event| {
                order.lock().unwrap().push(event.kind());
            });
        }

        let handle = ctx.handle(Path::root("scenes").child("s1"));
        handle.write("name", "Intro", "nameChanged").unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            vec![EventKind::Transaction, EventKind::ModelChanged]
        );
        assert_eq!(handle.read::<String>("name").as_deref(), Some("Intro"));
    }

    #[test]
    fn wrong_shape_reads_as_absent() {
        let ctx = context();
        let handle = ctx.handle(Path::root("m"));
        handle.write("count", "not a number", "countChanged").unwrap();
        assert_eq!(handle.read::<u32>("count"), None);
        assert_eq!(handle.read_raw("count"), Some(json!("not a number")));
    }

    #[test]
    fn deleted_node_reads_absent_through_live_handle() {
        let ctx = context();
        let handle = ctx.handle(Path::root("objects").child("k"));
        handle.write("x", &3, "xChanged").unwrap();
        assert!(handle.exists());

        ctx.project().delete(handle.path());
        assert!(!handle.exists());
        assert_eq!(handle.read::<i64>("x"), None);
    }

    #[test]
    fn handles_compare_by_project_and_path() {
        let ctx = context();
        let other = context();
        let path = Path::root("a");
        assert_eq!(ctx.handle(path.clone()), ctx.handle(path.clone()));
        assert_ne!(ctx.handle(path.clone()), other.handle(path));
    }
}
