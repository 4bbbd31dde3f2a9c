use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};
use tracing::debug;

use tessera_types::{KeyGenerator, Path, ProjectId};

use crate::error::{Result, StoreError};
use crate::events::{ChangeFilter, ChangeRouter, ListenerId, ProjectEvent};
use crate::transaction::Transaction;
use crate::tree;

/// A runtime-only handle registered against a project.
pub type SourceHandle = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct ProjectState {
    /// Tree the timeline is replayed onto; empty unless installed from a
    /// snapshot.
    baseline: Value,
    data: Value,
    timeline: Vec<Transaction>,
    local_state: Map<String, Value>,
}

/// One live document.
///
/// The tree is mutated exclusively through [`add_transaction`](Self::add_transaction)
/// and the helpers built on it: each call appends to the timeline, applies
/// the mutation, and only then notifies listeners, all before returning.
/// Local state and registered sources live beside the tree and are never
/// part of the timeline.
///
/// A project is shared, never owned, by the models built over it; wrap it in
/// an `Arc`.
pub struct Project {
    id: ProjectId,
    keys: Arc<KeyGenerator>,
    inner: RwLock<ProjectState>,
    sources: RwLock<HashMap<String, SourceHandle>>,
    router: ChangeRouter,
}

impl Project {
    /// Create an empty project with a fresh identifier.
    pub fn new(keys: Arc<KeyGenerator>) -> Self {
        Self::with_id(ProjectId::new(), keys)
    }

    /// Create an empty project with the given identifier.
    pub fn with_id(id: ProjectId, keys: Arc<KeyGenerator>) -> Self {
        let state = ProjectState {
            baseline: tree::empty(),
            data: tree::empty(),
            ..Default::default()
        };
        Self::from_state(id, keys, state)
    }

    /// Install a full snapshot directly, without a timeline.
    ///
    /// Used when a replica joins: the snapshot becomes the replay baseline and
    /// the timeline starts empty.
    pub fn from_snapshot(
        id: ProjectId,
        data: Value,
        local_state: Map<String, Value>,
        keys: Arc<KeyGenerator>,
    ) -> Result<Self> {
        if !data.is_object() {
            return Err(StoreError::InvalidSnapshot(
                "snapshot root must be a mapping".into(),
            ));
        }
        let state = ProjectState {
            baseline: data.clone(),
            data,
            timeline: Vec::new(),
            local_state,
        };
        Ok(Self::from_state(id, keys, state))
    }

    fn from_state(id: ProjectId, keys: Arc<KeyGenerator>, state: ProjectState) -> Self {
        Self {
            id,
            keys,
            inner: RwLock::new(state),
            sources: RwLock::new(HashMap::new()),
            router: ChangeRouter::new(),
        }
    }

    pub fn id(&self) -> &ProjectId {
        &self.id
    }

    /// The key generator this project was constructed with.
    pub fn keys(&self) -> &Arc<KeyGenerator> {
        &self.keys
    }

    pub fn generate_key(&self) -> String {
        self.keys.generate_key()
    }

    // ---- Reads ----

    /// The value at `path`, or `None` if any key along the way is missing.
    pub fn get(&self, path: &Path) -> Option<Value> {
        tree::get(&self.read().data, path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        tree::get(&self.read().data, path).is_some()
    }

    /// Keys of the mapping at `path`, in insertion order.
    pub fn child_keys(&self, path: &Path) -> Vec<String> {
        tree::child_keys(&self.read().data, path)
    }

    /// Run `f` against the current tree without cloning it.
    pub fn with_data<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.read().data)
    }

    /// Snapshot of the whole tree.
    pub fn data(&self) -> Value {
        self.read().data.clone()
    }

    /// The tree the timeline replays onto.
    pub fn baseline(&self) -> Value {
        self.read().baseline.clone()
    }

    /// Copy of the full timeline.
    pub fn timeline(&self) -> Vec<Transaction> {
        self.read().timeline.clone()
    }

    pub fn timeline_len(&self) -> usize {
        self.read().timeline.len()
    }

    // ---- Writes ----

    /// Append `transaction` to the timeline, apply it, then notify listeners.
    pub fn add_transaction(&self, transaction: Transaction) {
        {
            let mut state = self.write();
            Self::append(&mut state, &transaction);
        }
        self.router.route(&ProjectEvent::Transaction(transaction));
    }

    /// Add a transaction received from another replica.
    ///
    /// The transaction is flagged `created_externally` for the duration of
    /// its notification so replication listeners do not forward it again.
    /// The timeline stores it unflagged.
    pub fn apply_external_transaction(&self, transaction: Transaction) {
        self.add_transaction(transaction.into_external());
    }

    pub fn set(&self, path: &Path, value: Value) {
        self.add_transaction(Transaction::set(path.clone(), value));
    }

    pub fn delete(&self, path: &Path) {
        self.add_transaction(Transaction::delete(path.clone()));
    }

    /// `set` only if nothing is stored at `path`. Returns whether it wrote.
    pub fn soft_set(&self, path: &Path, value: Value) -> bool {
        let transaction = {
            let mut state = self.write();
            if tree::get(&state.data, path).is_some() {
                return false;
            }
            let transaction = Transaction::set(path.clone(), value);
            Self::append(&mut state, &transaction);
            transaction
        };
        self.router.route(&ProjectEvent::Transaction(transaction));
        true
    }

    fn append(state: &mut ProjectState, transaction: &Transaction) {
        let mut logged = transaction.clone();
        logged.created_externally = false;
        state.timeline.push(logged);
        tree::apply(&mut state.data, transaction);
        debug!(
            path = %transaction.path,
            kind = transaction.kind_name(),
            external = transaction.created_externally,
            seq = state.timeline.len(),
            "transaction applied"
        );
    }

    // ---- Local state ----

    /// Change an ephemeral local-state entry and notify listeners.
    pub fn set_local_state(&self, property: &str, value: Value) {
        self.update_local_state(property, value, false);
    }

    /// Change a local-state entry on behalf of another replica.
    pub fn apply_external_local_state(&self, property: &str, value: Value) {
        self.update_local_state(property, value, true);
    }

    fn update_local_state(&self, property: &str, value: Value, set_externally: bool) {
        self.write()
            .local_state
            .insert(property.to_string(), value.clone());
        self.router.route(&ProjectEvent::LocalState {
            property: property.to_string(),
            value,
            set_externally,
        });
    }

    pub fn local_state_value(&self, property: &str) -> Option<Value> {
        self.read().local_state.get(property).cloned()
    }

    /// Snapshot of all local state.
    pub fn local_state(&self) -> Map<String, Value> {
        self.read().local_state.clone()
    }

    // ---- Registered sources ----

    /// Register a runtime-only handle under an external identifier,
    /// returning any handle it replaced.
    pub fn register_source(&self, id: &str, handle: SourceHandle) -> Option<SourceHandle> {
        self.sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), handle)
    }

    pub fn source(&self, id: &str) -> Option<SourceHandle> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// The handle registered under `id`, if it has concrete type `T`.
    pub fn source_as<T: Any + Send + Sync>(&self, id: &str) -> Option<Arc<T>> {
        self.source(id).and_then(|handle| handle.downcast::<T>().ok())
    }

    pub fn unregister_source(&self, id: &str) -> bool {
        self.sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    // ---- Notifications ----

    /// Register a listener called synchronously for every matching event.
    pub fn subscribe<F>(&self, filter: ChangeFilter, listener: F) -> ListenerId
    where
        F: Fn(&ProjectEvent) + Send + Sync + 'static,
    {
        self.router.subscribe(filter, Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.router.unsubscribe(id)
    }

    pub fn listener_count(&self) -> usize {
        self.router.listener_count()
    }

    /// Deliver a non-transaction event, such as a model property change.
    pub fn emit(&self, event: ProjectEvent) {
        self.router.route(&event);
    }

    fn read(&self) -> RwLockReadGuard<'_, ProjectState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ProjectState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("timeline_len", &self.timeline_len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::events::EventKind;

    fn project() -> Project {
        Project::new(Arc::new(KeyGenerator::new()))
    }

    fn path(keys: &[&str]) -> Path {
        Path::new(keys.iter().copied()).unwrap()
    }

    #[test]
    fn set_then_get() {
        let p = project();
        p.set(&path(&["a", "b"]), json!(1));
        assert_eq!(p.get(&path(&["a", "b"])), Some(json!(1)));
        assert_eq!(p.timeline_len(), 1);
    }

    #[test]
    fn soft_set_never_overwrites() {
        let p = project();
        assert!(p.soft_set(&path(&["name"]), json!("first")));
        assert!(!p.soft_set(&path(&["name"]), json!("second")));
        assert_eq!(p.get(&path(&["name"])), Some(json!("first")));
        assert_eq!(p.timeline_len(), 1);
    }

    #[test]
    fn delete_absent_is_logged_but_harmless() {
        let p = project();
        p.delete(&path(&["missing", "deep"]));
        assert_eq!(p.get(&path(&["missing", "deep"])), None);
        assert_eq!(p.timeline_len(), 1);
        assert_eq!(p.data(), json!({}));
    }

    #[test]
    fn listener_sees_applied_state() {
        let p = Arc::new(project());
        let observed = Arc::new(Mutex::new(None));
        {
            let weak = Arc::downgrade(&p);
            let observed = Arc::clone(&observed);
            p.subscribe(ChangeFilter::kinds([EventKind::Transaction]), move |event| {
                let project = weak.upgrade().unwrap();
                let path = event.path().unwrap().clone();
                *observed.lock().unwrap() = project.get(&path);
            });
        }
        p.set(&path(&["x"]), json!("now"));
        assert_eq!(*observed.lock().unwrap(), Some(json!("now")));
    }

    #[test]
    fn external_flag_reaches_listeners_not_timeline() {
        let p = project();
        let flags = Arc::new(Mutex::new(Vec::new()));
        {
            let flags = Arc::clone(&flags);
            p.subscribe(ChangeFilter::all(), move |event| {
                flags.lock().unwrap().push(event.is_external());
            });
        }
        p.apply_external_transaction(Transaction::set(path(&["a"]), json!(1)));
        p.set(&path(&["b"]), json!(2));

        assert_eq!(*flags.lock().unwrap(), vec![true, false]);
        assert!(p.timeline().iter().all(|t| !t.created_externally));
    }

    #[test]
    fn local_state_is_not_logged() {
        let p = project();
        p.set_local_state("selection", json!(["objects", "k1"]));
        assert_eq!(p.local_state_value("selection"), Some(json!(["objects", "k1"])));
        assert_eq!(p.timeline_len(), 0);
        assert_eq!(p.data(), json!({}));
    }

    #[test]
    fn snapshot_rejects_scalar_root() {
        let keys = Arc::new(KeyGenerator::new());
        let err = Project::from_snapshot(ProjectId::new(), json!(3), Map::new(), keys);
        assert!(matches!(err, Err(StoreError::InvalidSnapshot(_))));
    }

    #[test]
    fn snapshot_installs_without_timeline() {
        let keys = Arc::new(KeyGenerator::new());
        let mut local = Map::new();
        local.insert("tool".into(), json!("pen"));
        let p = Project::from_snapshot(ProjectId::from("p1"), json!({"a": 1}), local, keys)
            .unwrap();
        assert_eq!(p.id().as_str(), "p1");
        assert_eq!(p.get(&path(&["a"])), Some(json!(1)));
        assert_eq!(p.local_state_value("tool"), Some(json!("pen")));
        assert_eq!(p.timeline_len(), 0);
        assert_eq!(p.baseline(), json!({"a": 1}));
    }

    #[test]
    fn registered_sources_downcast() {
        let p = project();
        assert!(p.register_source("camera-1", Arc::new(42u32)).is_none());
        assert_eq!(p.source_as::<u32>("camera-1").as_deref(), Some(&42));
        assert!(p.source_as::<String>("camera-1").is_none());
        assert!(p.unregister_source("camera-1"));
        assert!(p.source("camera-1").is_none());
    }

    #[test]
    fn child_keys_follow_insertion_order() {
        let p = project();
        for key in ["z", "a", "m"] {
            p.set(&path(&["group", key]), json!(key));
        }
        assert_eq!(p.child_keys(&path(&["group"])), vec!["z", "a", "m"]);
    }
}
