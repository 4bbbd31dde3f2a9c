use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::debug;

use tessera_types::Path;

use crate::context::{ModelContext, ModelHandle};
use crate::editor::{AnyModel, Composite, Image, ModelKind, Scene, Shape, Text};
use crate::error::ResolveError;
use crate::model::BindModel;

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// Condition a raw node must satisfy for a [`SyncEntry`] to apply.
#[derive(Clone)]
pub enum SyncPredicate {
    /// Every node matches.
    Always,
    /// The node is a mapping whose `field` equals `value`. The usual
    /// tagged-union discriminator check.
    FieldEquals { field: String, value: Value },
    /// Arbitrary check over the raw node.
    Custom(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
}

impl SyncPredicate {
    /// Discriminator check on a `type` field.
    pub fn type_is(tag: &str) -> Self {
        Self::FieldEquals {
            field: "type".into(),
            value: Value::String(tag.to_string()),
        }
    }

    pub fn matches(&self, raw: &Value) -> bool {
        match self {
            Self::Always => true,
            Self::FieldEquals { field, value } => raw.get(field.as_str()) == Some(value),
            Self::Custom(check) => check(raw),
        }
    }
}

impl fmt::Debug for SyncPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "Always"),
            Self::FieldEquals { field, value } => write!(f, "FieldEquals({field} == {value})"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Builds a typed model over a handle.
pub type Constructor = fn(ModelHandle) -> AnyModel;

/// One registration: nodes directly under `prefix` that satisfy `predicate`
/// are built with `constructor`.
#[derive(Clone, Debug)]
pub struct SyncEntry {
    pub prefix: Path,
    pub kind: ModelKind,
    pub constructor: Constructor,
    pub predicate: SyncPredicate,
}

impl SyncEntry {
    /// Returns `true` if this entry accepts the node at `path`.
    pub fn applies(&self, path: &Path, raw: &Value) -> bool {
        path.is_child_of(&self.prefix) && self.predicate.matches(raw)
    }
}

fn construct<M: BindModel>(handle: ModelHandle) -> AnyModel {
    M::bind(handle).into_any()
}

// ---------------------------------------------------------------------------
// SyncRegistry
// ---------------------------------------------------------------------------

/// Ordered table mapping path prefixes and predicates to model constructors.
///
/// Resolution is **first match wins**: entries are tried in registration
/// order and the first one whose prefix and predicate accept the node is
/// used, even if a later entry is more specific.
#[derive(Default)]
pub struct SyncRegistry {
    entries: RwLock<Vec<SyncEntry>>,
}

impl SyncRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the editor's model variants:
    /// `scenes/*` as [`Scene`], and `objects/*` dispatched on their `type`
    /// field to [`Shape`], [`Text`], [`Image`], or [`Composite`].
    pub fn editor() -> Self {
        let registry = Self::new();
        let scenes = Path::root(Scene::COLLECTION);
        let objects = Path::root(Shape::COLLECTION);

        registry.register::<Scene>(scenes, SyncPredicate::Always);
        registry.register::<Shape>(objects.clone(), SyncPredicate::type_is(Shape::TYPE_TAG));
        registry.register::<Text>(objects.clone(), SyncPredicate::type_is(Text::TYPE_TAG));
        registry.register::<Image>(objects.clone(), SyncPredicate::type_is(Image::TYPE_TAG));
        registry.register::<Composite>(objects, SyncPredicate::type_is(Composite::TYPE_TAG));
        registry
    }

    /// Append an entry for model type `M`.
    pub fn register<M: BindModel>(&self, prefix: Path, predicate: SyncPredicate) {
        self.register_entry(SyncEntry {
            prefix,
            kind: M::KIND,
            constructor: construct::<M>,
            predicate,
        });
    }

    /// Append a fully specified entry.
    pub fn register_entry(&self, entry: SyncEntry) {
        debug!(prefix = %entry.prefix, kind = %entry.kind, predicate = ?entry.predicate, "sync handler registered");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Remove every entry. Used by test harnesses between runs.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The first entry accepting the node at `path` with content `raw`.
    pub fn find(&self, path: &Path, raw: &Value) -> Option<SyncEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|entry| entry.applies(path, raw))
            .cloned()
    }

    /// Where new models of `kind` should be created when adding them to the
    /// group at `preferred`.
    ///
    /// Returns `preferred` itself when an entry for `kind` lives directly
    /// there, otherwise the prefix of the first entry registered for `kind`.
    pub fn home_for(&self, kind: ModelKind, preferred: &Path) -> Option<Path> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut candidates = entries.iter().filter(|entry| entry.kind == kind);
        if candidates.clone().any(|entry| entry.prefix == *preferred) {
            return Some(preferred.clone());
        }
        candidates.next().map(|entry| entry.prefix.clone())
    }

    /// Rebuild the typed model stored at `path`.
    pub fn resolve(&self, context: &ModelContext, path: &Path) -> Result<AnyModel, ResolveError> {
        let raw = context
            .project()
            .get(path)
            .ok_or_else(|| ResolveError::UnresolvedReference(path.clone()))?;

        let entry = self
            .find(path, &raw)
            .ok_or_else(|| ResolveError::NoRegistryMatch(path.clone()))?;

        Ok((entry.constructor)(context.handle(path.clone())))
    }
}

impl fmt::Debug for SyncRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tessera_store::Project;
    use tessera_types::KeyGenerator;

    use super::*;
    use crate::model::Model;

    fn context_with(registry: SyncRegistry) -> ModelContext {
        let project = Arc::new(Project::new(Arc::new(KeyGenerator::new())));
        ModelContext::new(project, Arc::new(registry))
    }

    #[test]
    fn discriminator_dispatch() {
        let ctx = context_with(SyncRegistry::editor());
        let path = Path::root("objects").child("t1");
        ctx.project().set(&path, json!({"type": "text", "text": "hi"}));

        let model = ctx.resolve(&path).unwrap();
        assert_eq!(model.kind(), ModelKind::Text);
        assert_eq!(model.path(), &path);
    }

    #[test]
    fn absent_node_is_unresolved() {
        let ctx = context_with(SyncRegistry::editor());
        let path = Path::root("objects").child("gone");
        assert_eq!(
            ctx.resolve(&path).unwrap_err(),
            ResolveError::UnresolvedReference(path)
        );
    }

    #[test]
    fn unknown_discriminator_has_no_match() {
        let ctx = context_with(SyncRegistry::editor());
        let path = Path::root("objects").child("v1");
        ctx.project().set(&path, json!({"type": "video"}));
        assert_eq!(ctx.resolve(&path).unwrap_err(), ResolveError::NoRegistryMatch(path));
    }

    #[test]
    fn only_direct_children_match() {
        let ctx = context_with(SyncRegistry::editor());
        let nested = Path::root("scenes").child("s1").child("name");
        ctx.project().set(&nested, json!("Intro"));
        assert!(matches!(
            ctx.resolve(&nested),
            Err(ResolveError::NoRegistryMatch(_))
        ));
    }

    #[test]
    fn first_match_wins_over_more_specific_later_entry() {
        let registry = SyncRegistry::new();
        let objects = Path::root("objects");
        registry.register::<Shape>(objects.clone(), SyncPredicate::Always);
        registry.register::<Text>(objects, SyncPredicate::type_is("text"));
        let ctx = context_with(registry);

        let path = Path::root("objects").child("t");
        ctx.project().set(&path, json!({"type": "text"}));
        assert_eq!(ctx.resolve(&path).unwrap().kind(), ModelKind::Shape);
    }

    #[test]
    fn custom_predicate() {
        let registry = SyncRegistry::new();
        registry.register::<Shape>(
            Path::root("objects"),
            SyncPredicate::Custom(Arc::new(|raw| raw.get("width").is_some())),
        );
        let ctx = context_with(registry);

        let with_width = Path::root("objects").child("a");
        let without = Path::root("objects").child("b");
        ctx.project().set(&with_width, json!({"width": 3}));
        ctx.project().set(&without, json!({"height": 3}));
        assert!(ctx.resolve(&with_width).is_ok());
        assert!(ctx.resolve(&without).is_err());
    }

    #[test]
    fn clear_empties_registry() {
        let registry = SyncRegistry::editor();
        assert_eq!(registry.len(), 5);
        registry.clear();
        assert!(registry.is_empty());
    }
}
