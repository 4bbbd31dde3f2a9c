use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tessera_types::Path;

use crate::transaction::Transaction;

/// A change notification emitted by a [`Project`](crate::Project).
#[derive(Clone, Debug, PartialEq)]
pub enum ProjectEvent {
    /// A transaction was appended and applied.
    Transaction(Transaction),
    /// An ephemeral local-state entry changed.
    LocalState {
        property: String,
        value: Value,
        set_externally: bool,
    },
    /// A model property was written; `event` is the property's change event.
    ModelChanged { model_path: Path, event: String },
}

impl ProjectEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Transaction(_) => EventKind::Transaction,
            Self::LocalState { .. } => EventKind::LocalState,
            Self::ModelChanged { .. } => EventKind::ModelChanged,
        }
    }

    /// The tree path this event concerns, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Transaction(t) => Some(&t.path),
            Self::ModelChanged { model_path, .. } => Some(model_path),
            Self::LocalState { .. } => None,
        }
    }

    /// Returns `true` if the change originated on another replica.
    pub fn is_external(&self) -> bool {
        match self {
            Self::Transaction(t) => t.created_externally,
            Self::LocalState { set_externally, .. } => *set_externally,
            Self::ModelChanged { .. } => false,
        }
    }
}

/// Discriminant of a [`ProjectEvent`], used for filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Transaction,
    LocalState,
    ModelChanged,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transaction => write!(f, "transaction"),
            Self::LocalState => write!(f, "local-state"),
            Self::ModelChanged => write!(f, "model-changed"),
        }
    }
}

/// Filter for subscribing to a subset of project events.
#[derive(Clone, Debug, Default)]
pub struct ChangeFilter {
    /// If set, only events whose path lies at or below this prefix are
    /// delivered. Events without a path never match a prefix filter.
    pub path_prefix: Option<Path>,
    /// If set, only events of these kinds are delivered.
    pub kinds: Option<Vec<EventKind>>,
}

impl ChangeFilter {
    /// A filter that accepts every event.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            path_prefix: None,
            kinds: Some(kinds.into_iter().collect()),
        }
    }

    pub fn under(prefix: Path) -> Self {
        Self {
            path_prefix: Some(prefix),
            kinds: None,
        }
    }

    /// Returns `true` if the given event matches this filter.
    pub fn matches(&self, event: &ProjectEvent) -> bool {
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind()) {
                return false;
            }
        }
        if let Some(ref prefix) = self.path_prefix {
            match event.path() {
                Some(path) if path.starts_with(prefix) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub(crate) type Listener = Arc<dyn Fn(&ProjectEvent) + Send + Sync>;

struct Subscriber {
    id: ListenerId,
    filter: ChangeFilter,
    listener: Listener,
}

/// Synchronous fan-out router delivering events to matching listeners.
///
/// Listeners run on the caller's thread before the mutating call returns.
/// The subscriber list is not locked while listeners run, so a listener may
/// read the project, write to it, or (un)subscribe.
pub(crate) struct ChangeRouter {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl ChangeRouter {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self, filter: ChangeFilter, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                id,
                filter,
                listener,
            });
        id
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|sub| sub.id != id);
        subs.len() != before
    }

    /// Deliver an event to every matching listener, in subscription order.
    pub(crate) fn route(&self, event: &ProjectEvent) {
        let matching: Vec<Listener> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|sub| sub.filter.matches(event))
            .map(|sub| Arc::clone(&sub.listener))
            .collect();

        for listener in matching {
            listener(event);
        }
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
