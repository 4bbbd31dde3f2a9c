//! Pure operations on the path tree.
//!
//! The tree is a `serde_json::Value` whose root is a mapping. Mapping nodes
//! keep insertion order. A [`PathKey::Index`] addresses an element when the
//! node is an array and is used as a stringified key when the node is a
//! mapping. Nothing here fails: `set` creates whatever intermediate mappings
//! it needs and `delete` of a missing key is a no-op. The one exception is
//! an index more than [`MAX_INDEX_GAP`] past the end of an array, which
//! would need unbounded padding: that write is dropped.

use serde_json::{Map, Value};
use tessera_types::{Path, PathKey};
use tracing::warn;

use crate::transaction::{Transaction, TransactionOp};

/// How far past the end of an array a `set` may reach. The gap is padded
/// with `null`.
pub const MAX_INDEX_GAP: usize = 1024;

/// An empty root mapping.
pub fn empty() -> Value {
    Value::Object(Map::new())
}

/// Read the value at `path`, or `None` if any key along the way is missing.
pub fn get<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut node = root;
    for key in path.keys() {
        node = step(node, key)?;
    }
    Some(node)
}

/// Place `value` at `path`, creating intermediate mapping nodes.
///
/// A scalar found where an intermediate mapping is needed is replaced by an
/// empty mapping, so the write always lands.
pub fn set(root: &mut Value, path: &Path, value: Value) {
    let mut node = root;
    for key in path.init() {
        node = match descend_or_create(node, key) {
            Some(next) => next,
            None => {
                warn!(%path, "array index too far past the end; write dropped");
                return;
            }
        };
    }

    let last = path.last();
    match (node, last.as_index()) {
        (Value::Array(items), Some(index)) => {
            if pad(items, index) {
                items[index] = value;
            } else {
                warn!(%path, "array index too far past the end; write dropped");
            }
        }
        (node, _) => {
            ensure_object(node).insert(last.as_map_key().into_owned(), value);
        }
    }
}

/// Remove the final key of `path` from its parent. Returns whether anything
/// was removed.
pub fn delete(root: &mut Value, path: &Path) -> bool {
    let mut node = root;
    for key in path.init() {
        match step_mut(node, key) {
            Some(next) => node = next,
            None => return false,
        }
    }

    let last = path.last();
    match (node, last.as_index()) {
        (Value::Array(items), Some(index)) => {
            if index < items.len() {
                items.remove(index);
                true
            } else {
                false
            }
        }
        (Value::Object(map), _) => map.shift_remove(&*last.as_map_key()).is_some(),
        _ => false,
    }
}

/// Apply one transaction to the tree.
pub fn apply(root: &mut Value, transaction: &Transaction) {
    match &transaction.op {
        TransactionOp::Set { value } => set(root, &transaction.path, value.clone()),
        TransactionOp::Delete => {
            delete(root, &transaction.path);
        }
    }
}

/// Keys of the mapping at `path`, in insertion order. Empty when the node is
/// absent or not a mapping.
pub fn child_keys(root: &Value, path: &Path) -> Vec<String> {
    match get(root, path) {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

fn step<'a>(node: &'a Value, key: &PathKey) -> Option<&'a Value> {
    match (node, key.as_index()) {
        (Value::Array(items), Some(index)) => items.get(index),
        (Value::Object(map), _) => map.get(&*key.as_map_key()),
        _ => None,
    }
}

fn step_mut<'a>(node: &'a mut Value, key: &PathKey) -> Option<&'a mut Value> {
    match (node, key.as_index()) {
        (Value::Array(items), Some(index)) => items.get_mut(index),
        (Value::Object(map), _) => map.get_mut(&*key.as_map_key()),
        _ => None,
    }
}

fn descend_or_create<'a>(node: &'a mut Value, key: &PathKey) -> Option<&'a mut Value> {
    match (node, key.as_index()) {
        (Value::Array(items), Some(index)) => {
            if !pad(items, index) {
                return None;
            }
            Some(&mut items[index])
        }
        (node, _) => Some(
            ensure_object(node)
                .entry(key.as_map_key().into_owned())
                .or_insert_with(empty),
        ),
    }
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = empty();
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with a mapping"),
    }
}

/// Grow `items` so `index` is addressable. Returns `false`, leaving `items`
/// untouched, when `index` lies more than [`MAX_INDEX_GAP`] past the end.
fn pad(items: &mut Vec<Value>, index: usize) -> bool {
    if index.saturating_sub(items.len()) > MAX_INDEX_GAP {
        return false;
    }
    if items.len() <= index {
        items.resize(index + 1, Value::Null);
    }
    true
}
