use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// One step in a [`Path`]: a mapping key or a small array index.
///
/// Serializes untagged, so a path reads on the wire as a plain JSON array
/// such as `["scenes", "0Nf3kq", 2]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathKey {
    Index(u32),
    Name(String),
}

impl PathKey {
    /// The key as used inside a mapping node. Indices stringify.
    pub fn as_map_key(&self) -> Cow<'_, str> {
        match self {
            Self::Name(name) => Cow::Borrowed(name),
            Self::Index(index) => Cow::Owned(index.to_string()),
        }
    }

    /// The key as an array index, if it is one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index as usize),
            Self::Name(_) => None,
        }
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathKey {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

impl From<String> for PathKey {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

impl From<&String> for PathKey {
    fn from(value: &String) -> Self {
        Self::Name(value.clone())
    }
}

impl From<u32> for PathKey {
    fn from(value: u32) -> Self {
        Self::Index(value)
    }
}

/// Ordered, non-empty sequence of keys addressing a location in the tree.
///
/// A `Path` can never be empty: every constructor and the deserializer reject
/// an empty key sequence with [`TypeError::InvalidPath`]. Paths are values;
/// deriving a child or parent always produces a new `Path`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<PathKey>", into = "Vec<PathKey>")]
pub struct Path(Vec<PathKey>);

impl Path {
    /// Build a path from any sequence of keys.
    pub fn new<I, K>(keys: I) -> Result<Self, TypeError>
    where
        I: IntoIterator<Item = K>,
        K: Into<PathKey>,
    {
        Self::from_keys(keys.into_iter().map(Into::into).collect())
    }

    /// Build a path from an owned key vector.
    pub fn from_keys(keys: Vec<PathKey>) -> Result<Self, TypeError> {
        if keys.is_empty() {
            return Err(TypeError::InvalidPath("path must contain at least one key".into()));
        }
        Ok(Self(keys))
    }

    /// A single-key path. Infallible.
    pub fn root(key: impl Into<PathKey>) -> Self {
        Self(vec![key.into()])
    }

    /// A new path with `key` appended.
    pub fn child(&self, key: impl Into<PathKey>) -> Self {
        let mut keys = self.0.clone();
        keys.push(key.into());
        Self(keys)
    }

    /// A new path with every key of `suffix` appended.
    pub fn join(&self, suffix: &Path) -> Self {
        let mut keys = self.0.clone();
        keys.extend(suffix.0.iter().cloned());
        Self(keys)
    }

    /// The enclosing path, or `None` for a single-key path.
    pub fn parent(&self) -> Option<Self> {
        if self.0.len() < 2 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// The final key.
    pub fn last(&self) -> &PathKey {
        // Non-empty by construction.
        &self.0[self.0.len() - 1]
    }

    /// All keys except the last one.
    pub fn init(&self) -> &[PathKey] {
        &self.0[..self.0.len() - 1]
    }

    pub fn keys(&self) -> &[PathKey] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; provided for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns `true` if `prefix` is equal to, or an ancestor of, this path.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Returns `true` if this path is exactly one key below `parent`.
    pub fn is_child_of(&self, parent: &Path) -> bool {
        self.0.len() == parent.0.len() + 1 && self.starts_with(parent)
    }
}

impl TryFrom<Vec<PathKey>> for Path {
    type Error = TypeError;

    fn try_from(keys: Vec<PathKey>) -> Result<Self, Self::Error> {
        Self::from_keys(keys)
    }
}

impl From<Path> for Vec<PathKey> {
    fn from(path: Path) -> Self {
        path.0
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}
