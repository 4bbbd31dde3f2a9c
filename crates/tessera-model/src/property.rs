//! Typed property descriptors.
//!
//! A descriptor names one leaf under a model's path and knows how to read,
//! write, and default it. Concrete models expose descriptors as associated
//! constants and wrap them in plain accessor methods.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use tessera_types::Path;

use crate::context::ModelHandle;
use crate::error::Result;
use crate::model::Model;

/// A scalar or structured value stored at `model.path + [name]`.
pub struct ValueProperty<T> {
    pub name: &'static str,
    pub event: &'static str,
    default: Option<fn() -> T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ValueProperty<T> {
    pub const fn new(name: &'static str, event: &'static str) -> Self {
        Self {
            name,
            event,
            default: None,
            _marker: PhantomData,
        }
    }

    pub const fn with_default(name: &'static str, event: &'static str, default: fn() -> T) -> Self {
        Self {
            name,
            event,
            default: Some(default),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> ValueProperty<T> {
    /// The stored value, or `None` when absent.
    pub fn get(&self, handle: &ModelHandle) -> Option<T> {
        handle.read(self.name)
    }

    /// Write the value and fire this property's change event.
    pub fn set(&self, handle: &ModelHandle, value: &T) -> Result<()> {
        handle.write(self.name, value, self.event)
    }

    /// Soft-set the default value. Returns whether anything was written.
    pub fn apply_default(&self, handle: &ModelHandle) -> Result<bool> {
        match self.default {
            Some(default) => handle.soft_write(self.name, &default()),
            None => Ok(false),
        }
    }

    pub fn default_value(&self) -> Option<T> {
        self.default.map(|default| default())
    }
}

/// A pointer to another model, stored as that model's path.
///
/// Reading resolves the stored path through the registry, or returns the
/// instance cached by the last `set` on the same handle if it still sits at
/// the stored path and that node is still live.
pub struct ReferenceProperty<M> {
    pub name: &'static str,
    pub event: &'static str,
    default_path: Option<&'static [&'static str]>,
    _marker: PhantomData<fn() -> M>,
}

impl<M> ReferenceProperty<M> {
    pub const fn new(name: &'static str, event: &'static str) -> Self {
        Self {
            name,
            event,
            default_path: None,
            _marker: PhantomData,
        }
    }

    pub const fn with_default_path(
        name: &'static str,
        event: &'static str,
        default_path: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            event,
            default_path: Some(default_path),
            _marker: PhantomData,
        }
    }
}

impl<M: Model> ReferenceProperty<M> {
    /// The stored target path, if any.
    pub fn target_path(&self, handle: &ModelHandle) -> Option<Path> {
        handle.read(self.name)
    }

    /// The referenced model, or `None` when unset, dangling, unmatched by
    /// the registry, or of a different type than `M`.
    pub fn get(&self, handle: &ModelHandle) -> Option<M> {
        let target = self.target_path(handle)?;

        if let Some(cached) = handle.cached_reference(self.name) {
            if cached.path() == &target && handle.project().contains(&target) {
                return M::from_any(cached);
            }
        }

        match handle.context().resolve(&target) {
            Ok(model) => {
                let narrowed = M::from_any(model);
                if narrowed.is_none() {
                    debug!(path = %handle.path(), property = self.name, %target, "reference target has unexpected type");
                }
                narrowed
            }
            Err(err) => {
                debug!(path = %handle.path(), property = self.name, error = %err, "reference not resolved");
                None
            }
        }
    }

    /// Store `target`'s path and remember `target` as the resolved instance.
    pub fn set(&self, handle: &ModelHandle, target: &M) -> Result<()> {
        handle.cache_reference(self.name, target.clone().into_any());
        handle.write(self.name, target.path(), self.event)
    }

    /// Remove the reference.
    pub fn clear(&self, handle: &ModelHandle) {
        handle.forget_reference(self.name);
        handle.remove(self.name, self.event);
    }

    /// Soft-set the default target path. Returns whether anything was
    /// written.
    pub fn apply_default(&self, handle: &ModelHandle) -> Result<bool> {
        match self.default_path {
            Some(keys) => {
                let path = Path::new(keys.iter().copied())?;
                handle.soft_write(self.name, &path)
            }
            None => Ok(false),
        }
    }
}
