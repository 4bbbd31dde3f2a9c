//! The editor's concrete model variants.
//!
//! Scenes live under `scenes/<key>`. Scene objects live under
//! `objects/<key>` and carry a `type` discriminator the registry dispatches
//! on. Scenes hold their objects through a [`ReferenceGroup`] of stored
//! paths, so one object can appear in several scenes.
//!
//! [`ReferenceGroup`]: crate::ReferenceGroup

mod objects;
mod scene;

use std::fmt;

pub use objects::{Composite, Image, Shape, Text, TYPE_FIELD};
pub use scene::Scene;

use crate::context::ModelHandle;
use crate::model::Model;

/// Discriminant of a registered model variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Scene,
    Shape,
    Text,
    Image,
    Composite,
}

impl ModelKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Shape => "shape",
            Self::Text => "text",
            Self::Image => "image",
            Self::Composite => "composite",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Any model the registry can rebuild.
#[derive(Clone, Debug, PartialEq)]
pub enum AnyModel {
    Scene(Scene),
    Shape(Shape),
    Text(Text),
    Image(Image),
    Composite(Composite),
}

impl AnyModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Scene(_) => ModelKind::Scene,
            Self::Shape(_) => ModelKind::Shape,
            Self::Text(_) => ModelKind::Text,
            Self::Image(_) => ModelKind::Image,
            Self::Composite(_) => ModelKind::Composite,
        }
    }

    pub fn as_scene(&self) -> Option<&Scene> {
        match self {
            Self::Scene(scene) => Some(scene),
            _ => None,
        }
    }

    pub fn as_composite(&self) -> Option<&Composite> {
        match self {
            Self::Composite(composite) => Some(composite),
            _ => None,
        }
    }
}

impl Model for AnyModel {
    fn handle(&self) -> &ModelHandle {
        match self {
            Self::Scene(model) => model.handle(),
            Self::Shape(model) => model.handle(),
            Self::Text(model) => model.handle(),
            Self::Image(model) => model.handle(),
            Self::Composite(model) => model.handle(),
        }
    }

    fn from_any(model: AnyModel) -> Option<Self> {
        Some(model)
    }

    fn into_any(self) -> AnyModel {
        self
    }

    fn references(&self) -> Vec<AnyModel> {
        match self {
            Self::Scene(model) => model.references(),
            Self::Shape(model) => model.references(),
            Self::Text(model) => model.references(),
            Self::Image(model) => model.references(),
            Self::Composite(model) => model.references(),
        }
    }
}
