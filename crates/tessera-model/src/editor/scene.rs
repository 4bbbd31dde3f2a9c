use crate::context::ModelHandle;
use crate::editor::{AnyModel, Composite, ModelKind};
use crate::error::Result;
use crate::group::ReferenceGroup;
use crate::model::{BindModel, Model};
use crate::property::ValueProperty;
use crate::traverse::VisitSet;

fn default_name() -> String {
    "Untitled scene".to_string()
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_background() -> String {
    "#000000".to_string()
}

/// A canvas holding an ordered set of object references.
#[derive(Clone, Debug, PartialEq)]
pub struct Scene {
    handle: ModelHandle,
}

impl Scene {
    /// Prefix every scene lives directly under.
    pub const COLLECTION: &'static str = "scenes";
    /// Sub-key holding the scene's object references.
    pub const OBJECTS: &'static str = "objects";

    pub const NAME: ValueProperty<String> =
        ValueProperty::with_default("name", "nameChanged", default_name);
    pub const WIDTH: ValueProperty<u32> =
        ValueProperty::with_default("width", "sizeChanged", default_width);
    pub const HEIGHT: ValueProperty<u32> =
        ValueProperty::with_default("height", "sizeChanged", default_height);
    pub const BACKGROUND: ValueProperty<String> =
        ValueProperty::with_default("background", "backgroundChanged", default_background);

    pub fn name(&self) -> Option<String> {
        Self::NAME.get(&self.handle)
    }

    pub fn set_name(&self, name: &str) -> Result<()> {
        Self::NAME.set(&self.handle, &name.to_string())
    }

    /// `(width, height)` when both are stored.
    pub fn size(&self) -> Option<(u32, u32)> {
        Some((Self::WIDTH.get(&self.handle)?, Self::HEIGHT.get(&self.handle)?))
    }

    pub fn set_size(&self, width: u32, height: u32) -> Result<()> {
        Self::WIDTH.set(&self.handle, &width)?;
        Self::HEIGHT.set(&self.handle, &height)
    }

    pub fn background(&self) -> Option<String> {
        Self::BACKGROUND.get(&self.handle)
    }

    pub fn set_background(&self, color: &str) -> Result<()> {
        Self::BACKGROUND.set(&self.handle, &color.to_string())
    }

    /// The scene's objects, in insertion order.
    pub fn objects(&self) -> ReferenceGroup<AnyModel> {
        ReferenceGroup::new(
            self.handle.context().clone(),
            self.handle.property_path(Self::OBJECTS),
        )
    }

    /// Every leaf object this scene draws, expanding composites into the
    /// objects of the scene they embed.
    ///
    /// A composite whose scene is already being expanded further up is
    /// skipped, so mutually embedding scenes terminate.
    pub fn flatten(&self, visited: &mut VisitSet) -> Vec<AnyModel> {
        let mut out = Vec::new();
        if !visited.enter(self.path()) {
            return out;
        }

        for object in self.objects().model_list() {
            let embedded = object.as_composite().map(Composite::scene);
            match embedded {
                Some(Some(inner)) => out.extend(inner.flatten(visited)),
                Some(None) => {}
                None => out.push(object),
            }
        }

        visited.leave(self.path());
        out
    }
}

impl Model for Scene {
    fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    fn from_any(model: AnyModel) -> Option<Self> {
        match model {
            AnyModel::Scene(scene) => Some(scene),
            _ => None,
        }
    }

    fn into_any(self) -> AnyModel {
        AnyModel::Scene(self)
    }

    fn references(&self) -> Vec<AnyModel> {
        self.objects().model_list()
    }
}

impl BindModel for Scene {
    const KIND: ModelKind = ModelKind::Scene;

    fn bind(handle: ModelHandle) -> Self {
        Self { handle }
    }

    fn initialize(&self) -> Result<()> {
        Self::NAME.apply_default(&self.handle)?;
        Self::WIDTH.apply_default(&self.handle)?;
        Self::HEIGHT.apply_default(&self.handle)?;
        Self::BACKGROUND.apply_default(&self.handle)?;
        Ok(())
    }
}
