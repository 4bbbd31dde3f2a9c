use tessera_store::AssetStore;
use tracing::debug;

use crate::context::ModelHandle;
use crate::editor::{AnyModel, ModelKind, Scene};
use crate::error::Result;
use crate::model::{BindModel, Model};
use crate::property::{ReferenceProperty, ValueProperty};

/// Name of the discriminator field the registry dispatches objects on.
pub const TYPE_FIELD: &str = "type";

fn origin() -> f64 {
    0.0
}

fn default_fill() -> String {
    "#ffffff".to_string()
}

fn default_text() -> String {
    String::new()
}

fn default_font_size() -> u32 {
    24
}

const X: ValueProperty<f64> = ValueProperty::with_default("x", "positionChanged", origin);
const Y: ValueProperty<f64> = ValueProperty::with_default("y", "positionChanged", origin);

/// Write the discriminator and the shared placement defaults.
fn initialize_object(handle: &ModelHandle, tag: &'static str) -> Result<()> {
    if handle.soft_write(TYPE_FIELD, tag)? {
        debug!(path = %handle.path(), tag, "object discriminator written");
    }
    X.apply_default(handle)?;
    Y.apply_default(handle)?;
    Ok(())
}

fn position(handle: &ModelHandle) -> Option<(f64, f64)> {
    Some((X.get(handle)?, Y.get(handle)?))
}

fn set_position(handle: &ModelHandle, x: f64, y: f64) -> Result<()> {
    X.set(handle, &x)?;
    Y.set(handle, &y)
}

// ---------------------------------------------------------------------------
// Shape
// ---------------------------------------------------------------------------

/// A filled vector shape.
#[derive(Clone, Debug, PartialEq)]
pub struct Shape {
    handle: ModelHandle,
}

impl Shape {
    /// Prefix every scene object lives directly under.
    pub const COLLECTION: &'static str = "objects";
    pub const TYPE_TAG: &'static str = "shape";

    pub const FILL: ValueProperty<String> =
        ValueProperty::with_default("fill", "fillChanged", default_fill);

    pub fn fill(&self) -> Option<String> {
        Self::FILL.get(&self.handle)
    }

    pub fn set_fill(&self, color: &str) -> Result<()> {
        Self::FILL.set(&self.handle, &color.to_string())
    }

    pub fn position(&self) -> Option<(f64, f64)> {
        position(&self.handle)
    }

    pub fn set_position(&self, x: f64, y: f64) -> Result<()> {
        set_position(&self.handle, x, y)
    }
}

impl Model for Shape {
    fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    fn from_any(model: AnyModel) -> Option<Self> {
        match model {
            AnyModel::Shape(shape) => Some(shape),
            _ => None,
        }
    }

    fn into_any(self) -> AnyModel {
        AnyModel::Shape(self)
    }
}

impl BindModel for Shape {
    const KIND: ModelKind = ModelKind::Shape;

    fn bind(handle: ModelHandle) -> Self {
        Self { handle }
    }

    fn initialize(&self) -> Result<()> {
        initialize_object(&self.handle, Self::TYPE_TAG)?;
        Self::FILL.apply_default(&self.handle)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct Text {
    handle: ModelHandle,
}

impl Text {
    pub const TYPE_TAG: &'static str = "text";

    pub const TEXT: ValueProperty<String> =
        ValueProperty::with_default("text", "textChanged", default_text);
    pub const FONT_SIZE: ValueProperty<u32> =
        ValueProperty::with_default("fontSize", "fontSizeChanged", default_font_size);

    pub fn text(&self) -> Option<String> {
        Self::TEXT.get(&self.handle)
    }

    pub fn set_text(&self, text: &str) -> Result<()> {
        Self::TEXT.set(&self.handle, &text.to_string())
    }

    pub fn font_size(&self) -> Option<u32> {
        Self::FONT_SIZE.get(&self.handle)
    }

    pub fn set_font_size(&self, size: u32) -> Result<()> {
        Self::FONT_SIZE.set(&self.handle, &size)
    }

    pub fn position(&self) -> Option<(f64, f64)> {
        position(&self.handle)
    }

    pub fn set_position(&self, x: f64, y: f64) -> Result<()> {
        set_position(&self.handle, x, y)
    }
}

impl Model for Text {
    fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    fn from_any(model: AnyModel) -> Option<Self> {
        match model {
            AnyModel::Text(text) => Some(text),
            _ => None,
        }
    }

    fn into_any(self) -> AnyModel {
        AnyModel::Text(self)
    }
}

impl BindModel for Text {
    const KIND: ModelKind = ModelKind::Text;

    fn bind(handle: ModelHandle) -> Self {
        Self { handle }
    }

    fn initialize(&self) -> Result<()> {
        initialize_object(&self.handle, Self::TYPE_TAG)?;
        Self::TEXT.apply_default(&self.handle)?;
        Self::FONT_SIZE.apply_default(&self.handle)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Image
// ---------------------------------------------------------------------------

/// A bitmap backed by an asset. The tree only stores the asset path; the
/// bytes go through an [`AssetStore`].
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    handle: ModelHandle,
}

impl Image {
    pub const TYPE_TAG: &'static str = "image";

    pub const SOURCE: ValueProperty<String> = ValueProperty::new("source", "sourceChanged");

    pub fn source(&self) -> Option<String> {
        Self::SOURCE.get(&self.handle)
    }

    pub fn set_source(&self, asset_path: &str) -> Result<()> {
        Self::SOURCE.set(&self.handle, &asset_path.to_string())
    }

    pub fn position(&self) -> Option<(f64, f64)> {
        position(&self.handle)
    }

    pub fn set_position(&self, x: f64, y: f64) -> Result<()> {
        set_position(&self.handle, x, y)
    }

    /// Read the image bytes. `Ok(None)` when no source is set.
    pub async fn load(&self, assets: &dyn AssetStore) -> Result<Option<Vec<u8>>> {
        let Some(source) = self.source() else {
            return Ok(None);
        };
        let bytes = assets.read_asset(&source).await?;
        debug!(path = %self.handle.path(), %source, size = bytes.len(), "image asset loaded");
        Ok(Some(bytes))
    }

    /// Write `bytes` to `asset_path`, then point the image at it.
    pub async fn store(&self, assets: &dyn AssetStore, asset_path: &str, bytes: Vec<u8>) -> Result<()> {
        assets.write_asset(asset_path, bytes).await?;
        self.set_source(asset_path)
    }
}

impl Model for Image {
    fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    fn from_any(model: AnyModel) -> Option<Self> {
        match model {
            AnyModel::Image(image) => Some(image),
            _ => None,
        }
    }

    fn into_any(self) -> AnyModel {
        AnyModel::Image(self)
    }
}

impl BindModel for Image {
    const KIND: ModelKind = ModelKind::Image;

    fn bind(handle: ModelHandle) -> Self {
        Self { handle }
    }

    fn initialize(&self) -> Result<()> {
        initialize_object(&self.handle, Self::TYPE_TAG)
    }
}

// ---------------------------------------------------------------------------
// Composite
// ---------------------------------------------------------------------------

/// An object that draws another scene in place.
#[derive(Clone, Debug, PartialEq)]
pub struct Composite {
    handle: ModelHandle,
}

impl Composite {
    pub const TYPE_TAG: &'static str = "composite";

    pub const SCENE: ReferenceProperty<Scene> = ReferenceProperty::new("scene", "sceneChanged");

    /// The embedded scene, if set and still present.
    pub fn scene(&self) -> Option<Scene> {
        Self::SCENE.get(&self.handle)
    }

    pub fn set_scene(&self, scene: &Scene) -> Result<()> {
        Self::SCENE.set(&self.handle, scene)
    }

    pub fn clear_scene(&self) {
        Self::SCENE.clear(&self.handle);
    }

    pub fn position(&self) -> Option<(f64, f64)> {
        position(&self.handle)
    }

    pub fn set_position(&self, x: f64, y: f64) -> Result<()> {
        set_position(&self.handle, x, y)
    }
}

impl Model for Composite {
    fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    fn from_any(model: AnyModel) -> Option<Self> {
        match model {
            AnyModel::Composite(composite) => Some(composite),
            _ => None,
        }
    }

    fn into_any(self) -> AnyModel {
        AnyModel::Composite(self)
    }

    fn references(&self) -> Vec<AnyModel> {
        self.scene().map(Model::into_any).into_iter().collect()
    }
}

impl BindModel for Composite {
    const KIND: ModelKind = ModelKind::Composite;

    fn bind(handle: ModelHandle) -> Self {
        Self { handle }
    }

    fn initialize(&self) -> Result<()> {
        initialize_object(&self.handle, Self::TYPE_TAG)
    }
}
