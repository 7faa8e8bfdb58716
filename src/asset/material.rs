use crate::text::{markup::name_hash, style::VertexGradient};

/// The parts of a rendering material that affect layout.
///
/// Shader setup is the caller's business; the engine only reads how far the
/// quads must extend past the glyph outline.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub name_hash: u32,
    /// Extra quad padding in atlas pixels. Clamped to the atlas padding.
    pub padding: f32,
    /// Distance field range in atlas pixels, used to size bold style padding.
    pub gradient_scale: f32,
}

impl Material {
    pub fn new(name: impl Into<String>, padding: f32, gradient_scale: f32) -> Self {
        let name = name.into();
        Self {
            name_hash: name_hash(&name),
            name,
            padding,
            gradient_scale,
        }
    }
}

/// A named four-corner gradient usable through `<gradient=name>`.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorGradient {
    pub name: String,
    pub name_hash: u32,
    pub gradient: VertexGradient,
}

impl ColorGradient {
    pub fn new(name: impl Into<String>, gradient: VertexGradient) -> Self {
        let name = name.into();
        Self {
            name_hash: name_hash(&name),
            name,
            gradient,
        }
    }
}
