use crate::{atlas::GlyphRect, rasterizer::GlyphMetrics};

/// How glyph bitmaps are stored in the atlas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GlyphRenderMode {
    /// Plain 8-bit coverage. The padding area stays empty.
    Raster,
    /// Signed distance field spread over the atlas padding.
    #[default]
    Sdf,
}

/// A packed glyph of a font asset.
///
/// Metrics are in pixels at the asset's sampling point size; the layout
/// engine scales them to the requested size. Once packed, the atlas
/// rectangle never moves.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Glyph {
    pub index: u32,
    pub metrics: GlyphMetrics,
    /// Inner (unpadded) rectangle in atlas pixels. Empty for blank glyphs.
    pub rect: GlyphRect,
    pub atlas_index: usize,
    pub scale: f32,
}

impl Glyph {
    pub fn is_blank(&self) -> bool {
        self.rect.is_empty()
    }
}

/// Binding of a code point to a glyph of the same asset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Character {
    pub code_point: char,
    pub glyph_index: u32,
    /// Per-code-point scale applied on top of the glyph scale.
    pub scale: f32,
}

impl Character {
    pub fn new(code_point: char, glyph_index: u32) -> Self {
        Self {
            code_point,
            glyph_index,
            scale: 1.0,
        }
    }
}

/// An image region of a sprite asset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpriteGlyph {
    pub metrics: GlyphMetrics,
    pub rect: GlyphRect,
    pub scale: f32,
}

/// A sprite glyph reachable by name and optionally by code point.
#[derive(Clone, Debug, PartialEq)]
pub struct SpriteCharacter {
    pub name: String,
    pub name_hash: u32,
    pub unicode: Option<char>,
    pub glyph_index: usize,
    pub scale: f32,
}
