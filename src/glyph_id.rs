/// Index of a [`FontAsset`](crate::asset::FontAsset) inside a [`FontStorage`](crate::FontStorage).
///
/// Ids are only meaningful for the storage that issued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontAssetId(pub(crate) u32);

/// Index of a [`SpriteAsset`](crate::asset::SpriteAsset) inside a [`FontStorage`](crate::FontStorage).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpriteAssetId(pub(crate) u32);

/// Index of a [`Material`](crate::asset::Material) inside a [`FontStorage`](crate::FontStorage).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub(crate) u32);

/// Index of a [`ColorGradient`](crate::asset::ColorGradient) preset inside a [`FontStorage`](crate::FontStorage).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColorGradientId(pub(crate) u32);

macro_rules! impl_index {
    ($ty:ty) => {
        impl $ty {
            pub fn index(self) -> usize {
                self.0 as usize
            }

            pub(crate) fn from_index(index: usize) -> Self {
                Self(index as u32)
            }
        }
    };
}

impl_index!(FontAssetId);
impl_index!(SpriteAssetId);
impl_index!(MaterialId);
impl_index!(ColorGradientId);

/// Identity of a packed glyph.
///
/// A glyph is owned by exactly one font asset and is rasterized at that
/// asset's sampling point size, so the pair is enough to find its atlas
/// rectangle again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GlyphId {
    font_asset: FontAssetId,
    glyph_index: u32,
}

impl GlyphId {
    pub fn new(font_asset: FontAssetId, glyph_index: u32) -> Self {
        Self {
            font_asset,
            glyph_index,
        }
    }

    pub fn font_asset(&self) -> FontAssetId {
        self.font_asset
    }

    pub fn glyph_index(&self) -> u32 {
        self.glyph_index
    }
}
