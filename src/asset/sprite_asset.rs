use fxhash::FxHashMap;

use crate::{
    asset::glyph::{SpriteCharacter, SpriteGlyph},
    atlas::GlyphRect,
    glyph_id::{MaterialId, SpriteAssetId},
    rasterizer::GlyphMetrics,
    text::markup::name_hash,
};

/// A table of image regions addressed by name, index or code point.
///
/// Sprite atlases are authored offline, so unlike font assets nothing is
/// packed here; the caller supplies each region.
#[derive(Clone, Debug)]
pub struct SpriteAsset {
    pub(crate) id: SpriteAssetId,
    name: String,
    name_hash: u32,
    /// Size the sprite metrics were authored at.
    point_size: f32,
    atlas_width: u32,
    atlas_height: u32,
    glyphs: Vec<SpriteGlyph>,
    characters: Vec<SpriteCharacter>,
    by_name: FxHashMap<u32, usize>,
    by_unicode: FxHashMap<char, usize>,
    pub fallbacks: Vec<SpriteAssetId>,
    pub material: Option<MaterialId>,
}

impl SpriteAsset {
    pub fn new(name: impl Into<String>, point_size: f32, atlas_width: u32, atlas_height: u32) -> Self {
        let name = name.into();
        Self {
            id: SpriteAssetId(0),
            name_hash: name_hash(&name),
            name,
            point_size,
            atlas_width,
            atlas_height,
            glyphs: Vec::new(),
            characters: Vec::new(),
            by_name: FxHashMap::default(),
            by_unicode: FxHashMap::default(),
            fallbacks: Vec::new(),
            material: None,
        }
    }

    /// Adds a sprite and returns its index.
    ///
    /// A later sprite with the same name or code point shadows the earlier
    /// one in lookups; indices stay valid.
    pub fn add_sprite(
        &mut self,
        name: impl Into<String>,
        unicode: Option<char>,
        rect: GlyphRect,
        metrics: GlyphMetrics,
    ) -> usize {
        let name = name.into();
        let hash = name_hash(&name);
        let index = self.characters.len();

        self.glyphs.push(SpriteGlyph {
            metrics,
            rect,
            scale: 1.0,
        });
        self.characters.push(SpriteCharacter {
            name,
            name_hash: hash,
            unicode,
            glyph_index: index,
            scale: 1.0,
        });
        self.by_name.insert(hash, index);
        if let Some(ch) = unicode {
            self.by_unicode.insert(ch, index);
        }
        index
    }

    pub fn id(&self) -> SpriteAssetId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_hash(&self) -> u32 {
        self.name_hash
    }

    pub fn point_size(&self) -> f32 {
        self.point_size
    }

    pub fn atlas_size(&self) -> (u32, u32) {
        (self.atlas_width, self.atlas_height)
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    pub fn character(&self, index: usize) -> Option<&SpriteCharacter> {
        self.characters.get(index)
    }

    pub fn glyph(&self, index: usize) -> Option<&SpriteGlyph> {
        let character = self.characters.get(index)?;
        self.glyphs.get(character.glyph_index)
    }

    pub fn index_by_name_hash(&self, hash: u32) -> Option<usize> {
        self.by_name.get(&hash).copied()
    }

    pub fn index_by_unicode(&self, ch: char) -> Option<usize> {
        self.by_unicode.get(&ch).copied()
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_by_name_and_unicode() {
        let mut asset = SpriteAsset::new("emoji", 32.0, 128, 128);
        let smile = asset.add_sprite(
            "Smile",
            Some('\u{263A}'),
            GlyphRect::new(0, 0, 32, 32),
            GlyphMetrics::default(),
        );
        asset.add_sprite("heart", None, GlyphRect::new(32, 0, 32, 32), GlyphMetrics::default());

        assert_eq!(asset.index_by_name_hash(name_hash("smile")), Some(smile));
        assert_eq!(asset.index_by_unicode('\u{263A}'), Some(smile));
        assert_eq!(asset.index_by_name_hash(name_hash("HEART")), Some(1));
        assert_eq!(asset.glyph(1).unwrap().rect.x, 32);
        assert!(asset.glyph(2).is_none());
    }
}
