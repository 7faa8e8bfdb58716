/// Font assets: character tables and their dynamic glyph atlas.
pub mod font_asset;
/// Glyph and character records shared by font and sprite assets.
pub mod glyph;
pub mod material;
/// Code point resolution through fallback chains.
pub mod resolve;
pub mod sprite_asset;

pub use font_asset::{
    AddGlyphError, AtlasPopulationMode, AtlasSettings, FontAsset, FontStyleSettings, WeightVariant,
};
pub use glyph::{Character, Glyph, GlyphRenderMode, SpriteCharacter, SpriteGlyph};
pub use material::{ColorGradient, Material};
pub use resolve::{Resolution, ResolvedGlyph, Substitution, resolve_character};
pub use sprite_asset::SpriteAsset;
