use fxhash::FxHashSet;

use crate::{
    asset::{AddGlyphError, Character},
    font_storage::FontStorage,
    glyph_id::{FontAssetId, SpriteAssetId},
    text::style::{FontStyles, FontWeight},
};

/// The asset entry a code point resolved to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ResolvedGlyph {
    Character {
        font_asset: FontAssetId,
        character: Character,
        /// Another asset than the requested one supplied the glyph.
        is_using_alternate_typeface: bool,
        /// The glyph came from the weight table, so bold or italic must not
        /// be synthesized again.
        is_weight_variant: bool,
    },
    Sprite {
        sprite_asset: SpriteAssetId,
        index: usize,
    },
}

/// What was shown instead of the requested code point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Substitution {
    MissingGlyph(char),
    Space,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolution {
    pub glyph: ResolvedGlyph,
    pub substitution: Option<Substitution>,
    /// First asset along the way that covered the code point but had no
    /// atlas space left.
    pub atlas_full: Option<FontAssetId>,
}

/// Finds a glyph for `ch`, starting at `primary`.
///
/// Search order: the weight variant selected by `styles`/`weight`, the
/// primary asset and its fallback chain (depth first), the global fallback
/// list, the default sprite asset by code point, the default font asset.
/// When all of that fails the configured missing-glyph code point is
/// searched the same way, and finally a space. Each asset is visited at most
/// once per search, so fallback cycles terminate.
///
/// Returns `None` only when not even a space is available.
pub fn resolve_character(
    storage: &mut FontStorage,
    ch: char,
    primary: FontAssetId,
    styles: FontStyles,
    weight: FontWeight,
) -> Option<Resolution> {
    let mut atlas_full = None;

    if let Some(glyph) = find_glyph(storage, ch, primary, styles, weight, &mut atlas_full) {
        return Some(Resolution {
            glyph,
            substitution: None,
            atlas_full,
        });
    }

    let missing = storage.settings().missing_glyph;
    if missing != ch
        && let Some(glyph) = find_glyph(storage, missing, primary, styles, weight, &mut atlas_full)
    {
        return Some(Resolution {
            glyph,
            substitution: Some(Substitution::MissingGlyph(missing)),
            atlas_full,
        });
    }

    find_glyph(storage, ' ', primary, styles, weight, &mut atlas_full).map(|glyph| Resolution {
        glyph,
        substitution: Some(Substitution::Space),
        atlas_full,
    })
}

/// Looks `ch` up in the font chain only, without substitutes.
pub fn find_in_font_chain(
    storage: &mut FontStorage,
    ch: char,
    primary: FontAssetId,
) -> Option<(FontAssetId, Character)> {
    let mut visited = FxHashSet::default();
    let mut atlas_full = None;
    search_font_chain(storage, ch, primary, &mut visited, &mut atlas_full)
}

fn find_glyph(
    storage: &mut FontStorage,
    ch: char,
    primary: FontAssetId,
    styles: FontStyles,
    weight: FontWeight,
    atlas_full: &mut Option<FontAssetId>,
) -> Option<ResolvedGlyph> {
    let mut visited = FxHashSet::default();

    let italic = styles.contains(FontStyles::ITALIC);
    let weight = if styles.contains(FontStyles::BOLD) {
        weight.max(FontWeight::Bold)
    } else {
        weight
    };
    if (italic || weight != FontWeight::Regular)
        && let Some(variant) = storage
            .font_asset(primary)
            .and_then(|asset| asset.weight_variant(weight, italic))
        && let Some(asset) = storage.font_asset_mut(variant)
    {
        match asset.try_add_character(ch) {
            Ok(character) => {
                return Some(ResolvedGlyph::Character {
                    font_asset: variant,
                    character,
                    is_using_alternate_typeface: true,
                    is_weight_variant: true,
                });
            }
            Err(AddGlyphError::AtlasFull(_)) => {
                atlas_full.get_or_insert(variant);
            }
            Err(_) => {}
        }
    }

    let font_result = |found: (FontAssetId, Character)| ResolvedGlyph::Character {
        font_asset: found.0,
        character: found.1,
        is_using_alternate_typeface: found.0 != primary,
        is_weight_variant: false,
    };

    if let Some(found) = search_font_chain(storage, ch, primary, &mut visited, atlas_full) {
        return Some(font_result(found));
    }

    let globals = storage.settings().fallback_font_assets.clone();
    for fallback in globals {
        if let Some(found) = search_font_chain(storage, ch, fallback, &mut visited, atlas_full) {
            return Some(font_result(found));
        }
    }

    if let Some(sprites) = storage.settings().default_sprite_asset {
        let mut visited_sprites = FxHashSet::default();
        if let Some((sprite_asset, index)) =
            search_sprite_chain(storage, ch, sprites, &mut visited_sprites)
        {
            return Some(ResolvedGlyph::Sprite {
                sprite_asset,
                index,
            });
        }
    }

    let default = storage.settings().default_font_asset?;
    search_font_chain(storage, ch, default, &mut visited, atlas_full).map(font_result)
}

fn search_font_chain(
    storage: &mut FontStorage,
    ch: char,
    start: FontAssetId,
    visited: &mut FxHashSet<FontAssetId>,
    atlas_full: &mut Option<FontAssetId>,
) -> Option<(FontAssetId, Character)> {
    if !visited.insert(start) {
        return None;
    }
    let asset = storage.font_asset_mut(start)?;
    match asset.try_add_character(ch) {
        Ok(character) => return Some((start, character)),
        Err(AddGlyphError::AtlasFull(_)) => {
            atlas_full.get_or_insert(start);
        }
        Err(_) => {}
    }

    let fallbacks = asset.fallbacks.clone();
    fallbacks
        .into_iter()
        .find_map(|fallback| search_font_chain(storage, ch, fallback, visited, atlas_full))
}

pub(crate) fn search_sprite_chain(
    storage: &FontStorage,
    ch: char,
    start: SpriteAssetId,
    visited: &mut FxHashSet<SpriteAssetId>,
) -> Option<(SpriteAssetId, usize)> {
    if !visited.insert(start) {
        return None;
    }
    let asset = storage.sprite_asset(start)?;
    if let Some(index) = asset.index_by_unicode(ch) {
        return Some((start, index));
    }
    asset
        .fallbacks
        .iter()
        .find_map(|fallback| search_sprite_chain(storage, ch, *fallback, visited))
}

/// Finds a sprite by name hash in `start` and its fallback chain.
pub(crate) fn search_sprite_by_name(
    storage: &FontStorage,
    hash: u32,
    start: SpriteAssetId,
    visited: &mut FxHashSet<SpriteAssetId>,
) -> Option<(SpriteAssetId, usize)> {
    if !visited.insert(start) {
        return None;
    }
    let asset = storage.sprite_asset(start)?;
    if let Some(index) = asset.index_by_name_hash(hash) {
        return Some((start, index));
    }
    asset
        .fallbacks
        .iter()
        .find_map(|fallback| search_sprite_by_name(storage, hash, *fallback, visited))
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        asset::{FontAsset, SpriteAsset},
        atlas::GlyphRect,
        rasterizer::GlyphMetrics,
        testing::{BoxRasterizer, test_atlas_settings},
    };

    fn add(storage: &mut FontStorage, name: &str, chars: &str) -> FontAssetId {
        storage.add_font_asset(FontAsset::new(
            name,
            Arc::new(BoxRasterizer::new(chars)),
            test_atlas_settings(),
        ))
    }

    fn font_of(resolution: &Resolution) -> FontAssetId {
        match resolution.glyph {
            ResolvedGlyph::Character { font_asset, .. } => font_asset,
            ResolvedGlyph::Sprite { .. } => panic!("expected a character"),
        }
    }

    #[test]
    fn primary_asset_wins() {
        let mut storage = FontStorage::new();
        let primary = add(&mut storage, "a", "a");
        let r = resolve_character(&mut storage, 'a', primary, FontStyles::empty(), FontWeight::Regular)
            .unwrap();
        assert_eq!(font_of(&r), primary);
        assert_eq!(r.substitution, None);
        assert!(matches!(
            r.glyph,
            ResolvedGlyph::Character {
                is_using_alternate_typeface: false,
                ..
            }
        ));
    }

    #[test]
    fn fallback_chain_is_depth_first_and_cycle_safe() {
        let mut storage = FontStorage::new();
        let primary = add(&mut storage, "primary", "a");
        let first = add(&mut storage, "first", "b");
        let nested = add(&mut storage, "nested", "c");
        let second = add(&mut storage, "second", "c");
        storage.font_asset_mut(primary).unwrap().fallbacks = vec![first, second];
        storage.font_asset_mut(first).unwrap().fallbacks = vec![nested, primary];
        storage.font_asset_mut(nested).unwrap().fallbacks = vec![first];

        let r = resolve_character(&mut storage, 'c', primary, FontStyles::empty(), FontWeight::Regular)
            .unwrap();
        assert_eq!(font_of(&r), nested);
        assert!(matches!(
            r.glyph,
            ResolvedGlyph::Character {
                is_using_alternate_typeface: true,
                ..
            }
        ));
    }

    #[test]
    fn global_fallbacks_then_default_asset() {
        let mut storage = FontStorage::new();
        let primary = add(&mut storage, "primary", "a");
        let global = add(&mut storage, "global", "g");
        let default = add(&mut storage, "default", "d");
        storage.settings_mut().fallback_font_assets = vec![global];
        storage.settings_mut().default_font_asset = Some(default);

        let g = resolve_character(&mut storage, 'g', primary, FontStyles::empty(), FontWeight::Regular)
            .unwrap();
        let d = resolve_character(&mut storage, 'd', primary, FontStyles::empty(), FontWeight::Regular)
            .unwrap();
        assert_eq!(font_of(&g), global);
        assert_eq!(font_of(&d), default);
    }

    #[test]
    fn sprites_are_found_by_code_point() {
        let mut storage = FontStorage::new();
        let primary = add(&mut storage, "primary", "a");
        let mut sprites = SpriteAsset::new("icons", 20.0, 64, 64);
        sprites.add_sprite(
            "star",
            Some('\u{2605}'),
            GlyphRect::new(0, 0, 16, 16),
            GlyphMetrics::default(),
        );
        let sprites = storage.add_sprite_asset(sprites);
        storage.settings_mut().default_sprite_asset = Some(sprites);

        let r = resolve_character(
            &mut storage,
            '\u{2605}',
            primary,
            FontStyles::empty(),
            FontWeight::Regular,
        )
        .unwrap();
        assert_eq!(
            r.glyph,
            ResolvedGlyph::Sprite {
                sprite_asset: sprites,
                index: 0
            }
        );
    }

    #[test]
    fn missing_code_points_use_the_substitute_then_space() {
        let mut storage = FontStorage::new();
        let primary = add(&mut storage, "primary", "a?");
        storage.settings_mut().missing_glyph = '?';

        let r = resolve_character(&mut storage, 'z', primary, FontStyles::empty(), FontWeight::Regular)
            .unwrap();
        assert_eq!(r.substitution, Some(Substitution::MissingGlyph('?')));

        storage.settings_mut().missing_glyph = '#';
        let r = resolve_character(&mut storage, 'z', primary, FontStyles::empty(), FontWeight::Regular)
            .unwrap();
        assert_eq!(r.substitution, Some(Substitution::Space));
    }

    #[test]
    fn bold_prefers_the_weight_variant() {
        let mut storage = FontStorage::new();
        let primary = add(&mut storage, "regular", "ab");
        let bold = add(&mut storage, "bold", "a");
        storage
            .font_asset_mut(primary)
            .unwrap()
            .set_weight_variant(FontWeight::Bold, false, bold);

        let a = resolve_character(&mut storage, 'a', primary, FontStyles::BOLD, FontWeight::Regular)
            .unwrap();
        assert_eq!(font_of(&a), bold);
        assert!(matches!(
            a.glyph,
            ResolvedGlyph::Character {
                is_weight_variant: true,
                ..
            }
        ));

        // not in the variant: primary, synthesized
        let b = resolve_character(&mut storage, 'b', primary, FontStyles::BOLD, FontWeight::Regular)
            .unwrap();
        assert_eq!(font_of(&b), primary);
    }
}
