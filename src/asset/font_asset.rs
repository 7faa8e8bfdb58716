use std::sync::Arc;

use fxhash::{FxHashMap, FxHashSet};

use crate::{
    asset::glyph::{Character, Glyph, GlyphRenderMode},
    atlas::{AtlasTexture, AtlasUpdate, GlyphRect, PackingHeuristic, RectPacker},
    glyph_id::{FontAssetId, MaterialId},
    rasterizer::{FaceMetrics, GlyphMetrics, GlyphRasterizer, coverage_to_sdf},
    text::{markup::name_hash, style::FontWeight},
};

/// Whether an asset may add glyphs after creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AtlasPopulationMode {
    /// Glyphs are packed up front with [`FontAsset::try_add_characters`]; lookups
    /// of anything else fail.
    Static,
    /// Glyphs are packed on first reference.
    #[default]
    Dynamic,
}

/// Per-asset atlas configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AtlasSettings {
    pub width: i32,
    pub height: i32,
    /// Empty border around each glyph, in atlas pixels. Doubles as the SDF spread.
    pub padding: i32,
    pub render_mode: GlyphRenderMode,
    pub population: AtlasPopulationMode,
    /// Append a new atlas page instead of failing when the current one is full.
    pub multi_atlas: bool,
    /// Point size glyphs are rasterized at.
    pub sampling_point_size: f32,
}

impl Default for AtlasSettings {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            padding: 5,
            render_mode: GlyphRenderMode::Sdf,
            population: AtlasPopulationMode::Dynamic,
            multi_atlas: false,
            sampling_point_size: 48.0,
        }
    }
}

/// Constants used to synthesize bold and italic when no weight variant exists.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FontStyleSettings {
    /// Extra advance of synthesized bold, in 1/100 em.
    pub bold_spacing: f32,
    /// Extra quad padding of synthesized bold, in atlas pixels before gradient scaling.
    pub bold_style_padding: f32,
    /// Horizontal shear of synthesized italic, in 1/100 of the glyph height.
    pub italic_slant: f32,
    /// Tab stop width as a multiple of the face tab width.
    pub tab_multiple: f32,
}

impl Default for FontStyleSettings {
    fn default() -> Self {
        Self {
            bold_spacing: 7.0,
            bold_style_padding: 0.75,
            italic_slant: 35.0,
            tab_multiple: 4.0,
        }
    }
}

/// Alternate assets for one weight step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WeightVariant {
    pub regular: Option<FontAssetId>,
    pub italic: Option<FontAssetId>,
}

/// Why a glyph could not be made available.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AddGlyphError {
    #[error("the face has no glyph for {0:?}")]
    NotInFace(char),
    #[error("{0:?} is not part of a static asset")]
    StaticAsset(char),
    #[error("no atlas space left for {0:?}")]
    AtlasFull(char),
}

#[derive(Clone, Debug)]
struct AtlasPage {
    packer: RectPacker,
    texture: AtlasTexture,
}

impl AtlasPage {
    fn new(width: i32, height: i32) -> Self {
        Self {
            packer: RectPacker::new(width, height),
            texture: AtlasTexture::new(width.max(0) as usize, height.max(0) as usize),
        }
    }
}

/// A font face together with its glyph atlas.
///
/// Character and glyph tables only ever grow. Packed rectangles never move,
/// so a [`Glyph`] handed out once stays valid for the life of the asset.
pub struct FontAsset {
    pub(crate) id: FontAssetId,
    name: String,
    name_hash: u32,
    rasterizer: Arc<dyn GlyphRasterizer>,
    face: FaceMetrics,
    settings: AtlasSettings,
    pub style: FontStyleSettings,
    characters: FxHashMap<char, Character>,
    glyphs: FxHashMap<u32, Glyph>,
    /// Code points the face is known not to cover.
    missing: FxHashSet<char>,
    pages: Vec<AtlasPage>,
    /// Packed glyphs whose pixels have not been written yet.
    pending: Vec<u32>,
    pub fallbacks: Vec<FontAssetId>,
    weights: [WeightVariant; 9],
    kerning: FxHashMap<(u32, u32), f32>,
    pub material: Option<MaterialId>,
}

impl std::fmt::Debug for FontAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontAsset")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("characters", &self.characters.len())
            .field("glyphs", &self.glyphs.len())
            .field("pages", &self.pages.len())
            .finish_non_exhaustive()
    }
}

impl FontAsset {
    pub fn new(
        name: impl Into<String>,
        rasterizer: Arc<dyn GlyphRasterizer>,
        settings: AtlasSettings,
    ) -> Self {
        let name = name.into();
        let face = rasterizer.face_metrics(settings.sampling_point_size);
        Self {
            id: FontAssetId(0),
            name_hash: name_hash(&name),
            name,
            rasterizer,
            face,
            settings,
            style: FontStyleSettings::default(),
            characters: FxHashMap::default(),
            glyphs: FxHashMap::default(),
            missing: FxHashSet::default(),
            pages: vec![AtlasPage::new(settings.width, settings.height)],
            pending: Vec::new(),
            fallbacks: Vec::new(),
            weights: [WeightVariant::default(); 9],
            kerning: FxHashMap::default(),
            material: None,
        }
    }

    pub fn id(&self) -> FontAssetId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_hash(&self) -> u32 {
        self.name_hash
    }

    pub fn settings(&self) -> &AtlasSettings {
        &self.settings
    }

    /// Face metrics at the sampling point size.
    pub fn face_metrics(&self) -> &FaceMetrics {
        &self.face
    }

    pub fn face_metrics_at(&self, point_size: f32) -> FaceMetrics {
        self.face.scaled(point_size / self.settings.sampling_point_size)
    }

    pub fn character(&self, ch: char) -> Option<&Character> {
        self.characters.get(&ch)
    }

    pub fn glyph(&self, glyph_index: u32) -> Option<&Glyph> {
        self.glyphs.get(&glyph_index)
    }

    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_texture(&self, index: usize) -> Option<&AtlasTexture> {
        self.pages.get(index).map(|page| &page.texture)
    }

    pub fn page_packer(&self, index: usize) -> Option<&RectPacker> {
        self.pages.get(index).map(|page| &page.packer)
    }

    pub fn has_pending_glyphs(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn weight_variant(&self, weight: FontWeight, italic: bool) -> Option<FontAssetId> {
        let variant = self.weights[weight.index()];
        if italic { variant.italic } else { variant.regular }
    }

    pub fn set_weight_variant(&mut self, weight: FontWeight, italic: bool, asset: FontAssetId) {
        let variant = &mut self.weights[weight.index()];
        if italic {
            variant.italic = Some(asset);
        } else {
            variant.regular = Some(asset);
        }
    }

    /// Kerning between two glyphs at the sampling size.
    pub fn kerning(&mut self, left: u32, right: u32) -> f32 {
        let point_size = self.settings.sampling_point_size;
        *self
            .kerning
            .entry((left, right))
            .or_insert_with(|| self.rasterizer.kerning(left, right, point_size).unwrap_or(0.0))
    }

    /// Looks a code point up, packing its glyph first if the asset is dynamic.
    ///
    /// Repeated calls for the same code point return the same binding and
    /// never pack twice.
    pub fn try_add_character(&mut self, ch: char) -> Result<Character, AddGlyphError> {
        if let Some(character) = self.characters.get(&ch) {
            return Ok(*character);
        }
        if self.missing.contains(&ch) {
            return Err(AddGlyphError::NotInFace(ch));
        }
        if self.settings.population == AtlasPopulationMode::Static {
            return Err(AddGlyphError::StaticAsset(ch));
        }

        let Some(glyph_index) = self.rasterizer.glyph_index(ch) else {
            self.missing.insert(ch);
            return Err(AddGlyphError::NotInFace(ch));
        };

        if !self.glyphs.contains_key(&glyph_index) {
            let metrics = self.sampled_metrics(glyph_index);
            let (width, height) = bitmap_size(&metrics);
            let Some((page, rect)) = self.pack(width, height, PackingHeuristic::BestShortSideFit)
            else {
                log::warn!("Atlas of font asset `{}` is full, {:?} not added.", self.name, ch);
                return Err(AddGlyphError::AtlasFull(ch));
            };
            self.insert_glyph(glyph_index, metrics, page, rect);
        }

        let character = Character::new(ch, glyph_index);
        self.characters.insert(ch, character);
        Ok(character)
    }

    /// Adds every character of `text` in one packing pass.
    ///
    /// Returns one flag per `char` of `text`. Static assets use the
    /// contact-point heuristic, dynamic ones best-short-side-fit. Works on
    /// static assets too; that is how they get populated.
    pub fn try_add_characters(&mut self, text: &str) -> Vec<bool> {
        let chars: Vec<char> = text.chars().collect();
        let mut results = vec![false; chars.len()];

        // glyphs that still need atlas space, deduplicated
        let mut to_pack: Vec<(u32, GlyphMetrics)> = Vec::new();
        for &ch in &chars {
            if self.characters.contains_key(&ch) || self.missing.contains(&ch) {
                continue;
            }
            let Some(glyph_index) = self.rasterizer.glyph_index(ch) else {
                self.missing.insert(ch);
                continue;
            };
            if !self.glyphs.contains_key(&glyph_index)
                && !to_pack.iter().any(|(index, _)| *index == glyph_index)
            {
                to_pack.push((glyph_index, self.sampled_metrics(glyph_index)));
            }
        }

        let heuristic = match self.settings.population {
            AtlasPopulationMode::Static => PackingHeuristic::ContactPoint,
            AtlasPopulationMode::Dynamic => PackingHeuristic::BestShortSideFit,
        };
        let mut waiting = to_pack;
        let mut grown = false;
        loop {
            let sizes: Vec<(i32, i32)> = waiting.iter().map(|(_, m)| bitmap_size(m)).collect();
            let page_index = self.pages.len() - 1;
            let padding = self.settings.padding;
            let placed = self.pages[page_index]
                .packer
                .try_pack_batch(&sizes, padding, heuristic);

            let mut rest = Vec::new();
            for ((glyph_index, metrics), rect) in waiting.into_iter().zip(placed) {
                match rect {
                    Some(rect) => self.insert_glyph(glyph_index, metrics, page_index, rect),
                    None => rest.push((glyph_index, metrics)),
                }
            }

            if rest.is_empty() || grown || !self.settings.multi_atlas {
                if !rest.is_empty() {
                    log::warn!(
                        "Atlas of font asset `{}` is full, {} glyphs not added.",
                        self.name,
                        rest.len()
                    );
                }
                break;
            }
            self.add_page();
            grown = true;
            waiting = rest;
        }

        for (result, &ch) in results.iter_mut().zip(&chars) {
            if self.characters.contains_key(&ch) {
                *result = true;
                continue;
            }
            let Some(glyph_index) = self.rasterizer.glyph_index(ch) else {
                continue;
            };
            if self.glyphs.contains_key(&glyph_index) {
                self.characters.insert(ch, Character::new(ch, glyph_index));
                *result = true;
            }
        }
        results
    }

    /// Rasterizes every glyph packed since the last call and writes it into
    /// the CPU atlas copy.
    ///
    /// The returned updates describe exactly the pixels that changed.
    pub fn render_pending_glyphs(&mut self) -> Vec<AtlasUpdate> {
        let pending = std::mem::take(&mut self.pending);
        let mut updates = Vec::with_capacity(pending.len());
        let point_size = self.settings.sampling_point_size;
        let padding = self.settings.padding.max(0);

        for glyph_index in pending {
            let Some(glyph) = self.glyphs.get(&glyph_index).copied() else {
                continue;
            };
            let Some(raster) = self.rasterizer.rasterize(glyph_index, point_size) else {
                log::warn!(
                    "Font asset `{}` failed to rasterize glyph {}.",
                    self.name,
                    glyph_index
                );
                continue;
            };

            let (pixels, x, y, width, height) = match self.settings.render_mode {
                GlyphRenderMode::Raster => (
                    raster.coverage,
                    glyph.rect.x,
                    glyph.rect.y,
                    raster.width,
                    raster.height,
                ),
                GlyphRenderMode::Sdf => {
                    let (sdf, width, height) = coverage_to_sdf(
                        &raster.coverage,
                        raster.width,
                        raster.height,
                        padding as usize,
                    );
                    (
                        sdf,
                        glyph.rect.x - padding,
                        glyph.rect.y - padding,
                        width,
                        height,
                    )
                }
            };

            // never write outside the padded rectangle that was reserved
            let slot = glyph.rect.inflate(padding);
            let clip_w = width.min((slot.right() - x).max(0) as usize);
            let clip_h = height.min((slot.bottom() - y).max(0) as usize);
            let pixels = crop(pixels, width, clip_w, clip_h);

            let Some(page) = self.pages.get_mut(glyph.atlas_index) else {
                continue;
            };
            let (x, y) = (x.max(0) as usize, y.max(0) as usize);
            page.texture.blit(x, y, clip_w, clip_h, &pixels);
            updates.push(AtlasUpdate {
                font_asset: self.id,
                texture_index: glyph.atlas_index,
                x,
                y,
                width: clip_w,
                height: clip_h,
                pixels,
            });
        }

        updates
    }

    fn sampled_metrics(&self, glyph_index: u32) -> GlyphMetrics {
        self.rasterizer
            .glyph_metrics(glyph_index, self.settings.sampling_point_size)
            .unwrap_or_default()
    }

    fn add_page(&mut self) {
        log::debug!(
            "Font asset `{}` adds atlas page {}.",
            self.name,
            self.pages.len()
        );
        self.pages
            .push(AtlasPage::new(self.settings.width, self.settings.height));
    }

    fn pack(
        &mut self,
        width: i32,
        height: i32,
        heuristic: PackingHeuristic,
    ) -> Option<(usize, GlyphRect)> {
        let padding = self.settings.padding;
        let index = self.pages.len() - 1;
        if let Some(rect) = self.pages[index].packer.try_pack(width, height, padding, heuristic) {
            return Some((index, rect));
        }
        if !self.settings.multi_atlas {
            return None;
        }

        self.add_page();
        let index = self.pages.len() - 1;
        self.pages[index]
            .packer
            .try_pack(width, height, padding, heuristic)
            .map(|rect| (index, rect))
    }

    fn insert_glyph(&mut self, index: u32, metrics: GlyphMetrics, atlas_index: usize, rect: GlyphRect) {
        let glyph = Glyph {
            index,
            metrics,
            rect,
            atlas_index,
            scale: 1.0,
        };
        if !glyph.is_blank() {
            self.pending.push(index);
        }
        self.glyphs.insert(index, glyph);
    }
}

fn bitmap_size(metrics: &GlyphMetrics) -> (i32, i32) {
    (metrics.width.ceil() as i32, metrics.height.ceil() as i32)
}

fn crop(pixels: Vec<u8>, stride: usize, width: usize, height: usize) -> Vec<u8> {
    if width == stride && pixels.len() == width * height {
        return pixels;
    }
    let mut out = Vec::with_capacity(width * height);
    for row in 0..height {
        let start = row * stride;
        match pixels.get(start..start + width) {
            Some(line) => out.extend_from_slice(line),
            None => out.resize(out.len() + width, 0),
        }
    }
    out
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BoxRasterizer, test_atlas_settings};

    fn asset(chars: &str, settings: AtlasSettings) -> FontAsset {
        FontAsset::new("box", Arc::new(BoxRasterizer::new(chars)), settings)
    }

    #[test]
    fn resolving_twice_returns_the_same_rectangle() {
        let mut font = asset("ab", test_atlas_settings());
        let first = font.try_add_character('a').unwrap();
        let rect = font.glyph(first.glyph_index).unwrap().rect;
        let used = font.page_packer(0).unwrap().used_rects().len();

        let second = font.try_add_character('a').unwrap();
        assert_eq!(first, second);
        assert_eq!(font.glyph(second.glyph_index).unwrap().rect, rect);
        assert_eq!(font.page_packer(0).unwrap().used_rects().len(), used);
    }

    #[test]
    fn unknown_code_points_are_remembered() {
        let mut font = asset("a", test_atlas_settings());
        assert_eq!(
            font.try_add_character('z'),
            Err(AddGlyphError::NotInFace('z'))
        );
        assert_eq!(
            font.try_add_character('z'),
            Err(AddGlyphError::NotInFace('z'))
        );
        assert_eq!(font.glyph_count(), 0);
    }

    #[test]
    fn whitespace_takes_no_atlas_space() {
        let mut font = asset("a", test_atlas_settings());
        let space = font.try_add_character(' ').unwrap();
        assert!(font.glyph(space.glyph_index).unwrap().is_blank());
        assert!(!font.has_pending_glyphs());
    }

    #[test]
    fn full_page_fails_without_multi_atlas() {
        let settings = AtlasSettings {
            width: 20,
            height: 20,
            ..test_atlas_settings()
        };
        let mut font = asset("ab", settings);
        font.try_add_character('a').unwrap();
        assert_eq!(
            font.try_add_character('b'),
            Err(AddGlyphError::AtlasFull('b'))
        );
        assert_eq!(font.page_count(), 1);
    }

    #[test]
    fn multi_atlas_appends_a_page() {
        let settings = AtlasSettings {
            width: 20,
            height: 20,
            multi_atlas: true,
            ..test_atlas_settings()
        };
        let mut font = asset("ab", settings);
        font.try_add_character('a').unwrap();
        let b = font.try_add_character('b').unwrap();
        assert_eq!(font.page_count(), 2);
        assert_eq!(font.glyph(b.glyph_index).unwrap().atlas_index, 1);
    }

    #[test]
    fn static_assets_only_know_their_character_set() {
        let settings = AtlasSettings {
            population: AtlasPopulationMode::Static,
            ..test_atlas_settings()
        };
        let mut font = asset("abc", settings);
        assert_eq!(font.try_add_characters("ab?"), vec![true, true, false]);
        assert!(font.try_add_character('a').is_ok());
        assert_eq!(
            font.try_add_character('c'),
            Err(AddGlyphError::StaticAsset('c'))
        );
        assert!(font.page_packer(0).unwrap().is_consistent());
    }

    #[test]
    fn pending_glyphs_are_flushed_once() {
        let mut font = asset("ab", test_atlas_settings());
        font.try_add_character('a').unwrap();
        font.try_add_character('b').unwrap();

        let updates = font.render_pending_glyphs();
        assert_eq!(updates.len(), 2);
        for update in &updates {
            assert_eq!(update.pixels.len(), update.width * update.height);
            assert!(update.pixels.iter().any(|p| *p == 255));
        }
        assert!(font.render_pending_glyphs().is_empty());

        let a = font.character('a').unwrap().glyph_index;
        let rect = font.glyph(a).unwrap().rect;
        let page = font.page_texture(0).unwrap();
        assert!(page.read_rect(&rect).iter().all(|p| *p == 255));
    }

    #[test]
    fn sdf_updates_cover_the_padding() {
        let settings = AtlasSettings {
            render_mode: GlyphRenderMode::Sdf,
            ..test_atlas_settings()
        };
        let padding = settings.padding as usize;
        let mut font = asset("a", settings);
        let a = font.try_add_character('a').unwrap();
        let rect = font.glyph(a.glyph_index).unwrap().rect;

        let updates = font.render_pending_glyphs();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].width, rect.width as usize + padding * 2);
        assert_eq!(updates[0].x, rect.x as usize - padding);
    }

    #[test]
    fn weight_table_is_per_style() {
        let mut font = asset("a", test_atlas_settings());
        font.set_weight_variant(FontWeight::Bold, false, FontAssetId(3));
        assert_eq!(font.weight_variant(FontWeight::Bold, false), Some(FontAssetId(3)));
        assert_eq!(font.weight_variant(FontWeight::Bold, true), None);
    }
}
