//! Font fixtures shared by the unit tests.

use std::sync::Arc;

use fxhash::FxHashMap;

use crate::{
    asset::{AtlasPopulationMode, AtlasSettings, FontAsset, GlyphRenderMode},
    font_storage::FontStorage,
    glyph_id::FontAssetId,
    rasterizer::{FaceMetrics, GlyphMetrics, GlyphRasterizer, RasterizedGlyph},
};

/// A face whose glyphs are solid boxes.
///
/// At point size `p` every glyph advances `0.5p` and inks a box of
/// `round(0.4p)` by `round(0.7p)` sitting on the baseline. Whitespace has
/// no ink. The face ascends `0.8p` and descends `0.2p`.
#[derive(Debug, Default)]
pub(crate) struct BoxRasterizer {
    chars: Vec<char>,
    /// Kerning in em.
    kerning: FxHashMap<(u32, u32), f32>,
}

impl BoxRasterizer {
    /// Covers `chars` and the space.
    pub fn new(chars: &str) -> Self {
        let mut covered = vec![' '];
        for ch in chars.chars() {
            if !covered.contains(&ch) {
                covered.push(ch);
            }
        }
        Self {
            chars: covered,
            kerning: FxHashMap::default(),
        }
    }

    pub fn with_kerning(mut self, left: char, right: char, em: f32) -> Self {
        if let (Some(left), Some(right)) = (self.glyph_index(left), self.glyph_index(right)) {
            self.kerning.insert((left, right), em);
        }
        self
    }

    fn is_blank(&self, glyph_index: u32) -> bool {
        self.chars
            .get(glyph_index as usize - 1)
            .is_some_and(|ch| ch.is_whitespace())
    }
}

impl GlyphRasterizer for BoxRasterizer {
    fn face_metrics(&self, point_size: f32) -> FaceMetrics {
        FaceMetrics::from_basic(point_size, point_size * 0.8, -point_size * 0.2, 0.0)
    }

    fn glyph_index(&self, ch: char) -> Option<u32> {
        self.chars
            .iter()
            .position(|c| *c == ch)
            .map(|position| position as u32 + 1)
    }

    fn glyph_metrics(&self, glyph_index: u32, point_size: f32) -> Option<GlyphMetrics> {
        if glyph_index == 0 || glyph_index as usize > self.chars.len() {
            return None;
        }
        let (width, height) = if self.is_blank(glyph_index) {
            (0.0, 0.0)
        } else {
            ((point_size * 0.4).round(), (point_size * 0.7).round())
        };
        Some(GlyphMetrics {
            width,
            height,
            bearing_x: point_size * 0.05,
            bearing_y: height,
            advance: point_size * 0.5,
        })
    }

    fn rasterize(&self, glyph_index: u32, point_size: f32) -> Option<RasterizedGlyph> {
        let metrics = self.glyph_metrics(glyph_index, point_size)?;
        let width = metrics.width as usize;
        let height = metrics.height as usize;
        Some(RasterizedGlyph {
            metrics,
            width,
            height,
            coverage: vec![255; width * height],
        })
    }

    fn kerning(&self, left: u32, right: u32, point_size: f32) -> Option<f32> {
        self.kerning.get(&(left, right)).map(|em| em * point_size)
    }
}

/// Small raster atlas sampled at 20 px, so a 10 px font is half scale.
pub(crate) fn test_atlas_settings() -> AtlasSettings {
    AtlasSettings {
        width: 256,
        height: 256,
        padding: 2,
        render_mode: GlyphRenderMode::Raster,
        population: AtlasPopulationMode::Dynamic,
        multi_atlas: false,
        sampling_point_size: 20.0,
    }
}

/// A storage whose default font is a [`BoxRasterizer`] covering `chars`.
pub(crate) fn storage_with_font(chars: &str) -> (FontStorage, FontAssetId) {
    storage_with_rasterizer(BoxRasterizer::new(chars))
}

pub(crate) fn storage_with_rasterizer(rasterizer: BoxRasterizer) -> (FontStorage, FontAssetId) {
    let mut storage = FontStorage::new();
    let id = storage.add_font_asset(FontAsset::new(
        "box",
        Arc::new(rasterizer),
        test_atlas_settings(),
    ));
    storage.settings_mut().default_font_asset = Some(id);
    (storage, id)
}
