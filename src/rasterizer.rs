use std::sync::Arc;

/// Vertical metrics of a face at one point size.
///
/// Values are in pixels with the Y axis pointing **up** from the baseline,
/// so `descent_line` and `underline_offset` are usually negative.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceMetrics {
    pub point_size: f32,
    pub line_height: f32,
    pub ascent_line: f32,
    pub descent_line: f32,
    pub cap_line: f32,
    pub mean_line: f32,
    pub underline_offset: f32,
    pub underline_thickness: f32,
    pub strikethrough_offset: f32,
    pub superscript_offset: f32,
    pub superscript_size: f32,
    pub subscript_offset: f32,
    pub subscript_size: f32,
    /// Advance of a single tab stop before the asset's tab multiple is applied.
    pub tab_width: f32,
}

impl FaceMetrics {
    /// Derives the secondary metrics from the four values every face exposes.
    ///
    /// Used by rasterizers whose font format does not carry explicit
    /// underline or script offsets.
    pub fn from_basic(point_size: f32, ascent: f32, descent: f32, line_gap: f32) -> Self {
        let cap_line = ascent * 0.7;
        Self {
            point_size,
            line_height: ascent - descent + line_gap,
            ascent_line: ascent,
            descent_line: descent,
            cap_line,
            mean_line: cap_line * 0.7,
            underline_offset: descent * 0.5,
            underline_thickness: (point_size * 0.05).max(1.0),
            strikethrough_offset: cap_line * 0.45,
            superscript_offset: ascent * 0.5,
            superscript_size: 0.5,
            subscript_offset: descent * 0.5,
            subscript_size: 0.5,
            tab_width: point_size * 0.5,
        }
    }

    /// Returns the same metrics expressed at `factor` times the size.
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            point_size: self.point_size * factor,
            line_height: self.line_height * factor,
            ascent_line: self.ascent_line * factor,
            descent_line: self.descent_line * factor,
            cap_line: self.cap_line * factor,
            mean_line: self.mean_line * factor,
            underline_offset: self.underline_offset * factor,
            underline_thickness: self.underline_thickness * factor,
            strikethrough_offset: self.strikethrough_offset * factor,
            superscript_offset: self.superscript_offset * factor,
            superscript_size: self.superscript_size,
            subscript_offset: self.subscript_offset * factor,
            subscript_size: self.subscript_size,
            tab_width: self.tab_width * factor,
        }
    }
}

/// Placement metrics of one glyph, in pixels at the size it was queried.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GlyphMetrics {
    pub width: f32,
    pub height: f32,
    /// Distance from the pen position to the left edge of the bitmap.
    pub bearing_x: f32,
    /// Distance from the baseline up to the top edge of the bitmap.
    pub bearing_y: f32,
    pub advance: f32,
}

/// 8-bit coverage bitmap of one glyph, row-major, origin at the top-left.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterizedGlyph {
    pub metrics: GlyphMetrics,
    pub width: usize,
    pub height: usize,
    pub coverage: Vec<u8>,
}

/// The font backend as seen by the layout engine.
///
/// Outline parsing and rasterization live behind this trait; the engine only
/// asks for metrics and coverage bitmaps of glyph indices at a point size.
pub trait GlyphRasterizer: Send + Sync {
    fn face_metrics(&self, point_size: f32) -> FaceMetrics;

    /// Maps a code point to a glyph index. `None` when the face has no glyph.
    fn glyph_index(&self, ch: char) -> Option<u32>;

    fn glyph_metrics(&self, glyph_index: u32, point_size: f32) -> Option<GlyphMetrics>;

    fn rasterize(&self, glyph_index: u32, point_size: f32) -> Option<RasterizedGlyph>;

    /// Horizontal kerning between two glyphs, in pixels.
    fn kerning(&self, _left: u32, _right: u32, _point_size: f32) -> Option<f32> {
        None
    }
}

/// [`GlyphRasterizer`] backed by a `fontdue` font.
pub struct FontdueRasterizer {
    font: Arc<fontdue::Font>,
}

impl FontdueRasterizer {
    pub fn new(font: Arc<fontdue::Font>) -> Self {
        Self { font }
    }

    pub fn font(&self) -> &Arc<fontdue::Font> {
        &self.font
    }

    fn glyph_top(&self, ch: char, point_size: f32) -> Option<f32> {
        let index = self.glyph_index(ch)?;
        let metrics = self.glyph_metrics(index, point_size)?;
        Some(metrics.bearing_y)
    }
}

impl GlyphRasterizer for FontdueRasterizer {
    fn face_metrics(&self, point_size: f32) -> FaceMetrics {
        let Some(line) = self.font.horizontal_line_metrics(point_size) else {
            return FaceMetrics::from_basic(point_size, point_size * 0.8, -point_size * 0.2, 0.0);
        };

        let mut metrics =
            FaceMetrics::from_basic(point_size, line.ascent, line.descent, line.line_gap);
        if let Some(cap) = self.glyph_top('H', point_size) {
            metrics.cap_line = cap;
            metrics.strikethrough_offset = cap * 0.45;
        }
        if let Some(mean) = self.glyph_top('x', point_size) {
            metrics.mean_line = mean;
        }
        if let Some(space) = self.glyph_index(' ') {
            metrics.tab_width = self.font.metrics_indexed(space as u16, point_size).advance_width;
        }
        metrics
    }

    fn glyph_index(&self, ch: char) -> Option<u32> {
        // fontdue reports index 0 (.notdef) for unmapped characters.
        match self.font.lookup_glyph_index(ch) {
            0 => None,
            index => Some(index as u32),
        }
    }

    fn glyph_metrics(&self, glyph_index: u32, point_size: f32) -> Option<GlyphMetrics> {
        let index = u16::try_from(glyph_index).ok()?;
        let m = self.font.metrics_indexed(index, point_size);
        Some(GlyphMetrics {
            width: m.width as f32,
            height: m.height as f32,
            bearing_x: m.xmin as f32,
            bearing_y: (m.ymin + m.height as i32) as f32,
            advance: m.advance_width,
        })
    }

    fn rasterize(&self, glyph_index: u32, point_size: f32) -> Option<RasterizedGlyph> {
        let index = u16::try_from(glyph_index).ok()?;
        let (m, coverage) = self.font.rasterize_indexed(index, point_size);
        Some(RasterizedGlyph {
            metrics: GlyphMetrics {
                width: m.width as f32,
                height: m.height as f32,
                bearing_x: m.xmin as f32,
                bearing_y: (m.ymin + m.height as i32) as f32,
                advance: m.advance_width,
            },
            width: m.width,
            height: m.height,
            coverage,
        })
    }

    fn kerning(&self, left: u32, right: u32, point_size: f32) -> Option<f32> {
        let left = u16::try_from(left).ok()?;
        let right = u16::try_from(right).ok()?;
        self.font.horizontal_kern_indexed(left, right, point_size)
    }
}

/// Converts a coverage bitmap into a signed distance field.
///
/// The output is `spread` pixels larger on every side. 128 marks the outline,
/// values above are inside. Distances are searched brute force within
/// `spread`, which is fine for the glyph sizes an atlas holds.
pub fn coverage_to_sdf(
    coverage: &[u8],
    width: usize,
    height: usize,
    spread: usize,
) -> (Vec<u8>, usize, usize) {
    let out_w = width + spread * 2;
    let out_h = height + spread * 2;
    let mut out = vec![0u8; out_w * out_h];
    if spread == 0 {
        for row in 0..height {
            out[row * out_w..row * out_w + width]
                .copy_from_slice(&coverage[row * width..(row + 1) * width]);
        }
        return (out, out_w, out_h);
    }

    let inside = |x: isize, y: isize| -> bool {
        if x < 0 || y < 0 || x as usize >= width || y as usize >= height {
            return false;
        }
        coverage[y as usize * width + x as usize] >= 128
    };

    let radius = spread as isize;
    for oy in 0..out_h {
        for ox in 0..out_w {
            let x = ox as isize - radius;
            let y = oy as isize - radius;
            let here = inside(x, y);

            let mut best = (spread * spread) as f32 * 2.0;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if inside(x + dx, y + dy) != here {
                        best = best.min((dx * dx + dy * dy) as f32);
                    }
                }
            }

            let distance = best.sqrt().min(spread as f32) / spread as f32;
            let signed = if here { 0.5 + distance * 0.5 } else { 0.5 - distance * 0.5 };
            out[oy * out_w + ox] = (signed * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }

    (out, out_w, out_h)
}
