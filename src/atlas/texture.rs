use super::packer::GlyphRect;
use crate::glyph_id::FontAssetId;

/// Pixels written into one atlas page since the last flush.
///
/// The engine keeps its own CPU copy of every page; these records let the
/// caller mirror the same writes into a GPU texture.
#[derive(Clone, Debug, PartialEq)]
pub struct AtlasUpdate {
    pub font_asset: FontAssetId,
    /// Index of the atlas page in the owning font asset.
    pub texture_index: usize,
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    /// Row-major 8-bit pixels, `width * height` bytes.
    pub pixels: Vec<u8>,
}

/// CPU-side single-channel atlas page.
#[derive(Clone, Debug)]
pub struct AtlasTexture {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl AtlasTexture {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width.saturating_mul(height)],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Copies a `width` x `height` bitmap so its top-left lands at (`x`, `y`).
    ///
    /// Rows or columns falling outside the page are clipped.
    pub fn blit(&mut self, x: usize, y: usize, width: usize, height: usize, data: &[u8]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let copy_w = width.min(self.width - x);

        for row in 0..height {
            let dst_y = y + row;
            if dst_y >= self.height {
                break;
            }
            let src_start = row * width;
            let src_end = src_start + copy_w;
            if src_end > data.len() {
                break;
            }

            let dst_start = dst_y * self.width + x;
            self.pixels[dst_start..dst_start + copy_w].copy_from_slice(&data[src_start..src_end]);
        }
    }

    /// Returns a copy of the pixels covered by `rect`.
    pub fn read_rect(&self, rect: &GlyphRect) -> Vec<u8> {
        if rect.is_empty() || rect.x < 0 || rect.y < 0 {
            return Vec::new();
        }
        let (x, y) = (rect.x as usize, rect.y as usize);
        let (w, h) = (rect.width as usize, rect.height as usize);
        if x + w > self.width || y + h > self.height {
            return Vec::new();
        }

        let mut out = Vec::with_capacity(w * h);
        for row in 0..h {
            let start = (y + row) * self.width + x;
            out.extend_from_slice(&self.pixels[start..start + w]);
        }
        out
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blit_then_read_back() {
        let mut page = AtlasTexture::new(8, 8);
        page.blit(2, 3, 2, 2, &[1, 2, 3, 4]);
        assert_eq!(page.read_rect(&GlyphRect::new(2, 3, 2, 2)), vec![1, 2, 3, 4]);
        assert_eq!(page.pixels()[0], 0);
    }

    #[test]
    fn blit_clips_at_the_page_edge() {
        let mut page = AtlasTexture::new(4, 4);
        page.blit(3, 3, 2, 2, &[9, 9, 9, 9]);
        assert_eq!(page.pixels()[15], 9);
        assert_eq!(page.pixels().iter().filter(|p| **p == 9).count(), 1);
    }
}
