//! Online rectangle packing for glyph atlases.
//!
//! The ledger is a pair of rectangle lists: free rectangles that may receive a
//! glyph and used rectangles already holding one. A placement always lands in
//! the top-left corner of one free rectangle, which is then split (guillotine
//! style) into at most two remainders. Because remainders stay inside their
//! parent, free rectangles never overlap each other or any used rectangle.

use euclid::default::{Box2D, Point2D};

/// Integer pixel rectangle inside an atlas page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GlyphRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl GlyphRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn to_box(&self) -> Box2D<i32> {
        Box2D::new(
            Point2D::new(self.x, self.y),
            Point2D::new(self.right(), self.bottom()),
        )
    }

    /// `true` when the two rectangles share interior area.
    pub fn overlaps(&self, other: &GlyphRect) -> bool {
        !self.is_empty() && !other.is_empty() && self.to_box().intersects(&other.to_box())
    }

    pub fn contains(&self, other: &GlyphRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Grows the rectangle by `amount` on every side.
    pub fn inflate(&self, amount: i32) -> Self {
        Self::new(
            self.x - amount,
            self.y - amount,
            self.width + amount * 2,
            self.height + amount * 2,
        )
    }
}

/// Heuristic used to choose the free rectangle that receives a glyph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PackingHeuristic {
    /// Smallest leftover on the shorter side. Used for incremental adds.
    #[default]
    BestShortSideFit,
    BestLongSideFit,
    BestAreaFit,
    BottomLeft,
    /// Most edge contact with the page border and placed glyphs. Used for
    /// bulk pre-packing where tight clusters matter more than speed.
    ContactPoint,
}

/// Score of a candidate placement; lower is better.
type Score = (i64, i64);

fn score(
    heuristic: PackingHeuristic,
    free: &GlyphRect,
    width: i32,
    height: i32,
    atlas_width: i32,
    atlas_height: i32,
    used: &[GlyphRect],
) -> Score {
    let leftover_w = (free.width - width) as i64;
    let leftover_h = (free.height - height) as i64;
    match heuristic {
        PackingHeuristic::BestShortSideFit => (
            leftover_w.min(leftover_h),
            leftover_w.max(leftover_h),
        ),
        PackingHeuristic::BestLongSideFit => (
            leftover_w.max(leftover_h),
            leftover_w.min(leftover_h),
        ),
        PackingHeuristic::BestAreaFit => (
            free.area() - width as i64 * height as i64,
            leftover_w.min(leftover_h),
        ),
        PackingHeuristic::BottomLeft => ((free.y + height) as i64, free.x as i64),
        PackingHeuristic::ContactPoint => {
            let placed = GlyphRect::new(free.x, free.y, width, height);
            let contact = contact_score(&placed, atlas_width, atlas_height, used);
            (-contact, leftover_w.min(leftover_h))
        }
    }
}

fn common_interval(a_start: i32, a_end: i32, b_start: i32, b_end: i32) -> i64 {
    if a_end < b_start || b_end < a_start {
        0
    } else {
        (a_end.min(b_end) - a_start.max(b_start)) as i64
    }
}

fn contact_score(placed: &GlyphRect, atlas_width: i32, atlas_height: i32, used: &[GlyphRect]) -> i64 {
    let mut score = 0;
    if placed.x == 0 || placed.right() == atlas_width {
        score += placed.height as i64;
    }
    if placed.y == 0 || placed.bottom() == atlas_height {
        score += placed.width as i64;
    }

    for rect in used {
        if rect.x == placed.right() || rect.right() == placed.x {
            score += common_interval(rect.y, rect.bottom(), placed.y, placed.bottom());
        }
        if rect.y == placed.bottom() || rect.bottom() == placed.y {
            score += common_interval(rect.x, rect.right(), placed.x, placed.right());
        }
    }
    score
}

/// Finds the best free rectangle for a `width` x `height` placement.
fn find_position(
    heuristic: PackingHeuristic,
    width: i32,
    height: i32,
    atlas_width: i32,
    atlas_height: i32,
    free_rects: &[GlyphRect],
    used_rects: &[GlyphRect],
) -> Option<(usize, Score)> {
    free_rects
        .iter()
        .enumerate()
        .filter(|(_, free)| free.width >= width && free.height >= height)
        .map(|(index, free)| {
            (
                index,
                score(
                    heuristic,
                    free,
                    width,
                    height,
                    atlas_width,
                    atlas_height,
                    used_rects,
                ),
            )
        })
        .min_by_key(|(_, score)| *score)
}

/// Places `placed` in the top-left of `free_rects[index]` and replaces that
/// free rectangle with its (at most two) remainders.
fn split_free_rect(free_rects: &mut Vec<GlyphRect>, index: usize, placed: &GlyphRect) {
    let free = free_rects.swap_remove(index);
    let leftover_w = free.width - placed.width;
    let leftover_h = free.height - placed.height;

    // Split along the shorter leftover axis so the larger remainder stays whole.
    let (right, bottom) = if leftover_w < leftover_h {
        (
            GlyphRect::new(placed.right(), free.y, leftover_w, placed.height),
            GlyphRect::new(free.x, placed.bottom(), free.width, leftover_h),
        )
    } else {
        (
            GlyphRect::new(placed.right(), free.y, leftover_w, free.height),
            GlyphRect::new(free.x, placed.bottom(), placed.width, leftover_h),
        )
    };

    for rect in [right, bottom] {
        if !rect.is_empty() {
            free_rects.push(rect);
        }
    }
    merge_free_rects(free_rects);
}

/// Joins free rectangles that share a full edge.
fn merge_free_rects(free_rects: &mut Vec<GlyphRect>) {
    let mut merged = true;
    while merged {
        merged = false;
        'outer: for i in 0..free_rects.len() {
            for j in (i + 1)..free_rects.len() {
                let a = free_rects[i];
                let b = free_rects[j];
                let joined = if a.y == b.y && a.height == b.height && a.right() == b.x {
                    Some(GlyphRect::new(a.x, a.y, a.width + b.width, a.height))
                } else if a.y == b.y && a.height == b.height && b.right() == a.x {
                    Some(GlyphRect::new(b.x, b.y, a.width + b.width, a.height))
                } else if a.x == b.x && a.width == b.width && a.bottom() == b.y {
                    Some(GlyphRect::new(a.x, a.y, a.width, a.height + b.height))
                } else if a.x == b.x && a.width == b.width && b.bottom() == a.y {
                    Some(GlyphRect::new(b.x, b.y, a.width, a.height + b.height))
                } else {
                    None
                };

                if let Some(joined) = joined {
                    free_rects[i] = joined;
                    free_rects.swap_remove(j);
                    merged = true;
                    break 'outer;
                }
            }
        }
    }
}

/// Attempts to place one `width` x `height` bitmap with `padding` on every side.
///
/// On success the padded rectangle is appended to `used_rects` and the inner
/// (unpadded) rectangle is returned. Nothing is modified on failure; growing
/// the atlas is the caller's decision.
///
/// Zero-sized bitmaps (whitespace) succeed without consuming atlas space.
pub fn try_pack(
    width: i32,
    height: i32,
    padding: i32,
    heuristic: PackingHeuristic,
    atlas_width: i32,
    atlas_height: i32,
    free_rects: &mut Vec<GlyphRect>,
    used_rects: &mut Vec<GlyphRect>,
) -> Option<GlyphRect> {
    if width <= 0 || height <= 0 {
        return Some(GlyphRect::default());
    }

    let padded_w = width + padding * 2;
    let padded_h = height + padding * 2;
    let (index, _) = find_position(
        heuristic,
        padded_w,
        padded_h,
        atlas_width,
        atlas_height,
        free_rects,
        used_rects,
    )?;

    let free = free_rects[index];
    let placed = GlyphRect::new(free.x, free.y, padded_w, padded_h);
    split_free_rect(free_rects, index, &placed);
    used_rects.push(placed);

    Some(GlyphRect::new(
        placed.x + padding,
        placed.y + padding,
        width,
        height,
    ))
}

/// Packs several bitmaps against the same free list.
///
/// Each round places the (item, free rectangle) pair with the best score
/// among all items still waiting, which packs better than insertion order.
/// The result has one entry per input size; `None` marks an item that did not
/// fit. Items that did fit stay placed.
pub fn try_pack_batch(
    sizes: &[(i32, i32)],
    padding: i32,
    heuristic: PackingHeuristic,
    atlas_width: i32,
    atlas_height: i32,
    free_rects: &mut Vec<GlyphRect>,
    used_rects: &mut Vec<GlyphRect>,
) -> Vec<Option<GlyphRect>> {
    let mut results = vec![None; sizes.len()];
    let mut pending: Vec<usize> = Vec::with_capacity(sizes.len());

    for (item, &(width, height)) in sizes.iter().enumerate() {
        if width <= 0 || height <= 0 {
            results[item] = Some(GlyphRect::default());
        } else {
            pending.push(item);
        }
    }

    while !pending.is_empty() {
        let best = pending
            .iter()
            .enumerate()
            .filter_map(|(slot, &item)| {
                let (width, height) = sizes[item];
                find_position(
                    heuristic,
                    width + padding * 2,
                    height + padding * 2,
                    atlas_width,
                    atlas_height,
                    free_rects,
                    used_rects,
                )
                .map(|(free_index, score)| (slot, item, free_index, score))
            })
            .min_by_key(|(_, _, _, score)| *score);

        let Some((slot, item, free_index, _)) = best else {
            break;
        };

        let (width, height) = sizes[item];
        let free = free_rects[free_index];
        let placed = GlyphRect::new(free.x, free.y, width + padding * 2, height + padding * 2);
        split_free_rect(free_rects, free_index, &placed);
        used_rects.push(placed);
        results[item] = Some(GlyphRect::new(
            placed.x + padding,
            placed.y + padding,
            width,
            height,
        ));
        pending.swap_remove(slot);
    }

    results
}

/// Checks the ledger invariants: everything inside the page, no overlaps
/// between any two rectangles, and total area within the page area.
pub fn ledger_is_consistent(
    atlas_width: i32,
    atlas_height: i32,
    free_rects: &[GlyphRect],
    used_rects: &[GlyphRect],
) -> bool {
    let page = GlyphRect::new(0, 0, atlas_width, atlas_height);
    let all: Vec<&GlyphRect> = free_rects.iter().chain(used_rects.iter()).collect();

    if all.iter().any(|rect| !page.contains(rect)) {
        return false;
    }

    for (i, a) in all.iter().enumerate() {
        if all[i + 1..].iter().any(|b| a.overlaps(b)) {
            return false;
        }
    }

    let total: i64 = all.iter().map(|rect| rect.area()).sum();
    total <= page.area()
}

/// Free/used ledger of one atlas page.
#[derive(Clone, Debug)]
pub struct RectPacker {
    width: i32,
    height: i32,
    free_rects: Vec<GlyphRect>,
    used_rects: Vec<GlyphRect>,
}

impl RectPacker {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            free_rects: vec![GlyphRect::new(0, 0, width, height)],
            used_rects: Vec::new(),
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn free_rects(&self) -> &[GlyphRect] {
        &self.free_rects
    }

    pub fn used_rects(&self) -> &[GlyphRect] {
        &self.used_rects
    }

    pub fn try_pack(
        &mut self,
        width: i32,
        height: i32,
        padding: i32,
        heuristic: PackingHeuristic,
    ) -> Option<GlyphRect> {
        try_pack(
            width,
            height,
            padding,
            heuristic,
            self.width,
            self.height,
            &mut self.free_rects,
            &mut self.used_rects,
        )
    }

    pub fn try_pack_batch(
        &mut self,
        sizes: &[(i32, i32)],
        padding: i32,
        heuristic: PackingHeuristic,
    ) -> Vec<Option<GlyphRect>> {
        try_pack_batch(
            sizes,
            padding,
            heuristic,
            self.width,
            self.height,
            &mut self.free_rects,
            &mut self.used_rects,
        )
    }

    pub fn is_consistent(&self) -> bool {
        ledger_is_consistent(self.width, self.height, &self.free_rects, &self.used_rects)
    }
}
