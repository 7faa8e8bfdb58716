use super::layout::AutoSizeRange;

/// Smallest font size step the solver takes.
const MIN_STEP: f32 = 0.05;
/// The search has converged once the bracket is this narrow.
const CONVERGED_WIDTH: f32 = 0.051;
const WIDTH_ADJUSTMENT_STEP: f32 = 0.01;

/// Bisection over font size with an optional horizontal squeeze.
///
/// `lower` is the largest size known to fit and `upper` the smallest known
/// to overflow; both start at the configured limits. Every step narrows the
/// bracket by at least [`MIN_STEP`], so the search cannot oscillate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutoFit {
    pub font_size: f32,
    pub lower: f32,
    pub upper: f32,
    pub min_limit: f32,
    pub max_limit: f32,
    /// `upper` was laid out and overflowed, rather than being the limit.
    pub upper_overflowed: bool,
    /// Current squeeze, 0 to `char_width_max`.
    pub char_width_adjustment: f32,
    pub char_width_max: f32,
}

impl AutoFit {
    pub fn new(range: &AutoSizeRange, base_size: f32) -> Self {
        let min_limit = range.min_size.min(range.max_size);
        let max_limit = range.max_size.max(range.min_size);
        Self {
            font_size: base_size.clamp(min_limit, max_limit),
            lower: min_limit,
            upper: max_limit,
            min_limit,
            max_limit,
            upper_overflowed: false,
            char_width_adjustment: 0.0,
            char_width_max: (range.max_char_width_adjustment * 0.01).clamp(0.0, 0.5),
        }
    }

    pub fn is_converged(&self) -> bool {
        self.upper - self.lower <= CONVERGED_WIDTH
    }

    /// Content overflowed at the current settings. Returns `false` when
    /// nothing is left to try.
    pub fn shrink(&mut self) -> bool {
        if self.char_width_adjustment < self.char_width_max {
            self.char_width_adjustment =
                (self.char_width_adjustment + WIDTH_ADJUSTMENT_STEP).min(self.char_width_max);
            return true;
        }
        if self.font_size <= self.min_limit {
            return false;
        }

        self.upper = self.font_size;
        self.upper_overflowed = true;
        if self.is_converged() {
            // fall back to the largest size that fitted
            if self.lower < self.font_size {
                self.font_size = self.lower;
                return true;
            }
            return false;
        }

        let step = ((self.font_size - self.lower) * 0.5).max(MIN_STEP);
        let next = quantize(self.font_size - step);
        self.font_size = next.max(self.min_limit).max(self.lower);
        true
    }

    /// Content fitted. Returns `true` when a larger size is worth trying.
    pub fn grow(&mut self) -> bool {
        self.lower = self.font_size;
        if self.font_size >= self.max_limit {
            return false;
        }
        if self.is_converged() {
            if self.upper_overflowed {
                return false;
            }
            self.font_size = self.max_limit;
            return true;
        }

        let step = ((self.upper - self.font_size) * 0.5).max(MIN_STEP);
        let next = quantize(self.font_size + step).min(self.upper);
        if next <= self.font_size || (self.upper_overflowed && next >= self.upper) {
            return false;
        }
        self.font_size = next.min(self.max_limit);
        true
    }
}

/// Snaps to the 0.05 grid. Steps are at least one grid cell, so snapping
/// never cancels a step.
fn quantize(size: f32) -> f32 {
    (size * 20.0).round() / 20.0
}
