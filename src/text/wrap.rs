use fxhash::FxHashSet;

use crate::{
    glyph_id::FontAssetId,
    text::{layout::HorizontalAlign, style::TextStack},
};

pub(crate) const SOFT_HYPHEN: char = '\u{00AD}';
pub(crate) const ZERO_WIDTH_SPACE: char = '\u{200B}';
pub(crate) const ELLIPSIS: char = '\u{2026}';

/// Slack allowed before a glyph counts as overflowing.
const OVERFLOW_EPSILON: f32 = 0.0001;
/// Stretching alignments may compress a line by up to this much.
const STRETCH_TOLERANCE: f32 = 1.05;

/// Characters that always end the line they are on.
pub(crate) fn is_hard_break(ch: char) -> bool {
    matches!(ch, '\n' | '\u{000B}' | '\u{2028}' | '\u{2029}')
}

/// Characters that glue their neighbours together.
pub(crate) fn is_non_breaking(ch: char) -> bool {
    matches!(
        ch,
        '\u{00A0}' | '\u{2007}' | '\u{2011}' | '\u{2060}' | '\u{202F}' | '\u{FEFF}'
    )
}

/// Characters without a glyph of their own.
pub(crate) fn is_control(ch: char) -> bool {
    is_hard_break(ch)
        || matches!(
            ch,
            '\r' | '\t'
                | ZERO_WIDTH_SPACE
                | '\u{200C}'
                | '\u{200D}'
                | '\u{2060}'
                | '\u{FEFF}'
                | SOFT_HYPHEN
        )
}

/// Whitespace that may be broken after and is never overflow-checked.
pub(crate) fn is_breaking_whitespace(ch: char) -> bool {
    (ch.is_whitespace() && !is_non_breaking(ch) && !is_hard_break(ch)) || ch == ZERO_WIDTH_SPACE
}

/// Dashes after which a line may end.
pub(crate) fn is_breaking_hyphen(ch: char) -> bool {
    matches!(ch, '-' | '\u{2010}' | '\u{2012}' | '\u{2013}' | '\u{2014}')
}

/// Scripts written without spaces, where lines may break between any two
/// characters.
pub(crate) fn is_cjk(ch: char) -> bool {
    matches!(
        ch as u32,
        0x1100..=0x11FF
            | 0x2E80..=0x2FDF
            | 0x3000..=0x303F
            | 0x3040..=0x309F
            | 0x30A0..=0x30FF
            | 0x3130..=0x318F
            | 0x31F0..=0x31FF
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xA960..=0xA97F
            | 0xAC00..=0xD7A3
            | 0xD7B0..=0xD7FF
            | 0xF900..=0xFAFF
            | 0xFE30..=0xFE4F
            | 0xFF00..=0xFFEF
            | 0x20000..=0x2FA1F
    )
}

/// Whether a line may end between `prev` and `next`, both CJK.
///
/// `leading` holds characters that may not start a line, `following` those
/// that may not end one.
pub(crate) fn can_break_between(
    prev: char,
    next: char,
    leading: &FxHashSet<char>,
    following: &FxHashSet<char>,
) -> bool {
    is_cjk(prev) && is_cjk(next) && !leading.contains(&next) && !following.contains(&prev)
}

/// Overflow test for a glyph ending at `x_end` on a line whose right edge
/// is `limit`.
pub(crate) fn exceeds(x_end: f32, limit: f32, stretch: bool) -> bool {
    let limit = if stretch { limit * STRETCH_TOLERANCE } else { limit };
    x_end > limit + OVERFLOW_EPSILON
}

/// A `<link>`/`<action>` span still waiting for its closing tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct OpenLink {
    pub tag_item: usize,
    pub first_element: usize,
}

/// The complete layout cursor.
///
/// A plain `Copy` value: saving a break candidate is an assignment, and
/// rolling back restores every stack along with the pen position. Output
/// buffers are rolled back by truncating them to the recorded counts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct WordWrapState {
    pub item_index: usize,
    pub element_count: usize,
    pub line_count: usize,
    pub link_count: usize,

    pub x: f32,
    pub page_number: usize,
    pub line_first_element: usize,
    pub line_start_x: f32,
    pub max_ascender: f32,
    pub min_descender: f32,
    pub max_cap_height: f32,
    pub max_line_gap: f32,
    pub previous_baseline: f32,
    pub previous_descender: f32,
    pub previous_line_gap: f32,
    pub first_line_on_page: bool,
    pub starts_paragraph: bool,
    /// Pen position ignoring wrapping, for the preferred width.
    pub unwrapped_x: f32,
    pub max_unwrapped_x: f32,
    pub previous_glyph: Option<(FontAssetId, u32)>,
    pub previous_character: Option<char>,
    /// Alignment the current line was started with.
    pub line_alignment: HorizontalAlign,

    pub size: TextStack<f32, 16>,
    pub baseline_offset: TextStack<f32, 16>,
    pub justification: TextStack<HorizontalAlign, 16>,
    pub rotation: TextStack<f32, 8>,
    pub scale: TextStack<f32, 8>,
    pub character_space: f32,
    pub monospace: f32,
    pub indent: f32,
    pub line_indent: f32,
    pub margin_left: f32,
    pub margin_right: f32,
    pub width_limit: Option<f32>,
    pub line_height: Option<f32>,
    pub no_break: bool,
    pub open_link: Option<OpenLink>,

    /// `element_count` of the last break applied; 0 is the text start.
    pub last_break: usize,
}

impl WordWrapState {
    pub fn new(font_size: f32, align: HorizontalAlign) -> Self {
        Self {
            item_index: 0,
            element_count: 0,
            line_count: 0,
            link_count: 0,
            x: 0.0,
            page_number: 0,
            line_first_element: 0,
            line_start_x: 0.0,
            max_ascender: f32::MIN,
            min_descender: f32::MAX,
            max_cap_height: 0.0,
            max_line_gap: 0.0,
            previous_baseline: 0.0,
            previous_descender: 0.0,
            previous_line_gap: 0.0,
            first_line_on_page: true,
            starts_paragraph: true,
            unwrapped_x: 0.0,
            max_unwrapped_x: 0.0,
            previous_glyph: None,
            previous_character: None,
            line_alignment: align,
            size: TextStack::new(font_size),
            baseline_offset: TextStack::new(0.0),
            justification: TextStack::new(align),
            rotation: TextStack::new(0.0),
            scale: TextStack::new(1.0),
            character_space: 0.0,
            monospace: 0.0,
            indent: 0.0,
            line_indent: 0.0,
            margin_left: 0.0,
            margin_right: 0.0,
            width_limit: None,
            line_height: None,
            no_break: false,
            open_link: None,
            last_break: 0,
        }
    }

    pub fn line_has_content(&self) -> bool {
        self.element_count > self.line_first_element
    }

    /// Clears the per-line accumulators for a line starting at the current
    /// element.
    pub fn begin_line(&mut self, paragraph: bool) {
        self.line_first_element = self.element_count;
        self.starts_paragraph = paragraph;
        self.line_start_x = self.margin_left
            + self.indent
            + if paragraph { self.line_indent } else { 0.0 };
        self.x = self.line_start_x;
        self.max_ascender = f32::MIN;
        self.min_descender = f32::MAX;
        self.max_cap_height = 0.0;
        self.max_line_gap = 0.0;
        self.previous_glyph = None;
        self.previous_character = None;
        self.line_alignment = self.justification.current();
    }

    pub fn include_metrics(&mut self, ascender: f32, descender: f32, cap_height: f32, gap: f32) {
        self.max_ascender = self.max_ascender.max(ascender);
        self.min_descender = self.min_descender.min(descender);
        self.max_cap_height = self.max_cap_height.max(cap_height);
        self.max_line_gap = self.max_line_gap.max(gap);
    }
}

/// What to do when the next glyph does not fit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OverflowAction {
    /// Roll back to the saved candidate and end the line there.
    BreakAtCandidate,
    /// End the line right before the current glyph.
    BreakBeforeCurrent,
    /// Place the glyph past the edge.
    Force,
}

/// Two-strike escalation.
///
/// A candidate not used before wins. Overflowing again at a break point
/// already taken wraps the word by character, breaking right before the
/// glyph. A glyph that does not fit an empty line can only overflow.
pub(crate) fn on_overflow(
    candidate: Option<&WordWrapState>,
    state: &WordWrapState,
) -> OverflowAction {
    if let Some(candidate) = candidate
        && candidate.element_count != state.last_break
        && candidate.element_count > state.line_first_element
    {
        return OverflowAction::BreakAtCandidate;
    }

    if state.line_has_content() {
        OverflowAction::BreakBeforeCurrent
    } else {
        OverflowAction::Force
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn break_classes() {
        assert!(is_breaking_whitespace(' '));
        assert!(is_breaking_whitespace(ZERO_WIDTH_SPACE));
        assert!(!is_breaking_whitespace('\u{00A0}'));
        assert!(!is_breaking_whitespace('\n'));
        assert!(is_breaking_hyphen('-'));
        assert!(!is_breaking_hyphen('\u{2011}'));
        assert!(is_hard_break('\u{2029}'));
        assert!(is_control(SOFT_HYPHEN));
    }

    #[test]
    fn cjk_pairs_respect_the_tables() {
        let leading: FxHashSet<char> = ['。'].into_iter().collect();
        let following: FxHashSet<char> = ['「'].into_iter().collect();
        assert!(can_break_between('漢', '字', &leading, &following));
        assert!(!can_break_between('字', '。', &leading, &following));
        assert!(!can_break_between('「', '字', &leading, &following));
        assert!(!can_break_between('a', '字', &leading, &following));
        assert!(is_cjk('한'));
        assert!(is_cjk('カ'));
    }

    #[test]
    fn stretching_alignments_get_tolerance() {
        assert!(!exceeds(20.0, 20.0, false));
        assert!(exceeds(20.5, 20.0, false));
        assert!(!exceeds(20.5, 20.0, true));
    }

    #[test]
    fn two_strikes_before_overflowing() {
        let mut state = WordWrapState::new(10.0, HorizontalAlign::Left);
        state.element_count = 4;

        // fresh candidate
        let mut candidate = state;
        candidate.element_count = 2;
        assert_eq!(
            on_overflow(Some(&candidate), &state),
            OverflowAction::BreakAtCandidate
        );

        // same break point again
        state.last_break = 2;
        assert_eq!(
            on_overflow(Some(&candidate), &state),
            OverflowAction::BreakBeforeCurrent
        );

        // nothing on the line: only overflow is left
        state.line_first_element = 4;
        assert_eq!(on_overflow(None, &state), OverflowAction::Force);
    }
}
