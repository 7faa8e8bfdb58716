use euclid::default::{Box2D, Point2D};

use crate::{
    atlas::GlyphRect,
    text::{
        layout::{
            DecorationKind, DecorationSpan, ElementKind, HorizontalAlign, LineInfo, TextElementInfo,
        },
        style::{Color32, FontStyles, VertexGradient},
        wrap,
    },
};

/// Pen-space geometry of an element, kept until its line has a baseline.
///
/// X is measured from the left edge of the text box, Y points up from the
/// baseline.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Placement {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    /// Italic shear of the top and bottom edges.
    pub top_shear: f32,
    pub bottom_shear: f32,
    /// Degrees, counter-clockwise.
    pub rotation: f32,
    pub has_quad: bool,
    pub ascender: f32,
    pub descender: f32,
    pub underline_offset: f32,
    pub underline_thickness: f32,
    pub strikethrough_offset: f32,
}

/// UVs of a glyph rectangle grown by `padding`, top-left origin.
pub(crate) fn glyph_uv(rect: GlyphRect, padding: f32, page_width: f32, page_height: f32) -> Box2D<f32> {
    Box2D::new(
        Point2D::new(
            (rect.x as f32 - padding) / page_width,
            (rect.y as f32 - padding) / page_height,
        ),
        Point2D::new(
            (rect.right() as f32 + padding) / page_width,
            (rect.bottom() as f32 + padding) / page_height,
        ),
    )
}

/// Per-corner colors: the gradient tinted by `color`, alpha never above the
/// color's own.
pub(crate) fn vertex_colors(color: Color32, gradient: Option<VertexGradient>) -> [Color32; 4] {
    match gradient {
        None => [color; 4],
        Some(gradient) => gradient.corners().map(|corner| {
            let tinted = corner.multiply(color);
            tinted.with_alpha(tinted.a.min(color.a))
        }),
    }
}

/// Resolves the pen-space placement against the line baseline (Y down).
pub(crate) fn place_on_baseline(element: &mut TextElementInfo, placement: &Placement, baseline: f32) {
    element.baseline = baseline;
    element.ascender = baseline - placement.ascender;
    element.descender = baseline - placement.descender;

    if !placement.has_quad {
        let origin = Point2D::new(element.origin, baseline);
        element.top_left = origin;
        element.top_right = origin;
        element.bottom_left = origin;
        element.bottom_right = origin;
        return;
    }

    let top = baseline - placement.top;
    let bottom = baseline - placement.bottom;
    let mut corners = [
        Point2D::new(placement.left + placement.bottom_shear, bottom),
        Point2D::new(placement.left + placement.top_shear, top),
        Point2D::new(placement.right + placement.top_shear, top),
        Point2D::new(placement.right + placement.bottom_shear, bottom),
    ];

    if placement.rotation != 0.0 {
        let center = Point2D::new(
            (placement.left + placement.right) * 0.5,
            (top + bottom) * 0.5,
        );
        let (sin, cos) = placement.rotation.to_radians().sin_cos();
        for corner in &mut corners {
            let (dx, dy) = (corner.x - center.x, corner.y - center.y);
            *corner = Point2D::new(center.x + dx * cos + dy * sin, center.y - dx * sin + dy * cos);
        }
    }

    let [bottom_left, top_left, top_right, bottom_right] = corners;
    element.bottom_left = bottom_left;
    element.top_left = top_left;
    element.top_right = top_right;
    element.bottom_right = bottom_right;
}

pub(crate) fn translate(element: &mut TextElementInfo, dx: f32, dy: f32) {
    element.origin += dx;
    element.baseline += dy;
    element.ascender += dy;
    element.descender += dy;
    for corner in [
        &mut element.top_left,
        &mut element.top_right,
        &mut element.bottom_left,
        &mut element.bottom_right,
    ] {
        corner.x += dx;
        corner.y += dy;
    }
}

/// Whitespace, line breaks and other elements without ink.
pub(crate) fn is_blank(element: &TextElementInfo) -> bool {
    match element.kind {
        ElementKind::Character { glyph, .. } => glyph.is_none() || element.character.is_whitespace(),
        ElementKind::Sprite { .. } => false,
    }
}

pub(crate) fn quad_bounds(element: &TextElementInfo) -> Box2D<f32> {
    Box2D::from_points([
        element.top_left,
        element.top_right,
        element.bottom_left,
        element.bottom_right,
    ])
}

pub(crate) fn union(a: Option<Box2D<f32>>, b: Box2D<f32>) -> Box2D<f32> {
    match a {
        Some(a) => a.union(&b),
        None => b,
    }
}

/// Advance-box span of the inked part of a line.
fn ink_span(elements: &[TextElementInfo]) -> Option<(f32, f32)> {
    elements
        .iter()
        .filter(|element| !is_blank(element))
        .map(|element| (element.origin, element.origin + element.x_advance))
        .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)))
}

/// Horizontal alignment of one line.
///
/// Stretching happens in logical order, right-to-left lines are then
/// mirrored inside the line area, and finally the line is shifted to its
/// alignment.
pub(crate) fn align_line(
    elements: &mut [TextElementInfo],
    line: &LineInfo,
    word_wrapping_ratio: f32,
    right_to_left: bool,
    is_last_line: bool,
) {
    let left = line.margin_left;
    let right = line.margin_right;

    let stretch = match line.alignment {
        HorizontalAlign::Flush => true,
        HorizontalAlign::Justified => !line.ends_paragraph && !is_last_line,
        _ => false,
    };
    if stretch {
        justify(elements, right - left - line.width, word_wrapping_ratio);
    }

    if right_to_left {
        for element in elements.iter_mut() {
            let mirrored = left + right - element.origin - element.x_advance;
            translate(element, mirrored - element.origin, 0.0);
        }
    }

    if ink_span(elements).is_none() {
        return;
    }
    // pen positions already start at the line start, so only the slack moves
    let slack = right - left - line.width;
    let far = if right_to_left { -slack } else { slack };
    let dx = match line.alignment {
        HorizontalAlign::Left | HorizontalAlign::Justified | HorizontalAlign::Flush => 0.0,
        HorizontalAlign::Center => far * 0.5,
        HorizontalAlign::Right => far,
        HorizontalAlign::Geometry => elements
            .iter()
            .filter(|element| !is_blank(element))
            .map(quad_bounds)
            .reduce(|a, b| a.union(&b))
            .map_or(0.0, |bounds| (left + right) * 0.5 - (bounds.min.x + bounds.max.x) * 0.5),
    };

    if dx != 0.0 {
        for element in elements.iter_mut() {
            translate(element, dx, 0.0);
        }
    }
}

/// Spreads `slack` over the gaps of a line, `ratio` of it between characters
/// and the rest after spaces.
fn justify(elements: &mut [TextElementInfo], slack: f32, ratio: f32) {
    let Some(last) = elements.iter().rposition(|element| !is_blank(element)) else {
        return;
    };
    if last == 0 {
        return;
    }

    let gap_after_space = |elements: &[TextElementInfo], index: usize| {
        elements[index - 1].character.is_whitespace()
    };
    let spaces = (1..=last)
        .filter(|&index| gap_after_space(elements, index))
        .count();
    let chars = last - spaces;

    let (per_space, per_char) = match (spaces, chars) {
        (0, _) => (0.0, slack / chars as f32),
        (_, 0) => (slack / spaces as f32, 0.0),
        _ => (
            slack * (1.0 - ratio) / spaces as f32,
            slack * ratio / chars as f32,
        ),
    };

    let mut offset = 0.0;
    for index in 1..elements.len() {
        if index <= last {
            offset += if gap_after_space(elements, index) {
                per_space
            } else {
                per_char
            };
        }
        translate(&mut elements[index], offset, 0.0);
    }
}

/// Merged underline, strikethrough and highlight runs.
pub(crate) fn decorations(
    elements: &[TextElementInfo],
    placements: &[Placement],
    lines: &[LineInfo],
) -> Vec<DecorationSpan> {
    let mut spans: Vec<DecorationSpan> = Vec::new();

    for (line_number, line) in lines.iter().enumerate() {
        if line.character_count == 0 {
            continue;
        }
        let range = line.first_character_index..=line.last_character_index;
        for kind in [
            DecorationKind::Highlight,
            DecorationKind::Underline,
            DecorationKind::Strikethrough,
        ] {
            let style = match kind {
                DecorationKind::Underline => FontStyles::UNDERLINE,
                DecorationKind::Strikethrough => FontStyles::STRIKETHROUGH,
                DecorationKind::Highlight => FontStyles::HIGHLIGHT,
            };
            let mut open: Option<DecorationSpan> = None;

            for index in range.clone() {
                let (Some(element), Some(placement)) = (elements.get(index), placements.get(index))
                else {
                    break;
                };
                let decorated = element.styles.contains(style) && is_decorated(element);
                if !decorated {
                    spans.extend(open.take());
                    continue;
                }

                let color = match kind {
                    DecorationKind::Highlight => element.highlight_color,
                    _ => element.color,
                };
                let (top, bottom) = match kind {
                    DecorationKind::Underline => {
                        let y = element.baseline - placement.underline_offset;
                        let half = placement.underline_thickness * 0.5;
                        (y - half, y + half)
                    }
                    DecorationKind::Strikethrough => {
                        let y = element.baseline - placement.strikethrough_offset;
                        let half = placement.underline_thickness * 0.5;
                        (y - half, y + half)
                    }
                    DecorationKind::Highlight => (line.ascender, line.descender),
                };
                let rect = Box2D::new(
                    Point2D::new(element.origin, top),
                    Point2D::new(element.origin + element.x_advance, bottom),
                );

                match &mut open {
                    Some(span) if span.color == color => {
                        span.rect.min.x = span.rect.min.x.min(rect.min.x);
                        span.rect.max.x = span.rect.max.x.max(rect.max.x);
                        span.rect.min.y = span.rect.min.y.min(rect.min.y);
                        span.rect.max.y = span.rect.max.y.max(rect.max.y);
                    }
                    _ => {
                        spans.extend(open.take());
                        open = Some(DecorationSpan {
                            kind,
                            line_number,
                            rect,
                            color,
                        });
                    }
                }
            }
            spans.extend(open);
        }
    }

    spans
}

/// Visible glyphs and the spaces between them.
fn is_decorated(element: &TextElementInfo) -> bool {
    element.is_visible || (element.character.is_whitespace() && !wrap::is_hard_break(element.character))
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::glyph_id::{FontAssetId, GlyphId};

    fn element(character: char, origin: f32, advance: f32) -> TextElementInfo {
        let glyph = (!character.is_whitespace())
            .then(|| GlyphId::new(FontAssetId(0), 1));
        let mut element = TextElementInfo {
            kind: ElementKind::Character {
                font_asset: FontAssetId(0),
                glyph,
                atlas_index: 0,
                is_using_alternate_typeface: false,
            },
            character,
            index: 0,
            source_index: 0,
            material_reference_index: 0,
            styles: FontStyles::empty(),
            point_size: 10.0,
            scale: 1.0,
            origin,
            x_advance: advance,
            baseline: 0.0,
            ascender: 0.0,
            descender: 0.0,
            top_left: Point2D::zero(),
            top_right: Point2D::zero(),
            bottom_left: Point2D::zero(),
            bottom_right: Point2D::zero(),
            uv: Box2D::zero(),
            color: Color32::WHITE,
            vertex_colors: [Color32::WHITE; 4],
            highlight_color: Color32::YELLOW,
            line_number: 0,
            page_number: 0,
            word_number: None,
            is_visible: !character.is_whitespace(),
        };
        let placement = Placement {
            left: origin,
            right: origin + advance,
            top: 8.0,
            bottom: 0.0,
            has_quad: !character.is_whitespace(),
            ascender: 8.0,
            descender: -2.0,
            ..Default::default()
        };
        place_on_baseline(&mut element, &placement, 10.0);
        element
    }

    fn line(elements: &[TextElementInfo], alignment: HorizontalAlign) -> LineInfo {
        let (_, end) = ink_span(elements).unwrap();
        LineInfo {
            last_character_index: elements.len() - 1,
            character_count: elements.len(),
            width: end,
            alignment,
            margin_left: 0.0,
            margin_right: 100.0,
            ..Default::default()
        }
    }

    fn text(s: &str) -> Vec<TextElementInfo> {
        s.chars()
            .enumerate()
            .map(|(i, c)| element(c, i as f32 * 5.0, 5.0))
            .collect()
    }

    #[test]
    fn baseline_placement_is_y_down() {
        let e = element('a', 2.0, 5.0);
        assert_relative_eq!(e.top_left.y, 2.0);
        assert_relative_eq!(e.bottom_left.y, 10.0);
        assert_relative_eq!(e.ascender, 2.0);
        assert_relative_eq!(e.descender, 12.0);
    }

    #[test]
    fn rotation_keeps_the_center() {
        let mut e = element('a', 0.0, 4.0);
        let placement = Placement {
            left: 0.0,
            right: 4.0,
            top: 4.0,
            bottom: 0.0,
            rotation: 90.0,
            has_quad: true,
            ..Default::default()
        };
        place_on_baseline(&mut e, &placement, 10.0);
        let bounds = quad_bounds(&e);
        assert_relative_eq!(bounds.center().x, 2.0, epsilon = 1e-4);
        assert_relative_eq!(bounds.center().y, 8.0, epsilon = 1e-4);
        // bottom-left swings to the bottom-right
        assert_relative_eq!(e.bottom_left.x, 4.0, epsilon = 1e-4);
        assert_relative_eq!(e.bottom_left.y, 10.0, epsilon = 1e-4);
    }

    #[test]
    fn center_and_right() {
        let mut elements = text("ab");
        let info = line(&elements, HorizontalAlign::Center);
        align_line(&mut elements, &info, 0.4, false, true);
        assert_relative_eq!(elements[0].origin, 45.0);

        let mut elements = text("ab ");
        let info = line(&elements, HorizontalAlign::Right);
        align_line(&mut elements, &info, 0.4, false, true);
        assert_relative_eq!(elements[1].origin + elements[1].x_advance, 100.0);
    }

    #[test]
    fn justified_lines_fill_the_width() {
        let mut elements = text("ab cd");
        let info = line(&elements, HorizontalAlign::Justified);
        align_line(&mut elements, &info, 0.4, false, false);
        assert_relative_eq!(elements[0].origin, 0.0);
        assert_relative_eq!(elements[4].origin + elements[4].x_advance, 100.0, epsilon = 1e-3);

        // last line of a paragraph stays left
        let mut elements = text("ab cd");
        let info = line(&elements, HorizontalAlign::Justified);
        align_line(&mut elements, &info, 0.4, false, true);
        assert_relative_eq!(elements[4].origin, 20.0);
    }

    #[test]
    fn right_to_left_mirrors_logical_order() {
        let mut elements = text("ab");
        let info = line(&elements, HorizontalAlign::Left);
        align_line(&mut elements, &info, 0.4, true, true);
        assert!(elements[0].origin > elements[1].origin);
        assert_relative_eq!(elements[0].origin + elements[0].x_advance, 100.0);
    }

    #[test]
    fn leading_space_is_kept() {
        let mut elements = text("  b");
        let info = line(&elements, HorizontalAlign::Left);
        align_line(&mut elements, &info, 0.4, false, true);
        assert_relative_eq!(elements[2].origin, 10.0);

        let mut elements = text("  b");
        let info = line(&elements, HorizontalAlign::Center);
        align_line(&mut elements, &info, 0.4, false, true);
        assert_relative_eq!(elements[2].origin, 52.5);

        let mut elements = text("  b");
        let info = line(&elements, HorizontalAlign::Left);
        align_line(&mut elements, &info, 0.4, true, true);
        assert_relative_eq!(elements[2].origin, 85.0);
    }

    #[test]
    fn gradient_alpha_is_clamped() {
        let gradient = VertexGradient::vertical(Color32::WHITE, Color32::RED);
        let colors = vertex_colors(Color32::WHITE.with_alpha(100), Some(gradient));
        assert_eq!(colors[1].a, 100);
        assert_eq!(colors[0].g, 0);
        assert_eq!(vertex_colors(Color32::BLUE, None), [Color32::BLUE; 4]);
    }

    #[test]
    fn uv_includes_padding() {
        let uv = glyph_uv(GlyphRect::new(10, 20, 8, 14), 2.0, 100.0, 200.0);
        assert_relative_eq!(uv.min.x, 0.08);
        assert_relative_eq!(uv.min.y, 0.09);
        assert_relative_eq!(uv.max.x, 0.2);
        assert_relative_eq!(uv.max.y, 0.18);
    }

    #[test]
    fn underlines_merge_across_spaces() {
        let mut elements = text("ab c");
        for element in &mut elements {
            element.styles = FontStyles::UNDERLINE;
        }
        let placements = vec![
            Placement {
                underline_offset: -1.0,
                underline_thickness: 1.0,
                ..Default::default()
            };
            4
        ];
        let info = line(&elements, HorizontalAlign::Left);
        let spans = decorations(&elements, &placements, &[info]);
        assert_eq!(spans.len(), 1);
        assert_relative_eq!(spans[0].rect.min.x, 0.0);
        assert_relative_eq!(spans[0].rect.max.x, 20.0);
        assert_relative_eq!(spans[0].rect.min.y, 10.5);
    }
}
