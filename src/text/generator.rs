use euclid::default::Box2D;
use fxhash::FxHashSet;

use crate::{
    font_storage::FontStorage,
    glyph_id::{FontAssetId, GlyphId},
    rasterizer::FaceMetrics,
    text::{
        autofit::AutoFit,
        data::TextData,
        layout::{
            ElementKind, LayoutWarning, LineInfo, LinkInfo, LinkKind, OverflowMode, PageInfo,
            TextElementInfo, TextLayout, TextLayoutConfig, VerticalAlign, WordInfo,
        },
        markup::{TagKind, TagValue, Unit},
        record::{self, Placement},
        style::{FontStyles, FontWeight},
        tokenizer::{
            self, Element, ElementGlyph, FontBinding, Item, LayoutTag, SMALL_CAPS_SCALE, Tokenized,
        },
        wrap::{self, ELLIPSIS, OpenLink, OverflowAction, SOFT_HYPHEN, WordWrapState},
    },
};

/// Upper bound on layout passes per call, retries included.
pub const MAX_LAYOUT_ITERATIONS: usize = 20;

/// Why a pass gave up before the end of the text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Retry {
    /// Content overflowed and auto-sizing may shrink it.
    Shrink,
    /// A line breaks at the soft hyphen of this item, which must show.
    HyphenRewrite(usize),
}

#[derive(Clone, Copy, Debug)]
struct PassOptions {
    shrink: bool,
    hyphen_rewrite: bool,
}

/// A saved break opportunity.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    state: WordWrapState,
    /// Item of the soft hyphen the break would follow.
    soft_hyphen: Option<usize>,
    /// Where `…` could go if the line ends here.
    ellipsis: Option<WordWrapState>,
}

/// Size-dependent measurements of one element, before it is placed.
#[derive(Clone, Copy, Debug)]
struct Measured {
    kind: ElementKind,
    point_size: f32,
    scale: f32,
    kerning: f32,
    /// Pen advance, kerning included.
    advance: f32,
    placement: Placement,
    uv: Box2D<f32>,
    cap_height: f32,
    line_gap: f32,
}

/// The layout engine.
///
/// A generator owns the scratch buffers of a layout and can be reused for
/// any number of texts, one at a time. [`FontSystem`](crate::FontSystem)
/// keeps a pool of them for callers on several threads.
#[derive(Debug, Default)]
pub struct TextGenerator {
    placements: Vec<Placement>,
    /// Soft hyphens a previous pass decided to break at.
    hyphenated: FxHashSet<usize>,
}

impl TextGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate_str(
        &mut self,
        text: &str,
        config: &TextLayoutConfig,
        storage: &mut FontStorage,
    ) -> TextLayout {
        let data = TextData::new(text, config.parse_escape_sequences);
        self.generate(&data, config, storage)
    }

    /// Lays `text` out in the box described by `config`.
    ///
    /// Never fails: problems are reported in [`TextLayout::warnings`]. Glyphs
    /// first seen here are rasterized before returning and their pixels are
    /// listed in [`TextLayout::atlas_updates`].
    pub fn generate(
        &mut self,
        text: &TextData,
        config: &TextLayoutConfig,
        storage: &mut FontStorage,
    ) -> TextLayout {
        let primary = config
            .font_asset
            .or(storage.settings().default_font_asset)
            .filter(|&id| storage.font_asset(id).is_some());
        let Some(primary) = primary else {
            log::warn!("no font asset to lay text out with");
            return TextLayout {
                font_size: config.font_size,
                warnings: vec![LayoutWarning::NoFontAsset],
                ..Default::default()
            };
        };

        let tokens = tokenizer::tokenize(text, config, primary, storage);
        if tokens.element_count() == 0 {
            let mut warnings = tokens.warnings;
            warnings.push(LayoutWarning::EmptyText);
            return TextLayout {
                font_size: config.font_size,
                material_references: tokens.material_references,
                warnings,
                atlas_updates: storage.render_pending_glyphs(),
                ..Default::default()
            };
        }

        self.hyphenated.clear();
        let mut fit = config
            .auto_size
            .map(|range| AutoFit::new(&range, config.font_size));
        let mut allow_shrink = true;
        let mut best: Option<TextLayout> = None;
        let mut result: Option<TextLayout> = None;

        for iteration in 1..=MAX_LAYOUT_ITERATIONS {
            let last = iteration == MAX_LAYOUT_ITERATIONS;
            let (font_size, char_width) =
                fit.map_or((config.font_size, 0.0), |fit| (fit.font_size, fit.char_width_adjustment));
            let options = PassOptions {
                shrink: fit.is_some() && allow_shrink && !last,
                hyphen_rewrite: !last,
            };

            let mut pass = LayoutPass::new(
                storage,
                config,
                &tokens,
                &self.hyphenated,
                &mut self.placements,
                font_size,
                char_width,
                options,
            );
            match pass.run() {
                Ok(()) => {
                    let overflowed = pass.overflowed;
                    let mut layout = pass.finish();
                    layout.iterations = iteration;

                    if overflowed && fit.is_some() {
                        if last && let Some(mut fitting) = best.take() {
                            fitting.iterations = iteration;
                            layout = fitting;
                        }
                        result = Some(layout);
                        break;
                    }
                    if let Some(fit) = fit.as_mut()
                        && allow_shrink
                        && !last
                        && fit.grow()
                    {
                        log::trace!("text fits at {font_size}, trying {}", fit.font_size);
                        best = Some(layout);
                        self.hyphenated.clear();
                        continue;
                    }
                    result = Some(layout);
                    break;
                }
                Err(Retry::Shrink) => {
                    let shrunk = fit.as_mut().is_some_and(|fit| fit.shrink());
                    if !shrunk {
                        allow_shrink = false;
                    }
                    self.hyphenated.clear();
                }
                Err(Retry::HyphenRewrite(item)) => {
                    self.hyphenated.insert(item);
                }
            }
        }

        let mut layout = result.or(best).unwrap_or_default();
        if layout.iterations >= MAX_LAYOUT_ITERATIONS {
            log::warn!("layout did not settle within {MAX_LAYOUT_ITERATIONS} passes");
            layout.warnings.push(LayoutWarning::IterationLimitReached);
        }
        layout.atlas_updates = storage.render_pending_glyphs();
        layout
    }
}

/// One attempt at laying the tokens out at a fixed font size.
struct LayoutPass<'a> {
    storage: &'a mut FontStorage,
    config: &'a TextLayoutConfig,
    tokens: &'a Tokenized,
    hyphenated: &'a FxHashSet<usize>,
    placements: &'a mut Vec<Placement>,
    options: PassOptions,
    font_size: f32,
    /// Converts absolute sizes in markup to the auto-sized scale.
    size_ratio: f32,
    char_width: f32,

    layout: TextLayout,
    state: WordWrapState,
    line_start: WordWrapState,
    candidate: Option<Candidate>,
    /// Last position on the current line where `…` still fits.
    ellipsis_line: Option<WordWrapState>,
    ellipsis_previous_line: Option<WordWrapState>,
    /// Elements past this count were hidden by truncation.
    laid_out: Option<usize>,
    stopped: bool,
    /// Content left the box with no way left to shrink.
    overflowed: bool,
}

impl<'a> LayoutPass<'a> {
    fn new(
        storage: &'a mut FontStorage,
        config: &'a TextLayoutConfig,
        tokens: &'a Tokenized,
        hyphenated: &'a FxHashSet<usize>,
        placements: &'a mut Vec<Placement>,
        font_size: f32,
        char_width: f32,
        options: PassOptions,
    ) -> Self {
        placements.clear();
        let mut state = WordWrapState::new(font_size, config.horizontal_align);
        state.margin_left = config.margins.left;
        state.margin_right = config.margins.right;
        state.begin_line(true);

        let size_ratio = if config.font_size > 0.0 {
            font_size / config.font_size
        } else {
            1.0
        };

        Self {
            storage,
            config,
            tokens,
            hyphenated,
            placements,
            options,
            font_size,
            size_ratio,
            char_width,
            layout: TextLayout {
                material_references: tokens.material_references.clone(),
                warnings: tokens.warnings.clone(),
                ..Default::default()
            },
            state,
            line_start: state,
            candidate: None,
            ellipsis_line: None,
            ellipsis_previous_line: None,
            laid_out: None,
            stopped: false,
            overflowed: false,
        }
    }

    fn run(&mut self) -> Result<(), Retry> {
        let tokens = self.tokens;
        while !self.stopped {
            let Some(item) = tokens.items.get(self.state.item_index) else {
                break;
            };
            match item {
                Item::Tag(tag) => self.apply_tag(tag)?,
                Item::Element(element) => self.place(element)?,
            }
        }

        if !self.stopped && (self.state.line_has_content() || self.layout.lines.is_empty()) {
            self.commit_line(true)?;
        }
        self.close_link();
        Ok(())
    }
}

/// Tags
impl LayoutPass<'_> {
    fn inner_width(&self) -> f32 {
        self.config
            .width
            .map_or(0.0, |width| width - self.config.margins.left - self.config.margins.right)
    }

    fn apply_tag(&mut self, tag: &LayoutTag) -> Result<(), Retry> {
        let item = self.state.item_index;
        self.state.item_index += 1;

        let em = self.state.size.current();
        let inner_width = self.inner_width();
        let length = |percent_of: f32| {
            tag.value
                .as_ref()
                .and_then(|value| value.to_pixels(em, percent_of))
        };

        let state = &mut self.state;
        match tag.kind {
            TagKind::Size => {
                if tag.closing {
                    state.size.pop();
                } else if let Some(TagValue::Number {
                    value,
                    unit,
                    relative,
                }) = tag.value
                {
                    let size = match unit {
                        Unit::Pixels if relative => em + value * self.size_ratio,
                        Unit::Pixels => value * self.size_ratio,
                        Unit::Percent => em * value * 0.01,
                        Unit::FontUnits => em * value,
                    };
                    state.size.push(size.max(0.0));
                }
            }
            TagKind::VOffset => {
                if tag.closing {
                    state.baseline_offset.pop();
                } else if let Some(offset) = length(em) {
                    state.baseline_offset.push(offset);
                }
            }
            TagKind::Pos => {
                if let Some(x) = length(inner_width) {
                    state.x = state.margin_left + x;
                }
            }
            TagKind::Space => {
                if let Some(space) = length(em) {
                    state.x += space;
                }
            }
            TagKind::MonoSpace => state.monospace = if tag.closing { 0.0 } else { length(em).unwrap_or(0.0) },
            TagKind::CharacterSpace => {
                state.character_space = if tag.closing { 0.0 } else { length(em).unwrap_or(0.0) }
            }
            TagKind::Indent => {
                state.indent = if tag.closing { 0.0 } else { length(inner_width).unwrap_or(0.0) };
                self.refresh_line_start();
            }
            TagKind::LineIndent => {
                state.line_indent = if tag.closing { 0.0 } else { length(inner_width).unwrap_or(0.0) };
                self.refresh_line_start();
            }
            TagKind::Margin | TagKind::MarginLeft | TagKind::MarginRight => {
                let margin = if tag.closing { 0.0 } else { length(inner_width).unwrap_or(0.0) };
                if tag.kind != TagKind::MarginRight {
                    state.margin_left = self.config.margins.left + margin;
                }
                if tag.kind != TagKind::MarginLeft {
                    state.margin_right = self.config.margins.right + margin;
                }
                self.refresh_line_start();
            }
            TagKind::LineHeight => state.line_height = if tag.closing { None } else { length(em) },
            TagKind::Width => state.width_limit = if tag.closing { None } else { length(inner_width) },
            TagKind::Align => {
                if tag.closing {
                    state.justification.pop();
                } else if let Some(align) = tag.align {
                    state.justification.push(align);
                }
                if !state.line_has_content() {
                    state.line_alignment = state.justification.current();
                }
            }
            TagKind::Rotate => {
                if tag.closing {
                    state.rotation.pop();
                } else if let Some(degrees) = length(0.0) {
                    state.rotation.push(degrees);
                }
            }
            TagKind::Scale => {
                if tag.closing {
                    state.scale.pop();
                } else if let Some(scale) = length(0.0) {
                    state.scale.push(scale);
                }
            }
            TagKind::NoBreak => state.no_break = !tag.closing,
            TagKind::Page => {
                if !tag.closing {
                    let new_page = self.config.overflow == OverflowMode::Page;
                    self.break_line(true, new_page)?;
                }
            }
            TagKind::Link | TagKind::Action => {
                self.close_link();
                if !tag.closing {
                    self.state.open_link = Some(OpenLink {
                        tag_item: item,
                        first_element: self.state.element_count,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Re-derives the line start after a margin or indent change, as long as
    /// nothing was placed on the line yet.
    fn refresh_line_start(&mut self) {
        if !self.state.line_has_content() {
            let paragraph = self.state.starts_paragraph;
            self.state.begin_line(paragraph);
        }
    }

    fn close_link(&mut self) {
        let Some(open) = self.state.open_link.take() else {
            return;
        };
        let tokens = self.tokens;
        let Some(Item::Tag(tag)) = tokens.items.get(open.tag_item) else {
            return;
        };
        let kind = match tag.kind {
            TagKind::Action => LinkKind::Action,
            _ => LinkKind::Link,
        };
        self.layout.links.push(LinkInfo {
            kind,
            id: tag.id.clone().unwrap_or_default(),
            first_character_index: open.first_element,
            character_count: self.state.element_count - open.first_element,
        });
        self.state.link_count = self.layout.links.len();
    }
}

/// Measurement
impl LayoutPass<'_> {
    fn face_metrics(&self, font_asset: FontAssetId, point_size: f32) -> FaceMetrics {
        match self.storage.font_asset(font_asset) {
            Some(asset) => asset.face_metrics_at(point_size),
            None => FaceMetrics::from_basic(point_size, point_size * 0.8, -point_size * 0.2, 0.0),
        }
    }

    fn element_kind(&self, element: &Element) -> ElementKind {
        match element.glyph {
            ElementGlyph::Font(binding) => {
                let glyph = self
                    .storage
                    .font_asset(binding.font_asset)
                    .and_then(|asset| asset.glyph(binding.character.glyph_index));
                ElementKind::Character {
                    font_asset: binding.font_asset,
                    glyph: glyph.map(|glyph| GlyphId::new(binding.font_asset, glyph.index)),
                    atlas_index: glyph.map_or(0, |glyph| glyph.atlas_index),
                    is_using_alternate_typeface: binding.is_using_alternate_typeface,
                }
            }
            ElementGlyph::Control => ElementKind::Character {
                font_asset: element.font_asset,
                glyph: None,
                atlas_index: 0,
                is_using_alternate_typeface: false,
            },
            ElementGlyph::Sprite {
                sprite_asset,
                index,
            } => ElementKind::Sprite {
                sprite_asset,
                sprite_index: index,
            },
        }
    }

    fn measure(&mut self, element: &Element) -> Measured {
        let size = self.state.size.current();
        let spacing = self.config.character_spacing * 0.01 * size + self.state.character_space;
        let x_scale = self.state.scale.current() * (1.0 - self.char_width);

        let face_asset = match element.glyph {
            ElementGlyph::Font(binding) => binding.font_asset,
            _ => element.font_asset,
        };
        let base = self.face_metrics(face_asset, size);
        let mut point_size = size;
        let mut offset = self.state.baseline_offset.current();
        if element.styles.contains(FontStyles::SUPERSCRIPT) {
            offset += base.superscript_offset;
            point_size *= base.superscript_size;
        } else if element.styles.contains(FontStyles::SUBSCRIPT) {
            offset += base.subscript_offset;
            point_size *= base.subscript_size;
        }
        if element.small_caps {
            point_size *= SMALL_CAPS_SCALE;
        }
        let face = self.face_metrics(face_asset, point_size);

        let mut measured = Measured {
            kind: self.element_kind(element),
            point_size,
            scale: 1.0,
            kerning: 0.0,
            advance: 0.0,
            placement: Placement {
                rotation: self.state.rotation.current(),
                ascender: face.ascent_line + offset,
                descender: face.descent_line + offset,
                underline_offset: face.underline_offset + offset,
                underline_thickness: face.underline_thickness,
                strikethrough_offset: face.strikethrough_offset + offset,
                ..Default::default()
            },
            uv: Box2D::zero(),
            cap_height: face.cap_line,
            line_gap: (face.line_height - (face.ascent_line - face.descent_line)).max(0.0),
        };

        match element.glyph {
            ElementGlyph::Control => {
                if element.character == '\t' {
                    let tab_multiple = self
                        .storage
                        .font_asset(face_asset)
                        .map_or(4.0, |asset| asset.style.tab_multiple);
                    let tab = face.tab_width * tab_multiple;
                    if tab > 0.0 {
                        let next = ((self.state.x / tab).floor() + 1.0) * tab;
                        measured.advance = next - self.state.x;
                    }
                }
            }
            ElementGlyph::Font(binding) => {
                self.measure_glyph(element, binding, offset, x_scale, spacing, &mut measured);
            }
            ElementGlyph::Sprite {
                sprite_asset,
                index,
            } => {
                let Some(sprites) = self.storage.sprite_asset(sprite_asset) else {
                    return measured;
                };
                let Some(character) = sprites.character(index) else {
                    return measured;
                };
                let Some(glyph) = sprites.glyph(character.glyph_index) else {
                    return measured;
                };
                if sprites.point_size() <= 0.0 {
                    return measured;
                }
                let scale = point_size / sprites.point_size() * glyph.scale * character.scale;
                let (atlas_width, atlas_height) = sprites.atlas_size();
                let m = glyph.metrics;

                let placement = &mut measured.placement;
                placement.left = m.bearing_x * scale * x_scale;
                placement.right = placement.left + m.width * scale * x_scale;
                placement.top = m.bearing_y * scale + offset;
                placement.bottom = placement.top - m.height * scale;
                placement.has_quad = m.width > 0.0 && m.height > 0.0;
                placement.ascender = placement.ascender.max(placement.top);
                placement.descender = placement.descender.min(placement.bottom);

                measured.scale = scale;
                measured.advance = m.advance * scale * x_scale + spacing;
                measured.uv = record::glyph_uv(
                    glyph.rect,
                    0.0,
                    atlas_width as f32,
                    atlas_height as f32,
                );
            }
        }
        measured
    }

    fn measure_glyph(
        &mut self,
        element: &Element,
        binding: FontBinding,
        offset: f32,
        x_scale: f32,
        spacing: f32,
        out: &mut Measured,
    ) {
        let material = self
            .tokens
            .material_references
            .get(element.material_reference)
            .and_then(|reference| reference.material)
            .and_then(|id| self.storage.material(id))
            .map(|material| (material.padding, material.gradient_scale));
        let previous = self.state.previous_glyph;
        let kerning = self.config.kerning;
        let monospace = self.state.monospace;
        let size = self.state.size.current();
        let word_spacing = self.config.word_spacing * 0.01 * size;

        let Some(asset) = self.storage.font_asset_mut(binding.font_asset) else {
            return;
        };
        let Some(glyph) = asset.glyph(binding.character.glyph_index).copied() else {
            return;
        };
        let settings = *asset.settings();
        let style = asset.style;
        let size_ratio = out.point_size / settings.sampling_point_size;
        let scale = size_ratio * glyph.scale * binding.character.scale;

        let synthesized = !binding.is_weight_variant;
        let bold = synthesized
            && (element.styles.contains(FontStyles::BOLD) || element.weight >= FontWeight::Bold);
        let italic = synthesized && element.styles.contains(FontStyles::ITALIC);

        if kerning
            && let Some((font, left)) = previous
            && font == binding.font_asset
        {
            out.kerning = asset.kerning(left, glyph.index) * size_ratio * x_scale;
        }

        let atlas_padding = settings.padding.max(0) as f32;
        let (material_padding, gradient_scale) =
            material.unwrap_or((atlas_padding, atlas_padding + 1.0));
        let style_padding = if bold {
            style.bold_style_padding / 4.0 * gradient_scale
        } else {
            0.0
        };
        let pad = (material_padding + style_padding).min(atlas_padding);

        let m = glyph.metrics;
        let mut advance = m.advance * scale * x_scale;
        if bold {
            advance += style.bold_spacing * 0.01 * out.point_size;
        }
        let mut shift = 0.0;
        if monospace != 0.0 {
            shift = (monospace - advance) * 0.5;
            advance = monospace;
        }
        advance += spacing;
        if wrap::is_breaking_whitespace(element.character) {
            advance += word_spacing;
        }
        out.advance = out.kerning + advance;
        out.scale = scale;

        if !glyph.is_blank() {
            let rect = glyph.rect;
            let top = (m.bearing_y + pad) * scale;
            let bottom = (m.bearing_y - rect.height as f32 - pad) * scale;
            let shear = if italic { style.italic_slant * 0.01 } else { 0.0 };

            let placement = &mut out.placement;
            placement.left = (m.bearing_x - pad) * scale * x_scale + shift;
            placement.right = placement.left + (rect.width as f32 + 2.0 * pad) * scale * x_scale;
            placement.top = top + offset;
            placement.bottom = bottom + offset;
            placement.top_shear = shear * top;
            placement.bottom_shear = shear * bottom;
            placement.has_quad = true;
            out.uv = record::glyph_uv(rect, pad, settings.width as f32, settings.height as f32);
        }
    }
}

/// Placement
impl LayoutPass<'_> {
    fn line_right(&self) -> Option<f32> {
        let box_right = self
            .config
            .width
            .map(|width| width - self.state.margin_right);
        let tag_right = self
            .state
            .width_limit
            .map(|width| self.state.margin_left + width);
        match (box_right, tag_right) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn wraps(&self) -> bool {
        self.config.word_wrap && !self.state.no_break
    }

    fn fits(&self, x_end: f32) -> bool {
        let stretch = self.state.justification.current().stretches();
        self.line_right()
            .is_none_or(|limit| !wrap::exceeds(x_end, limit, stretch))
    }

    fn save_candidate(&mut self, soft_hyphen: Option<usize>) {
        self.candidate = Some(Candidate {
            state: self.state,
            soft_hyphen,
            ellipsis: self.ellipsis_line,
        });
    }

    fn place(&mut self, element: &Element) -> Result<(), Retry> {
        let ch = element.character;
        let item = self.state.item_index;

        if ch == SOFT_HYPHEN {
            return self.place_soft_hyphen(element, item);
        }

        let measured = self.measure(element);

        if wrap::is_hard_break(ch) {
            self.push_element(element, &measured);
            self.state.item_index += 1;
            return self.break_line(ch == '\n' || ch == '\u{2029}', false);
        }

        let blank = wrap::is_breaking_whitespace(ch) || matches!(element.glyph, ElementGlyph::Control);
        if self.wraps()
            && let Some(previous) = self.state.previous_character
        {
            let settings = self.storage.settings();
            if wrap::can_break_between(
                previous,
                ch,
                &settings.leading_characters,
                &settings.following_characters,
            ) {
                self.save_candidate(None);
            }
        }

        if !blank && !self.fits(self.state.x + measured.advance) {
            if self.config.word_wrap && self.line_right().is_some() {
                let candidate = self.candidate.as_ref().map(|candidate| &candidate.state);
                match wrap::on_overflow(candidate, &self.state) {
                    OverflowAction::BreakAtCandidate => {
                        let Some(candidate) = self.candidate.take() else {
                            return Ok(());
                        };
                        if let Some(hyphen) = candidate.soft_hyphen
                            && self.options.hyphen_rewrite
                        {
                            return Err(Retry::HyphenRewrite(hyphen));
                        }
                        self.restore(candidate.state);
                        self.ellipsis_line = candidate.ellipsis;
                        return self.break_line(false, false);
                    }
                    OverflowAction::BreakBeforeCurrent => return self.break_line(false, false),
                    OverflowAction::Force => self.overflow_horizontally()?,
                }
            } else if self.config.overflow == OverflowMode::Ellipsis {
                let snapshot = self.ellipsis_line;
                return self.ellipsize(snapshot);
            } else {
                self.overflow_horizontally()?;
            }
        }

        if !blank && self.config.overflow == OverflowMode::Ellipsis {
            self.note_ellipsis_position();
        }

        self.push_element(element, &measured);
        self.state.item_index += 1;
        if self.wraps() && (wrap::is_breaking_whitespace(ch) || wrap::is_breaking_hyphen(ch)) {
            self.save_candidate(None);
        }
        Ok(())
    }

    /// Soft hyphens are invisible unless a line breaks at them.
    fn place_soft_hyphen(&mut self, element: &Element, item: usize) -> Result<(), Retry> {
        let hyphen = element.hyphen.map(|binding| Element {
            glyph: ElementGlyph::Font(binding),
            character: '-',
            ..*element
        });

        if self.hyphenated.contains(&item)
            && let Some(hyphen) = hyphen
        {
            let measured = self.measure(&hyphen);
            self.push_element(&hyphen, &measured);
            self.state.item_index += 1;
            return self.break_line(false, false);
        }

        let measured = self.measure(element);
        self.push_element(element, &measured);
        self.state.item_index += 1;

        if self.wraps()
            && let Some(hyphen) = hyphen
        {
            let advance = self.measure(&hyphen).advance;
            if self.fits(self.state.x + advance) {
                self.save_candidate(Some(item));
            }
        }
        Ok(())
    }

    fn overflow_horizontally(&mut self) -> Result<(), Retry> {
        if self.options.shrink {
            return Err(Retry::Shrink);
        }
        if self.config.auto_size.is_some() {
            self.overflowed = true;
        }
        Ok(())
    }

    /// Remembers the current position if `…` would still fit after it.
    fn note_ellipsis_position(&mut self) {
        let Some((binding, _)) = self.tokens.ellipsis else {
            return;
        };
        let sample = Element {
            glyph: ElementGlyph::Font(binding),
            character: ELLIPSIS,
            index: 0,
            source_index: 0,
            font_asset: binding.font_asset,
            styles: FontStyles::empty(),
            weight: FontWeight::Regular,
            small_caps: false,
            color: self.config.color,
            gradient: None,
            highlight: self.config.color,
            material_reference: 0,
            hyphen: None,
        };
        let advance = self.measure(&sample).advance;
        if self.fits(self.state.x + advance) {
            self.ellipsis_line = Some(self.state);
        }
    }

    fn push_element(&mut self, element: &Element, measured: &Measured) {
        let origin = self.state.x + measured.kerning;
        let mut placement = measured.placement;
        placement.left += origin;
        placement.right += origin;

        self.layout.elements.push(TextElementInfo {
            kind: measured.kind,
            character: element.character,
            index: element.index,
            source_index: element.source_index,
            material_reference_index: element.material_reference,
            styles: element.styles,
            point_size: measured.point_size,
            scale: measured.scale,
            origin,
            x_advance: measured.advance - measured.kerning,
            baseline: 0.0,
            ascender: 0.0,
            descender: 0.0,
            top_left: Default::default(),
            top_right: Default::default(),
            bottom_left: Default::default(),
            bottom_right: Default::default(),
            uv: measured.uv,
            color: element.color,
            vertex_colors: record::vertex_colors(element.color, element.gradient),
            highlight_color: element.highlight,
            line_number: self.layout.lines.len(),
            page_number: self.state.page_number,
            word_number: None,
            is_visible: placement.has_quad,
        });
        self.placements.push(placement);

        let state = &mut self.state;
        state.x += measured.advance;
        state.unwrapped_x += measured.advance;
        state.max_unwrapped_x = state.max_unwrapped_x.max(state.unwrapped_x);
        state.include_metrics(
            placement.ascender,
            placement.descender,
            measured.cap_height,
            measured.line_gap,
        );
        state.element_count = self.layout.elements.len();
        state.previous_character = Some(element.character);
        state.previous_glyph = match measured.kind {
            ElementKind::Character {
                glyph: Some(glyph), ..
            } => Some((glyph.font_asset(), glyph.glyph_index())),
            _ => None,
        };
    }

    /// Rolls every output buffer and the cursor back to `snapshot`.
    fn restore(&mut self, snapshot: WordWrapState) {
        self.state = snapshot;
        self.layout.elements.truncate(snapshot.element_count);
        self.placements.truncate(snapshot.element_count);
        self.layout.lines.truncate(snapshot.line_count);
        self.layout.links.truncate(snapshot.link_count);
    }
}

/// Lines
impl LayoutPass<'_> {
    fn break_line(&mut self, ends_paragraph: bool, new_page: bool) -> Result<(), Retry> {
        self.commit_line(ends_paragraph)?;
        if self.stopped {
            return Ok(());
        }

        let state = &mut self.state;
        if new_page {
            state.page_number += 1;
            state.first_line_on_page = true;
        }
        state.begin_line(ends_paragraph);
        if ends_paragraph {
            state.unwrapped_x = 0.0;
        }
        state.last_break = state.element_count;
        self.candidate = None;
        self.line_start = self.state;
        self.ellipsis_previous_line = self.ellipsis_line.take();
        Ok(())
    }

    fn line_metrics(&self) -> (f32, f32, f32, f32) {
        let state = &self.state;
        if state.max_ascender > state.min_descender {
            return (
                state.max_ascender,
                state.min_descender,
                state.max_cap_height,
                state.max_line_gap,
            );
        }
        let font = self
            .tokens
            .items
            .iter()
            .find_map(|item| match item {
                Item::Element(element) => Some(element.font_asset),
                Item::Tag(_) => None,
            });
        let face = font.map_or_else(
            || FaceMetrics::from_basic(self.font_size, self.font_size * 0.8, -self.font_size * 0.2, 0.0),
            |font| self.face_metrics(font, state.size.current()),
        );
        let gap = (face.line_height - (face.ascent_line - face.descent_line)).max(0.0);
        (face.ascent_line, face.descent_line, face.cap_line, gap)
    }

    /// Baseline of the current line if it is placed below the previous one.
    fn next_baseline(&self, ascender: f32) -> f32 {
        let state = &self.state;
        if state.first_line_on_page {
            return self.config.margins.top + ascender;
        }

        let size = state.size.current();
        let paragraph = if state.starts_paragraph {
            self.config.paragraph_spacing * 0.01 * size
        } else {
            0.0
        };
        match state.line_height {
            Some(height) => state.previous_baseline + height + paragraph,
            None => {
                state.previous_baseline - state.previous_descender
                    + state.previous_line_gap
                    + ascender
                    + self.config.line_spacing * 0.01 * size
                    + paragraph
            }
        }
    }

    /// Closes the current line: computes its baseline and resolves the
    /// geometry of its elements. Handles vertical overflow.
    fn commit_line(&mut self, ends_paragraph: bool) -> Result<(), Retry> {
        let (ascender, descender, cap_height, line_gap) = self.line_metrics();
        let margins = self.config.margins;
        let state = self.state;
        let mut baseline = self.next_baseline(ascender);

        let fits = self
            .config
            .height
            .is_none_or(|height| baseline - descender <= height - margins.bottom + 0.0001);
        if !fits {
            if self.options.shrink {
                return Err(Retry::Shrink);
            }
            if self.config.auto_size.is_some() {
                self.overflowed = true;
            }
            match self.config.overflow {
                OverflowMode::Page if !state.first_line_on_page => {
                    self.state.page_number += 1;
                    self.state.first_line_on_page = true;
                    baseline = margins.top + ascender;
                }
                OverflowMode::Truncate | OverflowMode::Linked => {
                    let line_start = self.line_start;
                    self.truncate_from(line_start);
                    return Ok(());
                }
                OverflowMode::Ellipsis => {
                    let snapshot = self.ellipsis_previous_line;
                    return self.ellipsize(snapshot);
                }
                _ => {}
            }
        }

        self.push_line(baseline, ascender, descender, cap_height, ends_paragraph);
        let state = &mut self.state;
        state.previous_baseline = baseline;
        state.previous_descender = descender;
        state.previous_line_gap = line_gap;
        state.first_line_on_page = false;
        Ok(())
    }

    fn push_line(
        &mut self,
        baseline: f32,
        ascender: f32,
        descender: f32,
        cap_height: f32,
        ends_paragraph: bool,
    ) {
        let first = self.state.line_first_element;
        let end = self.state.element_count;
        let line_number = self.layout.lines.len();
        let page_number = self.state.page_number;

        for index in first..end {
            let element = &mut self.layout.elements[index];
            record::place_on_baseline(element, &self.placements[index], baseline);
            element.line_number = line_number;
            element.page_number = page_number;
        }

        let line_start = self.state.line_start_x;
        let ink_end = self.layout.elements[first..end]
            .iter()
            .filter(|element| !record::is_blank(element))
            .map(|element| element.origin + element.x_advance)
            .reduce(f32::max);
        let right = self.line_right().unwrap_or(f32::INFINITY);

        self.layout.lines.push(LineInfo {
            first_character_index: first,
            last_character_index: end.saturating_sub(1).max(first),
            character_count: end - first,
            ascender: baseline - ascender,
            descender: baseline - descender,
            baseline,
            cap_height,
            width: ink_end.map_or(0.0, |end| end - line_start),
            max_width: right - line_start,
            alignment: self.state.line_alignment,
            margin_left: line_start,
            margin_right: right,
            page_number,
            ends_paragraph,
            ..Default::default()
        });
        self.state.line_count = self.layout.lines.len();
    }

    /// Stops the pass at `snapshot`; everything after it is kept hidden.
    fn truncate_from(&mut self, snapshot: WordWrapState) {
        self.restore(snapshot);
        self.layout.is_truncated = true;
        if self.config.overflow == OverflowMode::Linked {
            self.layout.first_overflow_character_index = Some(self.layout.elements.len());
        }
        self.hide_rest(snapshot.item_index);
    }

    /// Ends the text with `…` at `snapshot`.
    fn ellipsize(&mut self, snapshot: Option<WordWrapState>) -> Result<(), Retry> {
        let Some((binding, reference)) = self.tokens.ellipsis else {
            log::warn!("ellipsis glyph unavailable, truncating instead");
            self.layout.warnings.push(LayoutWarning::EllipsisUnavailable);
            let line_start = self.line_start;
            self.truncate_from(line_start);
            return Ok(());
        };
        let Some(snapshot) = snapshot else {
            let line_start = self.line_start;
            self.truncate_from(line_start);
            return Ok(());
        };

        self.restore(snapshot);
        let tokens = self.tokens;
        // the ellipsis takes the style of the character it replaces
        let Some(Item::Element(template)) = tokens.items.get(snapshot.item_index) else {
            self.truncate_from(snapshot);
            return Ok(());
        };
        let ellipsis = Element {
            glyph: ElementGlyph::Font(binding),
            character: ELLIPSIS,
            material_reference: reference,
            hyphen: None,
            ..*template
        };
        let measured = self.measure(&ellipsis);
        self.push_element(&ellipsis, &measured);

        let (ascender, descender, cap_height, _) = self.line_metrics();
        let baseline = self.next_baseline(ascender);
        self.push_line(baseline, ascender, descender, cap_height, true);
        self.layout.is_truncated = true;
        self.hide_rest(snapshot.item_index);
        Ok(())
    }

    /// Appends every element from `item` on as hidden and stops the pass.
    fn hide_rest(&mut self, item: usize) {
        self.laid_out = Some(self.layout.elements.len());
        self.stopped = true;

        let tokens = self.tokens;
        let line_number = self.layout.lines.len().saturating_sub(1);
        for element in tokens.items[item.min(tokens.items.len())..]
            .iter()
            .filter_map(|item| match item {
                Item::Element(element) => Some(element),
                Item::Tag(_) => None,
            })
        {
            let kind = self.element_kind(element);
            self.layout.elements.push(TextElementInfo {
                kind,
                character: element.character,
                index: element.index,
                source_index: element.source_index,
                material_reference_index: element.material_reference,
                styles: element.styles,
                point_size: self.font_size,
                scale: 0.0,
                origin: 0.0,
                x_advance: 0.0,
                baseline: 0.0,
                ascender: 0.0,
                descender: 0.0,
                top_left: Default::default(),
                top_right: Default::default(),
                bottom_left: Default::default(),
                bottom_right: Default::default(),
                uv: Box2D::zero(),
                color: element.color,
                vertex_colors: record::vertex_colors(element.color, element.gradient),
                highlight_color: element.highlight,
                line_number,
                page_number: self.state.page_number,
                word_number: None,
                is_visible: false,
            });
            self.placements.push(Placement::default());
        }
        self.state.element_count = self.layout.elements.len();
    }
}

/// Finalization
impl LayoutPass<'_> {
    fn finish(self) -> TextLayout {
        let config = self.config;
        let margins = config.margins;
        let mut layout = self.layout;
        let laid_out = self.laid_out.unwrap_or(layout.elements.len());

        // unbounded lines align inside the widest one
        let widest = layout
            .lines
            .iter()
            .map(|line| line.margin_left + line.width)
            .fold(margins.left, f32::max);
        for line in &mut layout.lines {
            if line.margin_right.is_infinite() {
                line.margin_right = widest;
                line.max_width = widest - line.margin_left;
            }
        }

        let last_line = layout.lines.len().saturating_sub(1);
        for (index, line) in layout.lines.iter().enumerate() {
            if line.character_count == 0 {
                continue;
            }
            let range = line.first_character_index..=line.last_character_index;
            record::align_line(
                &mut layout.elements[range],
                line,
                config.word_wrapping_ratio,
                config.right_to_left,
                index == last_line,
            );
        }

        layout.preferred_width = self.state.max_unwrapped_x + margins.left + margins.right;
        layout.preferred_height = layout
            .lines
            .iter()
            .map(|line| line.descender)
            .fold(margins.top, f32::max)
            + margins.bottom;

        align_vertically(&mut layout, config);
        assign_words(&mut layout, laid_out);
        apply_visibility(&mut layout, config, laid_out);
        layout.decorations =
            record::decorations(&layout.elements, self.placements.as_slice(), &layout.lines);
        summarize(&mut layout, laid_out);

        layout.font_size = self.font_size;
        layout.char_width_adjustment = self.char_width;
        layout
    }
}

fn page_ranges(lines: &[LineInfo]) -> Vec<std::ops::Range<usize>> {
    let mut pages: Vec<std::ops::Range<usize>> = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        match pages.last_mut() {
            Some(page) if lines[page.start].page_number == line.page_number => page.end = index + 1,
            _ => pages.push(index..index + 1),
        }
    }
    pages
}

fn align_vertically(layout: &mut TextLayout, config: &TextLayoutConfig) {
    let margins = config.margins;
    for page in page_ranges(&layout.lines) {
        let first = &layout.lines[page.start];
        let last = &layout.lines[page.end - 1];
        let top = first.ascender;
        let bottom = last.descender;
        let inner_height = config
            .height
            .map_or(bottom - top, |height| height - margins.top - margins.bottom);
        let center = margins.top + inner_height * 0.5;

        let elements = first.first_character_index..=last.last_character_index;
        let dy = match config.vertical_align {
            VerticalAlign::Top => 0.0,
            VerticalAlign::Middle => margins.top + (inner_height - (bottom - top)) * 0.5 - top,
            VerticalAlign::Bottom => margins.top + inner_height - bottom,
            VerticalAlign::Baseline => margins.top - first.baseline,
            VerticalAlign::Midline => {
                let bounds = layout.elements[elements.clone()]
                    .iter()
                    .filter(|element| !record::is_blank(element))
                    .map(record::quad_bounds)
                    .reduce(|a, b| a.union(&b));
                bounds.map_or(0.0, |bounds| center - (bounds.min.y + bounds.max.y) * 0.5)
            }
            VerticalAlign::Capline => center - (first.baseline - first.cap_height * 0.5),
        };
        if dy == 0.0 {
            continue;
        }

        for element in &mut layout.elements[elements] {
            record::translate(element, 0.0, dy);
        }
        for line in &mut layout.lines[page] {
            line.baseline += dy;
            line.ascender += dy;
            line.descender += dy;
        }
    }
}

fn is_word_character(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '-' | '\'' | '\u{2019}' | SOFT_HYPHEN)
}

fn assign_words(layout: &mut TextLayout, laid_out: usize) {
    let mut open: Option<WordInfo> = None;
    let mut previous_line = 0;
    for index in 0..laid_out {
        let element = &layout.elements[index];
        let continues = is_word_character(element.character) || element.is_sprite();
        if open.is_some() && (!continues || element.line_number != previous_line) {
            layout.words.extend(open.take());
        }
        previous_line = element.line_number;
        if !continues {
            continue;
        }

        let word = open.get_or_insert(WordInfo {
            first_character_index: index,
            last_character_index: index,
            character_count: 0,
        });
        word.last_character_index = index;
        word.character_count += 1;
        layout.elements[index].word_number = Some(layout.words.len());
    }
    layout.words.extend(open);
}

fn apply_visibility(layout: &mut TextLayout, config: &TextLayoutConfig, laid_out: usize) {
    for (index, element) in layout.elements.iter_mut().enumerate() {
        if index >= laid_out {
            element.is_visible = false;
            continue;
        }
        // set from the quad when the element was placed
        let has_ink = element.is_visible && !record::is_blank(element);
        let on_page =
            config.overflow != OverflowMode::Page || element.page_number == config.page_to_display;
        let within_limits = config.max_visible_characters.is_none_or(|max| index < max)
            && config
                .max_visible_lines
                .is_none_or(|max| element.line_number < max)
            && config
                .max_visible_words
                .is_none_or(|max| element.word_number.is_none_or(|word| word < max));
        element.is_visible = has_ink && on_page && within_limits;
    }
}

fn summarize(layout: &mut TextLayout, laid_out: usize) {
    let mut mesh: Option<Box2D<f32>> = None;
    for reference in &mut layout.material_references {
        reference.reference_count = 0;
    }

    for line in &mut layout.lines {
        if line.character_count == 0 {
            continue;
        }
        let mut extents: Option<Box2D<f32>> = None;
        let mut words = FxHashSet::default();
        for index in line.first_character_index..=line.last_character_index {
            let element = &layout.elements[index];
            if wrap::is_breaking_whitespace(element.character) {
                line.space_count += 1;
            }
            if let Some(word) = element.word_number {
                words.insert(word);
            }
            if !element.is_visible {
                continue;
            }
            line.visible_character_count += 1;
            line.first_visible_character_index.get_or_insert(index);
            line.last_visible_character_index = Some(index);
            extents = Some(record::union(extents, record::quad_bounds(element)));
        }
        line.word_count = words.len();
        if let Some(extents) = extents {
            line.extents = extents;
            mesh = Some(record::union(mesh, extents));
        }
    }

    for element in &layout.elements {
        if element.is_visible
            && let Some(reference) = layout
                .material_references
                .get_mut(element.material_reference_index)
        {
            reference.reference_count += 1;
        }
    }

    layout.pages = page_ranges(&layout.lines)
        .into_iter()
        .map(|page| {
            let first = &layout.lines[page.start];
            let last = &layout.lines[page.end - 1];
            PageInfo {
                first_character_index: first.first_character_index,
                last_character_index: last.last_character_index,
                ascender: first.ascender,
                descender: last.descender,
            }
        })
        .collect();

    layout.mesh_extents = mesh.unwrap_or_else(Box2D::zero);
    layout.character_count = layout.elements.len();
    layout.visible_character_count = layout
        .elements
        .iter()
        .filter(|element| element.is_visible)
        .count();
    layout.sprite_count = layout.elements[..laid_out]
        .iter()
        .filter(|element| element.is_sprite())
        .count();
    layout.space_count = layout.elements[..laid_out]
        .iter()
        .filter(|element| wrap::is_breaking_whitespace(element.character))
        .count();
    layout.word_count = layout.words.len();
    layout.line_count = layout.lines.len();
    layout.page_count = layout.pages.len();
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        asset::SpriteAsset,
        atlas::GlyphRect,
        rasterizer::GlyphMetrics,
        testing::{BoxRasterizer, storage_with_font, storage_with_rasterizer},
        text::{
            layout::{AutoSizeRange, DecorationKind, HorizontalAlign, Margins},
            style::Color32,
        },
    };

    fn config(font: FontAssetId) -> TextLayoutConfig {
        TextLayoutConfig {
            font_asset: Some(font),
            font_size: 10.0,
            ..Default::default()
        }
    }

    fn boxed(font: FontAssetId, width: f32, height: Option<f32>) -> TextLayoutConfig {
        TextLayoutConfig {
            width: Some(width),
            height,
            ..config(font)
        }
    }

    fn run(storage: &mut FontStorage, text: &str, config: &TextLayoutConfig) -> TextLayout {
        TextGenerator::new().generate_str(text, config, storage)
    }

    fn line_text(layout: &TextLayout, line: usize) -> String {
        let line = &layout.lines[line];
        layout.elements[line.first_character_index..=line.last_character_index]
            .iter()
            .map(|element| element.character)
            .collect()
    }

    fn visible_text(layout: &TextLayout) -> String {
        layout
            .elements
            .iter()
            .filter(|element| element.is_visible)
            .map(|element| element.character)
            .collect()
    }

    #[test]
    fn single_word_on_one_line() {
        let (mut storage, font) = storage_with_font("Helo");
        let config = TextLayoutConfig {
            font_size: 24.0,
            ..config(font)
        };
        let layout = run(&mut storage, "Hello", &config);
        assert_eq!(layout.visible_character_count, 5);
        assert_eq!(layout.lines.len(), 1);
        assert_eq!(layout.lines[0].character_count, 5);
        assert_relative_eq!(layout.elements[1].origin - layout.elements[0].origin, 12.0);
        assert!(layout.warnings.is_empty());
        assert_eq!(layout.iterations, 1);
    }

    #[test]
    fn bold_covers_the_tagged_word_only() {
        let (mut storage, font) = storage_with_font("Helo Wrd");
        let layout = run(&mut storage, "Hello <b>World</b>", &config(font));
        assert_eq!(layout.character_count, 11);
        for element in &layout.elements[..6] {
            assert!(!element.styles.contains(FontStyles::BOLD));
        }
        for element in &layout.elements[6..] {
            assert!(element.styles.contains(FontStyles::BOLD));
        }
        // synthesized bold is wider
        assert!(layout.elements[7].x_advance > layout.elements[1].x_advance);
    }

    #[test]
    fn wraps_at_the_space() {
        let (mut storage, font) = storage_with_font("ab");
        let layout = run(&mut storage, "aaaa bbbb", &boxed(font, 20.0, None));
        assert_eq!(layout.lines.len(), 2);
        assert_eq!(line_text(&layout, 0), "aaaa ");
        assert_eq!(line_text(&layout, 1), "bbbb");
        assert_relative_eq!(layout.lines[0].baseline, 8.0);
        assert_relative_eq!(layout.lines[1].baseline, 18.0);
        assert_relative_eq!(layout.lines[0].width, 20.0);
        assert_relative_eq!(layout.preferred_width, 45.0);
    }

    #[test]
    fn color_tag_sets_vertex_colors() {
        let (mut storage, font) = storage_with_font("XY");
        let layout = run(&mut storage, "<color=#FF0000>X</color>Y", &config(font));
        assert_eq!(layout.elements[0].vertex_colors, [Color32::RED; 4]);
        assert_eq!(layout.elements[1].color, Color32::WHITE);
    }

    #[test]
    fn missing_glyphs_are_substituted_once() {
        let (mut storage, font) = storage_with_font("a\u{25A1}");
        let layout = run(&mut storage, "a\u{20AC}\u{20AC}", &config(font));
        assert_eq!(layout.elements[1].character, '\u{25A1}');
        let missing = layout
            .warnings
            .iter()
            .filter(|warning| matches!(warning, LayoutWarning::MissingGlyph { .. }))
            .count();
        assert_eq!(missing, 1);
    }

    #[test]
    fn quad_geometry() {
        let (mut storage, font) = storage_with_font("a");
        let layout = run(&mut storage, "a", &config(font));
        let a = &layout.elements[0];
        // 8x14 box at 20 px with 2 px padding, drawn at half scale
        assert_relative_eq!(a.top_left.x, -0.5);
        assert_relative_eq!(a.top_left.y, 0.0);
        assert_relative_eq!(a.bottom_right.x, 5.5);
        assert_relative_eq!(a.bottom_right.y, 9.0);
        assert_relative_eq!(a.baseline, 8.0);
        assert_relative_eq!(a.scale, 0.5);
        assert!(a.uv.max.x > a.uv.min.x);
        assert_relative_eq!(layout.mesh_extents.max.x, 5.5);
    }

    #[test]
    fn no_word_is_split_while_a_space_was_available() {
        let (mut storage, font) = storage_with_font("abcdefgh");
        let text = "aa bbb c dddd ee fff gggg h";
        for width in (20..=60).step_by(5) {
            let layout = run(&mut storage, text, &boxed(font, width as f32, None));
            for (index, line) in layout.lines.iter().enumerate().take(layout.lines.len() - 1) {
                let last = &layout.elements[line.last_character_index];
                let next = &layout.elements[line.last_character_index + 1];
                assert!(
                    last.character.is_whitespace() || next.character.is_whitespace(),
                    "width {width}, line {index}: {:?}",
                    line_text(&layout, index)
                );
            }
        }
    }

    #[test]
    fn long_words_wrap_by_character() {
        let (mut storage, font) = storage_with_font("a");
        let layout = run(&mut storage, "aaaaaaaaaa", &boxed(font, 20.0, None));
        let counts: Vec<usize> = layout.lines.iter().map(|line| line.character_count).collect();
        assert_eq!(counts, vec![4, 4, 2]);
    }

    #[test]
    fn cjk_breaks_between_ideographs_but_not_before_closing_marks() {
        let (mut storage, font) = storage_with_font("\u{6F22}\u{5B57}\u{3002}");
        let layout = run(&mut storage, "\u{6F22}\u{5B57}\u{6F22}\u{5B57}", &boxed(font, 10.0, None));
        assert_eq!(layout.lines.len(), 2);

        let layout = run(&mut storage, "\u{6F22}\u{5B57}\u{3002}", &boxed(font, 10.0, None));
        assert_eq!(line_text(&layout, 0), "\u{6F22}");
        assert_eq!(line_text(&layout, 1), "\u{5B57}\u{3002}");
    }

    #[test]
    fn hard_breaks_and_paragraph_spacing() {
        let (mut storage, font) = storage_with_font("abcd");
        let layout = run(&mut storage, "ab\ncd", &config(font));
        assert_eq!(layout.lines.len(), 2);
        assert!(layout.lines[0].ends_paragraph);
        assert_relative_eq!(layout.lines[1].baseline, 18.0);

        let spaced = TextLayoutConfig {
            paragraph_spacing: 100.0,
            line_spacing: 50.0,
            ..config(font)
        };
        let layout = run(&mut storage, "ab\ncd", &spaced);
        assert_relative_eq!(layout.lines[1].baseline, 33.0);
    }

    #[test]
    fn truncate_hides_lines_that_do_not_fit() {
        let (mut storage, font) = storage_with_font("ab");
        let config = TextLayoutConfig {
            overflow: OverflowMode::Truncate,
            ..boxed(font, 20.0, Some(10.0))
        };
        let layout = run(&mut storage, "aaaa bbbb", &config);
        assert!(layout.is_truncated);
        assert_eq!(layout.lines.len(), 1);
        assert_eq!(layout.character_count, 9);
        assert_eq!(visible_text(&layout), "aaaa");
        assert_eq!(layout.first_overflow_character_index, None);
    }

    #[test]
    fn linked_reports_the_first_overflowing_character() {
        let (mut storage, font) = storage_with_font("ab");
        let config = TextLayoutConfig {
            overflow: OverflowMode::Linked,
            ..boxed(font, 20.0, Some(10.0))
        };
        let layout = run(&mut storage, "aaaa bbbb", &config);
        assert_eq!(layout.first_overflow_character_index, Some(5));
    }

    #[test]
    fn ellipsis_replaces_the_tail() {
        let (mut storage, font) = storage_with_font("abc\u{2026}");
        let config = TextLayoutConfig {
            overflow: OverflowMode::Ellipsis,
            ..boxed(font, 20.0, Some(10.0))
        };
        let layout = run(&mut storage, "aaaa bbbb cccc", &config);
        assert!(layout.is_truncated);
        assert_eq!(layout.lines.len(), 1);
        assert_eq!(visible_text(&layout), "aaa\u{2026}");
        assert!(layout.warnings.is_empty());
    }

    #[test]
    fn ellipsis_without_a_glyph_truncates() {
        let (mut storage, font) = storage_with_font("ab");
        let config = TextLayoutConfig {
            overflow: OverflowMode::Ellipsis,
            ..boxed(font, 20.0, Some(10.0))
        };
        let layout = run(&mut storage, "aaaa bbbb", &config);
        assert!(layout.is_truncated);
        assert_eq!(visible_text(&layout), "aaaa");
        assert!(layout.warnings.contains(&LayoutWarning::EllipsisUnavailable));
    }

    #[test]
    fn pages_split_overflowing_lines() {
        let (mut storage, font) = storage_with_font("ab");
        let mut config = TextLayoutConfig {
            overflow: OverflowMode::Page,
            ..boxed(font, 20.0, Some(10.0))
        };
        let layout = run(&mut storage, "aaaa bbbb", &config);
        assert_eq!(layout.page_count, 2);
        assert_eq!(layout.lines[1].page_number, 1);
        assert_relative_eq!(layout.lines[1].baseline, 8.0);
        assert_eq!(visible_text(&layout), "aaaa");

        config.page_to_display = 1;
        let layout = run(&mut storage, "aaaa bbbb", &config);
        assert_eq!(visible_text(&layout), "bbbb");
    }

    #[test]
    fn auto_size_converges_on_the_largest_fitting_size() {
        let (mut storage, font) = storage_with_font("a");
        let config = TextLayoutConfig {
            font_size: 36.0,
            auto_size: Some(AutoSizeRange {
                min_size: 5.0,
                max_size: 40.0,
                max_char_width_adjustment: 0.0,
            }),
            ..boxed(font, 20.0, Some(10.0))
        };
        let layout = run(&mut storage, "aaaa", &config);
        assert!(layout.iterations <= MAX_LAYOUT_ITERATIONS);
        assert!(layout.font_size <= 10.0 + 1e-4, "{}", layout.font_size);
        assert!(layout.font_size >= 9.5, "{}", layout.font_size);
        assert_eq!(layout.lines.len(), 1);
        assert!(!layout.warnings.contains(&LayoutWarning::IterationLimitReached));
    }

    #[test]
    fn auto_size_stops_at_the_minimum() {
        let (mut storage, font) = storage_with_font("a");
        let config = TextLayoutConfig {
            auto_size: Some(AutoSizeRange {
                min_size: 20.0,
                max_size: 40.0,
                max_char_width_adjustment: 0.0,
            }),
            ..boxed(font, 20.0, Some(10.0))
        };
        let layout = run(&mut storage, "aaaa", &config);
        assert_relative_eq!(layout.font_size, 20.0);
        assert!(layout.iterations <= MAX_LAYOUT_ITERATIONS);
    }

    #[test]
    fn soft_hyphen_shows_where_the_line_breaks() {
        let (mut storage, font) = storage_with_font("ab-");
        let layout = run(&mut storage, "aaa\u{00AD}bbb", &boxed(font, 20.0, None));
        assert_eq!(layout.lines.len(), 2);
        assert_eq!(line_text(&layout, 0), "aaa-");
        assert_eq!(line_text(&layout, 1), "bbb");
        assert_eq!(layout.iterations, 2);

        // no break, no hyphen
        let layout = run(&mut storage, "aaa\u{00AD}bbb", &config(font));
        assert_eq!(layout.lines.len(), 1);
        assert_eq!(visible_text(&layout), "aaabbb");
    }

    #[test]
    fn horizontal_alignment() {
        let (mut storage, font) = storage_with_font("ab");
        let config = TextLayoutConfig {
            horizontal_align: HorizontalAlign::Center,
            ..boxed(font, 100.0, None)
        };
        let layout = run(&mut storage, "ab", &config);
        assert_relative_eq!(layout.elements[0].origin, 45.0);

        let config = TextLayoutConfig {
            right_to_left: true,
            ..boxed(font, 100.0, None)
        };
        let layout = run(&mut storage, "ab", &config);
        assert!(layout.elements[0].origin > layout.elements[1].origin);
        assert_relative_eq!(layout.elements[0].origin + layout.elements[0].x_advance, 100.0);
    }

    #[test]
    fn align_tag_overrides_the_line() {
        let (mut storage, font) = storage_with_font("<>=abcdefghijklmnopqrstuvwxyz/");
        let layout = run(&mut storage, "a\n<align=right>b", &boxed(font, 100.0, None));
        assert_eq!(layout.lines[1].alignment, HorizontalAlign::Right);
        assert_relative_eq!(layout.elements[0].origin, 0.0);
        assert_relative_eq!(layout.elements[2].origin, 95.0);
    }

    #[test]
    fn vertical_alignment() {
        let (mut storage, font) = storage_with_font("a");
        let middle = TextLayoutConfig {
            vertical_align: VerticalAlign::Middle,
            ..boxed(font, 100.0, Some(100.0))
        };
        assert_relative_eq!(run(&mut storage, "a", &middle).lines[0].baseline, 53.0);

        let bottom = TextLayoutConfig {
            vertical_align: VerticalAlign::Bottom,
            ..middle.clone()
        };
        let layout = run(&mut storage, "a", &bottom);
        assert_relative_eq!(layout.lines[0].baseline, 98.0);
        assert_relative_eq!(layout.elements[0].baseline, 98.0);
    }

    #[test]
    fn margins_offset_the_text() {
        let (mut storage, font) = storage_with_font("ab");
        let config = TextLayoutConfig {
            margins: Margins {
                left: 3.0,
                top: 4.0,
                right: 2.0,
                bottom: 1.0,
            },
            ..config(font)
        };
        let layout = run(&mut storage, "ab", &config);
        assert_relative_eq!(layout.elements[0].origin, 3.0);
        assert_relative_eq!(layout.lines[0].baseline, 12.0);
        assert_relative_eq!(layout.preferred_width, 15.0);
        assert_relative_eq!(layout.preferred_height, 15.0);
    }

    #[test]
    fn links_record_their_span() {
        let (mut storage, font) = storage_with_font("<>=\"/abcdehikmnlo");
        let layout = run(&mut storage, "<link=\"home\">ab</link>c", &config(font));
        assert_eq!(
            layout.links,
            vec![LinkInfo {
                kind: LinkKind::Link,
                id: "home".into(),
                first_character_index: 0,
                character_count: 2,
            }]
        );
    }

    #[test]
    fn visibility_limits() {
        let (mut storage, font) = storage_with_font("abcd");
        let limited = TextLayoutConfig {
            max_visible_characters: Some(2),
            ..config(font)
        };
        assert_eq!(visible_text(&run(&mut storage, "abcd", &limited)), "ab");

        let words = TextLayoutConfig {
            max_visible_words: Some(1),
            ..config(font)
        };
        assert_eq!(visible_text(&run(&mut storage, "ab cd", &words)), "ab");

        let lines = TextLayoutConfig {
            max_visible_lines: Some(1),
            ..config(font)
        };
        assert_eq!(visible_text(&run(&mut storage, "ab\ncd", &lines)), "ab");
    }

    #[test]
    fn words_and_counts() {
        let (mut storage, font) = storage_with_font("abcdef-");
        let layout = run(&mut storage, "ab cd-ef", &config(font));
        assert_eq!(layout.word_count, 2);
        assert_eq!(layout.words[1].character_count, 5);
        assert_eq!(layout.elements[2].word_number, None);
        assert_eq!(layout.space_count, 1);
        assert_eq!(layout.lines[0].word_count, 2);
        assert_eq!(layout.material_references[0].reference_count, 7);
    }

    #[test]
    fn underline_spans_merge() {
        let (mut storage, font) = storage_with_font("<>/abcu");
        let layout = run(&mut storage, "<u>ab</u> c", &config(font));
        assert_eq!(layout.decorations.len(), 1);
        let span = layout.decorations[0];
        assert_eq!(span.kind, DecorationKind::Underline);
        assert_relative_eq!(span.rect.min.x, 0.0);
        assert_relative_eq!(span.rect.max.x, 10.0);
    }

    #[test]
    fn spacing_tags() {
        let (mut storage, font) = storage_with_font("<>=%/abcdeimopsx");
        let layout = run(&mut storage, "a\tb", &config(font));
        assert_relative_eq!(layout.elements[2].origin, 20.0);

        let layout = run(&mut storage, "<mspace=10>ab</mspace>", &config(font));
        assert_relative_eq!(layout.elements[1].origin, 10.0);

        let layout = run(&mut storage, "a<pos=50%>b", &boxed(font, 100.0, None));
        assert_relative_eq!(layout.elements[1].origin, 50.0);

        let layout = run(&mut storage, "<size=20>a</size>b", &config(font));
        assert_relative_eq!(layout.elements[0].point_size, 20.0);
        assert_relative_eq!(layout.elements[1].point_size, 10.0);
    }

    #[test]
    fn script_tags_shrink_and_shift() {
        let (mut storage, font) = storage_with_font("<>/supbx");
        let layout = run(&mut storage, "x<sup>x</sup>", &config(font));
        assert_relative_eq!(layout.elements[1].point_size, 5.0);
        assert!(layout.elements[1].bottom_left.y < layout.elements[0].bottom_left.y);

        // misspelled tags are text
        let layout = run(&mut storage, "<sop>x</sop>", &config(font));
        assert_eq!(layout.elements[0].character, '<');
        assert!(layout.character_count > 3);
    }

    #[test]
    fn kerning_moves_the_pen() {
        let rasterizer = BoxRasterizer::new("AV").with_kerning('A', 'V', -0.1);
        let (mut storage, font) = storage_with_rasterizer(rasterizer);
        let layout = run(&mut storage, "AV", &config(font));
        assert_relative_eq!(layout.elements[1].origin, 4.0);

        let plain = TextLayoutConfig {
            kerning: false,
            ..config(font)
        };
        let layout = run(&mut storage, "AV", &plain);
        assert_relative_eq!(layout.elements[1].origin, 5.0);
    }

    #[test]
    fn sprites_flow_with_the_text() {
        let (mut storage, font) = storage_with_font("<>=/adeinprstx0");
        let mut sprites = SpriteAsset::new("icons", 20.0, 64, 64);
        sprites.add_sprite(
            "star",
            None,
            GlyphRect::new(0, 0, 20, 20),
            GlyphMetrics {
                width: 20.0,
                height: 20.0,
                bearing_x: 0.0,
                bearing_y: 16.0,
                advance: 20.0,
            },
        );
        let sprites = storage.add_sprite_asset(sprites);
        storage.settings_mut().default_sprite_asset = Some(sprites);

        let layout = run(&mut storage, "a<sprite index=0>a", &config(font));
        assert_eq!(layout.sprite_count, 1);
        assert!(layout.elements[1].is_sprite());
        assert_relative_eq!(layout.elements[1].x_advance, 10.0);
        assert_relative_eq!(layout.elements[2].origin, 15.0);
        assert!(layout.elements[1].is_visible);
    }

    #[test]
    fn atlas_updates_are_reported_once() {
        let (mut storage, font) = storage_with_font("ab");
        let mut generator = TextGenerator::new();
        let first = generator.generate_str("ab", &config(font), &mut storage);
        assert_eq!(first.atlas_updates.len(), 2);

        let second = generator.generate_str("ab ba", &config(font), &mut storage);
        assert!(second.atlas_updates.is_empty());
        assert_eq!(first.elements[0].uv, second.elements[4].uv);
    }

    #[test]
    fn leading_space_survives_alignment() {
        let (mut storage, font) = storage_with_font("<>=%/abcegpos");
        let config = boxed(font, 100.0, None);
        let layout = run(&mut storage, "<pos=50%>b", &config);
        assert_relative_eq!(layout.elements[0].origin, 50.0);

        let layout = run(&mut storage, "<space=20>b", &config);
        assert_relative_eq!(layout.elements[0].origin, 20.0);

        let layout = run(&mut storage, "   b", &config);
        assert_relative_eq!(layout.elements[3].origin, 15.0);

        let centered = TextLayoutConfig {
            horizontal_align: HorizontalAlign::Center,
            ..config
        };
        let layout = run(&mut storage, "   b", &centered);
        assert_relative_eq!(layout.elements[3].origin, 55.0);
    }

    #[test]
    fn rollback_restores_the_style_stacks() {
        let (mut storage, font) = storage_with_font("ab");
        let layout = run(&mut storage, "aa b<size=20>bbb</size>", &boxed(font, 40.0, None));
        assert_eq!(layout.lines.len(), 2);
        assert_eq!(line_text(&layout, 0), "aa ");
        assert_eq!(line_text(&layout, 1), "bbbb");

        // the first b sits before the size tag and is laid out again at 10
        assert_relative_eq!(layout.elements[3].point_size, 10.0);
        assert_relative_eq!(layout.elements[3].origin, 0.0);
        for element in &layout.elements[4..] {
            assert_relative_eq!(element.point_size, 20.0);
        }
        assert_relative_eq!(layout.elements[4].origin, 5.0);

        // the larger glyphs do not leak into the first line
        assert_relative_eq!(layout.lines[0].baseline, 8.0);
        assert_relative_eq!(layout.lines[1].baseline, 26.0);
    }

    #[test]
    fn ellipsis_survives_a_wrap_rollback() {
        let (mut storage, font) = storage_with_font("abc\u{2026}");
        let config = TextLayoutConfig {
            overflow: OverflowMode::Ellipsis,
            ..boxed(font, 35.0, Some(10.0))
        };
        let layout = run(&mut storage, "aaaa bbbb cccc", &config);
        assert!(layout.is_truncated);
        assert_eq!(layout.lines.len(), 1);
        assert_eq!(visible_text(&layout), "aaa\u{2026}");
        assert_eq!(layout.character_count, 15);
    }

    #[test]
    fn auto_size_squeezes_characters_first() {
        let (mut storage, font) = storage_with_font("a");
        let config = TextLayoutConfig {
            auto_size: Some(AutoSizeRange {
                min_size: 10.0,
                max_size: 10.0,
                max_char_width_adjustment: 5.0,
            }),
            ..boxed(font, 19.5, Some(10.0))
        };
        let layout = run(&mut storage, "aaaa", &config);
        assert_eq!(layout.lines.len(), 1);
        assert_eq!(layout.iterations, 4);
        assert_relative_eq!(layout.font_size, 10.0);
        assert_relative_eq!(layout.char_width_adjustment, 0.03, epsilon = 1e-4);
        assert_relative_eq!(layout.elements[3].origin, 14.55, epsilon = 1e-3);
    }

    #[test]
    fn pass_limit_returns_a_complete_layout() {
        let (mut storage, font) = storage_with_font("a-");
        let text = format!("{}a", "a\u{00AD}".repeat(30));
        let layout = run(&mut storage, &text, &boxed(font, 10.0, None));

        assert_eq!(layout.iterations, MAX_LAYOUT_ITERATIONS);
        assert!(layout.warnings.contains(&LayoutWarning::IterationLimitReached));
        assert_eq!(layout.lines.len(), 30);
        // one hyphen was shown per retry, the final pass breaks without rewriting
        assert_eq!(line_text(&layout, 18), "a-");
        assert_eq!(line_text(&layout, 19), "a\u{00AD}");
        let shown = visible_text(&layout);
        assert_eq!(shown.matches('a').count(), 31);
        assert_eq!(shown.matches('-').count(), 19);
    }

    #[test]
    fn degenerate_input() {
        let (mut storage, font) = storage_with_font("a");
        let layout = run(&mut storage, "", &config(font));
        assert_eq!(layout.warnings, vec![LayoutWarning::EmptyText]);
        assert!(layout.elements.is_empty());

        let mut empty = FontStorage::new();
        let layout = run(&mut empty, "abc", &TextLayoutConfig::default());
        assert_eq!(layout.warnings, vec![LayoutWarning::NoFontAsset]);
    }
}
