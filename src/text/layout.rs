use euclid::default::{Box2D, Point2D};

use crate::{
    atlas::AtlasUpdate,
    glyph_id::{FontAssetId, GlyphId, MaterialId, SpriteAssetId},
    text::style::{Color32, FontStyles, FontWeight, VertexGradient},
};

/// Configuration knobs used by the text layout pipeline.
///
/// Spacing values (`character_spacing`, `word_spacing`, `line_spacing`,
/// `paragraph_spacing`) are in 1/100 em of the current font size.
#[derive(Clone, Debug, PartialEq)]
pub struct TextLayoutConfig {
    /// Falls back to [`TextSettings::default_font_asset`](crate::font_storage::TextSettings) when `None`.
    pub font_asset: Option<FontAssetId>,
    pub material: Option<MaterialId>,
    pub sprite_asset: Option<SpriteAssetId>,
    pub font_size: f32,
    pub font_styles: FontStyles,
    pub font_weight: FontWeight,
    pub color: Color32,
    pub gradient: Option<VertexGradient>,
    pub tint_all_sprites: bool,

    pub rich_text: bool,
    pub parse_escape_sequences: bool,

    /// Size of the text box. `None` means unbounded on that axis.
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub margins: Margins,
    pub horizontal_align: HorizontalAlign,
    pub vertical_align: VerticalAlign,

    pub word_wrap: bool,
    /// Share of justification slack given to characters rather than spaces.
    pub word_wrapping_ratio: f32,
    pub overflow: OverflowMode,
    /// Page shown when `overflow` is [`OverflowMode::Page`].
    pub page_to_display: usize,
    pub auto_size: Option<AutoSizeRange>,

    pub kerning: bool,
    pub character_spacing: f32,
    pub word_spacing: f32,
    pub line_spacing: f32,
    pub paragraph_spacing: f32,

    pub max_visible_characters: Option<usize>,
    pub max_visible_words: Option<usize>,
    pub max_visible_lines: Option<usize>,

    pub right_to_left: bool,
}

impl Default for TextLayoutConfig {
    fn default() -> Self {
        Self {
            font_asset: None,
            material: None,
            sprite_asset: None,
            font_size: 36.0,
            font_styles: FontStyles::empty(),
            font_weight: FontWeight::Regular,
            color: Color32::WHITE,
            gradient: None,
            tint_all_sprites: false,
            rich_text: true,
            parse_escape_sequences: false,
            width: None,
            height: None,
            margins: Margins::default(),
            horizontal_align: HorizontalAlign::Left,
            vertical_align: VerticalAlign::Top,
            word_wrap: true,
            word_wrapping_ratio: 0.4,
            overflow: OverflowMode::Overflow,
            page_to_display: 0,
            auto_size: None,
            kerning: true,
            character_spacing: 0.0,
            word_spacing: 0.0,
            line_spacing: 0.0,
            paragraph_spacing: 0.0,
            max_visible_characters: None,
            max_visible_words: None,
            max_visible_lines: None,
            right_to_left: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Margins {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// Font size range searched when auto-sizing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutoSizeRange {
    pub min_size: f32,
    pub max_size: f32,
    /// Maximum horizontal squeeze tried before shrinking, in percent (0-50).
    pub max_char_width_adjustment: f32,
}

impl Default for AutoSizeRange {
    fn default() -> Self {
        Self {
            min_size: 18.0,
            max_size: 72.0,
            max_char_width_adjustment: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
/// Horizontal justification applied after each line is assembled.
pub enum HorizontalAlign {
    #[default]
    Left,
    Center,
    Right,
    /// Stretches wrapped lines; the last line of a paragraph stays left.
    Justified,
    /// Stretches every line.
    Flush,
    /// Centers the visible glyph bounds instead of the advance box.
    Geometry,
}

impl HorizontalAlign {
    pub fn from_name(name: &str) -> Option<Self> {
        let align = match name.to_ascii_lowercase().as_str() {
            "left" => Self::Left,
            "center" => Self::Center,
            "right" => Self::Right,
            "justified" => Self::Justified,
            "flush" => Self::Flush,
            _ => return None,
        };
        Some(align)
    }

    pub(crate) fn stretches(self) -> bool {
        matches!(self, Self::Justified | Self::Flush)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
/// Vertical alignment strategy for the entire block of text.
pub enum VerticalAlign {
    #[default]
    Top,
    Middle,
    Bottom,
    /// First baseline on the top edge.
    Baseline,
    /// Center of the visible glyph bounds on the box center.
    Midline,
    /// Middle of the first line's cap height on the box center.
    Capline,
}

/// What happens to text that does not fit the box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OverflowMode {
    #[default]
    Overflow,
    /// Like `Overflow`; clipping is up to the renderer.
    Masking,
    /// Like `Overflow`; scrolling is up to the renderer.
    ScrollRect,
    /// Lines that do not fit are hidden.
    Truncate,
    /// The last fitting line ends in `…`.
    Ellipsis,
    /// Text continues on a new page; only `page_to_display` is visible.
    Page,
    /// Layout stops; the rest is meant for a linked text box.
    Linked,
}

/// Output of one layout call.
///
/// **Y-axis goes down.** Coordinates are relative to the top-left corner of
/// the text box, margins included.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextLayout {
    pub elements: Vec<TextElementInfo>,
    pub lines: Vec<LineInfo>,
    pub words: Vec<WordInfo>,
    pub links: Vec<LinkInfo>,
    pub pages: Vec<PageInfo>,
    pub decorations: Vec<DecorationSpan>,
    pub material_references: Vec<MaterialReference>,

    /// Bounds of all visible quads.
    pub mesh_extents: Box2D<f32>,
    pub preferred_width: f32,
    pub preferred_height: f32,

    pub character_count: usize,
    pub visible_character_count: usize,
    pub sprite_count: usize,
    pub space_count: usize,
    pub word_count: usize,
    pub line_count: usize,
    pub page_count: usize,
    /// First element not laid out because of `Linked` overflow.
    pub first_overflow_character_index: Option<usize>,
    pub is_truncated: bool,

    pub font_size: f32,
    /// Horizontal squeeze applied by auto-sizing, 0 to 0.5.
    pub char_width_adjustment: f32,
    pub iterations: usize,

    pub warnings: Vec<LayoutWarning>,
    /// Atlas pixels written while resolving this text.
    pub atlas_updates: Vec<AtlasUpdate>,
}

/// Asset-specific part of a [`TextElementInfo`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ElementKind {
    Character {
        font_asset: FontAssetId,
        /// `None` for control characters that have no glyph.
        glyph: Option<GlyphId>,
        atlas_index: usize,
        is_using_alternate_typeface: bool,
    },
    Sprite {
        sprite_asset: SpriteAssetId,
        sprite_index: usize,
    },
}

/// One laid-out character or sprite.
#[derive(Clone, Debug, PartialEq)]
pub struct TextElementInfo {
    pub kind: ElementKind,
    pub character: char,
    pub index: usize,
    /// Position of the code point in the input string (in `char`s).
    pub source_index: usize,
    pub material_reference_index: usize,
    pub styles: FontStyles,
    pub point_size: f32,
    pub scale: f32,

    pub origin: f32,
    pub x_advance: f32,
    pub baseline: f32,
    pub ascender: f32,
    pub descender: f32,

    pub top_left: Point2D<f32>,
    pub top_right: Point2D<f32>,
    pub bottom_left: Point2D<f32>,
    pub bottom_right: Point2D<f32>,
    /// Atlas UVs with a top-left origin.
    pub uv: Box2D<f32>,
    pub color: Color32,
    /// Bottom-left, top-left, top-right, bottom-right.
    pub vertex_colors: [Color32; 4],
    pub highlight_color: Color32,

    pub line_number: usize,
    pub page_number: usize,
    pub word_number: Option<usize>,
    pub is_visible: bool,
}

impl TextElementInfo {
    pub fn is_sprite(&self) -> bool {
        matches!(self.kind, ElementKind::Sprite { .. })
    }

    pub fn font_asset(&self) -> Option<FontAssetId> {
        match self.kind {
            ElementKind::Character { font_asset, .. } => Some(font_asset),
            ElementKind::Sprite { .. } => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LineInfo {
    pub first_character_index: usize,
    pub last_character_index: usize,
    pub first_visible_character_index: Option<usize>,
    pub last_visible_character_index: Option<usize>,
    pub character_count: usize,
    pub visible_character_count: usize,
    pub space_count: usize,
    pub word_count: usize,
    pub ascender: f32,
    pub descender: f32,
    pub baseline: f32,
    pub cap_height: f32,
    /// Advance width without trailing whitespace.
    pub width: f32,
    /// Available width the line was wrapped against.
    pub max_width: f32,
    pub alignment: HorizontalAlign,
    pub margin_left: f32,
    pub margin_right: f32,
    pub page_number: usize,
    /// Bounds of the line's visible quads.
    pub extents: Box2D<f32>,
    pub ends_paragraph: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WordInfo {
    pub first_character_index: usize,
    pub last_character_index: usize,
    pub character_count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkKind {
    Link,
    Action,
}

/// Span of text between `<link>`/`<action>` and its closing tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkInfo {
    pub kind: LinkKind,
    pub id: String,
    pub first_character_index: usize,
    pub character_count: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PageInfo {
    pub first_character_index: usize,
    pub last_character_index: usize,
    pub ascender: f32,
    pub descender: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecorationKind {
    Underline,
    Strikethrough,
    Highlight,
}

/// A merged run of underline, strikethrough or highlight on one line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecorationSpan {
    pub kind: DecorationKind,
    pub line_number: usize,
    pub rect: Box2D<f32>,
    pub color: Color32,
}

/// Which asset a material reference draws from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaterialOwner {
    Font(FontAssetId),
    Sprite(SpriteAssetId),
}

/// One draw-call bucket: an asset/material pair and how many visible
/// elements use it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialReference {
    pub owner: MaterialOwner,
    pub material: Option<MaterialId>,
    pub reference_count: usize,
}

/// Diagnostics recorded during layout. Layout itself never fails.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LayoutWarning {
    /// No font asset was given and no default is configured.
    NoFontAsset,
    EmptyText,
    /// The code point was replaced by the missing-glyph substitute.
    MissingGlyph { code_point: char, substitute: char },
    /// Neither the code point nor the substitute exist; a space was used.
    ReplacedWithSpace { code_point: char },
    /// Not even a space could be resolved; the character was dropped.
    GlyphUnavailable { code_point: char },
    AtlasFull { font_asset: FontAssetId },
    UnknownResource { tag: &'static str, name: String },
    UnsupportedSpriteAnimation { name: String },
    EllipsisUnavailable,
    IterationLimitReached,
}
