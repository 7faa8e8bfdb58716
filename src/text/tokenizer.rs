use fxhash::{FxHashMap, FxHashSet};

use crate::{
    asset::{
        Character, ResolvedGlyph, Substitution,
        resolve::{find_in_font_chain, resolve_character, search_sprite_by_name},
    },
    font_storage::FontStorage,
    glyph_id::{FontAssetId, MaterialId, SpriteAssetId},
    text::{
        data::TextData,
        layout::{
            HorizontalAlign, LayoutWarning, MaterialOwner, MaterialReference, OverflowMode,
            TextLayoutConfig,
        },
        markup::{RichTag, TagKind, TagValue, name_hash, parse_tag},
        style::{Color32, FontStyleStack, FontStyles, FontWeight, TextStack, VertexGradient},
        wrap::{self, ELLIPSIS, SOFT_HYPHEN},
    },
};

/// Size of small capitals relative to the current size.
pub(crate) const SMALL_CAPS_SCALE: f32 = 0.8;
/// Shown for sprites that have no code point of their own.
const OBJECT_REPLACEMENT: char = '\u{FFFC}';
const DEFAULT_HIGHLIGHT: Color32 = Color32::rgba(255, 255, 0, 64);

/// A code point bound to a glyph of a font asset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct FontBinding {
    pub font_asset: FontAssetId,
    pub character: Character,
    pub is_using_alternate_typeface: bool,
    pub is_weight_variant: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum ElementGlyph {
    Font(FontBinding),
    /// Line breaks, tabs and zero-width characters.
    Control,
    Sprite {
        sprite_asset: SpriteAssetId,
        index: usize,
    },
}

/// Everything about an element that does not depend on the font size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Element {
    pub glyph: ElementGlyph,
    /// Code point shown, after case mapping and substitution.
    pub character: char,
    /// Position in the code-point buffer.
    pub index: usize,
    pub source_index: usize,
    /// Font active at this position; supplies line metrics.
    pub font_asset: FontAssetId,
    pub styles: FontStyles,
    pub weight: FontWeight,
    pub small_caps: bool,
    pub color: Color32,
    pub gradient: Option<VertexGradient>,
    pub highlight: Color32,
    pub material_reference: usize,
    /// Visible form of a soft hyphen.
    pub hyphen: Option<FontBinding>,
}

/// A tag whose effect depends on the size or position at layout time.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct LayoutTag {
    pub kind: TagKind,
    pub closing: bool,
    pub value: Option<TagValue>,
    pub align: Option<HorizontalAlign>,
    /// Id of a `<link>`/`<action>`.
    pub id: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Item {
    Tag(LayoutTag),
    Element(Element),
}

/// Result of the markup pass, reused by every layout pass.
#[derive(Clone, Debug, Default)]
pub(crate) struct Tokenized {
    pub items: Vec<Item>,
    pub material_references: Vec<MaterialReference>,
    /// `…` of the primary asset and its material reference, resolved only
    /// for `Ellipsis` overflow.
    pub ellipsis: Option<(FontBinding, usize)>,
    pub warnings: Vec<LayoutWarning>,
}

impl Tokenized {
    pub fn element_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, Item::Element(_)))
            .count()
    }
}

/// Resolves markup and binds every element to its asset.
pub(crate) fn tokenize(
    text: &TextData,
    config: &TextLayoutConfig,
    primary: FontAssetId,
    storage: &mut FontStorage,
) -> Tokenized {
    let mut tokenizer = Tokenizer::new(config, primary, storage);
    tokenizer.run(text);
    tokenizer.finish()
}

struct Tokenizer<'a> {
    storage: &'a mut FontStorage,
    config: &'a TextLayoutConfig,
    primary: FontAssetId,

    /// Font and whether the `<font>` tag also pushed a material.
    fonts: TextStack<(FontAssetId, bool), 16>,
    materials: TextStack<Option<MaterialId>, 16>,
    styles: FontStyleStack,
    weights: TextStack<FontWeight, 16>,
    colors: TextStack<Color32, 16>,
    alpha: u8,
    gradients: TextStack<Option<VertexGradient>, 16>,
    highlights: TextStack<Color32, 16>,
    sprite_asset: Option<SpriteAssetId>,
    no_parse: bool,

    out: Tokenized,
    reference_index: FxHashMap<(MaterialOwner, Option<MaterialId>), usize>,
    reported: FxHashSet<char>,
    reported_full: FxHashSet<FontAssetId>,
}

impl<'a> Tokenizer<'a> {
    fn new(
        config: &'a TextLayoutConfig,
        primary: FontAssetId,
        storage: &'a mut FontStorage,
    ) -> Self {
        let sprite_asset = config
            .sprite_asset
            .or(storage.settings().default_sprite_asset);
        Self {
            storage,
            config,
            primary,
            fonts: TextStack::new((primary, false)),
            materials: TextStack::new(None),
            styles: FontStyleStack::new(config.font_styles),
            weights: TextStack::new(config.font_weight),
            colors: TextStack::new(config.color),
            alpha: 255,
            gradients: TextStack::new(config.gradient),
            highlights: TextStack::new(DEFAULT_HIGHLIGHT),
            sprite_asset,
            no_parse: false,
            out: Tokenized::default(),
            reference_index: FxHashMap::default(),
            reported: FxHashSet::default(),
            reported_full: FxHashSet::default(),
        }
    }

    fn run(&mut self, text: &TextData) {
        let chars = text.chars();
        let mut i = 0;
        while i < chars.len() {
            let ch = chars[i];
            if ch == '<'
                && self.config.rich_text
                && let Some(tag) = parse_tag(chars, i)
                && self.apply_tag(&tag, i, text)
            {
                i = tag.end + 1;
                continue;
            }
            self.push_character(ch, i, text.source_index(i));
            i += 1;
        }
    }

    fn finish(mut self) -> Tokenized {
        if self.config.overflow == OverflowMode::Ellipsis
            && let Some((font_asset, character)) =
                find_in_font_chain(self.storage, ELLIPSIS, self.primary)
        {
            let material = self.font_material(font_asset);
            let reference = self.material_reference(MaterialOwner::Font(font_asset), material);
            self.out.ellipsis = Some((
                FontBinding {
                    font_asset,
                    character,
                    is_using_alternate_typeface: font_asset != self.primary,
                    is_weight_variant: false,
                },
                reference,
            ));
        }
        self.out
    }

    fn warn(&mut self, warning: LayoutWarning) {
        if self.storage.settings().warnings_enabled {
            log::warn!("{:?}", warning);
        }
        self.out.warnings.push(warning);
    }

    fn material_reference(&mut self, owner: MaterialOwner, material: Option<MaterialId>) -> usize {
        let references = &mut self.out.material_references;
        *self
            .reference_index
            .entry((owner, material))
            .or_insert_with(|| {
                references.push(MaterialReference {
                    owner,
                    material,
                    reference_count: 0,
                });
                references.len() - 1
            })
    }

    /// Material a glyph of `font_asset` is drawn with at this position.
    fn font_material(&self, font_asset: FontAssetId) -> Option<MaterialId> {
        let (current, _) = self.fonts.current();
        if font_asset == current {
            if let Some(material) = self.materials.current() {
                return Some(material);
            }
            if font_asset == self.primary && self.config.material.is_some() {
                return self.config.material;
            }
        }
        self.storage
            .font_asset(font_asset)
            .and_then(|asset| asset.material)
    }

    fn current_color(&self) -> Color32 {
        let color = self.colors.current();
        color.with_alpha(color.a.min(self.alpha))
    }

    fn base_element(&self, glyph: ElementGlyph, character: char, index: usize, source_index: usize) -> Element {
        Element {
            glyph,
            character,
            index,
            source_index,
            font_asset: self.fonts.current().0,
            styles: self.styles.active(),
            weight: self.weights.current(),
            small_caps: false,
            color: self.current_color(),
            gradient: self.gradients.current(),
            highlight: self.highlights.current(),
            material_reference: 0,
            hyphen: None,
        }
    }
}

/// Characters
impl Tokenizer<'_> {
    fn push_character(&mut self, ch: char, index: usize, source_index: usize) {
        let styles = self.styles.active();
        let (shown, small_caps) = apply_case(ch, styles);
        let font = self.fonts.current().0;

        if wrap::is_control(shown) {
            let mut element = self.base_element(ElementGlyph::Control, shown, index, source_index);
            let material = self.font_material(font);
            element.material_reference = self.material_reference(MaterialOwner::Font(font), material);
            if shown == SOFT_HYPHEN {
                element.hyphen = find_in_font_chain(self.storage, '-', font).map(
                    |(font_asset, character)| FontBinding {
                        font_asset,
                        character,
                        is_using_alternate_typeface: font_asset != font,
                        is_weight_variant: false,
                    },
                );
            }
            self.out.items.push(Item::Element(element));
            return;
        }

        // non-breaking spaces borrow the plain space when the face lacks them
        if wrap::is_non_breaking(shown)
            && shown.is_whitespace()
            && find_in_font_chain(self.storage, shown, font).is_none()
            && let Some((font_asset, character)) = find_in_font_chain(self.storage, ' ', font)
        {
            let binding = FontBinding {
                font_asset,
                character,
                is_using_alternate_typeface: font_asset != font,
                is_weight_variant: false,
            };
            self.push_font_element(binding, shown, small_caps, index, source_index);
            return;
        }

        let weight = self.weights.current();
        let Some(resolution) = resolve_character(self.storage, shown, font, styles, weight) else {
            if self.reported.insert(shown) {
                self.warn(LayoutWarning::GlyphUnavailable { code_point: shown });
            }
            return;
        };

        if let Some(full) = resolution.atlas_full
            && self.reported_full.insert(full)
        {
            self.warn(LayoutWarning::AtlasFull { font_asset: full });
        }

        let displayed = match resolution.substitution {
            None => shown,
            Some(Substitution::MissingGlyph(substitute)) => {
                if self.reported.insert(shown) {
                    self.warn(LayoutWarning::MissingGlyph {
                        code_point: shown,
                        substitute,
                    });
                }
                substitute
            }
            Some(Substitution::Space) => {
                if self.reported.insert(shown) {
                    self.warn(LayoutWarning::ReplacedWithSpace { code_point: shown });
                }
                ' '
            }
        };

        match resolution.glyph {
            ResolvedGlyph::Character {
                font_asset,
                character,
                is_using_alternate_typeface,
                is_weight_variant,
            } => {
                let binding = FontBinding {
                    font_asset,
                    character,
                    is_using_alternate_typeface,
                    is_weight_variant,
                };
                self.push_font_element(binding, displayed, small_caps, index, source_index);
            }
            ResolvedGlyph::Sprite {
                sprite_asset,
                index: sprite_index,
            } => {
                let tint = self.config.tint_all_sprites;
                self.push_sprite(sprite_asset, sprite_index, tint, None, displayed, index, source_index);
            }
        }
    }

    fn push_font_element(
        &mut self,
        binding: FontBinding,
        shown: char,
        small_caps: bool,
        index: usize,
        source_index: usize,
    ) {
        let mut element = self.base_element(ElementGlyph::Font(binding), shown, index, source_index);
        element.small_caps = small_caps;
        let material = self.font_material(binding.font_asset);
        element.material_reference =
            self.material_reference(MaterialOwner::Font(binding.font_asset), material);
        self.out.items.push(Item::Element(element));
    }

    fn push_sprite(
        &mut self,
        sprite_asset: SpriteAssetId,
        sprite_index: usize,
        tint: bool,
        color: Option<Color32>,
        shown: char,
        index: usize,
        source_index: usize,
    ) {
        let mut element = self.base_element(
            ElementGlyph::Sprite {
                sprite_asset,
                index: sprite_index,
            },
            shown,
            index,
            source_index,
        );
        let alpha = element.color.a;
        element.color = match color {
            Some(color) => color,
            None if tint => element.color,
            None => Color32::WHITE.with_alpha(alpha),
        };
        element.gradient = None;
        let material = self
            .storage
            .sprite_asset(sprite_asset)
            .and_then(|asset| asset.material);
        element.material_reference =
            self.material_reference(MaterialOwner::Sprite(sprite_asset), material);
        self.out.items.push(Item::Element(element));
    }
}

/// Tags
impl Tokenizer<'_> {
    /// Applies `tag`. Returns `false` when the tag has to be shown as text.
    fn apply_tag(&mut self, tag: &RichTag, index: usize, text: &TextData) -> bool {
        if self.no_parse {
            if tag.kind == TagKind::NoParse && tag.closing {
                self.no_parse = false;
                return true;
            }
            return false;
        }

        let style = match tag.kind {
            TagKind::Bold => Some(FontStyles::BOLD),
            TagKind::Italic => Some(FontStyles::ITALIC),
            TagKind::Underline => Some(FontStyles::UNDERLINE),
            TagKind::Strikethrough => Some(FontStyles::STRIKETHROUGH),
            TagKind::Subscript => Some(FontStyles::SUBSCRIPT),
            TagKind::Superscript => Some(FontStyles::SUPERSCRIPT),
            TagKind::Lowercase => Some(FontStyles::LOWERCASE),
            TagKind::Uppercase => Some(FontStyles::UPPERCASE),
            TagKind::SmallCaps => Some(FontStyles::SMALLCAPS),
            _ => None,
        };
        if let Some(style) = style {
            if tag.closing {
                self.styles.remove(style);
            } else {
                self.styles.add(style);
            }
            return true;
        }

        match tag.kind {
            TagKind::Mark => {
                if tag.closing {
                    self.styles.remove(FontStyles::HIGHLIGHT);
                    self.highlights.pop();
                } else {
                    let color = match &tag.value {
                        Some(value) => match value.as_color() {
                            Some(color) => color,
                            None => return false,
                        },
                        None => DEFAULT_HIGHLIGHT,
                    };
                    self.styles.add(FontStyles::HIGHLIGHT);
                    self.highlights.push(color);
                }
                true
            }
            TagKind::FontWeight => {
                if tag.closing {
                    self.weights.pop();
                    return true;
                }
                match tag.value.as_ref().and_then(|v| v.to_pixels(0.0, 0.0)) {
                    Some(value) => {
                        self.weights.push(FontWeight::from_value(value));
                        true
                    }
                    None => false,
                }
            }
            TagKind::Color => {
                if tag.closing {
                    self.colors.pop();
                    return true;
                }
                match tag.value.as_ref().and_then(TagValue::as_color) {
                    Some(color) => {
                        self.colors.push(color);
                        true
                    }
                    None => false,
                }
            }
            TagKind::Alpha => {
                if tag.closing {
                    self.alpha = 255;
                    return true;
                }
                match tag.value.as_ref().and_then(parse_alpha) {
                    Some(alpha) => {
                        self.alpha = alpha;
                        true
                    }
                    None => false,
                }
            }
            TagKind::Gradient => self.apply_gradient(tag),
            TagKind::Font => self.apply_font(tag),
            TagKind::Material => self.apply_material(tag),
            TagKind::Sprite => {
                if tag.closing {
                    return true;
                }
                self.apply_sprite(tag, index, text.source_index(index))
            }
            TagKind::NoParse => {
                if !tag.closing {
                    self.no_parse = true;
                }
                true
            }
            TagKind::LineBreak => {
                if !tag.closing {
                    self.push_character('\n', index, text.source_index(index));
                }
                true
            }
            TagKind::Align => {
                let align = if tag.closing {
                    None
                } else {
                    match tag
                        .value
                        .as_ref()
                        .and_then(TagValue::as_text)
                        .and_then(HorizontalAlign::from_name)
                    {
                        Some(align) => Some(align),
                        None => return false,
                    }
                };
                self.push_layout_tag(tag, align, None);
                true
            }
            TagKind::Link | TagKind::Action => {
                let id = (!tag.closing).then(|| tag.value.as_ref().map(value_text).unwrap_or_default());
                self.push_layout_tag(tag, None, id);
                true
            }
            TagKind::Page | TagKind::NoBreak => {
                self.push_layout_tag(tag, None, None);
                true
            }
            _ => {
                // size and position tags need a number
                if !tag.closing
                    && !matches!(tag.value, Some(TagValue::Number { .. }))
                {
                    return false;
                }
                self.push_layout_tag(tag, None, None);
                true
            }
        }
    }

    fn push_layout_tag(&mut self, tag: &RichTag, align: Option<HorizontalAlign>, id: Option<String>) {
        self.out.items.push(Item::Tag(LayoutTag {
            kind: tag.kind,
            closing: tag.closing,
            value: tag.value.clone(),
            align,
            id,
        }));
    }

    fn unknown(&mut self, tag: &'static str, name: &str) -> bool {
        self.warn(LayoutWarning::UnknownResource {
            tag,
            name: name.to_string(),
        });
        false
    }

    fn apply_gradient(&mut self, tag: &RichTag) -> bool {
        if tag.closing {
            self.gradients.pop();
            return true;
        }
        let Some(name) = tag.value.as_ref().and_then(TagValue::as_text) else {
            return false;
        };
        let gradient = self
            .storage
            .find_color_gradient(name)
            .and_then(|id| self.storage.color_gradient(id))
            .map(|preset| preset.gradient);
        match gradient {
            Some(gradient) => {
                self.gradients.push(Some(gradient));
                true
            }
            None => self.unknown("gradient", name),
        }
    }

    fn apply_font(&mut self, tag: &RichTag) -> bool {
        if tag.closing {
            if self.fonts.depth() > 0 {
                let (_, pushed_material) = self.fonts.current();
                self.fonts.pop();
                if pushed_material {
                    self.materials.pop();
                }
            }
            return true;
        }

        let Some(name) = tag.value.as_ref().and_then(TagValue::as_text) else {
            return false;
        };
        let font = if name.eq_ignore_ascii_case("default") {
            self.primary
        } else {
            match self.storage.find_font_asset(name) {
                Some(font) => font,
                None => return self.unknown("font", name),
            }
        };

        let material = match tag.attribute("material").and_then(TagValue::as_text) {
            Some(material_name) => match self.storage.find_material(material_name) {
                Some(material) => Some(material),
                None => return self.unknown("material", material_name),
            },
            None => None,
        };

        self.fonts.push((font, material.is_some()));
        if material.is_some() {
            self.materials.push(material);
        }
        true
    }

    fn apply_material(&mut self, tag: &RichTag) -> bool {
        if tag.closing {
            self.materials.pop();
            return true;
        }
        let Some(name) = tag.value.as_ref().and_then(TagValue::as_text) else {
            return false;
        };
        if name.eq_ignore_ascii_case("default") {
            self.materials.push(None);
            return true;
        }
        match self.storage.find_material(name) {
            Some(material) => {
                self.materials.push(Some(material));
                true
            }
            None => self.unknown("material", name),
        }
    }

    fn apply_sprite(&mut self, tag: &RichTag, index: usize, source_index: usize) -> bool {
        // `<sprite="asset" ...>` names the asset, `<sprite=3>` the index
        let mut asset = self.sprite_asset;
        let mut sprite_index = None;
        match &tag.value {
            Some(TagValue::Text(name)) => match self.storage.find_sprite_asset(name) {
                Some(found) => asset = Some(found),
                None => return self.unknown("sprite", name),
            },
            Some(TagValue::Number { value, .. }) if *value >= 0.0 => {
                sprite_index = Some(*value as usize);
            }
            Some(_) => return false,
            None => {}
        }
        let Some(asset) = asset else {
            return self.unknown("sprite", "default");
        };

        if let Some(TagValue::Number { value, .. }) = tag.attribute("index")
            && *value >= 0.0
        {
            sprite_index = Some(*value as usize);
        }

        let found = if let Some(name) = tag.attribute("name").and_then(TagValue::as_text) {
            let mut visited = FxHashSet::default();
            match search_sprite_by_name(self.storage, name_hash(name), asset, &mut visited) {
                Some(found) => Some(found),
                None => return self.unknown("sprite", name),
            }
        } else {
            let index = sprite_index.unwrap_or(0);
            self.storage
                .sprite_asset(asset)
                .filter(|sprites| index < sprites.len())
                .map(|_| (asset, index))
        };
        let Some((asset, sprite_index)) = found else {
            let name = self
                .storage
                .sprite_asset(asset)
                .map(|sprites| sprites.name().to_string())
                .unwrap_or_default();
            return self.unknown("sprite", &name);
        };

        let (shown, sprite_name) = self
            .storage
            .sprite_asset(asset)
            .and_then(|sprites| sprites.character(sprite_index))
            .map(|character| {
                (
                    character.unicode.unwrap_or(OBJECT_REPLACEMENT),
                    character.name.clone(),
                )
            })
            .unwrap_or((OBJECT_REPLACEMENT, String::new()));

        if tag.attribute("anim").is_some() {
            self.warn(LayoutWarning::UnsupportedSpriteAnimation { name: sprite_name });
        }

        let tint = match tag.attribute("tint") {
            Some(TagValue::Number { value, .. }) => *value != 0.0,
            _ => self.config.tint_all_sprites,
        };
        let color = tag.attribute("color").and_then(TagValue::as_color);
        self.push_sprite(asset, sprite_index, tint, color, shown, index, source_index);
        true
    }
}

/// Applies the active case style. The flag marks letters shown as small
/// capitals.
fn apply_case(ch: char, styles: FontStyles) -> (char, bool) {
    if styles.contains(FontStyles::UPPERCASE) {
        return (single(ch.to_uppercase()).unwrap_or(ch), false);
    }
    if styles.contains(FontStyles::LOWERCASE) {
        return (single(ch.to_lowercase()).unwrap_or(ch), false);
    }
    if styles.contains(FontStyles::SMALLCAPS)
        && ch.is_lowercase()
        && let Some(upper) = single(ch.to_uppercase())
    {
        return (upper, true);
    }
    (ch, false)
}

/// Case mappings that expand to several code points are not applied.
fn single(mut mapped: impl Iterator<Item = char>) -> Option<char> {
    let first = mapped.next()?;
    mapped.next().is_none().then_some(first)
}

/// `<alpha=#80>` or a number from 0 to 255 (or a percentage).
fn parse_alpha(value: &TagValue) -> Option<u8> {
    match value {
        TagValue::Text(text) => {
            let hex = text.strip_prefix('#').filter(|hex| hex.len() == 2)?;
            u8::from_str_radix(hex, 16).ok()
        }
        TagValue::Number {
            value,
            unit: crate::text::markup::Unit::Percent,
            ..
        } => Some((value * 2.55).round().clamp(0.0, 255.0) as u8),
        TagValue::Number { value, .. } => Some(value.round().clamp(0.0, 255.0) as u8),
        TagValue::Color(_) => None,
    }
}

fn value_text(value: &TagValue) -> String {
    match value {
        TagValue::Text(text) => text.clone(),
        TagValue::Number { value, .. } => value.to_string(),
        TagValue::Color(c) => format!("#{:02X}{:02X}{:02X}{:02X}", c.r, c.g, c.b, c.a),
    }
}
