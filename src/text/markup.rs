use super::style::Color32;

/// Longest tag body (between `<` and `>`) that is still treated as markup.
const MAX_TAG_LENGTH: usize = 128;

/// Case-insensitive DJB-style hash used to key resources by name.
pub fn name_hash(name: &str) -> u32 {
    name.chars().fold(0u32, |hash, ch| {
        let lower = ch.to_ascii_lowercase() as u32;
        (hash << 5).wrapping_add(hash) ^ lower
    })
}

/// Recognized tag names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TagKind {
    Bold,
    Italic,
    Strikethrough,
    Underline,
    Mark,
    Subscript,
    Superscript,
    Size,
    FontWeight,
    Pos,
    VOffset,
    Page,
    NoBreak,
    Space,
    MonoSpace,
    CharacterSpace,
    Color,
    Alpha,
    Gradient,
    Font,
    Material,
    Sprite,
    Align,
    Width,
    Margin,
    MarginLeft,
    MarginRight,
    Indent,
    LineIndent,
    LineHeight,
    Lowercase,
    Uppercase,
    SmallCaps,
    Link,
    Action,
    NoParse,
    Rotate,
    Scale,
    LineBreak,
}

impl TagKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name.to_ascii_lowercase().as_str() {
            "b" => Self::Bold,
            "i" => Self::Italic,
            "s" | "strikethrough" => Self::Strikethrough,
            "u" | "underline" => Self::Underline,
            "mark" => Self::Mark,
            "sub" => Self::Subscript,
            "sup" => Self::Superscript,
            "size" => Self::Size,
            "font-weight" => Self::FontWeight,
            "pos" => Self::Pos,
            "voffset" => Self::VOffset,
            "page" => Self::Page,
            "nobr" => Self::NoBreak,
            "space" => Self::Space,
            "mspace" => Self::MonoSpace,
            "cspace" => Self::CharacterSpace,
            "color" => Self::Color,
            "alpha" => Self::Alpha,
            "gradient" => Self::Gradient,
            "font" => Self::Font,
            "material" => Self::Material,
            "sprite" => Self::Sprite,
            "align" => Self::Align,
            "width" => Self::Width,
            "margin" => Self::Margin,
            "margin-left" => Self::MarginLeft,
            "margin-right" => Self::MarginRight,
            "indent" => Self::Indent,
            "line-indent" => Self::LineIndent,
            "line-height" => Self::LineHeight,
            "lowercase" => Self::Lowercase,
            "uppercase" | "allcaps" => Self::Uppercase,
            "smallcaps" => Self::SmallCaps,
            "link" => Self::Link,
            "action" => Self::Action,
            "noparse" => Self::NoParse,
            "rotate" => Self::Rotate,
            "scale" => Self::Scale,
            "br" => Self::LineBreak,
            _ => return None,
        };
        Some(kind)
    }

    /// Tags that are meaningless without a value when opening.
    fn requires_value(self) -> bool {
        matches!(
            self,
            Self::Size
                | Self::FontWeight
                | Self::Pos
                | Self::VOffset
                | Self::Space
                | Self::MonoSpace
                | Self::CharacterSpace
                | Self::Color
                | Self::Alpha
                | Self::Gradient
                | Self::Font
                | Self::Material
                | Self::Align
                | Self::Width
                | Self::Margin
                | Self::MarginLeft
                | Self::MarginRight
                | Self::Indent
                | Self::LineIndent
                | Self::LineHeight
                | Self::Rotate
                | Self::Scale
        )
    }
}

/// Unit suffix of a numeric value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Unit {
    Pixels,
    /// Percent of a reference length chosen by the tag.
    Percent,
    /// Multiples of the current font size (`em`).
    FontUnits,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TagValue {
    Number {
        value: f32,
        unit: Unit,
        /// Written with an explicit sign, e.g. `<size=+4>`.
        relative: bool,
    },
    Color(Color32),
    Text(String),
}

impl TagValue {
    fn parse(raw: &str) -> Self {
        if raw.starts_with('#')
            && let Some(color) = Color32::from_hex(raw)
        {
            return Self::Color(color);
        }
        Self::parse_number(raw).unwrap_or_else(|| Self::Text(raw.to_string()))
    }

    fn parse_number(raw: &str) -> Option<Self> {
        let (number, unit) = if let Some(n) = raw.strip_suffix('%') {
            (n, Unit::Percent)
        } else if let Some(n) = raw.strip_suffix("em") {
            (n, Unit::FontUnits)
        } else if let Some(n) = raw.strip_suffix("px") {
            (n, Unit::Pixels)
        } else {
            (raw, Unit::Pixels)
        };

        let relative = number.starts_with('+') || number.starts_with('-');
        if number.is_empty()
            || !number
                .bytes()
                .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'+' | b'-'))
        {
            return None;
        }
        let value = number.parse::<f32>().ok()?;
        value.is_finite().then_some(Self::Number {
            value,
            unit,
            relative,
        })
    }

    /// Converts to pixels.
    ///
    /// `em` is the current font size, `percent_of` the length a percentage
    /// refers to. Text values yield `None`.
    pub fn to_pixels(&self, em: f32, percent_of: f32) -> Option<f32> {
        match *self {
            Self::Number { value, unit, .. } => Some(match unit {
                Unit::Pixels => value,
                Unit::Percent => value * 0.01 * percent_of,
                Unit::FontUnits => value * em,
            }),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Number or hex color read as a color, or a named color.
    pub fn as_color(&self) -> Option<Color32> {
        match self {
            Self::Color(color) => Some(*color),
            Self::Text(text) => Color32::from_name(text),
            Self::Number { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TagAttribute {
    pub name: String,
    pub name_hash: u32,
    pub value: TagValue,
}

/// A recognized tag.
#[derive(Clone, Debug, PartialEq)]
pub struct RichTag {
    pub kind: TagKind,
    pub closing: bool,
    pub value: Option<TagValue>,
    pub attributes: Vec<TagAttribute>,
    /// Index of the closing `>`.
    pub end: usize,
}

impl RichTag {
    pub fn attribute(&self, name: &str) -> Option<&TagValue> {
        let hash = name_hash(name);
        self.attributes
            .iter()
            .find(|attribute| attribute.name_hash == hash)
            .map(|attribute| &attribute.value)
    }
}

/// Tries to read a tag whose `<` is at `start`.
///
/// Returns `None` for anything that is not a well-formed, known tag; the
/// caller then treats the `<` as a literal character.
pub fn parse_tag(chars: &[char], start: usize) -> Option<RichTag> {
    if chars.get(start) != Some(&'<') {
        return None;
    }

    let mut end = None;
    for (offset, &ch) in chars[start + 1..].iter().enumerate() {
        if offset > MAX_TAG_LENGTH || ch == '<' || ch == '\n' {
            return None;
        }
        if ch == '>' {
            end = Some(start + 1 + offset);
            break;
        }
    }
    let end = end?;
    let body: String = chars[start + 1..end].iter().collect();

    let (closing, body) = match body.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, body.as_str()),
    };
    if body.is_empty() {
        return None;
    }

    // `<#RRGGBB>` shorthand: classified by length alone
    if body.starts_with('#') {
        if closing {
            return None;
        }
        let color = Color32::from_hex(body)?;
        return Some(RichTag {
            kind: TagKind::Color,
            closing: false,
            value: Some(TagValue::Color(color)),
            attributes: Vec::new(),
            end,
        });
    }

    let tokens = split_tokens(body)?;
    let mut tokens = tokens.into_iter();
    let (name, value) = tokens.next()?;
    let kind = TagKind::from_name(&name)?;

    let value = value.map(|raw| TagValue::parse(&raw));
    if !closing && value.is_none() && kind.requires_value() {
        return None;
    }

    let mut attributes = Vec::new();
    for (name, value) in tokens {
        let value = TagValue::parse(value.as_deref().unwrap_or(""));
        attributes.push(TagAttribute {
            name_hash: name_hash(&name),
            name,
            value,
        });
    }

    Some(RichTag {
        kind,
        closing,
        value,
        attributes,
        end,
    })
}

/// Splits `name=value name="quoted value"` into pairs.
fn split_tokens(body: &str) -> Option<Vec<(String, Option<String>)>> {
    let mut tokens = Vec::new();
    let mut chars = body.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut name = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            name.push(c);
        }
        if name.is_empty() {
            return None;
        }

        if chars.next_if_eq(&'=').is_none() {
            tokens.push((name, None));
            continue;
        }

        let mut value = String::new();
        match chars.peek().copied() {
            Some(quote @ ('"' | '\'')) => {
                chars.next();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == quote {
                        closed = true;
                        break;
                    }
                    value.push(c);
                }
                if !closed {
                    return None;
                }
            }
            _ => {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    value.push(c);
                }
            }
        }
        tokens.push((name, Some(value)));
    }

    Some(tokens)
}
