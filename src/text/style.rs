use bitflags::bitflags;

/// 8-bit RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color32 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Default for Color32 {
    fn default() -> Self {
        Self::WHITE
    }
}

impl Color32 {
    pub const WHITE: Self = Self::rgba(255, 255, 255, 255);
    pub const BLACK: Self = Self::rgba(0, 0, 0, 255);
    pub const RED: Self = Self::rgba(255, 0, 0, 255);
    pub const GREEN: Self = Self::rgba(0, 255, 0, 255);
    pub const BLUE: Self = Self::rgba(0, 0, 255, 255);
    pub const ORANGE: Self = Self::rgba(255, 128, 0, 255);
    pub const PURPLE: Self = Self::rgba(160, 32, 240, 255);
    pub const YELLOW: Self = Self::rgba(255, 255, 0, 255);
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Names accepted by `<color=name>`.
    pub fn from_name(name: &str) -> Option<Self> {
        let color = match name.to_ascii_lowercase().as_str() {
            "red" => Self::RED,
            "blue" => Self::BLUE,
            "black" => Self::BLACK,
            "green" => Self::GREEN,
            "white" => Self::WHITE,
            "orange" => Self::ORANGE,
            "purple" => Self::PURPLE,
            "yellow" => Self::YELLOW,
            _ => return None,
        };
        Some(color)
    }

    /// Parses `#RGB`, `#RGBA`, `#RRGGBB` and `#RRGGBBAA`.
    ///
    /// The form is chosen by length alone (4, 5, 7 or 9 characters including
    /// the `#`).
    pub fn from_hex(text: &str) -> Option<Self> {
        let digits = text.strip_prefix('#')?;
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }

        let nibble = |i: usize| u8::from_str_radix(&digits[i..i + 1], 16).ok().map(|v| v * 17);
        let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();

        match text.len() {
            4 => Some(Self::rgba(nibble(0)?, nibble(1)?, nibble(2)?, 255)),
            5 => Some(Self::rgba(nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?)),
            7 => Some(Self::rgba(byte(0)?, byte(2)?, byte(4)?, 255)),
            9 => Some(Self::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        }
    }

    /// Component-wise product, as used for tinting.
    pub fn multiply(self, other: Self) -> Self {
        let mul = |a: u8, b: u8| ((a as u16 * b as u16 + 127) / 255) as u8;
        Self::rgba(
            mul(self.r, other.r),
            mul(self.g, other.g),
            mul(self.b, other.b),
            mul(self.a, other.a),
        )
    }

    pub fn to_f32(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }
}

/// Four-corner color gradient applied across one quad.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexGradient {
    pub top_left: Color32,
    pub top_right: Color32,
    pub bottom_left: Color32,
    pub bottom_right: Color32,
}

impl Default for VertexGradient {
    fn default() -> Self {
        Self::solid(Color32::WHITE)
    }
}

impl VertexGradient {
    pub const fn solid(color: Color32) -> Self {
        Self {
            top_left: color,
            top_right: color,
            bottom_left: color,
            bottom_right: color,
        }
    }

    pub const fn horizontal(left: Color32, right: Color32) -> Self {
        Self {
            top_left: left,
            top_right: right,
            bottom_left: left,
            bottom_right: right,
        }
    }

    pub const fn vertical(top: Color32, bottom: Color32) -> Self {
        Self {
            top_left: top,
            top_right: top,
            bottom_left: bottom,
            bottom_right: bottom,
        }
    }

    /// Colors in quad corner order: bottom-left, top-left, top-right, bottom-right.
    pub fn corners(&self) -> [Color32; 4] {
        [
            self.bottom_left,
            self.top_left,
            self.top_right,
            self.bottom_right,
        ]
    }
}

bitflags! {
    /// Style flags resolved for one text element.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FontStyles: u16 {
        const BOLD = 1 << 0;
        const ITALIC = 1 << 1;
        const UNDERLINE = 1 << 2;
        const STRIKETHROUGH = 1 << 3;
        const HIGHLIGHT = 1 << 4;
        const SUPERSCRIPT = 1 << 5;
        const SUBSCRIPT = 1 << 6;
        const UPPERCASE = 1 << 7;
        const LOWERCASE = 1 << 8;
        const SMALLCAPS = 1 << 9;
    }
}

const STYLE_COUNT: usize = 10;

/// Nesting counters for each style flag.
///
/// `<b><b>x</b>y</b>` keeps `y` bold because the counter only reaches zero at
/// the second close. Closing a style that is not open does nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FontStyleStack {
    base: FontStyles,
    counts: [u8; STYLE_COUNT],
}

impl FontStyleStack {
    pub fn new(base: FontStyles) -> Self {
        Self {
            base,
            counts: [0; STYLE_COUNT],
        }
    }

    fn slot(style: FontStyles) -> Option<usize> {
        let bits = style.bits();
        (bits.count_ones() == 1).then(|| bits.trailing_zeros() as usize)
    }

    /// Opens one level of `style` and returns the new nesting depth.
    pub fn add(&mut self, style: FontStyles) -> u8 {
        let Some(slot) = Self::slot(style) else {
            return 0;
        };
        self.counts[slot] = self.counts[slot].saturating_add(1);
        self.counts[slot]
    }

    /// Closes one level of `style` and returns the remaining depth.
    pub fn remove(&mut self, style: FontStyles) -> u8 {
        let Some(slot) = Self::slot(style) else {
            return 0;
        };
        self.counts[slot] = self.counts[slot].saturating_sub(1);
        self.counts[slot]
    }

    pub fn depth(&self, style: FontStyles) -> u8 {
        Self::slot(style).map_or(0, |slot| self.counts[slot])
    }

    pub fn active(&self) -> FontStyles {
        let mut styles = self.base;
        for (slot, count) in self.counts.iter().enumerate() {
            if *count > 0 {
                styles |= FontStyles::from_bits_truncate(1 << slot);
            }
        }
        styles
    }
}

/// The nine standard weights, `Thin` (100) to `Black` (900).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FontWeight {
    Thin = 100,
    ExtraLight = 200,
    Light = 300,
    #[default]
    Regular = 400,
    Medium = 500,
    SemiBold = 600,
    Bold = 700,
    Heavy = 800,
    Black = 900,
}

impl FontWeight {
    pub const ALL: [FontWeight; 9] = [
        FontWeight::Thin,
        FontWeight::ExtraLight,
        FontWeight::Light,
        FontWeight::Regular,
        FontWeight::Medium,
        FontWeight::SemiBold,
        FontWeight::Bold,
        FontWeight::Heavy,
        FontWeight::Black,
    ];

    /// Rounds a numeric weight to the nearest step.
    pub fn from_value(value: f32) -> Self {
        let step = ((value / 100.0).round() as i32).clamp(1, 9) as usize;
        Self::ALL[step - 1]
    }

    /// Position in [`Self::ALL`], used to index weight tables.
    pub fn index(self) -> usize {
        self as usize / 100 - 1
    }

    pub fn value(self) -> u16 {
        self as u16
    }
}

/// Bounded push/pop stack with a default bottom item.
///
/// The stack is `Copy` so the whole layout cursor can be snapshotted by value.
/// Pushes past `N` are counted but not stored, so the item at depth `N`
/// stays current until the stack pops back below it. Popping an empty stack
/// is a no-op that keeps returning the default.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextStack<T: Copy, const N: usize> {
    base: T,
    items: [T; N],
    depth: usize,
}

impl<T: Copy, const N: usize> TextStack<T, N> {
    pub fn new(base: T) -> Self {
        Self {
            base,
            items: [base; N],
            depth: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        if let Some(slot) = self.items.get_mut(self.depth) {
            *slot = item;
        }
        self.depth += 1;
    }

    /// Removes the top item and returns the new current item.
    pub fn pop(&mut self) -> T {
        self.depth = self.depth.saturating_sub(1);
        self.current()
    }

    pub fn current(&self) -> T {
        if self.depth == 0 {
            self.base
        } else {
            self.items[self.depth.min(N) - 1]
        }
    }

    pub fn base(&self) -> T {
        self.base
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}
