use crate::{
    font_storage::FontStorage,
    text::{TextGenerator, TextLayout, TextLayoutConfig},
};

/// Input text as a code-point buffer.
///
/// Each code point remembers the index of the `char` it came from in the
/// original string, so layout records can point back into the source even
/// after escape sequences collapsed several characters into one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextData {
    chars: Vec<char>,
    source_indices: Vec<usize>,
}

impl TextData {
    /// Builds the buffer, optionally converting backslash escapes.
    ///
    /// Recognized escapes are `\n`, `\r`, `\t`, `\v`, `\\`, `\uXXXX` and
    /// `\UXXXXXXXX`. Anything else, including escapes naming an invalid code
    /// point, is kept verbatim.
    pub fn new(text: &str, parse_escape_sequences: bool) -> Self {
        let source: Vec<char> = text.chars().collect();
        if !parse_escape_sequences {
            return Self {
                source_indices: (0..source.len()).collect(),
                chars: source,
            };
        }

        let mut chars = Vec::with_capacity(source.len());
        let mut source_indices = Vec::with_capacity(source.len());
        let mut i = 0;
        while i < source.len() {
            if source[i] == '\\'
                && let Some((ch, consumed)) = parse_escape(&source[i + 1..])
            {
                chars.push(ch);
                source_indices.push(i);
                i += 1 + consumed;
                continue;
            }
            chars.push(source[i]);
            source_indices.push(i);
            i += 1;
        }

        Self {
            chars,
            source_indices,
        }
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Index into the original string's `chars()` for buffer position `index`.
    pub fn source_index(&self, index: usize) -> usize {
        self.source_indices.get(index).copied().unwrap_or(index)
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

/// Layout
impl TextData {
    /// Lays the text out with a throwaway [`TextGenerator`].
    ///
    /// Callers laying out text repeatedly should keep a generator around, or
    /// go through [`FontSystem`](crate::FontSystem).
    pub fn layout(&self, config: &TextLayoutConfig, font_storage: &mut FontStorage) -> TextLayout {
        TextGenerator::new().generate(self, config, font_storage)
    }
}

/// Parses the escape following a backslash. Returns the code point and the
/// number of characters consumed after the backslash.
fn parse_escape(rest: &[char]) -> Option<(char, usize)> {
    let simple = match rest.first()? {
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        'v' => Some('\u{000B}'),
        '\\' => Some('\\'),
        _ => None,
    };
    if let Some(ch) = simple {
        return Some((ch, 1));
    }

    let digits = match rest.first()? {
        'u' => 4,
        'U' => 8,
        _ => return None,
    };
    let hex: String = rest.get(1..=digits)?.iter().collect();
    let value = u32::from_str_radix(&hex, 16).ok()?;
    char::from_u32(value).map(|ch| (ch, 1 + digits))
}
