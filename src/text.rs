pub(crate) mod autofit;
/// Defines the input data structures for text layout.
pub mod data;
/// The layout engine.
pub mod generator;
/// Layout configuration and the records a layout produces.
pub mod layout;
/// Rich-text tag recognition.
pub mod markup;
pub(crate) mod record;
/// Colors, style flags and the bounded style stacks.
pub mod style;
pub(crate) mod tokenizer;
pub(crate) mod wrap;

pub use data::TextData;
pub use generator::{MAX_LAYOUT_ITERATIONS, TextGenerator};
pub use layout::{
    AutoSizeRange, DecorationKind, DecorationSpan, ElementKind, HorizontalAlign, LayoutWarning,
    LineInfo, LinkInfo, LinkKind, Margins, MaterialOwner, MaterialReference, OverflowMode,
    PageInfo, TextElementInfo, TextLayout, TextLayoutConfig, VerticalAlign, WordInfo,
};
pub use style::{Color32, FontStyles, FontWeight, VertexGradient};
