//! # Sumi
//!
//! Rich-text layout with dynamically populated glyph atlases.
//!
//! ## Overview
//!
//! `Sumi` turns a string with inline markup into positioned, textured quads.
//! The atlas pixels it writes are handed back to the caller, who owns the GPU
//! side. The core of the library is the [`FontStorage`], which owns font
//! faces and every asset markup can name, and the [`TextGenerator`], which
//! lays text out against it. [`FontSystem`] bundles both for shared use.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sumi::{FontSystem, asset::AtlasSettings, text::TextLayoutConfig};
//!
//! // 1. Create a FontSystem and load faces
//! let font_system = FontSystem::new();
//! font_system.load_system_fonts();
//!
//! // 2. Create a font asset from an installed family
//! let font = font_system
//!     .create_font_asset_from_family("DejaVu Sans", AtlasSettings::default())
//!     .unwrap();
//!
//! // 3. Lay text out
//! let config = TextLayoutConfig {
//!     font_asset: Some(font),
//!     width: Some(300.0),
//!     ..Default::default()
//! };
//! let layout = font_system.layout_text("Hello <b>World</b>", &config);
//!
//! // 4. Upload `layout.atlas_updates`, then draw `layout.elements`
//! for update in &layout.atlas_updates {
//!     // queue.write_texture(...)
//! }
//! ```
//!
//! ## Features
//!
//! *   **Rich Text**: Style, size, color, font, sprite, link and spacing tags with bounded nesting.
//! *   **Advanced Layout**: Word and CJK wrapping, justification, right-to-left lines, pages and overflow modes.
//! *   **Auto Size**: Bounded search for the largest font size that fits the box.
//! *   **Dynamic Atlases**: Glyphs are packed on first use and rasterized as coverage or SDF.
//! *   **Thread Safety**: `FontSystem` pools layout engines behind internal locking.

pub mod asset;
pub mod atlas;
pub mod font_storage;
pub mod font_system;
pub mod glyph_id;
pub mod rasterizer;
pub mod text;

#[cfg(test)]
mod testing;

// common re-exports
pub use font_storage::{FontError, FontStorage, ResourceProvider, TextSettings};
pub use font_system::FontSystem;
pub use glyph_id::{ColorGradientId, FontAssetId, GlyphId, MaterialId, SpriteAssetId};
pub use text::{TextData, TextGenerator, TextLayout, TextLayoutConfig};

// re-export dependencies
pub use fontdb;
pub use fontdue;
pub use parking_lot;
