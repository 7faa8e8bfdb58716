/// Free/used rectangle ledger and packing heuristics.
pub mod packer;
/// CPU copies of atlas pages and the update records handed to the caller.
pub mod texture;

pub use packer::{GlyphRect, PackingHeuristic, RectPacker, try_pack, try_pack_batch};
pub use texture::{AtlasTexture, AtlasUpdate};
