//! Color quantization
//!
//! Reduces an RGBA image to a small palette and a per-pixel palette index map:
//! 1. Histogram opaque pixels into 512 RGB bins
//! 2. Merge bins into perceptual (CIELAB) clusters
//! 3. Classify each pixel to its nearest palette color

mod classify;
mod palette_builder;

pub use classify::{ColorIndexMap, TRANSPARENT, classify_pixels, nearest_index};
pub use palette_builder::{
    MAX_COLORS, MERGE_DELTA_E, MIN_COLORS, Palette, PaletteEntry, build_palette,
    evenly_spaced_grays,
};

/// Pixels with alpha below this are treated as transparent
pub const OPAQUE_ALPHA: u8 = 128;
