//! Nearest-palette-color pixel classification

use image::RgbaImage;
use rayon::prelude::*;

use super::OPAQUE_ALPHA;
use super::palette_builder::Palette;
use crate::color::Rgb;

/// Index stored for pixels with alpha below the opacity threshold
pub const TRANSPARENT: u8 = u8::MAX;

/// Per-pixel palette indices in row-major order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorIndexMap {
    width: u32,
    height: u32,
    indices: Vec<u8>,
}

impl ColorIndexMap {
    /// Wrap an existing index buffer; `indices.len()` must equal `width * height`
    pub fn from_indices(width: u32, height: u32, indices: Vec<u8>) -> Self {
        assert_eq!(
            indices.len(),
            width as usize * height as usize,
            "index buffer does not match dimensions"
        );
        Self {
            width,
            height,
            indices,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[u8] {
        &self.indices
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.indices[self.offset(x, y)]
    }

    #[inline]
    pub fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Number of opaque pixels carrying `color_index`
    pub fn count(&self, color_index: u8) -> usize {
        self.indices.iter().filter(|&&i| i == color_index).count()
    }
}

/// Index of the palette entry nearest to `rgb` by squared RGB distance,
/// with the distance itself. Ties keep the lowest index.
///
/// Only the first 255 entries are considered; index 255 is [`TRANSPARENT`].
pub fn nearest_index(rgb: Rgb, palette: &Palette) -> (u8, u32) {
    let mut best = 0usize;
    let mut best_distance = u32::MAX;
    let usable = palette.entries().iter().take(TRANSPARENT as usize);
    for (i, entry) in usable.enumerate() {
        let d = rgb.distance_sq(&entry.rgb);
        if d < best_distance {
            best_distance = d;
            best = i;
        }
    }
    (best as u8, best_distance)
}

/// Assign every opaque pixel the index of its nearest palette color
///
/// Pixels with alpha below 128 map to [`TRANSPARENT`]. Each output entry
/// depends only on its own source pixel, so the pass runs in parallel.
pub fn classify_pixels(image: &RgbaImage, palette: &Palette) -> ColorIndexMap {
    let (width, height) = image.dimensions();
    let indices: Vec<u8> = if palette.is_empty() {
        vec![TRANSPARENT; width as usize * height as usize]
    } else {
        image
            .as_raw()
            .par_chunks_exact(4)
            .map(|px| {
                if px[3] < OPAQUE_ALPHA {
                    TRANSPARENT
                } else {
                    nearest_index(Rgb::new(px[0], px[1], px[2]), palette).0
                }
            })
            .collect()
    };

    ColorIndexMap::from_indices(width, height, indices)
}
