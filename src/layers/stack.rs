//! Stacked layer construction and rendering
//!
//! Layer 0 is the front of the cut stack and the last layer is the base
//! plate. Each layer's stacked mask is the union of its own pixels with
//! every layer in front of it, so masks only grow toward the base, and the
//! base always covers the whole canvas.

use image::{ImageFormat, Rgba, RgbaImage};
use rayon::prelude::*;
use std::io::Cursor;

use super::mask::PixelMask;
use crate::color::Rgb;
use crate::error::LayerError;
use crate::quantize::Palette;
use crate::segment::Segmentation;

/// Color used when a layer's color string cannot be parsed
pub const DEFAULT_LAYER_COLOR: Rgb = Rgb::BLACK;

const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// One colored slab of the cut stack
#[derive(Debug, Clone)]
pub struct Layer {
    position: usize,
    color: String,
    original_mask: PixelMask,
    stacked_mask: PixelMask,
    coverage: f64,
    raster: RgbaImage,
    fallback_color: bool,
}

impl Layer {
    /// A layer owning `original_mask`, not yet stacked or rendered; the
    /// raster stays empty until the first render
    pub fn new(color: impl Into<String>, original_mask: PixelMask) -> Self {
        Self {
            position: 0,
            color: color.into(),
            stacked_mask: original_mask.clone(),
            original_mask,
            coverage: 0.0,
            raster: RgbaImage::new(0, 0),
            fallback_color: false,
        }
    }

    /// Index in the stack, 0 = front
    pub fn position(&self) -> usize {
        self.position
    }

    /// Display color as given by the user or palette, e.g. `#FF0000`
    pub fn color(&self) -> &str {
        &self.color
    }

    /// Pixels natively this layer's color after cleanup
    pub fn original_mask(&self) -> &PixelMask {
        &self.original_mask
    }

    /// Original mask united with every layer in front of this one
    pub fn stacked_mask(&self) -> &PixelMask {
        &self.stacked_mask
    }

    /// Percentage of the canvas covered by the stacked mask
    pub fn coverage(&self) -> f64 {
        self.coverage
    }

    /// Rendered raster; 0x0 before the stack is rendered
    pub fn raster(&self) -> &RgbaImage {
        &self.raster
    }

    /// True when the last render could not parse the color string
    pub fn used_fallback_color(&self) -> bool {
        self.fallback_color
    }

    /// Parsed display color, or [`DEFAULT_LAYER_COLOR`] if malformed
    pub fn resolved_color(&self) -> Rgb {
        Rgb::from_hex(&self.color).unwrap_or(DEFAULT_LAYER_COLOR)
    }

    /// Encode the rendered raster as PNG
    pub fn encode_png(&self) -> Result<Vec<u8>, LayerError> {
        encode_png(&self.raster)
    }

    pub(crate) fn set_color(&mut self, color: String) {
        self.color = color;
    }

    pub(crate) fn into_parts(self) -> (String, PixelMask) {
        (self.color, self.original_mask)
    }

    /// Re-render the raster from the current stacked mask and color
    pub(crate) fn render(&mut self) {
        let color = match Rgb::from_hex(&self.color) {
            Ok(c) => {
                self.fallback_color = false;
                c
            }
            Err(e) => {
                tracing::warn!(
                    layer = self.position,
                    color = %self.color,
                    error = %e,
                    "Invalid layer color, rendering with default"
                );
                self.fallback_color = true;
                DEFAULT_LAYER_COLOR
            }
        };

        let fill: Rgba<u8> = color.into();
        let mask = &self.stacked_mask;
        self.raster = RgbaImage::from_fn(mask.width(), mask.height(), |x, y| {
            if mask.get_xy(x, y) { fill } else { CLEAR }
        });
    }
}

/// Ordered layers over one canvas; index 0 is the front
#[derive(Debug, Clone)]
pub struct LayerStack {
    width: u32,
    height: u32,
    layers: Vec<Layer>,
}

impl LayerStack {
    /// Stack and render `layers` in the given order
    pub fn from_layers(width: u32, height: u32, layers: Vec<Layer>) -> Self {
        let mut stack = Self::unrendered(width, height, layers);
        stack.render_all();
        stack
    }

    /// Stack `layers` and compute coverage without rendering rasters
    pub fn unrendered(width: u32, height: u32, layers: Vec<Layer>) -> Self {
        let mut stack = Self {
            width,
            height,
            layers,
        };
        stack.restack();
        stack
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn get(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Layer> {
        self.layers.iter()
    }

    pub(crate) fn layers_mut(&mut self) -> &mut Vec<Layer> {
        &mut self.layers
    }

    /// Rebuild every stacked mask from the original masks in current order,
    /// force the base to full coverage, and refresh coverage and positions
    pub(crate) fn restack(&mut self) {
        let mut running = PixelMask::new(self.width, self.height);
        let last = self.layers.len().saturating_sub(1);

        for (i, layer) in self.layers.iter_mut().enumerate() {
            running.union_with(&layer.original_mask);
            layer.position = i;
            layer.stacked_mask = if i == last {
                PixelMask::full(self.width, self.height)
            } else {
                running.clone()
            };
            layer.coverage = layer.stacked_mask.coverage_percent();
        }
    }

    /// Re-render every layer raster; a bad color only affects its own layer
    pub fn render_all(&mut self) {
        self.layers.par_iter_mut().for_each(Layer::render);
    }

    /// Full recompute after the order or membership of layers changed
    pub(crate) fn recompute(&mut self) {
        self.restack();
        self.render_all();
    }

    /// True when stacked masks grow monotonically toward a full base
    pub fn is_well_stacked(&self) -> bool {
        let nested = self
            .layers
            .windows(2)
            .all(|w| w[0].stacked_mask.is_subset_of(&w[1].stacked_mask));
        let base_full = self.layers.last().is_none_or(|l| l.stacked_mask.is_full());
        nested && base_full
    }

    /// Paint the stack as seen from the front onto `canvas`, which is
    /// cleared first and must match the stack dimensions
    pub fn composite_into(&self, canvas: &mut RgbaImage) {
        for px in canvas.pixels_mut() {
            *px = CLEAR;
        }
        for layer in self.layers.iter().rev() {
            for (dst, src) in canvas.pixels_mut().zip(layer.raster.pixels()) {
                if src[3] != 0 {
                    *dst = *src;
                }
            }
        }
    }
}

impl<'a> IntoIterator for &'a LayerStack {
    type Item = &'a Layer;
    type IntoIter = std::slice::Iter<'a, Layer>;

    fn into_iter(self) -> Self::IntoIter {
        self.layers.iter()
    }
}

/// One original mask per palette color, in palette order
pub fn original_masks(segmentation: &Segmentation, palette: &Palette) -> Vec<PixelMask> {
    let map = &segmentation.index_map;
    let mut masks = vec![PixelMask::new(map.width(), map.height()); palette.len()];
    for region in &segmentation.regions {
        if let Some(mask) = masks.get_mut(region.color_index as usize) {
            for &p in &region.pixels {
                mask.set(p);
            }
        }
    }
    masks
}

/// Build the stacked layers for `segmentation` without rendering rasters
pub fn build_stack_masks(segmentation: &Segmentation, palette: &Palette) -> LayerStack {
    let map = &segmentation.index_map;
    let layers = palette
        .colors()
        .zip(original_masks(segmentation, palette))
        .map(|(color, mask)| Layer::new(color.to_hex(), mask))
        .collect();
    let stack = LayerStack::unrendered(map.width(), map.height(), layers);

    tracing::debug!(
        layers = stack.len(),
        coverage = ?stack.iter().map(|l| l.coverage().round()).collect::<Vec<_>>(),
        "Layer masks built"
    );
    stack
}

/// Build and render the full layer stack, one layer per palette color
pub fn build_layer_stack(segmentation: &Segmentation, palette: &Palette) -> LayerStack {
    let mut stack = build_stack_masks(segmentation, palette);
    stack.render_all();
    stack
}

pub(crate) fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, LayerError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| LayerError::PngEncode(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(color: &str, width: u32, height: u32, pixels: &[usize]) -> Layer {
        Layer::new(color, PixelMask::from_pixels(width, height, pixels.iter().copied()))
    }

    #[test]
    fn test_stacked_masks_accumulate() {
        let stack = LayerStack::from_layers(
            2,
            2,
            vec![
                layer("#FF0000", 2, 2, &[0]),
                layer("#00FF00", 2, 2, &[1]),
                layer("#0000FF", 2, 2, &[2]),
            ],
        );

        let ones: Vec<Vec<usize>> = stack
            .iter()
            .map(|l| l.stacked_mask().iter_ones().collect())
            .collect();
        assert_eq!(ones, vec![vec![0], vec![0, 1], vec![0, 1, 2, 3]]);
        assert_eq!(stack.get(0).unwrap().coverage(), 25.0);
        assert_eq!(stack.get(1).unwrap().coverage(), 50.0);
        assert_eq!(stack.get(2).unwrap().coverage(), 100.0);
        assert!(stack.is_well_stacked());
    }

    #[test]
    fn test_positions_follow_order() {
        let stack = LayerStack::from_layers(
            1,
            1,
            vec![layer("#000000", 1, 1, &[]), layer("#FFFFFF", 1, 1, &[0])],
        );
        let positions: Vec<usize> = stack.iter().map(Layer::position).collect();
        assert_eq!(positions, vec![0, 1]);
    }

    #[test]
    fn test_render_uses_stacked_mask() {
        let stack = LayerStack::from_layers(
            2,
            1,
            vec![layer("#FF0000", 2, 1, &[0]), layer("#0000FF", 2, 1, &[])],
        );
        let front = stack.get(0).unwrap().raster();
        assert_eq!(front.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(front.get_pixel(1, 0), &Rgba([0, 0, 0, 0]));

        let base = stack.get(1).unwrap().raster();
        assert_eq!(base.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(base.get_pixel(1, 0), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_malformed_color_falls_back_without_aborting() {
        let stack = LayerStack::from_layers(
            1,
            1,
            vec![layer("not-a-color", 1, 1, &[0]), layer("#00FF00", 1, 1, &[])],
        );
        let bad = stack.get(0).unwrap();
        assert!(bad.used_fallback_color());
        assert_eq!(bad.raster().get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(bad.resolved_color(), DEFAULT_LAYER_COLOR);

        let good = stack.get(1).unwrap();
        assert!(!good.used_fallback_color());
        assert_eq!(good.raster().get_pixel(0, 0), &Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_composite_shows_front_layer() {
        let stack = LayerStack::from_layers(
            2,
            1,
            vec![layer("#FF0000", 2, 1, &[1]), layer("#0000FF", 2, 1, &[0])],
        );
        let mut canvas = RgbaImage::from_pixel(2, 1, Rgba([9, 9, 9, 9]));
        stack.composite_into(&mut canvas);
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(canvas.get_pixel(1, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_encode_png_signature() {
        let stack = LayerStack::from_layers(1, 1, vec![layer("#123456", 1, 1, &[0])]);
        let png = stack.get(0).unwrap().encode_png().unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn test_raster_allocated_on_render() {
        let layer = layer("#FF0000", 4, 3, &[0]);
        assert_eq!(layer.raster().dimensions(), (0, 0));

        let mut stack = LayerStack::unrendered(4, 3, vec![layer]);
        assert_eq!(stack.get(0).unwrap().raster().dimensions(), (0, 0));
        stack.render_all();
        assert_eq!(stack.get(0).unwrap().raster().dimensions(), (4, 3));
    }

    #[test]
    fn test_single_layer_is_base() {
        let stack = LayerStack::from_layers(3, 3, vec![layer("#ABCDEF", 3, 3, &[4])]);
        assert_eq!(stack.get(0).unwrap().coverage(), 100.0);
        assert!(stack.is_well_stacked());
    }
}
