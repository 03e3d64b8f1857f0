//! Staged processing run
//!
//! One run turns an RGBA image into a rendered layer stack:
//! 1. Build a k-color palette from the opaque pixels
//! 2. Classify every pixel to its nearest palette entry
//! 3. Extract size-enforced regions
//! 4. Denoise the index map and extract regions again
//! 5. Build stacked masks and render one raster per layer
//!
//! [`PipelineRun`] executes one stage per `next()` call and yields a
//! [`ProgressEvent`] after each, so a host can repaint between stages.

use image::{ImageReader, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

use crate::error::LayerError;
use crate::export::{Manifest, preview_png, write_layers};
use crate::layers::{LayerStack, build_stack_masks};
use crate::pool::RasterPool;
use crate::quantize::{
    ColorIndexMap, MAX_COLORS, MIN_COLORS, OPAQUE_ALPHA, Palette, build_palette, classify_pixels,
};
use crate::segment::{Region, Segmentation, clean_features, extract_regions};

/// Percentages reported by a complete run, in order
pub const PROGRESS_STEPS: [u8; 9] = [10, 30, 50, 70, 80, 90, 95, 98, 100];

/// Parameters for one processing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessOptions {
    /// Number of palette colors, 2..=12 (default: 6)
    pub color_count: usize,
    /// Smallest region kept as its own color, in pixels (default: 100)
    pub min_region_size: usize,
    /// Denoise radius; 1 or less disables cleaning (default: 4)
    pub min_feature_size: usize,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            color_count: 6,
            min_region_size: 100,
            min_feature_size: 4,
        }
    }
}

impl ProcessOptions {
    pub fn validate(&self) -> Result<(), LayerError> {
        if !(MIN_COLORS..=MAX_COLORS).contains(&self.color_count) {
            return Err(LayerError::InvalidColorCount {
                got: self.color_count,
                min: MIN_COLORS,
                max: MAX_COLORS,
            });
        }
        Ok(())
    }

    /// Parse options from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, LayerError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LayerError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub percent: u8,
    pub message: String,
}

impl ProgressEvent {
    fn new(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent,
            message: message.into(),
        }
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub palette: Palette,
    /// Cleaned, size-enforced index map the layers were built from
    pub index_map: ColorIndexMap,
    pub regions: Vec<Region>,
    pub stack: LayerStack,
}

enum Progress {
    Start,
    Prepared,
    Quantized(Palette),
    Classified(Palette, ColorIndexMap),
    Extracted(Palette, Segmentation),
    Cleaned(Palette, ColorIndexMap),
    Segmented(Palette, Segmentation),
    Stacked(Palette, Segmentation, LayerStack),
    Rendered(Palette, Segmentation, LayerStack),
    Finished(ProcessResult),
    Taken,
}

/// An in-flight run; iterate it to execute the stages
pub struct PipelineRun<'a> {
    image: &'a RgbaImage,
    options: ProcessOptions,
    state: Progress,
}

impl<'a> PipelineRun<'a> {
    /// Validate inputs and set up a run; no stage executes yet
    pub fn new(image: &'a RgbaImage, options: &ProcessOptions) -> Result<Self, LayerError> {
        options.validate()?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(LayerError::EmptyImage { width, height });
        }

        Ok(Self {
            image,
            options: *options,
            state: Progress::Start,
        })
    }

    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, Progress::Finished(_))
    }

    /// Run any remaining stages and return the result
    pub fn into_result(mut self) -> ProcessResult {
        loop {
            if let Progress::Finished(result) = self.state {
                return result;
            }
            self.advance();
        }
    }

    fn advance(&mut self) -> Option<ProgressEvent> {
        let options = self.options;
        let (state, event) = match std::mem::replace(&mut self.state, Progress::Taken) {
            Progress::Start => {
                let opaque = self
                    .image
                    .pixels()
                    .filter(|p| p[3] >= OPAQUE_ALPHA)
                    .count();
                tracing::debug!(
                    width = self.image.width(),
                    height = self.image.height(),
                    opaque,
                    "Image prepared"
                );
                (Progress::Prepared, ProgressEvent::new(10, "Preparing image"))
            }
            Progress::Prepared => {
                let palette = build_palette(self.image, options.color_count);
                let message = format!("Built palette of {} colors", palette.len());
                (Progress::Quantized(palette), ProgressEvent::new(30, message))
            }
            Progress::Quantized(palette) => {
                let map = classify_pixels(self.image, &palette);
                (
                    Progress::Classified(palette, map),
                    ProgressEvent::new(50, "Classified pixels"),
                )
            }
            Progress::Classified(palette, map) => {
                let segmentation = extract_regions(&map, options.min_region_size);
                let message = format!("Extracted {} regions", segmentation.regions.len());
                (
                    Progress::Extracted(palette, segmentation),
                    ProgressEvent::new(70, message),
                )
            }
            Progress::Extracted(palette, segmentation) => {
                let cleaned = clean_features(&segmentation.index_map, options.min_feature_size);
                (
                    Progress::Cleaned(palette, cleaned),
                    ProgressEvent::new(80, "Cleaned small features"),
                )
            }
            Progress::Cleaned(palette, map) => {
                let segmentation = extract_regions(&map, options.min_region_size);
                let message = format!("Refined to {} regions", segmentation.regions.len());
                (
                    Progress::Segmented(palette, segmentation),
                    ProgressEvent::new(90, message),
                )
            }
            Progress::Segmented(palette, segmentation) => {
                let stack = build_stack_masks(&segmentation, &palette);
                (
                    Progress::Stacked(palette, segmentation, stack),
                    ProgressEvent::new(95, "Built layer masks"),
                )
            }
            Progress::Stacked(palette, segmentation, mut stack) => {
                stack.render_all();
                (
                    Progress::Rendered(palette, segmentation, stack),
                    ProgressEvent::new(98, "Rendered layers"),
                )
            }
            Progress::Rendered(palette, segmentation, stack) => {
                let message = format!("Done: {} layers", stack.len());
                let Segmentation { regions, index_map } = segmentation;
                let result = ProcessResult {
                    palette,
                    index_map,
                    regions,
                    stack,
                };
                (Progress::Finished(result), ProgressEvent::new(100, message))
            }
            finished @ (Progress::Finished(_) | Progress::Taken) => {
                self.state = finished;
                return None;
            }
        };

        self.state = state;
        tracing::debug!(percent = event.percent, "{}", event.message);
        Some(event)
    }
}

impl Iterator for PipelineRun<'_> {
    type Item = ProgressEvent;

    fn next(&mut self) -> Option<ProgressEvent> {
        self.advance()
    }
}

/// Owns the reusable buffers shared by runs and previews
#[derive(Debug, Default)]
pub struct LayerPipeline {
    pool: RasterPool,
}

impl LayerPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(&self) -> &RasterPool {
        &self.pool
    }

    /// Start a staged run over `image`
    pub fn run<'a>(
        &self,
        image: &'a RgbaImage,
        options: &ProcessOptions,
    ) -> Result<PipelineRun<'a>, LayerError> {
        PipelineRun::new(image, options)
    }

    /// Run every stage, reporting each progress event to `on_progress`
    pub fn process(
        &self,
        image: &RgbaImage,
        options: &ProcessOptions,
        mut on_progress: impl FnMut(&ProgressEvent),
    ) -> Result<ProcessResult, LayerError> {
        tracing::info!(
            width = image.width(),
            height = image.height(),
            colors = options.color_count,
            min_region_size = options.min_region_size,
            min_feature_size = options.min_feature_size,
            "Processing image"
        );

        let mut run = self.run(image, options)?;
        for event in run.by_ref() {
            on_progress(&event);
        }
        let result = run.into_result();

        tracing::info!(
            layers = result.stack.len(),
            regions = result.regions.len(),
            "Processing complete"
        );
        Ok(result)
    }

    /// Composite the stack as seen from the front and encode it as PNG
    pub fn render_preview(&self, stack: &LayerStack) -> Result<Vec<u8>, LayerError> {
        preview_png(stack, &self.pool)
    }

    /// Write layer PNGs, preview and manifest into `dir`
    pub fn export(
        &self,
        dir: &Path,
        stack: &LayerStack,
        options: &ProcessOptions,
    ) -> Result<Manifest, LayerError> {
        write_layers(dir, stack, options, &self.pool)
    }
}

/// Decode an image from bytes (PNG or JPEG)
pub fn load_image(bytes: &[u8]) -> Result<RgbaImage, LayerError> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| LayerError::Decode(format!("Failed to guess image format: {}", e)))?
        .decode()
        .map_err(|e| LayerError::Decode(e.to_string()))?;
    Ok(image.to_rgba8())
}

/// Read and decode an image file
pub fn load_image_file(path: impl AsRef<Path>) -> Result<RgbaImage, LayerError> {
    let bytes = std::fs::read(path)?;
    load_image(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::encode_png;
    use image::Rgba;

    fn two_tone(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgba([220, 30, 30, 255])
            } else {
                Rgba([30, 30, 220, 255])
            }
        })
    }

    fn small_options() -> ProcessOptions {
        ProcessOptions {
            color_count: 2,
            min_region_size: 4,
            min_feature_size: 1,
        }
    }

    #[test]
    fn test_default_options() {
        let options = ProcessOptions::default();
        assert_eq!(options.color_count, 6);
        assert_eq!(options.min_region_size, 100);
        assert_eq!(options.min_feature_size, 4);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_color_count() {
        for color_count in [0, 1, 13] {
            let options = ProcessOptions {
                color_count,
                ..Default::default()
            };
            assert!(matches!(
                options.validate(),
                Err(LayerError::InvalidColorCount { min: 2, max: 12, .. })
            ));
        }
    }

    #[test]
    fn test_options_json_uses_camel_case_and_defaults() {
        let options = ProcessOptions::from_json(r#"{"colorCount": 3, "minFeatureSize": 2}"#).unwrap();
        assert_eq!(options.color_count, 3);
        assert_eq!(options.min_region_size, 100);
        assert_eq!(options.min_feature_size, 2);

        let json = serde_json::to_string(&options).unwrap();
        assert!(json.contains("\"minRegionSize\":100"));
    }

    #[test]
    fn test_bad_json_is_config_error() {
        assert!(matches!(
            ProcessOptions::from_json("{not json"),
            Err(LayerError::Config(_))
        ));
    }

    #[test]
    fn test_run_yields_every_stage_in_order() {
        let image = two_tone(8, 4);
        let run = PipelineRun::new(&image, &small_options()).unwrap();
        let percents: Vec<u8> = run.map(|e| e.percent).collect();
        assert_eq!(percents, PROGRESS_STEPS.to_vec());
    }

    #[test]
    fn test_one_stage_per_step() {
        let image = two_tone(8, 4);
        let mut run = PipelineRun::new(&image, &small_options()).unwrap();
        assert_eq!(run.next().map(|e| e.percent), Some(10));
        assert!(!run.is_finished());

        let result = run.into_result();
        assert_eq!(result.stack.len(), 2);
        assert_eq!(result.regions.len(), 2);
    }

    #[test]
    fn test_exhausted_run_stays_finished() {
        let image = two_tone(4, 2);
        let mut run = PipelineRun::new(&image, &small_options()).unwrap();
        run.by_ref().for_each(drop);
        assert!(run.is_finished());
        assert_eq!(run.next(), None);
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let image = RgbaImage::new(0, 3);
        assert!(matches!(
            PipelineRun::new(&image, &ProcessOptions::default()),
            Err(LayerError::EmptyImage {
                width: 0,
                height: 3
            })
        ));
    }

    #[test]
    fn test_process_reports_progress() {
        let image = two_tone(8, 4);
        let pipeline = LayerPipeline::new();
        let mut seen = Vec::new();
        let result = pipeline
            .process(&image, &small_options(), |e| seen.push(e.percent))
            .unwrap();

        assert_eq!(seen, PROGRESS_STEPS.to_vec());
        assert!(result.stack.is_well_stacked());
        assert_eq!(result.index_map.len(), 32);
    }

    #[test]
    fn test_preview_reuses_pooled_buffer() {
        let image = two_tone(6, 2);
        let pipeline = LayerPipeline::new();
        let result = pipeline.process(&image, &small_options(), |_| {}).unwrap();

        let first = pipeline.render_preview(&result.stack).unwrap();
        let second = pipeline.render_preview(&result.stack).unwrap();
        assert_eq!(first, second);
        assert_eq!(pipeline.pool().allocations(), 1);
        assert_eq!(pipeline.pool().available(), 1);
    }

    #[test]
    fn test_load_image_rejects_garbage() {
        assert!(matches!(
            load_image(b"definitely not an image"),
            Err(LayerError::Decode(_))
        ));
    }

    #[test]
    fn test_load_image_round_trips_png() {
        let image = two_tone(4, 4);
        let bytes = encode_png(&image).unwrap();
        assert_eq!(load_image(&bytes).unwrap(), image);
    }
}
