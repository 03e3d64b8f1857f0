//! # laser-layers
//!
//! Decomposes a photo into an ordered stack of single-color layers for
//! multi-layer laser-cut acrylic.
//!
//! ## Features
//!
//! - **Palette**: perceptual (CIELAB) histogram clustering down to 2-12 colors
//! - **Segmentation**: 8-connected regions with a minimum region size
//! - **Cleanup**: edge-preserving weighted-vote denoise
//! - **Layers**: stacked masks, per-layer rasters and coverage
//! - **Editing**: recolor, reorder and merge with undo/redo
//!
//! ## Example - Processing
//!
//! ```rust,ignore
//! use laser_layers::{LayerPipeline, ProcessOptions, load_image_file};
//!
//! let image = load_image_file("photo.jpg").unwrap();
//! let pipeline = LayerPipeline::new();
//! let result = pipeline
//!     .process(&image, &ProcessOptions::default(), |e| println!("{}% {}", e.percent, e.message))
//!     .unwrap();
//! pipeline.export("out".as_ref(), &result.stack, &ProcessOptions::default()).unwrap();
//! ```
//!
//! ## Example - Editing
//!
//! ```rust,ignore
//! use laser_layers::LayerStackEditor;
//!
//! let mut editor = LayerStackEditor::new(result.stack);
//! editor.recolor(0, "#C0FFEE").unwrap();
//! editor.reorder(&[1, 0, 2, 3, 4, 5]).unwrap();
//! editor.merge(2, 3).unwrap();
//! editor.undo();
//! ```

pub mod color;
pub mod error;
pub mod export;
pub mod layers;
pub mod pipeline;
pub mod pool;
pub mod quantize;
pub mod segment;

// Re-export commonly used items
pub use color::{LabColor, Rgb, delta_e, rgb_to_lab};
pub use error::{ColorParseError, EditError, LayerError};
pub use export::{Manifest, write_layers};
pub use layers::{Layer, LayerStack, LayerStackEditor, MergeState, PixelMask, Selection};
pub use pipeline::{
    LayerPipeline, PROGRESS_STEPS, PipelineRun, ProcessOptions, ProcessResult, ProgressEvent,
    load_image, load_image_file,
};
pub use pool::{PooledRaster, RasterPool};
pub use quantize::{ColorIndexMap, Palette, build_palette, classify_pixels};
pub use segment::{Region, Segmentation, clean_features, extract_regions};
