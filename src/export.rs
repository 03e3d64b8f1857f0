//! Writes a layer stack to disk
//!
//! Output directory layout:
//! - `layer_00.png`, `layer_01.png`, ... front to base
//! - `preview.png`, the stack composited as seen from the front
//! - `manifest.json`, dimensions, options and per-layer metadata

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::LayerError;
use crate::layers::{LayerStack, encode_png};
use crate::pipeline::ProcessOptions;
use crate::pool::RasterPool;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const PREVIEW_FILE: &str = "preview.png";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerEntry {
    pub position: usize,
    pub color: String,
    pub coverage: f64,
    pub file: String,
    /// Pixels set in the stacked mask
    pub pixels: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub width: u32,
    pub height: u32,
    pub options: ProcessOptions,
    pub preview: String,
    pub layers: Vec<LayerEntry>,
}

impl Manifest {
    pub fn describe(stack: &LayerStack, options: &ProcessOptions) -> Self {
        let layers = stack
            .iter()
            .map(|layer| LayerEntry {
                position: layer.position(),
                color: layer.color().to_string(),
                coverage: layer.coverage(),
                file: layer_file_name(layer.position()),
                pixels: layer.stacked_mask().count_ones(),
            })
            .collect();

        Self {
            width: stack.width(),
            height: stack.height(),
            options: *options,
            preview: PREVIEW_FILE.to_string(),
            layers,
        }
    }
}

pub fn layer_file_name(position: usize) -> String {
    format!("layer_{:02}.png", position)
}

/// Composite `stack` into a pooled buffer and encode it as PNG
pub fn preview_png(stack: &LayerStack, pool: &RasterPool) -> Result<Vec<u8>, LayerError> {
    let mut canvas = pool.acquire(stack.width(), stack.height());
    stack.composite_into(&mut canvas);
    encode_png(&canvas)
}

/// Write every layer raster, the preview and the manifest into `dir`,
/// creating it if needed
pub fn write_layers(
    dir: &Path,
    stack: &LayerStack,
    options: &ProcessOptions,
    pool: &RasterPool,
) -> Result<Manifest, LayerError> {
    fs::create_dir_all(dir)?;
    let manifest = Manifest::describe(stack, options);

    for (layer, entry) in stack.iter().zip(&manifest.layers) {
        fs::write(dir.join(&entry.file), layer.encode_png()?)?;
        tracing::debug!(file = %entry.file, color = %entry.color, coverage = entry.coverage, "Layer written");
    }

    fs::write(dir.join(PREVIEW_FILE), preview_png(stack, pool)?)?;

    let json = serde_json::to_string_pretty(&manifest).map_err(LayerError::Manifest)?;
    fs::write(dir.join(MANIFEST_FILE), json)?;

    tracing::info!(
        layers = manifest.layers.len(),
        dir = %dir.display(),
        "Export complete"
    );
    Ok(manifest)
}
