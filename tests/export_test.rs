//! Integration tests for writing layer stacks to disk

use image::{Rgba, RgbaImage};
use laser_layers::export::{MANIFEST_FILE, PREVIEW_FILE};
use laser_layers::{LayerPipeline, Manifest, ProcessOptions, load_image_file};
use pretty_assertions::assert_eq;

// Left half green, right half white
fn half_and_half() -> RgbaImage {
    RgbaImage::from_fn(12, 6, |x, _| {
        if x < 6 {
            Rgba([0, 200, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    })
}

fn options() -> ProcessOptions {
    ProcessOptions {
        color_count: 2,
        min_region_size: 4,
        min_feature_size: 1,
    }
}

#[test]
fn test_export_writes_layers_preview_and_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("layers");
    let pipeline = LayerPipeline::new();
    let result = pipeline.process(&half_and_half(), &options(), |_| {}).unwrap();

    let manifest = pipeline.export(&out, &result.stack, &options()).unwrap();

    assert!(out.join("layer_00.png").is_file());
    assert!(out.join("layer_01.png").is_file());
    assert!(out.join(PREVIEW_FILE).is_file());
    assert!(out.join(MANIFEST_FILE).is_file());
    assert_eq!(manifest.layers.len(), 2);
    assert_eq!(manifest.layers[1].coverage, 100.0);
    assert_eq!(manifest.layers[1].pixels, 72);
}

#[test]
fn test_manifest_round_trips_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = LayerPipeline::new();
    let result = pipeline.process(&half_and_half(), &options(), |_| {}).unwrap();
    let written = pipeline.export(dir.path(), &result.stack, &options()).unwrap();

    let json = std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
    let read: Manifest = serde_json::from_str(&json).unwrap();
    assert_eq!(read, written);
    assert_eq!(read.options, options());
    assert_eq!((read.width, read.height), (12, 6));
}

#[test]
fn test_exported_rasters_decode_to_layer_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = LayerPipeline::new();
    let result = pipeline.process(&half_and_half(), &options(), |_| {}).unwrap();
    pipeline.export(dir.path(), &result.stack, &options()).unwrap();

    for layer in &result.stack {
        let path = dir.path().join(format!("layer_{:02}.png", layer.position()));
        assert_eq!(&load_image_file(&path).unwrap(), layer.raster());
    }
}

#[test]
fn test_preview_matches_source_colors() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = LayerPipeline::new();
    let source = half_and_half();
    let result = pipeline.process(&source, &options(), |_| {}).unwrap();
    pipeline.export(dir.path(), &result.stack, &options()).unwrap();

    let preview = load_image_file(dir.path().join(PREVIEW_FILE)).unwrap();
    assert_eq!(preview, source);
}
