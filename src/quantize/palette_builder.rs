//! Palette extraction by perceptual histogram-bin merging
//!
//! Pixels are bucketed into a 3-bit-per-channel RGB histogram (512 bins).
//! Bins are visited heaviest first and greedily folded into the nearest
//! existing cluster when it lies within [`MERGE_DELTA_E`] in CIELAB;
//! otherwise they seed a new cluster. The heaviest clusters become the
//! palette, padded with distinct grays when the image has too few colors.

use image::RgbaImage;
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::OPAQUE_ALPHA;
use crate::color::{LabColor, Rgb, delta_e, rgb_to_lab};

/// Smallest supported palette
pub const MIN_COLORS: usize = 2;
/// Largest supported palette
pub const MAX_COLORS: usize = 12;
/// Bins closer than this (ΔE76) to a cluster are folded into it
pub const MERGE_DELTA_E: f32 = 15.0;

const BIN_BITS: u32 = 3;
const BIN_COUNT: usize = 1 << (3 * BIN_BITS);
const MAX_GRAY_ATTEMPTS: usize = 256;

/// One palette color with its cached CIELAB value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaletteEntry {
    pub rgb: Rgb,
    pub lab: LabColor,
}

impl PaletteEntry {
    pub fn new(rgb: Rgb) -> Self {
        Self {
            rgb,
            lab: rgb_to_lab(rgb),
        }
    }
}

/// Ordered set of representative colors; index 0 is the heaviest cluster
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Palette {
    entries: Vec<PaletteEntry>,
}

impl Palette {
    pub fn from_colors<I>(colors: I) -> Self
    where
        I: IntoIterator<Item = Rgb>,
    {
        Self {
            entries: colors.into_iter().map(PaletteEntry::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PaletteEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[PaletteEntry] {
        &self.entries
    }

    pub fn colors(&self) -> impl Iterator<Item = Rgb> + '_ {
        self.entries.iter().map(|e| e.rgb)
    }

    pub fn contains(&self, rgb: Rgb) -> bool {
        self.entries.iter().any(|e| e.rgb == rgb)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Bin {
    sum_r: u64,
    sum_g: u64,
    sum_b: u64,
    count: u64,
}

impl Bin {
    fn average(&self) -> Rgb {
        average_rgb(self.sum_r, self.sum_g, self.sum_b, self.count)
    }
}

/// Running weighted average of the bins folded into it
#[derive(Debug, Clone)]
struct Cluster {
    sum_r: u64,
    sum_g: u64,
    sum_b: u64,
    weight: u64,
    rgb: Rgb,
    lab: LabColor,
}

impl Cluster {
    fn seed(bin: &Bin) -> Self {
        let rgb = bin.average();
        Self {
            sum_r: bin.sum_r,
            sum_g: bin.sum_g,
            sum_b: bin.sum_b,
            weight: bin.count,
            rgb,
            lab: rgb_to_lab(rgb),
        }
    }

    fn absorb(&mut self, bin: &Bin) {
        self.sum_r += bin.sum_r;
        self.sum_g += bin.sum_g;
        self.sum_b += bin.sum_b;
        self.weight += bin.count;
        self.rgb = average_rgb(self.sum_r, self.sum_g, self.sum_b, self.weight);
        self.lab = rgb_to_lab(self.rgb);
    }
}

fn average_rgb(sum_r: u64, sum_g: u64, sum_b: u64, count: u64) -> Rgb {
    if count == 0 {
        return Rgb::BLACK;
    }
    let mean = |sum: u64| ((sum + count / 2) / count).min(255) as u8;
    Rgb::new(mean(sum_r), mean(sum_g), mean(sum_b))
}

#[inline]
fn bin_index(r: u8, g: u8, b: u8) -> usize {
    let shift = 8 - BIN_BITS;
    (((r >> shift) as usize) << (2 * BIN_BITS))
        | (((g >> shift) as usize) << BIN_BITS)
        | ((b >> shift) as usize)
}

fn build_histogram(image: &RgbaImage) -> Vec<Bin> {
    let mut bins = vec![Bin::default(); BIN_COUNT];
    for px in image.pixels() {
        let [r, g, b, a] = px.0;
        if a < OPAQUE_ALPHA {
            continue;
        }
        let bin = &mut bins[bin_index(r, g, b)];
        bin.sum_r += r as u64;
        bin.sum_g += g as u64;
        bin.sum_b += b as u64;
        bin.count += 1;
    }
    bins
}

/// Greedy merge of weight-sorted bins into perceptual clusters
fn merge_bins(bins: &[Bin]) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();

    for bin in bins {
        let lab = rgb_to_lab(bin.average());
        let nearest = clusters
            .iter()
            .enumerate()
            .map(|(i, c)| (i, delta_e(&lab, &c.lab)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((i, distance)) if distance < MERGE_DELTA_E => clusters[i].absorb(bin),
            _ => clusters.push(Cluster::seed(bin)),
        }
    }

    clusters.sort_by(|a, b| b.weight.cmp(&a.weight));
    clusters
}

/// Build a palette of exactly `k` colors from the opaque pixels of `image`
///
/// Never fails: a fully transparent image yields `k` evenly spaced grays and
/// an image with fewer than `k` distinct clusters is padded with grays.
/// `k` above [`MAX_COLORS`] is clamped to it.
pub fn build_palette(image: &RgbaImage, k: usize) -> Palette {
    let k = k.min(MAX_COLORS);
    let mut bins: Vec<Bin> = build_histogram(image)
        .into_iter()
        .filter(|b| b.count > 0)
        .collect();

    if bins.is_empty() {
        tracing::warn!(colors = k, "No opaque pixels, using grayscale palette");
        return Palette::from_colors(evenly_spaced_grays(k));
    }

    bins.sort_by(|a, b| b.count.cmp(&a.count));
    let clusters = merge_bins(&bins);

    let mut colors: Vec<Rgb> = clusters.iter().take(k).map(|c| c.rgb).collect();
    if colors.len() < k {
        tracing::debug!(
            clusters = clusters.len(),
            colors = k,
            "Padding palette with grays"
        );
        pad_with_grays(&mut colors, k);
    }

    tracing::debug!(
        bins = bins.len(),
        clusters = clusters.len(),
        colors = colors.len(),
        "Palette built"
    );
    Palette::from_colors(colors)
}

/// `k` grays spaced evenly across [0, 255]
pub fn evenly_spaced_grays(k: usize) -> Vec<Rgb> {
    match k {
        0 => Vec::new(),
        1 => vec![Rgb::gray(128)],
        _ => (0..k)
            .map(|i| Rgb::gray((255 * i / (k - 1)) as u8))
            .collect(),
    }
}

fn pad_with_grays(colors: &mut Vec<Rgb>, k: usize) {
    let missing = k - colors.len();
    for (slot, target) in evenly_spaced_grays(missing).into_iter().enumerate() {
        let gray = unique_gray(colors, target.r, slot as u64);
        colors.push(gray);
    }
}

/// Nearest gray to `target` not already in `existing`, searching outward
/// one step at a time; falls back to a seeded random gray.
fn unique_gray(existing: &[Rgb], target: u8, seed: u64) -> Rgb {
    for attempt in 0..MAX_GRAY_ATTEMPTS {
        let step = attempt.div_ceil(2) as i32;
        let offset = if attempt % 2 == 1 { step } else { -step };
        let value = target as i32 + offset;
        if !(0..=255).contains(&value) {
            continue;
        }
        let candidate = Rgb::gray(value as u8);
        if !existing.contains(&candidate) {
            return candidate;
        }
    }

    let mut rng = StdRng::seed_from_u64(seed ^ target as u64);
    Rgb::gray(rng.r#gen::<u8>())
}
