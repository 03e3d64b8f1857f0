//! Connected-component region extraction with minimum-size enforcement
//!
//! Regions are maximal 8-connected runs of one palette index, found with an
//! explicit-stack flood fill. Components smaller than the minimum size are
//! deferred and folded into a neighboring color, largest first; pixels that
//! still have no home inherit the color of the nearest accepted pixel.

use std::collections::BTreeMap;

use crate::quantize::{ColorIndexMap, TRANSPARENT};

/// Smallest window radius used when a small region has no direct neighbors
pub const MIN_SEARCH_RADIUS: usize = 5;
/// Largest window radius used when a small region has no direct neighbors
pub const MAX_SEARCH_RADIUS: usize = 15;
/// Furthest ring searched when resolving leftover pixels
pub const MAX_RING_RADIUS: usize = 24;

const NO_OWNER: u32 = u32::MAX;

const NEIGHBORS_8: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// A set of same-colored pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Palette index shared by every pixel
    pub color_index: u8,
    /// Row-major pixel offsets
    pub pixels: Vec<usize>,
    /// Adjacent palette index -> number of touching neighbor pixels
    pub boundary: BTreeMap<u8, u32>,
}

impl Region {
    pub fn new(color_index: u8) -> Self {
        Self {
            color_index,
            pixels: Vec::new(),
            boundary: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Most frequent adjacent color; ties go to the lower index
    pub fn dominant_neighbor(&self) -> Option<u8> {
        dominant(&self.boundary)
    }

    /// Mean pixel position, or `None` for an empty region
    pub fn centroid(&self, width: u32) -> Option<(f64, f64)> {
        if self.pixels.is_empty() {
            return None;
        }
        let w = width as usize;
        let (sx, sy) = self.pixels.iter().fold((0f64, 0f64), |(sx, sy), &p| {
            (sx + (p % w) as f64, sy + (p / w) as f64)
        });
        let n = self.pixels.len() as f64;
        Some((sx / n, sy / n))
    }
}

/// Result of region extraction: accepted regions and the relabeled index map
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub regions: Vec<Region>,
    pub index_map: ColorIndexMap,
}

impl Segmentation {
    /// Pixels covered by all regions
    pub fn pixel_count(&self) -> usize {
        self.regions.iter().map(Region::len).sum()
    }

    pub fn smallest_region(&self) -> Option<usize> {
        self.regions.iter().map(Region::len).min()
    }
}

fn dominant(histogram: &BTreeMap<u8, u32>) -> Option<u8> {
    let mut best: Option<(u8, u32)> = None;
    for (&color, &count) in histogram {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((color, count));
        }
    }
    best.map(|(color, _)| color)
}

#[inline]
fn neighbors8(idx: usize, width: usize, height: usize) -> impl Iterator<Item = usize> {
    let x = (idx % width) as isize;
    let y = (idx / width) as isize;
    NEIGHBORS_8.iter().filter_map(move |&(dx, dy)| {
        let nx = x + dx;
        let ny = y + dy;
        (nx >= 0 && ny >= 0 && (nx as usize) < width && (ny as usize) < height)
            .then(|| ny as usize * width + nx as usize)
    })
}

struct Extractor {
    width: usize,
    height: usize,
    min_size: usize,
    labels: Vec<u8>,
    /// Accepted region id per pixel, `NO_OWNER` while unassigned
    owner: Vec<u32>,
    regions: Vec<Region>,
}

impl Extractor {
    fn new(map: &ColorIndexMap, min_size: usize) -> Self {
        Self {
            width: map.width() as usize,
            height: map.height() as usize,
            min_size,
            labels: map.indices().to_vec(),
            owner: vec![NO_OWNER; map.len()],
            regions: Vec::new(),
        }
    }

    fn flood_fill(&self, start: usize, scanned: &mut [bool]) -> Region {
        let color = self.labels[start];
        let mut region = Region::new(color);
        let mut stack = vec![start];
        scanned[start] = true;

        while let Some(idx) = stack.pop() {
            region.pixels.push(idx);
            for n in neighbors8(idx, self.width, self.height) {
                let c = self.labels[n];
                if c == TRANSPARENT {
                    continue;
                }
                if c != color {
                    *region.boundary.entry(c).or_insert(0) += 1;
                } else if !scanned[n] {
                    scanned[n] = true;
                    stack.push(n);
                }
            }
        }

        region
    }

    fn accept(&mut self, region: Region) {
        let id = self.regions.len() as u32;
        for &p in &region.pixels {
            self.owner[p] = id;
        }
        self.regions.push(region);
    }

    /// First pass: accept large components, return the small ones
    fn scan_components(&mut self) -> Vec<Region> {
        let mut scanned = vec![false; self.labels.len()];
        let mut deferred = Vec::new();

        for start in 0..self.labels.len() {
            if scanned[start] || self.labels[start] == TRANSPARENT {
                continue;
            }
            let region = self.flood_fill(start, &mut scanned);
            if region.len() < self.min_size {
                deferred.push(region);
            } else {
                self.accept(region);
            }
        }

        deferred
    }

    /// Adjacent colors as they stand now, after earlier merges
    fn current_boundary(&self, pixels: &[usize], color: u8) -> BTreeMap<u8, u32> {
        let mut histogram = BTreeMap::new();
        for &p in pixels {
            for n in neighbors8(p, self.width, self.height) {
                let c = self.labels[n];
                if c != TRANSPARENT && c != color {
                    *histogram.entry(c).or_insert(0) += 1;
                }
            }
        }
        histogram
    }

    /// Dominant color among accepted pixels in a growing window around `center`
    fn search_surrounding(&self, center: (f64, f64)) -> Option<u8> {
        let max_radius = ((self.min_size as f64).sqrt().round() as usize)
            .clamp(MIN_SEARCH_RADIUS, MAX_SEARCH_RADIUS);
        let cx = center.0.round() as isize;
        let cy = center.1.round() as isize;

        for radius in MIN_SEARCH_RADIUS..=max_radius {
            let r = radius as isize;
            let x0 = (cx - r).max(0) as usize;
            let y0 = (cy - r).max(0) as usize;
            let x1 = ((cx + r).max(0) as usize).min(self.width - 1);
            let y1 = ((cy + r).max(0) as usize).min(self.height - 1);

            let mut histogram = BTreeMap::new();
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let idx = y * self.width + x;
                    if self.owner[idx] != NO_OWNER {
                        *histogram.entry(self.labels[idx]).or_insert(0u32) += 1;
                    }
                }
            }
            if let Some(color) = dominant(&histogram) {
                return Some(color);
            }
        }

        None
    }

    /// Accepted region to receive pixels recolored to `target`: the most
    /// common adjacent owner of that color, else any region of that color,
    /// else a new one.
    fn host_for(&mut self, pixels: &[usize], target: u8) -> usize {
        let mut owners: BTreeMap<u32, u32> = BTreeMap::new();
        for &p in pixels {
            for n in neighbors8(p, self.width, self.height) {
                let owner = self.owner[n];
                if owner != NO_OWNER && self.labels[n] == target {
                    *owners.entry(owner).or_insert(0) += 1;
                }
            }
        }

        let adjacent = owners
            .iter()
            .fold(None::<(u32, u32)>, |best, (&id, &count)| match best {
                Some((_, c)) if c >= count => best,
                _ => Some((id, count)),
            });
        if let Some((id, _)) = adjacent {
            return id as usize;
        }

        if let Some(id) = self.regions.iter().position(|r| r.color_index == target) {
            return id;
        }

        self.regions.push(Region::new(target));
        self.regions.len() - 1
    }

    fn assign(&mut self, pixels: &[usize], target: u8, host: usize) {
        for &p in pixels {
            self.labels[p] = target;
            self.owner[p] = host as u32;
        }
        self.regions[host].pixels.extend_from_slice(pixels);
    }

    /// Second pass: fold small components into a surrounding color
    fn merge_small(&mut self, mut deferred: Vec<Region>) {
        deferred.sort_by(|a, b| b.len().cmp(&a.len()));
        let mut processed = vec![false; self.labels.len()];

        for mut small in deferred {
            let pixels: Vec<usize> = small
                .pixels
                .iter()
                .copied()
                .filter(|&p| !processed[p])
                .collect();
            if pixels.is_empty() {
                continue;
            }

            small.boundary = self.current_boundary(&pixels, small.color_index);
            let target = match small.dominant_neighbor() {
                Some(color) => Some(color),
                None => small
                    .centroid(self.width as u32)
                    .and_then(|c| self.search_surrounding(c)),
            };
            // Unresolved pixels are picked up by the ring search
            let Some(target) = target else {
                continue;
            };

            for &p in &pixels {
                processed[p] = true;
            }
            let host = self.host_for(&pixels, target);
            self.assign(&pixels, target, host);

            let host_region = &mut self.regions[host];
            for (&color, &count) in &small.boundary {
                if color != target {
                    *host_region.boundary.entry(color).or_insert(0) += count;
                }
            }
        }
    }

    /// Nearest accepted pixel within `MAX_RING_RADIUS`, searching square rings
    fn nearest_owned(&self, idx: usize) -> Option<usize> {
        let x = (idx % self.width) as isize;
        let y = (idx / self.width) as isize;

        for radius in 1..=MAX_RING_RADIUS as isize {
            let mut best: Option<(isize, usize)> = None;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx.abs() != radius && dy.abs() != radius {
                        continue;
                    }
                    let nx = x + dx;
                    let ny = y + dy;
                    if nx < 0 || ny < 0 || nx >= self.width as isize || ny >= self.height as isize
                    {
                        continue;
                    }
                    let n = ny as usize * self.width + nx as usize;
                    if self.owner[n] == NO_OWNER {
                        continue;
                    }
                    let d = dx * dx + dy * dy;
                    if best.is_none_or(|(bd, _)| d < bd) {
                        best = Some((d, n));
                    }
                }
            }
            if let Some((_, n)) = best {
                return Some(n);
            }
        }

        None
    }

    /// Give every leftover opaque pixel the color of its nearest accepted pixel
    fn resolve_residual(&mut self) {
        let residual: Vec<usize> = (0..self.labels.len())
            .filter(|&p| self.labels[p] != TRANSPARENT && self.owner[p] == NO_OWNER)
            .collect();
        if residual.is_empty() {
            return;
        }

        let mut unresolved = 0usize;
        for p in residual {
            match self.nearest_owned(p) {
                Some(n) => {
                    let host = self.owner[n] as usize;
                    let color = self.labels[n];
                    self.assign(&[p], color, host);
                }
                None => {
                    // Keeps its own color
                    unresolved += 1;
                    let color = self.labels[p];
                    let host = self.host_for(&[p], color);
                    self.assign(&[p], color, host);
                }
            }
        }

        if unresolved > 0 {
            tracing::debug!(pixels = unresolved, "No merge target within ring search");
        }
    }

    /// Fold any region still under the minimum into the nearest region that
    /// meets it, or into the first other region when none does.
    fn enforce_minimum(&mut self) {
        let width = self.width as u32;
        for i in 0..self.regions.len() {
            let len = self.regions[i].len();
            if len == 0 || len >= self.min_size {
                continue;
            }
            let Some(center) = self.regions[i].centroid(width) else {
                continue;
            };

            let nearest = self
                .regions
                .iter()
                .enumerate()
                .filter(|(j, r)| *j != i && r.len() >= self.min_size)
                .filter_map(|(j, r)| {
                    r.centroid(width).map(|(x, y)| {
                        let d = (x - center.0).powi(2) + (y - center.1).powi(2);
                        (j, d)
                    })
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(j, _)| j);

            let target = nearest.or_else(|| {
                self.regions
                    .iter()
                    .enumerate()
                    .find(|(j, r)| *j != i && !r.is_empty())
                    .map(|(j, _)| j)
            });
            let Some(target) = target else {
                continue;
            };

            let pixels = std::mem::take(&mut self.regions[i].pixels);
            let color = self.regions[target].color_index;
            tracing::debug!(
                size = pixels.len(),
                from = self.regions[i].color_index,
                to = color,
                "Force-merging undersized region"
            );
            self.assign(&pixels, color, target);
        }
    }

    /// Drop emptied regions and rebuild every boundary from the final labels
    fn finish(mut self) -> Segmentation {
        let mut regions = std::mem::take(&mut self.regions);
        regions.retain(|r| !r.is_empty());
        for region in &mut regions {
            region.boundary = self.current_boundary(&region.pixels, region.color_index);
        }
        Segmentation {
            regions,
            index_map: ColorIndexMap::from_indices(
                self.width as u32,
                self.height as u32,
                self.labels,
            ),
        }
    }
}

/// Segment `map` into 8-connected regions of at least `min_region_size` pixels
///
/// Every returned region meets the minimum unless the whole image holds
/// fewer opaque pixels than that. Transparent pixels belong to no region.
pub fn extract_regions(map: &ColorIndexMap, min_region_size: usize) -> Segmentation {
    if map.is_empty() {
        return Segmentation {
            regions: Vec::new(),
            index_map: map.clone(),
        };
    }

    let mut extractor = Extractor::new(map, min_region_size);
    let deferred = extractor.scan_components();
    let accepted = extractor.regions.len();
    let small = deferred.len();

    extractor.merge_small(deferred);
    extractor.resolve_residual();
    extractor.enforce_minimum();

    let segmentation = extractor.finish();
    tracing::debug!(
        accepted,
        small,
        regions = segmentation.regions.len(),
        min_region_size,
        "Regions extracted"
    );
    segmentation
}
