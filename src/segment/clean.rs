//! Edge-preserving denoise of a color index map
//!
//! Two pure passes, each reading a snapshot and writing a fresh buffer:
//! 1. Weighted majority vote in a circular window, skipped for pixels that
//!    sit on a balanced two-color edge and biased toward the current color
//! 2. Isolated pixels with no same-colored neighbor take the most frequent
//!    neighboring color

use rayon::prelude::*;

use crate::quantize::{ColorIndexMap, TRANSPARENT};

/// Smallest weight given to any in-window neighbor
const MIN_WEIGHT: f32 = 0.1;
/// Opposite sides count as an edge when their votes are at least this balanced
const EDGE_BALANCE: f32 = 0.4;
/// The current color survives with at least this share of all votes...
const KEEP_TOTAL_SHARE: f32 = 0.25;
/// ...and at least this share of the winner's votes
const KEEP_WINNER_SHARE: f32 = 0.5;

/// Direction pairs probed for edges: horizontal, vertical, both diagonals
const EDGE_DIRECTIONS: [(isize, isize); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];

/// Read-only view over an index buffer
#[derive(Clone, Copy)]
struct Grid<'a> {
    width: usize,
    height: usize,
    cells: &'a [u8],
}

impl<'a> Grid<'a> {
    fn new(map: &'a ColorIndexMap) -> Self {
        Self {
            width: map.width() as usize,
            height: map.height() as usize,
            cells: map.indices(),
        }
    }

    /// Opaque color at `(x + dx, y + dy)`, if in bounds
    #[inline]
    fn sample(&self, x: usize, y: usize, dx: isize, dy: isize) -> Option<u8> {
        let nx = x as isize + dx;
        let ny = y as isize + dy;
        if nx < 0 || ny < 0 || nx >= self.width as isize || ny >= self.height as isize {
            return None;
        }
        let c = self.cells[ny as usize * self.width + nx as usize];
        (c != TRANSPARENT).then_some(c)
    }

    /// Number of vote slots needed for the colors present
    fn color_slots(&self) -> usize {
        self.cells
            .iter()
            .filter(|&&c| c != TRANSPARENT)
            .max()
            .map_or(0, |&c| c as usize + 1)
    }
}

/// Offsets within a circle of `radius` (center excluded) and their weights
fn window(radius: usize) -> Vec<(isize, isize, f32)> {
    let r = radius as isize;
    let rf = radius as f32;
    let mut offsets = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            if dx == 0 && dy == 0 {
                continue;
            }
            let distance = ((dx * dx + dy * dy) as f32).sqrt();
            if distance > rf {
                continue;
            }
            let weight = ((rf - distance) / rf).max(MIN_WEIGHT);
            offsets.push((dx, dy, weight));
        }
    }
    offsets
}

/// Highest-voted slot; ties keep the lower index
fn winner(votes: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in votes.iter().enumerate() {
        if v > votes[best] {
            best = i;
        }
    }
    best
}

/// True when some direction pair straddles two different colors whose vote
/// totals are balanced
fn on_edge(grid: &Grid<'_>, x: usize, y: usize, votes: &[f32]) -> bool {
    EDGE_DIRECTIONS.iter().any(|&(dx, dy)| {
        let (Some(a), Some(b)) = (grid.sample(x, y, dx, dy), grid.sample(x, y, -dx, -dy)) else {
            return false;
        };
        if a == b {
            return false;
        }
        let va = votes[a as usize];
        let vb = votes[b as usize];
        let high = va.max(vb);
        high > 0.0 && va.min(vb) / high > EDGE_BALANCE
    })
}

fn vote_pass(map: &ColorIndexMap, radius: usize) -> ColorIndexMap {
    let grid = Grid::new(map);
    let offsets = window(radius);
    let center_weight = radius as f32 + 1.0;
    let slots = grid.color_slots();

    let cells: Vec<u8> = (0..grid.cells.len())
        .into_par_iter()
        .map_init(
            || vec![0f32; slots],
            |votes, idx| {
                let current = grid.cells[idx];
                if current == TRANSPARENT {
                    return current;
                }
                let x = idx % grid.width;
                let y = idx / grid.width;

                votes.fill(0.0);
                votes[current as usize] = center_weight;
                for &(dx, dy, weight) in &offsets {
                    if let Some(c) = grid.sample(x, y, dx, dy) {
                        votes[c as usize] += weight;
                    }
                }

                if on_edge(&grid, x, y, votes) {
                    return current;
                }

                let best = winner(votes);
                let own = votes[current as usize];
                let total: f32 = votes.iter().sum();
                if best != current as usize
                    && own >= KEEP_TOTAL_SHARE * total
                    && own >= KEEP_WINNER_SHARE * votes[best]
                {
                    current
                } else {
                    best as u8
                }
            },
        )
        .collect();

    ColorIndexMap::from_indices(map.width(), map.height(), cells)
}

fn isolation_pass(map: &ColorIndexMap, radius: usize) -> ColorIndexMap {
    let grid = Grid::new(map);
    let offsets = window(radius);
    let slots = grid.color_slots();

    let cells: Vec<u8> = (0..grid.cells.len())
        .into_par_iter()
        .map_init(
            || vec![0f32; slots],
            |counts, idx| {
                let current = grid.cells[idx];
                if current == TRANSPARENT {
                    return current;
                }
                let x = idx % grid.width;
                let y = idx / grid.width;

                counts.fill(0.0);
                let mut seen = false;
                for &(dx, dy, _) in &offsets {
                    if let Some(c) = grid.sample(x, y, dx, dy) {
                        if c == current {
                            return current;
                        }
                        counts[c as usize] += 1.0;
                        seen = true;
                    }
                }

                if seen { winner(counts) as u8 } else { current }
            },
        )
        .collect();

    ColorIndexMap::from_indices(map.width(), map.height(), cells)
}

/// Denoise `map` with a feature radius of `min_feature_size` pixels
///
/// A size of 1 or less returns the map unchanged.
pub fn clean_features(map: &ColorIndexMap, min_feature_size: usize) -> ColorIndexMap {
    if min_feature_size <= 1 || map.is_empty() {
        return map.clone();
    }

    let voted = vote_pass(map, min_feature_size);
    let cleaned = isolation_pass(&voted, (min_feature_size / 2).max(1));

    let changed = map
        .indices()
        .iter()
        .zip(cleaned.indices())
        .filter(|(a, b)| a != b)
        .count();
    tracing::debug!(min_feature_size, changed, "Features cleaned");

    cleaned
}
