//! Region segmentation
//!
//! Turns a classified color index map into clean, size-enforced regions:
//! 1. Flood-fill 8-connected components and fold undersized ones into
//!    their surroundings
//! 2. Denoise boundaries with an edge-preserving weighted vote
//! 3. Extract again from the cleaned map

mod clean;
mod regions;

pub use clean::clean_features;
pub use regions::{
    MAX_RING_RADIUS, MAX_SEARCH_RADIUS, MIN_SEARCH_RADIUS, Region, Segmentation, extract_regions,
};
