//! Stacked layer model
//!
//! Builds the ordered stack of single-color layers cut from acrylic, and
//! edits it in place (recolor, reorder, merge) while keeping every stacked
//! mask nested inside the one behind it.

mod editor;
mod history;
mod mask;
mod merge_flow;
mod stack;

pub use editor::LayerStackEditor;
pub use history::{History, Snapshot};
pub use mask::PixelMask;
pub use merge_flow::{MergeSession, MergeState, Selection};
pub use stack::{
    DEFAULT_LAYER_COLOR, Layer, LayerStack, build_layer_stack, build_stack_masks, original_masks,
};

pub(crate) use stack::encode_png;
