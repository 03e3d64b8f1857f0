//! Error types for the layer decomposition pipeline

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayerError {
    #[error("Color count must be between {min} and {max}, got {got}")]
    InvalidColorCount { got: usize, min: usize, max: usize },

    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("PNG encode error: {0}")]
    PngEncode(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Failed to write manifest: {0}")]
    Manifest(#[source] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A rejected layer edit. The stack is left exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("Layer index {index} out of range (stack has {len} layers)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Cannot merge layer {0} with itself")]
    SameLayer(usize),

    #[error("Invalid layer order {order:?} for {len} layers")]
    InvalidOrder { order: Vec<usize>, len: usize },
}

/// Error returned when parsing a `#RRGGBB` / `#RGB` color fails
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorParseError {
    #[error("invalid hex color length {0} (expected 3 or 6 digits)")]
    InvalidLength(usize),

    #[error("invalid hex digit in '{0}'")]
    InvalidDigit(String),
}
