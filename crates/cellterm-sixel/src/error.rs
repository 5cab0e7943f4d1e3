// SPDX-License-Identifier: MIT
//
// Error type for the sixel codec.
//
// Decoding never fails (corrupt input yields a partial raster), so every
// variant here comes from configuration or from wrapping caller-supplied
// pixel data.

use thiserror::Error;

/// Errors from configuring the encoder or building rasters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SixelError {
    /// Palette sizes must be a power of two in `2..=2048`.
    #[error("invalid palette size {0}: expected a power of two between 2 and 2048")]
    InvalidPaletteSize(usize),

    /// Unknown base palette name.
    #[error("unknown palette {0:?}: expected \"vt340\" or \"cga\"")]
    UnknownPalette(String),

    /// Pixel data does not match the declared dimensions.
    #[error("pixel data holds {actual} pixels, expected {expected}")]
    PixelCount { expected: usize, actual: usize },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SixelError>;
