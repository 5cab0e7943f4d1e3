// SPDX-License-Identifier: MIT
//
// cellterm-sixel — the sixel image codec behind cellterm's image cells.
//
// Pure data transformation with no terminal I/O: an RGBA `Raster` goes in,
// a DEC sixel stream comes out, and the decoder turns such a stream back
// into pixels. The terminal backend uses the encoder for image cells and
// the decoder for verification and for reading back palette state.
//
// Pipeline:
//
//   Raster ──histogram──▶ median cut / uniform cube / fixed preset ──▶ Palette
//   Raster + Palette ──nearest (+ optional dither)──▶ IndexedImage
//   IndexedImage ──bands of six rows, RLE──▶ sixel payload

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod palette;
pub mod quantize;
pub mod raster;

pub use decoder::{Decoded, SixelDecoder};
pub use encoder::{EncoderOptions, SixelEncoder};
pub use error::{Result, SixelError};
pub use palette::{BasePalette, Palette, PaletteSize};
pub use raster::{Raster, Rgb, Rgba};
