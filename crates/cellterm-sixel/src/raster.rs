// SPDX-License-Identifier: MIT
//
// Raster — the pixel buffer the codec reads from and writes to.
//
// Same layout as the cell grid one crate up: a flat row-major `Vec` with
// `index = y * width + x`. Encoding walks six rows at a time per column, so
// a band is six short strided reads; decoding paints single columns of six
// pixels. Neither cares much about layout, and row-major keeps `blit` (used
// to compose adjacent image cells into one strip) a sequence of slice copies.

use crate::error::{Result, SixelError};

// ─── Rgb ─────────────────────────────────────────────────────────────────────

/// An opaque 24-bit color.
///
/// Shared by the quantizer, the palette presets, and the terminal backend's
/// color negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);

    #[inline]
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build from a packed `0xRRGGBB` value. The top byte is ignored.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_u32(packed: u32) -> Self {
        Self {
            r: (packed >> 16) as u8,
            g: (packed >> 8) as u8,
            b: packed as u8,
        }
    }

    /// Pack into `0xRRGGBB`.
    #[inline]
    #[must_use]
    pub const fn to_u32(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    /// Squared Euclidean distance in RGB space.
    #[inline]
    #[must_use]
    pub const fn distance_sq(self, other: Self) -> u32 {
        let dr = self.r.abs_diff(other.r) as u32;
        let dg = self.g.abs_diff(other.g) as u32;
        let db = self.b.abs_diff(other.b) as u32;
        dr * dr + dg * dg + db * db
    }

    /// Perceived brightness on a 0–255 scale (Rec. 601 luma weights).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn luminance(self) -> u8 {
        // Weights sum to 1000, so the result never exceeds 255.
        ((299 * self.r as u32 + 587 * self.g as u32 + 114 * self.b as u32) / 1000) as u8
    }
}

// ─── Rgba ────────────────────────────────────────────────────────────────────

/// A pixel with straight (non-premultiplied) alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    /// Fully transparent black, the value of unpainted decoder pixels.
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    #[inline]
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    #[inline]
    #[must_use]
    pub const fn opaque(rgb: Rgb) -> Self {
        Self::new(rgb.r, rgb.g, rgb.b, 255)
    }

    #[inline]
    #[must_use]
    pub const fn rgb(self) -> Rgb {
        Rgb::new(self.r, self.g, self.b)
    }
}

impl From<Rgb> for Rgba {
    fn from(rgb: Rgb) -> Self {
        Self::opaque(rgb)
    }
}

// ─── Raster ──────────────────────────────────────────────────────────────────

/// A 2D RGBA pixel buffer.
///
/// # Examples
///
/// ```
/// use cellterm_sixel::{Raster, Rgba};
///
/// let mut img = Raster::new(4, 2);
/// img.set(1, 1, Rgba::new(255, 0, 0, 255));
/// assert_eq!(img.get(1, 1), Some(Rgba::new(255, 0, 0, 255)));
/// assert_eq!(img.get(4, 0), None);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    width: usize,
    height: usize,
    pixels: Vec<Rgba>,
}

impl Raster {
    /// A transparent raster.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, Rgba::TRANSPARENT)
    }

    /// A raster where every pixel is `color`.
    #[must_use]
    pub fn filled(width: usize, height: usize, color: Rgba) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width * height],
        }
    }

    /// Wrap tightly packed RGBA bytes (4 bytes per pixel, row-major).
    ///
    /// # Errors
    ///
    /// Returns [`SixelError::PixelCount`] if `bytes` does not hold exactly
    /// `width * height` pixels.
    pub fn from_rgba_bytes(width: usize, height: usize, bytes: &[u8]) -> Result<Self> {
        let expected = width * height;
        if bytes.len() != expected * 4 {
            return Err(SixelError::PixelCount {
                expected,
                actual: bytes.len() / 4,
            });
        }
        let pixels = bytes
            .chunks_exact(4)
            .map(|p| Rgba::new(p[0], p[1], p[2], p[3]))
            .collect();
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    #[inline]
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[inline]
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    #[must_use]
    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<Rgba> {
        if x < self.width && y < self.height {
            Some(self.pixels[y * self.width + x])
        } else {
            None
        }
    }

    /// Bounds-checked write. Returns `false` when `(x, y)` is outside.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, color: Rgba) -> bool {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = color;
            true
        } else {
            false
        }
    }

    /// Grow the canvas to at least `width × height`, keeping existing pixels
    /// at their coordinates. New pixels take `fill`. Never shrinks.
    pub fn grow(&mut self, width: usize, height: usize, fill: Rgba) {
        let new_w = width.max(self.width);
        let new_h = height.max(self.height);
        if new_w == self.width && new_h == self.height {
            return;
        }
        let mut pixels = vec![fill; new_w * new_h];
        for y in 0..self.height {
            let src = &self.pixels[y * self.width..(y + 1) * self.width];
            pixels[y * new_w..y * new_w + self.width].copy_from_slice(src);
        }
        self.width = new_w;
        self.height = new_h;
        self.pixels = pixels;
    }

    /// Shrink to `width × height` (clamped to the current size), keeping
    /// the top-left region.
    pub fn crop(&mut self, width: usize, height: usize) {
        let new_w = width.min(self.width);
        let new_h = height.min(self.height);
        if new_w == self.width && new_h == self.height {
            return;
        }
        let mut pixels = Vec::with_capacity(new_w * new_h);
        for y in 0..new_h {
            pixels.extend_from_slice(&self.pixels[y * self.width..y * self.width + new_w]);
        }
        self.width = new_w;
        self.height = new_h;
        self.pixels = pixels;
    }

    /// Copy `src` into this raster with its top-left at `(x, y)`, clipping
    /// whatever falls outside.
    pub fn blit(&mut self, x: usize, y: usize, src: &Self) {
        if x >= self.width || y >= self.height {
            return;
        }
        let cols = src.width.min(self.width - x);
        let rows = src.height.min(self.height - y);
        for row in 0..rows {
            let from = &src.pixels[row * src.width..row * src.width + cols];
            let start = (y + row) * self.width + x;
            self.pixels[start..start + cols].copy_from_slice(from);
        }
    }
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Raster({}x{})", self.width, self.height)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
