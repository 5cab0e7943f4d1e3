// SPDX-License-Identifier: MIT
//
// Palettes — the color registers a sixel image is painted with.
//
// A sixel stream selects colors by register number, so every encode ends up
// with an indexed palette: either computed from the image (median cut or the
// fast uniform cube, see `quantize.rs`) or one of the fixed hardware presets
// below. Register numbers are `u16` because terminals accept up to 2048 of
// them (xterm's `numColorRegisters` ceiling).

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SixelError};
use crate::raster::Rgb;

// ─── PaletteSize ─────────────────────────────────────────────────────────────

/// Smallest accepted palette size.
pub const MIN_PALETTE_SIZE: usize = 2;
/// Largest accepted palette size.
pub const MAX_PALETTE_SIZE: usize = 2048;

/// A validated palette size: a power of two in `2..=2048`.
///
/// # Examples
///
/// ```
/// use cellterm_sixel::PaletteSize;
///
/// assert!(PaletteSize::new(256).is_ok());
/// assert!(PaletteSize::new(100).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PaletteSize(u16);

impl PaletteSize {
    /// Validate a requested size.
    ///
    /// # Errors
    ///
    /// Returns [`SixelError::InvalidPaletteSize`] unless `n` is a power of two
    /// between [`MIN_PALETTE_SIZE`] and [`MAX_PALETTE_SIZE`].
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(n: usize) -> Result<Self> {
        if (MIN_PALETTE_SIZE..=MAX_PALETTE_SIZE).contains(&n) && n.is_power_of_two() {
            // n <= 2048 fits in u16.
            Ok(Self(n as u16))
        } else {
            Err(SixelError::InvalidPaletteSize(n))
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> usize {
        self.0 as usize
    }

    /// `log2` of the size, i.e. the number of median-cut generations.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0.trailing_zeros()
    }
}

impl Default for PaletteSize {
    fn default() -> Self {
        Self(128)
    }
}

impl fmt::Display for PaletteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── BasePalette ─────────────────────────────────────────────────────────────

/// Fixed 16-color palettes that replace quantization entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasePalette {
    /// The DEC VT340 power-on color map.
    Vt340,
    /// The IBM CGA/EGA text-mode colors.
    Cga,
}

/// VT340 defaults, converted from the terminal's percent values.
const VT340: [Rgb; 16] = [
    Rgb::new(0, 0, 0),
    Rgb::new(51, 51, 204),
    Rgb::new(204, 33, 33),
    Rgb::new(51, 204, 51),
    Rgb::new(204, 51, 204),
    Rgb::new(51, 204, 204),
    Rgb::new(204, 204, 51),
    Rgb::new(135, 135, 135),
    Rgb::new(66, 66, 66),
    Rgb::new(84, 84, 153),
    Rgb::new(153, 66, 66),
    Rgb::new(84, 153, 84),
    Rgb::new(153, 84, 153),
    Rgb::new(84, 153, 153),
    Rgb::new(153, 153, 84),
    Rgb::new(204, 204, 204),
];

const CGA: [Rgb; 16] = [
    Rgb::from_u32(0x00_0000),
    Rgb::from_u32(0x00_00AA),
    Rgb::from_u32(0x00_AA00),
    Rgb::from_u32(0x00_AAAA),
    Rgb::from_u32(0xAA_0000),
    Rgb::from_u32(0xAA_00AA),
    Rgb::from_u32(0xAA_5500),
    Rgb::from_u32(0xAA_AAAA),
    Rgb::from_u32(0x55_5555),
    Rgb::from_u32(0x55_55FF),
    Rgb::from_u32(0x55_FF55),
    Rgb::from_u32(0x55_FFFF),
    Rgb::from_u32(0xFF_5555),
    Rgb::from_u32(0xFF_55FF),
    Rgb::from_u32(0xFF_FF55),
    Rgb::from_u32(0xFF_FFFF),
];

impl BasePalette {
    #[must_use]
    pub const fn colors(self) -> &'static [Rgb] {
        match self {
            Self::Vt340 => &VT340,
            Self::Cga => &CGA,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Vt340 => "vt340",
            Self::Cga => "cga",
        }
    }
}

impl FromStr for BasePalette {
    type Err = SixelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vt340" => Ok(Self::Vt340),
            "cga" => Ok(Self::Cga),
            _ => Err(SixelError::UnknownPalette(s.to_owned())),
        }
    }
}

// ─── Palette ─────────────────────────────────────────────────────────────────

/// An ordered list of color registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Rgb>,
}

impl Palette {
    #[must_use]
    pub const fn new(colors: Vec<Rgb>) -> Self {
        Self { colors }
    }

    #[must_use]
    pub fn from_base(base: BasePalette) -> Self {
        Self::new(base.colors().to_vec())
    }

    #[inline]
    #[must_use]
    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Rgb> {
        self.colors.get(index).copied()
    }

    /// Index of the entry closest to `color` (squared Euclidean RGB). Ties go
    /// to the lowest index. Returns 0 for an empty palette.
    #[must_use]
    pub fn nearest(&self, color: Rgb) -> usize {
        let mut best = 0;
        let mut best_dist = u32::MAX;
        for (i, entry) in self.colors.iter().enumerate() {
            let d = entry.distance_sq(color);
            if d < best_dist {
                best = i;
                best_dist = d;
                if d == 0 {
                    break;
                }
            }
        }
        best
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn palette_size_accepts_powers_of_two() {
        for n in [2, 4, 8, 16, 64, 128, 256, 1024, 2048] {
            assert_eq!(PaletteSize::new(n).unwrap().get(), n);
        }
    }

    #[test]
    fn palette_size_rejects_others() {
        for n in [0, 1, 3, 100, 255, 4096] {
            assert_eq!(PaletteSize::new(n), Err(SixelError::InvalidPaletteSize(n)));
        }
    }

    #[test]
    fn palette_size_bits() {
        assert_eq!(PaletteSize::new(256).unwrap().bits(), 8);
        assert_eq!(PaletteSize::default().get(), 128);
    }

    #[test]
    fn base_palette_parses_case_insensitively() {
        assert_eq!("VT340".parse::<BasePalette>().unwrap(), BasePalette::Vt340);
        assert_eq!(" cga ".parse::<BasePalette>().unwrap(), BasePalette::Cga);
        assert!("ega".parse::<BasePalette>().is_err());
    }

    #[test]
    fn base_palettes_have_sixteen_entries() {
        assert_eq!(BasePalette::Vt340.colors().len(), 16);
        assert_eq!(BasePalette::Cga.colors().len(), 16);
        assert_eq!(BasePalette::Cga.colors()[6], Rgb::new(0xAA, 0x55, 0x00));
    }

    #[test]
    fn nearest_prefers_exact_match() {
        let p = Palette::from_base(BasePalette::Cga);
        assert_eq!(p.nearest(Rgb::new(0xFF, 0xFF, 0x55)), 14);
        assert_eq!(p.nearest(Rgb::new(250, 250, 250)), 15);
    }

    #[test]
    fn nearest_breaks_ties_toward_lower_index() {
        let p = Palette::new(vec![Rgb::new(0, 0, 0), Rgb::new(10, 0, 0)]);
        assert_eq!(p.nearest(Rgb::new(5, 0, 0)), 0);
    }

    #[test]
    fn nearest_on_empty_palette() {
        assert_eq!(Palette::new(Vec::new()).nearest(Rgb::WHITE), 0);
    }
}
