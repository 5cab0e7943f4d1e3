// SPDX-License-Identifier: MIT
//
// Colors as cells store them.
//
// A cell's foreground or background is one of three things:
//
//   - one of the eight 3-bit ECMA-48 colors (SGR 30–37 / 40–47), whose
//     bright variant is selected by the BOLD attribute rather than stored;
//   - a 24-bit RGB value (SGR 38;2 / 48;2);
//   - "default", meaning whatever the terminal reported as its default
//     foreground/background during color negotiation.
//
// The 16-entry `DEFAULT_PALETTE` is what indexed colors resolve to when the
// terminal never answered an OSC 4 query. It is the classic CGA text-mode
// palette in ANSI order, which gives a visible step between white (7) and
// bright white (15) on every terminal.

pub use cellterm_sixel::Rgb;

// ─── Color ───────────────────────────────────────────────────────────────────

/// One of the eight 3-bit ECMA-48 colors, in SGR order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Red = 1,
    Green = 2,
    Yellow = 3,
    Blue = 4,
    Magenta = 5,
    Cyan = 6,
    White = 7,
}

impl Color {
    pub const ALL: [Self; 8] = [
        Self::Black,
        Self::Red,
        Self::Green,
        Self::Yellow,
        Self::Blue,
        Self::Magenta,
        Self::Cyan,
        Self::White,
    ];

    /// SGR color number (0–7).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        if index < 8 {
            Some(Self::ALL[index as usize])
        } else {
            None
        }
    }

    /// Palette slot for this color, `+ 8` when bright.
    #[inline]
    #[must_use]
    pub const fn palette_index(self, bright: bool) -> usize {
        self as usize + if bright { 8 } else { 0 }
    }
}

// ─── ColorSpec ───────────────────────────────────────────────────────────────

/// A cell color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorSpec {
    /// 3-bit indexed color; brightness comes from the BOLD attribute.
    Indexed(Color),
    /// 24-bit color.
    Rgb(Rgb),
    /// The terminal's negotiated default.
    #[default]
    Default,
}

impl From<Color> for ColorSpec {
    fn from(c: Color) -> Self {
        Self::Indexed(c)
    }
}

impl From<Rgb> for ColorSpec {
    fn from(c: Rgb) -> Self {
        Self::Rgb(c)
    }
}

// ─── Palette ─────────────────────────────────────────────────────────────────

/// Fallback RGB for the 16 indexed colors (normal 0–7, bright 8–15).
pub const DEFAULT_PALETTE: [Rgb; 16] = [
    Rgb::from_u32(0x00_0000),
    Rgb::from_u32(0xAA_0000),
    Rgb::from_u32(0x00_AA00),
    Rgb::from_u32(0xAA_5500),
    Rgb::from_u32(0x00_00AA),
    Rgb::from_u32(0xAA_00AA),
    Rgb::from_u32(0x00_AAAA),
    Rgb::from_u32(0xAA_AAAA),
    Rgb::from_u32(0x55_5555),
    Rgb::from_u32(0xFF_5555),
    Rgb::from_u32(0x55_FF55),
    Rgb::from_u32(0xFF_FF55),
    Rgb::from_u32(0x55_55FF),
    Rgb::from_u32(0xFF_55FF),
    Rgb::from_u32(0x55_FFFF),
    Rgb::from_u32(0xFF_FFFF),
];

/// Default foreground when the terminal never reported one.
pub const DEFAULT_FOREGROUND: Rgb = DEFAULT_PALETTE[7];
/// Default background when the terminal never reported one.
pub const DEFAULT_BACKGROUND: Rgb = DEFAULT_PALETTE[0];

/// Closest indexed color to `rgb` within `palette`, as `(color, bright)`.
///
/// Used to downgrade RGB cells when truecolor output is disabled.
#[must_use]
pub fn nearest_indexed(rgb: Rgb, palette: &[Rgb; 16]) -> (Color, bool) {
    let mut best = 0usize;
    let mut best_dist = u32::MAX;
    for (i, entry) in palette.iter().enumerate() {
        let d = entry.distance_sq(rgb);
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    #[allow(clippy::cast_possible_truncation)] // best < 16
    let color = Color::from_index((best % 8) as u8).unwrap_or(Color::Black);
    (color, best >= 8)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
