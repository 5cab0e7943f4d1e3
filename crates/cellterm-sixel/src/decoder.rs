// SPDX-License-Identifier: MIT
//
// Sixel decoder — sixel data stream in, raster out.
//
// A single forward pass over the bytes. The only state is the cursor
// (column, band top), the selected register, and the register table.
// Control characters:
//
//   "Pan;Pad;Ph;Pv    raster attributes: declare a Ph×Pv canvas
//   #Pc               select register Pc
//   #Pc;Pu;Px;Py;Pz   define register Pc (Pu=1 HLS, Pu=2 RGB, percent) and select it
//   !Pn<sixel>        repeat the sixel Pn times
//   $                 graphics carriage return (column 0, same band)
//   -                 graphics new line (column 0, next band)
//   0x3F..=0x7E       one sixel: six vertical pixels, bit n = row top+n
//
// Decoding is tolerant: unknown bytes are skipped, ESC / BEL / 8-bit ST end
// the image, and input that stops mid-stream yields whatever was painted so
// far. The canvas is the declared size grown to cover every painted pixel,
// capped at `MAX_DIMENSION` per side.

use crate::palette::{BasePalette, MAX_PALETTE_SIZE};
use crate::raster::{Raster, Rgb, Rgba};

/// Largest canvas side the decoder will allocate.
pub const MAX_DIMENSION: usize = 4096;

/// Parameters beyond this many in one control are ignored.
const MAX_PARAMS: usize = 8;

// ─── Decoded ─────────────────────────────────────────────────────────────────

/// Result of a decode: the image plus the register table it ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub raster: Raster,
    /// Final register contents, including every `#` definition seen.
    pub registers: Vec<Rgb>,
}

// ─── SixelDecoder ────────────────────────────────────────────────────────────

/// Sixel decoder with a configurable starting register table.
///
/// Registers start from the VT340 defaults (0–15) and black above, or from
/// a caller-supplied palette, e.g. colors previously read back from the
/// terminal for images encoded with a suppressed palette.
///
/// # Examples
///
/// ```
/// use cellterm_sixel::{Rgba, SixelDecoder};
///
/// let img = SixelDecoder::default().decode(b"\"1;1;2;1#1;2;100;0;0#1~~");
/// assert_eq!(img.width(), 2);
/// assert_eq!(img.get(0, 0), Some(Rgba::new(255, 0, 0, 255)));
/// ```
#[derive(Debug, Clone)]
pub struct SixelDecoder {
    registers: Vec<Rgb>,
    background: Rgba,
}

impl Default for SixelDecoder {
    fn default() -> Self {
        Self::with_palette(BasePalette::Vt340.colors())
    }
}

impl SixelDecoder {
    /// Start registers `0..colors.len()` from `colors`; the rest are black.
    #[must_use]
    pub fn with_palette(colors: &[Rgb]) -> Self {
        let mut registers = vec![Rgb::BLACK; MAX_PALETTE_SIZE];
        for (slot, c) in registers.iter_mut().zip(colors) {
            *slot = *c;
        }
        Self {
            registers,
            background: Rgba::TRANSPARENT,
        }
    }

    /// Value given to pixels no sixel touched.
    #[must_use]
    pub const fn with_background(mut self, background: Rgba) -> Self {
        self.background = background;
        self
    }

    /// Decode to a raster.
    #[must_use]
    pub fn decode(&self, data: &[u8]) -> Raster {
        self.decode_full(data).raster
    }

    /// Decode, also returning the final register table.
    #[must_use]
    pub fn decode_full(&self, data: &[u8]) -> Decoded {
        let mut st = State::new(self.registers.clone(), self.background);
        let mut i = payload_start(data);

        while i < data.len() {
            let b = data[i];
            i += 1;
            match b {
                b'"' => {
                    let params = read_params(data, &mut i);
                    st.raster_attributes(&params);
                }
                b'#' => {
                    let params = read_params(data, &mut i);
                    st.color(&params);
                }
                b'!' => {
                    let params = read_params(data, &mut i);
                    let count = params.first().copied().unwrap_or(1).max(1);
                    let count = usize::try_from(count).unwrap_or(MAX_DIMENSION);
                    if let Some(&next) = data.get(i) {
                        if (0x3F..=0x7E).contains(&next) {
                            i += 1;
                            st.paint(next, count);
                        }
                    }
                }
                b'$' => st.x = 0,
                b'-' => {
                    st.x = 0;
                    st.y = st.y.saturating_add(6);
                }
                0x3F..=0x7E => st.paint(b, 1),
                0x1B | 0x07 | 0x9C => break,
                _ => {}
            }
        }

        st.finish()
    }
}

// ─── Decode State ────────────────────────────────────────────────────────────

struct State {
    canvas: Raster,
    registers: Vec<Rgb>,
    background: Rgba,
    color: usize,
    x: usize,
    y: usize,
    /// Declared raster size, if any.
    declared: (usize, usize),
    /// One past the furthest painted pixel on each axis.
    extent: (usize, usize),
}

impl State {
    fn new(registers: Vec<Rgb>, background: Rgba) -> Self {
        Self {
            canvas: Raster::filled(0, 0, background),
            registers,
            background,
            color: 0,
            x: 0,
            y: 0,
            declared: (0, 0),
            extent: (0, 0),
        }
    }

    fn raster_attributes(&mut self, params: &[u32]) {
        let (Some(&w), Some(&h)) = (params.get(2), params.get(3)) else {
            return;
        };
        let w = (w as usize).min(MAX_DIMENSION);
        let h = (h as usize).min(MAX_DIMENSION);
        if w > 0 && h > 0 {
            self.declared = (w, h);
            self.canvas.grow(w, h, self.background);
        }
    }

    fn color(&mut self, params: &[u32]) {
        let Some(&pc) = params.first() else {
            return;
        };
        let reg = pc as usize % self.registers.len();
        if params.len() >= 5 {
            let rgb = match params[1] {
                1 => hls_to_rgb(params[2], params[3], params[4]),
                2 => Rgb::new(
                    percent_to_u8(params[2]),
                    percent_to_u8(params[3]),
                    percent_to_u8(params[4]),
                ),
                _ => return,
            };
            self.registers[reg] = rgb;
        }
        self.color = reg;
    }

    fn paint(&mut self, sixel: u8, count: usize) {
        let bits = sixel - 0x3F;
        let count = count.min(MAX_DIMENSION.saturating_sub(self.x));
        if count == 0 {
            return;
        }
        if bits != 0 {
            let top_bit = 7 - bits.leading_zeros() as usize;
            let need_w = self.x + count;
            let need_h = (self.y + top_bit + 1).min(MAX_DIMENSION);
            self.reserve(need_w, need_h);

            let px = Rgba::opaque(self.registers[self.color]);
            for bit in 0..6 {
                let y = self.y + bit;
                if bits & (1 << bit) == 0 || y >= MAX_DIMENSION {
                    continue;
                }
                for x in self.x..self.x + count {
                    self.canvas.set(x, y, px);
                }
                self.extent.1 = self.extent.1.max(y + 1);
            }
            self.extent.0 = self.extent.0.max(need_w);
        }
        self.x += count;
    }

    /// Make room for `w × h`, growing geometrically so long rows don't
    /// reallocate per column.
    fn reserve(&mut self, w: usize, h: usize) {
        if w <= self.canvas.width() && h <= self.canvas.height() {
            return;
        }
        let grow_w = if w > self.canvas.width() {
            w.max(self.canvas.width() * 2).min(MAX_DIMENSION)
        } else {
            self.canvas.width()
        };
        let grow_h = if h > self.canvas.height() {
            h.max(self.canvas.height() * 2).min(MAX_DIMENSION)
        } else {
            self.canvas.height()
        };
        self.canvas.grow(grow_w, grow_h, self.background);
    }

    fn finish(mut self) -> Decoded {
        let w = self.declared.0.max(self.extent.0);
        let h = self.declared.1.max(self.extent.1);
        self.canvas.crop(w, h);
        Decoded {
            raster: self.canvas,
            registers: self.registers,
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Skip a leading 7-bit or 8-bit DCS introducer through its final `q`.
fn payload_start(data: &[u8]) -> usize {
    let after_intro = match data {
        [0x1B, b'P', ..] => 2,
        [0x90, ..] => 1,
        _ => return 0,
    };
    data[after_intro..]
        .iter()
        .position(|&b| b == b'q')
        .map_or(data.len(), |p| after_intro + p + 1)
}

/// Read `n;n;...` starting at `*i`. Empty parameters read as 0.
fn read_params(data: &[u8], i: &mut usize) -> Vec<u32> {
    let mut params = Vec::new();
    let mut current: Option<u32> = None;
    while let Some(&b) = data.get(*i) {
        match b {
            b'0'..=b'9' => {
                let v = current.unwrap_or(0);
                current = Some(v.saturating_mul(10).saturating_add(u32::from(b - b'0')));
            }
            b';' => {
                if params.len() < MAX_PARAMS {
                    params.push(current.unwrap_or(0));
                }
                current = None;
            }
            _ => break,
        }
        *i += 1;
    }
    if let Some(v) = current {
        if params.len() < MAX_PARAMS {
            params.push(v);
        }
    }
    params
}

#[allow(clippy::cast_possible_truncation)]
fn percent_to_u8(p: u32) -> u8 {
    // p is clamped to 100, so the result is at most 255.
    ((p.min(100) * 255 + 50) / 100) as u8
}

/// DEC HLS (hue 0 = blue, 120 = red, 240 = green) to RGB.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::many_single_char_names
)]
fn hls_to_rgb(h: u32, l: u32, s: u32) -> Rgb {
    let h = f64::from((h % 360 + 240) % 360) / 360.0;
    let l = f64::from(l.min(100)) / 100.0;
    let s = f64::from(s.min(100)) / 100.0;

    let to_u8 = |v: f64| (v * 255.0).round().clamp(0.0, 255.0) as u8;

    if s <= 0.0 {
        let v = to_u8(l);
        return Rgb::new(v, v, v);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let channel = |t: f64| {
        let t = t.rem_euclid(1.0);
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    };

    Rgb::new(
        to_u8(channel(h + 1.0 / 3.0)),
        to_u8(channel(h)),
        to_u8(channel(h - 1.0 / 3.0)),
    )
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RED: Rgba = Rgba::new(255, 0, 0, 255);

    fn decode(data: &[u8]) -> Raster {
        SixelDecoder::default().decode(data)
    }

    // ── Parameters ──────────────────────────────────────────────────────

    #[test]
    fn params_parse_with_empty_slots() {
        let mut i = 0;
        assert_eq!(read_params(b"1;;20x", &mut i), vec![1, 0, 20]);
        assert_eq!(i, 5);
    }

    #[test]
    fn params_saturate() {
        let mut i = 0;
        assert_eq!(read_params(b"99999999999", &mut i), vec![u32::MAX]);
    }

    #[test]
    fn percent_conversion() {
        assert_eq!(percent_to_u8(0), 0);
        assert_eq!(percent_to_u8(100), 255);
        assert_eq!(percent_to_u8(250), 255);
        assert_eq!(percent_to_u8(66), 168);
    }

    #[test]
    fn hls_hue_is_rotated() {
        assert_eq!(hls_to_rgb(0, 50, 100), Rgb::new(0, 0, 255));
        assert_eq!(hls_to_rgb(120, 50, 100), Rgb::new(255, 0, 0));
        assert_eq!(hls_to_rgb(240, 50, 100), Rgb::new(0, 255, 0));
        assert_eq!(hls_to_rgb(0, 100, 0), Rgb::WHITE);
    }

    // ── Introducer ──────────────────────────────────────────────────────

    #[test]
    fn dcs_introducer_is_skipped() {
        let img = decode(b"\x1bP0;1;0q\"1;1;1;1#0;2;100;0;0#0@\x1b\\");
        assert_eq!(img.width(), 1);
        assert_eq!(img.get(0, 0), Some(RED));
    }

    #[test]
    fn eight_bit_dcs_is_skipped() {
        let img = decode(b"\x90q#0;2;100;0;0#0@\x9c");
        assert_eq!(img.get(0, 0), Some(RED));
    }

    // ── Painting ────────────────────────────────────────────────────────

    #[test]
    fn declared_size_is_kept_even_if_unpainted() {
        let img = decode(b"\"1;1;5;7#0;2;100;0;0#0@");
        assert_eq!((img.width(), img.height()), (5, 7));
        assert_eq!(img.get(0, 0), Some(RED));
        assert_eq!(img.get(4, 6), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn undeclared_canvas_grows_to_fit() {
        let img = decode(b"#0;2;100;0;0#0~~-~");
        assert_eq!((img.width(), img.height()), (2, 12));
        assert_eq!(img.get(0, 11), Some(RED));
        assert_eq!(img.get(1, 11), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn repeat_paints_run() {
        let img = decode(b"#0;2;0;0;100#0!5@");
        assert_eq!(img.width(), 5);
        assert!((0..5).all(|x| img.get(x, 0) == Some(Rgba::new(0, 0, 255, 255))));
    }

    #[test]
    fn carriage_return_overpaints_same_band() {
        let img = decode(b"#1;2;100;0;0#2;2;0;0;100#1@@$#2?@");
        assert_eq!(img.get(0, 0), Some(RED));
        assert_eq!(img.get(1, 0), Some(Rgba::new(0, 0, 255, 255)));
    }

    #[test]
    fn selection_uses_default_registers() {
        // VT340 register 2 is red-ish.
        let img = decode(b"#2@");
        assert_eq!(img.get(0, 0), Some(Rgba::opaque(BasePalette::Vt340.colors()[2])));
    }

    #[test]
    fn caller_palette_seeds_registers() {
        let dec = SixelDecoder::with_palette(&[Rgb::new(1, 2, 3)]);
        assert_eq!(dec.decode(b"#0@").get(0, 0), Some(Rgba::new(1, 2, 3, 255)));
    }

    #[test]
    fn registers_are_reported() {
        let out = SixelDecoder::default().decode_full(b"#5;2;100;100;100");
        assert_eq!(out.registers[5], Rgb::WHITE);
    }

    // ── Tolerance ───────────────────────────────────────────────────────

    #[test]
    fn truncated_input_returns_partial_image() {
        let img = decode(b"\"1;1;4;6#0;2;100;0;0#0~~");
        assert_eq!(img.get(1, 5), Some(RED));
        assert_eq!(img.get(2, 0), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn garbage_is_ignored() {
        let img = decode(b"#0;2;100;0;0#0\r\n@ \x01@");
        assert_eq!(img.width(), 2);
    }

    #[test]
    fn terminator_stops_decoding() {
        let img = decode(b"#0;2;100;0;0#0@\x1b\\@@@");
        assert_eq!(img.width(), 1);
    }

    #[test]
    fn huge_dimensions_are_capped() {
        let img = decode(b"\"1;1;999999;999999");
        assert_eq!((img.width(), img.height()), (MAX_DIMENSION, MAX_DIMENSION));
    }

    #[test]
    fn empty_input_is_empty_raster() {
        assert!(decode(b"").is_empty());
    }
}
