// SPDX-License-Identifier: MIT
//
// Sixel encoder — raster in, DEC sixel data stream out.
//
// Wire layout of one encode (payload, without the DCS wrapper):
//
//   "1;1;W;H                      raster attributes: 1:1 aspect, W×H pixels
//   #0;2;r;g;b#1;2;r;g;b...       palette definitions, channels in percent
//   #i<sixels>$#j<sixels>$...-    band 0: one pass per register used
//   #i<sixels>$...                band 1 ... (no trailing '-')
//
// A sixel byte is `0x3F + bits`, where bit n paints row `band_top + n` of
// that column. `$` returns to column 0 of the same band so the next color
// can overpaint; `-` moves down six rows. Runs of more than three identical
// bytes collapse to `!<count><byte>`, and each pass drops its trailing empty
// columns.
//
// Output depends only on the image and the options, so identical inputs
// always produce identical bytes. The exception is shared-palette mode,
// where the first palette computed is reused until `clear_shared_palette`.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::error::Result;
use crate::palette::{BasePalette, Palette, PaletteSize};
use crate::quantize::{self, IndexedImage, Lookup, MapOptions};
use crate::raster::Raster;

/// Introducer for images whose unpainted pixels keep the existing background.
pub const DCS_TRANSPARENT: &str = "\x1bP0;1;0q";
/// Introducer for images whose unpainted pixels take register 0.
pub const DCS_OPAQUE: &str = "\x1bP0;0;0q";
/// String terminator closing the DCS.
pub const ST: &str = "\x1b\\";

/// Runs longer than this use the `!` repeat introducer.
const RLE_MIN_RUN: usize = 4;

/// Empty sixel (no bits set).
const EMPTY_SIXEL: u8 = 0x3F;

// ─── Options ─────────────────────────────────────────────────────────────────

/// Encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Number of registers median cut (or the fast cube) may produce.
    pub palette_size: PaletteSize,
    /// Treat pixels with alpha below `alpha_threshold` as unpainted.
    pub transparency: bool,
    pub alpha_threshold: u8,
    /// Use the uniform color cube instead of median cut.
    pub fast: bool,
    /// Fixed palette that replaces quantization.
    pub base_palette: Option<BasePalette>,
    /// Omit `#i;2;r;g;b` definitions (the terminal already has them).
    pub suppress_palette: bool,
    /// Floyd–Steinberg error diffusion while mapping.
    pub dither: bool,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            palette_size: PaletteSize::default(),
            transparency: false,
            alpha_threshold: 128,
            fast: false,
            base_palette: None,
            suppress_palette: false,
            dither: false,
        }
    }
}

// ─── Chosen palette ──────────────────────────────────────────────────────────

/// A palette plus how to look pixels up in it.
#[derive(Debug, Clone)]
struct Chosen {
    palette: Arc<Palette>,
    /// `Some` when `palette` is the uniform cube for this size.
    cube: Option<PaletteSize>,
}

impl Chosen {
    fn lookup(&self) -> Lookup<'_> {
        self.cube
            .map_or(Lookup::Nearest(&self.palette), Lookup::Cube)
    }
}

// ─── SixelEncoder ────────────────────────────────────────────────────────────

/// Turns rasters into sixel data.
///
/// `encode` takes `&self`; the only interior state is the shared-palette
/// cache, which sits behind a `Mutex`.
///
/// # Examples
///
/// ```
/// use cellterm_sixel::{Raster, Rgba, SixelEncoder};
///
/// let enc = SixelEncoder::default();
/// let img = Raster::filled(20, 12, Rgba::new(255, 0, 0, 255));
/// let data = enc.encode(&img);
/// assert!(data.starts_with("\"1;1;20;12#0;2;100;0;0"));
/// ```
#[derive(Debug, Default)]
pub struct SixelEncoder {
    options: EncoderOptions,
    shared_palette: bool,
    cache: Mutex<Option<Chosen>>,
}

impl SixelEncoder {
    #[must_use]
    pub fn new(options: EncoderOptions) -> Self {
        Self {
            options,
            shared_palette: false,
            cache: Mutex::new(None),
        }
    }

    #[inline]
    #[must_use]
    pub const fn options(&self) -> &EncoderOptions {
        &self.options
    }

    /// Replace every option at once. Drops any cached shared palette.
    pub fn set_options(&mut self, options: EncoderOptions) {
        self.options = options;
        self.clear_shared_palette();
    }

    /// Change the palette size.
    ///
    /// # Errors
    ///
    /// Returns [`SixelError::InvalidPaletteSize`](crate::SixelError) unless
    /// `n` is a power of two in `2..=2048`; the current size is kept.
    pub fn set_palette_size(&mut self, n: usize) -> Result<()> {
        self.options.palette_size = PaletteSize::new(n)?;
        self.clear_shared_palette();
        Ok(())
    }

    /// Reuse the first computed palette for every later image.
    pub fn set_shared_palette(&mut self, shared: bool) {
        self.shared_palette = shared;
        if !shared {
            self.clear_shared_palette();
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_shared_palette(&self) -> bool {
        self.shared_palette
    }

    /// Forget the cached shared palette; the next encode computes a new one.
    pub fn clear_shared_palette(&self) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The palette this encoder would use for `raster`.
    #[must_use]
    pub fn palette_for(&self, raster: &Raster) -> Arc<Palette> {
        self.choose(raster).palette
    }

    fn choose(&self, raster: &Raster) -> Chosen {
        if let Some(base) = self.options.base_palette {
            return Chosen {
                palette: Arc::new(Palette::from_base(base)),
                cube: None,
            };
        }

        if self.shared_palette {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(chosen) = cache.as_ref() {
                return chosen.clone();
            }
            let chosen = self.compute(raster);
            *cache = Some(chosen.clone());
            return chosen;
        }

        self.compute(raster)
    }

    fn compute(&self, raster: &Raster) -> Chosen {
        let size = self.options.palette_size;
        if self.options.fast {
            if let Some(cube) = quantize::uniform_cube(size) {
                debug!("sixel palette: uniform cube of {} colors", cube.len());
                return Chosen {
                    palette: Arc::new(cube),
                    cube: Some(size),
                };
            }
        }
        let hist = quantize::histogram(
            raster,
            self.options.transparency,
            self.options.alpha_threshold,
        );
        let palette = quantize::median_cut(&hist, size);
        debug!(
            "sixel palette: median cut {} distinct -> {} colors (limit {})",
            hist.len(),
            palette.len(),
            size
        );
        Chosen {
            palette: Arc::new(palette),
            cube: None,
        }
    }

    /// Quantize `raster` without emitting anything.
    #[must_use]
    pub fn quantize(&self, raster: &Raster) -> (Arc<Palette>, IndexedImage) {
        let chosen = self.choose(raster);
        let opts = MapOptions {
            transparency: self.options.transparency,
            alpha_threshold: self.options.alpha_threshold,
            dither: self.options.dither,
        };
        let indexed = quantize::map_pixels(raster, &chosen.palette, &chosen.lookup(), opts);
        (chosen.palette, indexed)
    }

    /// Encode to the sixel payload (everything between `q` and ST).
    #[must_use]
    pub fn encode(&self, raster: &Raster) -> String {
        let (palette, indexed) = self.quantize(raster);
        let mut out = String::with_capacity(raster.width() * raster.height() / 4 + 64);
        write_payload(&mut out, &indexed, &palette, self.options.suppress_palette);
        debug!(
            "sixel encode: {}x{} -> {} bytes",
            raster.width(),
            raster.height(),
            out.len()
        );
        out
    }

    /// Encode wrapped in `DCS … q` / `ST`, ready for the terminal.
    #[must_use]
    pub fn encode_framed(&self, raster: &Raster) -> String {
        let intro = if self.options.transparency {
            DCS_TRANSPARENT
        } else {
            DCS_OPAQUE
        };
        let payload = self.encode(raster);
        let mut out = String::with_capacity(intro.len() + payload.len() + ST.len());
        out.push_str(intro);
        out.push_str(&payload);
        out.push_str(ST);
        out
    }
}

// ─── Emission ────────────────────────────────────────────────────────────────

/// 8-bit channel to sixel percent, rounded.
#[inline]
fn percent(v: u8) -> u32 {
    (u32::from(v) * 100 + 127) / 255
}

fn push_run(out: &mut String, byte: u8, n: usize) {
    if n >= RLE_MIN_RUN {
        let _ = write!(out, "!{n}{}", char::from(byte));
    } else {
        for _ in 0..n {
            out.push(char::from(byte));
        }
    }
}

/// Run-length encode one color pass.
fn push_sixels(out: &mut String, bytes: &[u8]) {
    let mut iter = bytes.iter().copied();
    let Some(mut current) = iter.next() else {
        return;
    };
    let mut run = 1;
    for b in iter {
        if b == current {
            run += 1;
        } else {
            push_run(out, current, run);
            current = b;
            run = 1;
        }
    }
    push_run(out, current, run);
}

fn write_payload(out: &mut String, img: &IndexedImage, palette: &Palette, suppress: bool) {
    let (w, h) = (img.width, img.height);
    let _ = write!(out, "\"1;1;{w};{h}");

    if !suppress {
        for (i, c) in palette.colors().iter().enumerate() {
            let _ = write!(
                out,
                "#{i};2;{};{};{}",
                percent(c.r),
                percent(c.g),
                percent(c.b)
            );
        }
    }

    if w == 0 || h == 0 {
        return;
    }

    let registers = palette.len().max(1);
    let mut used = vec![false; registers];
    let mut line = vec![EMPTY_SIXEL; w];

    for band_top in (0..h).step_by(6) {
        if band_top > 0 {
            out.push('-');
        }
        let band_rows = (h - band_top).min(6);

        used.fill(false);
        for y in band_top..band_top + band_rows {
            for idx in img.indices[y * w..(y + 1) * w].iter().flatten() {
                if let Some(flag) = used.get_mut(usize::from(*idx)) {
                    *flag = true;
                }
            }
        }

        let mut first = true;
        for (color, _) in used.iter().enumerate().filter(|(_, u)| **u) {
            line.fill(EMPTY_SIXEL);
            for dy in 0..band_rows {
                let row = &img.indices[(band_top + dy) * w..(band_top + dy + 1) * w];
                for (x, idx) in row.iter().enumerate() {
                    if idx.is_some_and(|i| usize::from(i) == color) {
                        line[x] |= 1 << dy;
                    }
                }
            }
            let end = line
                .iter()
                .rposition(|b| *b != EMPTY_SIXEL)
                .map_or(0, |p| p + 1);

            if !first {
                out.push('$');
            }
            first = false;
            let _ = write!(out, "#{color}");
            push_sixels(out, &line[..end]);
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
