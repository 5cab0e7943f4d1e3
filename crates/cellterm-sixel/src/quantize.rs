// SPDX-License-Identifier: MIT
//
// Color quantization — reducing an RGBA raster to palette indices.
//
// Two palette builders:
//
//   Median cut (default). Build a histogram of the distinct painted colors,
//   then repeatedly split the bucket with the widest channel range at the
//   population-weighted median of that channel. Each surviving bucket
//   contributes its population-weighted mean. Every choice is tie-broken
//   (widest range first, then lowest bucket index; channel order R, G, B;
//   colors sorted by value within a channel), so the same image always
//   yields the same palette.
//
//   Uniform cube (fast mode). Split the palette's bit budget across R, G
//   and B round-robin starting with red and space each channel's levels
//   evenly. No histogram, and pixel lookup is arithmetic instead of a
//   nearest-color search. Needs at least one bit per channel, so palettes
//   smaller than 8 fall back to median cut.
//
// Mapping goes pixel by pixel in raster order, optionally diffusing the
// quantization error Floyd–Steinberg style. Unpainted pixels (transparency
// on and alpha below the threshold) map to `None` and never receive error.

use std::collections::HashMap;

use crate::palette::{Palette, PaletteSize};
use crate::raster::{Raster, Rgb};

// ─── Histogram ───────────────────────────────────────────────────────────────

/// A distinct color and how many pixels use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorCount {
    pub rgb: Rgb,
    pub count: u32,
}

/// Whether a pixel takes part in the image.
#[inline]
const fn is_painted(alpha: u8, transparency: bool, alpha_threshold: u8) -> bool {
    !transparency || alpha >= alpha_threshold
}

/// Distinct painted colors sorted by packed RGB value.
#[must_use]
pub fn histogram(raster: &Raster, transparency: bool, alpha_threshold: u8) -> Vec<ColorCount> {
    let mut counts: HashMap<Rgb, u32> = HashMap::new();
    for px in raster.pixels() {
        if is_painted(px.a, transparency, alpha_threshold) {
            *counts.entry(px.rgb()).or_insert(0) += 1;
        }
    }
    let mut out: Vec<ColorCount> = counts
        .into_iter()
        .map(|(rgb, count)| ColorCount { rgb, count })
        .collect();
    out.sort_unstable_by_key(|c| c.rgb.to_u32());
    out
}

// ─── Median Cut ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    #[inline]
    const fn of(self, c: Rgb) -> u8 {
        match self {
            Self::Red => c.r,
            Self::Green => c.g,
            Self::Blue => c.b,
        }
    }
}

#[derive(Debug, Default)]
struct Bucket {
    colors: Vec<ColorCount>,
}

impl Bucket {
    /// The channel with the largest value range, and that range. Ties keep
    /// the earlier channel in R, G, B order.
    fn widest(&self) -> (Channel, u8) {
        let mut best = (Channel::Red, 0);
        for ch in [Channel::Red, Channel::Green, Channel::Blue] {
            let (lo, hi) = self
                .colors
                .iter()
                .fold((u8::MAX, u8::MIN), |(lo, hi), c| {
                    let v = ch.of(c.rgb);
                    (lo.min(v), hi.max(v))
                });
            let range = hi.saturating_sub(lo);
            if range > best.1 {
                best = (ch, range);
            }
        }
        best
    }

    /// Split at the weighted median along `channel`. Both halves keep at
    /// least one color.
    fn split(mut self, channel: Channel) -> (Self, Self) {
        self.colors
            .sort_unstable_by_key(|c| (channel.of(c.rgb), c.rgb.to_u32()));

        let total: u64 = self.colors.iter().map(|c| u64::from(c.count)).sum();
        let half = total.div_ceil(2);
        let mut running = 0u64;
        let mut cut = self.colors.len() - 1;
        for (i, c) in self.colors.iter().enumerate() {
            running += u64::from(c.count);
            if running >= half {
                cut = i + 1;
                break;
            }
        }
        let cut = cut.clamp(1, self.colors.len() - 1);

        let high = self.colors.split_off(cut);
        (self, Self { colors: high })
    }

    /// Population-weighted mean, rounded to nearest.
    #[allow(clippy::cast_possible_truncation)]
    fn mean(&self) -> Rgb {
        let (mut r, mut g, mut b, mut n) = (0u64, 0u64, 0u64, 0u64);
        for c in &self.colors {
            let w = u64::from(c.count);
            r += u64::from(c.rgb.r) * w;
            g += u64::from(c.rgb.g) * w;
            b += u64::from(c.rgb.b) * w;
            n += w;
        }
        if n == 0 {
            return Rgb::BLACK;
        }
        // Means of u8 values stay within u8.
        Rgb::new(
            ((r + n / 2) / n) as u8,
            ((g + n / 2) / n) as u8,
            ((b + n / 2) / n) as u8,
        )
    }
}

/// Median-cut palette for a histogram.
///
/// Produces at most `size` entries; fewer when the image has fewer distinct
/// colors. An empty histogram yields a single black entry so register 0
/// always exists.
#[must_use]
pub fn median_cut(colors: &[ColorCount], size: PaletteSize) -> Palette {
    if colors.is_empty() {
        return Palette::new(vec![Rgb::BLACK]);
    }

    let target = size.get();
    let mut buckets = vec![Bucket {
        colors: colors.to_vec(),
    }];

    while buckets.len() < target {
        let mut pick: Option<(usize, Channel, u8)> = None;
        for (i, bucket) in buckets.iter().enumerate() {
            if bucket.colors.len() < 2 {
                continue;
            }
            let (channel, range) = bucket.widest();
            if pick.is_none_or(|(_, _, best)| range > best) {
                pick = Some((i, channel, range));
            }
        }
        let Some((i, channel, _)) = pick else {
            break;
        };
        let bucket = std::mem::take(&mut buckets[i]);
        let (low, high) = bucket.split(channel);
        buckets[i] = low;
        buckets.push(high);
    }

    Palette::new(buckets.iter().map(Bucket::mean).collect())
}

// ─── Uniform Cube ────────────────────────────────────────────────────────────

/// Bits per channel for a cube of `size` entries, red first.
const fn cube_bits(size: PaletteSize) -> [u32; 3] {
    let bits = size.bits();
    let base = bits / 3;
    let extra = bits % 3;
    [
        base + if extra > 0 { 1 } else { 0 },
        base + if extra > 1 { 1 } else { 0 },
        base,
    ]
}

/// Evenly spaced level `l` of `n` levels on `0..=255`.
#[allow(clippy::cast_possible_truncation)]
const fn cube_level(l: u32, n: u32) -> u8 {
    // l < n, so the quotient never exceeds 255.
    (l * 255 / (n - 1)) as u8
}

/// The fast-mode palette, or `None` when `size` cannot give every channel
/// at least one bit.
#[must_use]
pub fn uniform_cube(size: PaletteSize) -> Option<Palette> {
    if size.get() < 8 {
        return None;
    }
    let [rb, gb, bb] = cube_bits(size);
    let (nr, ng, nb) = (1u32 << rb, 1u32 << gb, 1u32 << bb);
    let mut colors = Vec::with_capacity(size.get());
    for r in 0..nr {
        for g in 0..ng {
            for b in 0..nb {
                colors.push(Rgb::new(
                    cube_level(r, nr),
                    cube_level(g, ng),
                    cube_level(b, nb),
                ));
            }
        }
    }
    Some(Palette::new(colors))
}

// ─── Mapping ─────────────────────────────────────────────────────────────────

/// How pixels are turned into register numbers.
#[derive(Debug)]
pub enum Lookup<'a> {
    /// Nearest-color search with a per-encode memo.
    Nearest(&'a Palette),
    /// Arithmetic lookup into a uniform cube built by [`uniform_cube`].
    Cube(PaletteSize),
}

impl Lookup<'_> {
    #[allow(clippy::cast_possible_truncation)]
    fn index(&self, rgb: Rgb, memo: &mut HashMap<Rgb, u16>) -> u16 {
        match self {
            Self::Nearest(palette) => *memo
                .entry(rgb)
                // Palettes hold at most 2048 entries.
                .or_insert_with(|| palette.nearest(rgb) as u16),
            Self::Cube(size) => {
                let [rb, gb, bb] = cube_bits(*size);
                let level = |v: u8, bits: u32| {
                    let n = (1u32 << bits) - 1;
                    (u32::from(v) * n + 127) / 255
                };
                let r = level(rgb.r, rb);
                let g = level(rgb.g, gb);
                let b = level(rgb.b, bb);
                ((((r << gb) | g) << bb) | b) as u16
            }
        }
    }
}

/// A raster reduced to palette registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedImage {
    pub width: usize,
    pub height: usize,
    /// Row-major register numbers; `None` for unpainted pixels.
    pub indices: Vec<Option<u16>>,
}

/// Options that shape [`map_pixels`].
#[derive(Debug, Clone, Copy)]
pub struct MapOptions {
    pub transparency: bool,
    pub alpha_threshold: u8,
    pub dither: bool,
}

/// Map every pixel of `raster` through `lookup`.
#[must_use]
pub fn map_pixels(
    raster: &Raster,
    palette: &Palette,
    lookup: &Lookup<'_>,
    opts: MapOptions,
) -> IndexedImage {
    let (w, h) = (raster.width(), raster.height());
    let mut memo = HashMap::new();
    let mut indices = Vec::with_capacity(w * h);

    if !opts.dither {
        for px in raster.pixels() {
            indices.push(
                is_painted(px.a, opts.transparency, opts.alpha_threshold)
                    .then(|| lookup.index(px.rgb(), &mut memo)),
            );
        }
        return IndexedImage {
            width: w,
            height: h,
            indices,
        };
    }

    // Working copy in i32 so diffused error can overshoot 0..=255.
    let mut work: Vec<[i32; 3]> = raster
        .pixels()
        .iter()
        .map(|p| [i32::from(p.r), i32::from(p.g), i32::from(p.b)])
        .collect();

    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let px = raster.pixels()[i];
            if !is_painted(px.a, opts.transparency, opts.alpha_threshold) {
                indices.push(None);
                continue;
            }
            let want = work[i].map(|v| v.clamp(0, 255));
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let rgb = Rgb::new(want[0] as u8, want[1] as u8, want[2] as u8);
            let idx = lookup.index(rgb, &mut memo);
            indices.push(Some(idx));

            let got = palette.get(usize::from(idx)).unwrap_or(rgb);
            let err = [
                want[0] - i32::from(got.r),
                want[1] - i32::from(got.g),
                want[2] - i32::from(got.b),
            ];
            let mut spread = |dx: isize, dy: usize, weight: i32| {
                let Some(nx) = x.checked_add_signed(dx) else {
                    return;
                };
                let ny = y + dy;
                if nx >= w || ny >= h {
                    return;
                }
                let cell = &mut work[ny * w + nx];
                for (v, e) in cell.iter_mut().zip(err) {
                    *v += e * weight / 16;
                }
            };
            spread(1, 0, 7);
            spread(-1, 1, 3);
            spread(0, 1, 5);
            spread(1, 1, 1);
        }
    }

    IndexedImage {
        width: w,
        height: h,
        indices,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
