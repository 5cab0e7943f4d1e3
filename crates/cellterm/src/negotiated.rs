// SPDX-License-Identifier: MIT
//
// What one terminal has told us about itself.
//
// Every ECMA-48 backend owns a `TerminalNegotiatedState`. Query replies
// decoded by the input scanner are folded in with `apply`, which reports
// what the backend should do about them: write a palette correction,
// repaint, or nothing.
//
// White washout:
//
//   Some terminals render palette white (index 7) or the default background
//   so bright that light-gray text on it disappears. When such a report
//   arrives and correction is enabled, index 7 is redefined to a mid gray
//   once per session. The value it replaced is remembered so shutdown can
//   put it back (`take_restore`). After a restore the state is clear again
//   and a later session can correct anew.

use bitflags::bitflags;
use tracing::{debug, info};

use crate::cell::CellAttributes;
use crate::color::{Color, ColorSpec, DEFAULT_BACKGROUND, DEFAULT_FOREGROUND, DEFAULT_PALETTE, Rgb};
use crate::input::Reply;

/// Luminance above which a white or background report counts as washed out.
pub const WASHOUT_THRESHOLD: u8 = 0xC8;

/// The palette slot that gets corrected.
pub const WASHOUT_INDEX: u8 = Color::White.index();

/// Replacement written into `WASHOUT_INDEX`.
pub const WASHOUT_TARGET: Rgb = Rgb::new(0xa8, 0xa8, 0xa8);

// ─── Capabilities ────────────────────────────────────────────────────────────

bitflags! {
    /// Terminal features learned from replies or the environment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Capabilities: u8 {
        const TRUECOLOR   = 0b0001;
        const SIXEL       = 0b0010;
        const ITERM2      = 0b0100;
        const SYNC_OUTPUT = 0b1000;
    }
}

impl Capabilities {
    /// Hints from `COLORTERM` and `TERM_PROGRAM`.
    #[must_use]
    pub fn from_env(colorterm: Option<&str>, term_program: Option<&str>) -> Self {
        let mut caps = Self::empty();
        if matches!(colorterm, Some("truecolor" | "24bit")) {
            caps |= Self::TRUECOLOR;
        }
        if let Some(program) = term_program {
            match program {
                "iTerm.app" | "WezTerm" => caps |= Self::ITERM2 | Self::TRUECOLOR,
                "vscode" => caps |= Self::TRUECOLOR,
                _ => {}
            }
        }
        caps
    }

    /// [`from_env`](Self::from_env) with this process's environment.
    #[must_use]
    pub fn detect() -> Self {
        let colorterm = std::env::var("COLORTERM").ok();
        let term_program = std::env::var("TERM_PROGRAM").ok();
        Self::from_env(colorterm.as_deref(), term_program.as_deref())
    }
}

// ─── Effects ─────────────────────────────────────────────────────────────────

/// What the backend should do after a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplyEffect {
    /// Redefine this palette slot.
    pub correction: Option<(u8, Rgb)>,
    /// Repaint the whole screen.
    pub repaint: bool,
}

/// How to undo a palette correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaletteRestore {
    /// OSC 4 with the value the terminal originally reported.
    Set(u8, Rgb),
    /// OSC 104: the original value was never seen.
    Reset(u8),
}

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TerminalNegotiatedState {
    default_fg: Option<Rgb>,
    default_bg: Option<Rgb>,
    palette: [Option<Rgb>; 16],
    capabilities: Capabilities,
    cell_pixels: Option<(u16, u16)>,
    window_pixels: Option<(u16, u16)>,
    pointer_shape: Option<String>,
    washout_enabled: bool,
    /// `Some(original)` while index 7 is corrected.
    washout: Option<Option<Rgb>>,
}

impl TerminalNegotiatedState {
    #[must_use]
    pub const fn new(capabilities: Capabilities, washout_enabled: bool) -> Self {
        Self {
            default_fg: None,
            default_bg: None,
            palette: [None; 16],
            capabilities,
            cell_pixels: None,
            window_pixels: None,
            pointer_shape: None,
            washout_enabled,
            washout: None,
        }
    }

    // ── Accessors ──

    #[inline]
    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    #[inline]
    #[must_use]
    pub const fn has(&self, caps: Capabilities) -> bool {
        self.capabilities.contains(caps)
    }

    pub fn insert_capabilities(&mut self, caps: Capabilities) {
        self.capabilities.insert(caps);
    }

    #[inline]
    #[must_use]
    pub const fn default_foreground(&self) -> Option<Rgb> {
        self.default_fg
    }

    #[inline]
    #[must_use]
    pub const fn default_background(&self) -> Option<Rgb> {
        self.default_bg
    }

    /// A palette entry the terminal reported (or we set).
    #[must_use]
    pub fn palette_entry(&self, index: u8) -> Option<Rgb> {
        self.palette.get(usize::from(index)).copied().flatten()
    }

    /// Cell size in pixels, `(width, height)`.
    #[inline]
    #[must_use]
    pub const fn cell_pixels(&self) -> Option<(u16, u16)> {
        self.cell_pixels
    }

    #[inline]
    #[must_use]
    pub const fn window_pixels(&self) -> Option<(u16, u16)> {
        self.window_pixels
    }

    #[must_use]
    pub fn pointer_shape(&self) -> Option<&str> {
        self.pointer_shape.as_deref()
    }

    /// Whether index 7 currently holds the washout correction.
    #[inline]
    #[must_use]
    pub const fn is_washout_corrected(&self) -> bool {
        self.washout.is_some()
    }

    /// The 16-color table with reported entries substituted in.
    #[must_use]
    pub fn effective_palette(&self) -> [Rgb; 16] {
        let mut out = DEFAULT_PALETTE;
        for (slot, reported) in out.iter_mut().zip(&self.palette) {
            if let Some(c) = reported {
                *slot = *c;
            }
        }
        out
    }

    // ── Replies ──

    /// Fold a reply into the state.
    pub fn apply(&mut self, reply: &Reply) -> ReplyEffect {
        match reply {
            Reply::Palette { index, color } => self.apply_palette(*index, *color),
            Reply::DefaultForeground(c) => {
                let changed = self.default_fg.replace(*c) != Some(*c);
                ReplyEffect {
                    correction: None,
                    repaint: changed,
                }
            }
            Reply::DefaultBackground(c) => {
                let changed = self.default_bg.replace(*c) != Some(*c);
                let mut effect = ReplyEffect {
                    correction: None,
                    repaint: changed,
                };
                if c.luminance() > WASHOUT_THRESHOLD {
                    let original = self.palette_entry(WASHOUT_INDEX);
                    if let Some(fix) = self.correct_washout(original) {
                        effect.correction = Some(fix);
                        effect.repaint = true;
                    }
                }
                effect
            }
            Reply::Mode { mode, status } => {
                if *mode == crate::ansi::SYNC_OUTPUT_MODE && matches!(status, 1..=3) {
                    debug!("synchronized output supported (status {})", status);
                    self.capabilities.insert(Capabilities::SYNC_OUTPUT);
                }
                ReplyEffect::default()
            }
            Reply::DeviceAttributes(params) => {
                if params.contains(&4) {
                    debug!("DA1 advertises sixel");
                    self.capabilities.insert(Capabilities::SIXEL);
                }
                ReplyEffect::default()
            }
            Reply::CellPixels { width, height } => {
                if *width > 0 && *height > 0 {
                    self.cell_pixels = Some((*width, *height));
                }
                ReplyEffect::default()
            }
            Reply::WindowPixels { width, height } => {
                self.window_pixels = Some((*width, *height));
                ReplyEffect::default()
            }
            Reply::PointerShape(shape) => {
                self.pointer_shape = Some(shape.clone());
                ReplyEffect::default()
            }
            Reply::CursorPosition { .. } => ReplyEffect::default(),
        }
    }

    fn apply_palette(&mut self, index: u8, color: Rgb) -> ReplyEffect {
        let Some(slot) = self.palette.get_mut(usize::from(index)) else {
            return ReplyEffect::default();
        };
        if index == WASHOUT_INDEX {
            // A bright background corrected index 7 before its own report
            // arrived; that report is what shutdown must put back.
            if let Some(original @ None) = &mut self.washout {
                debug!("palette {} reported as {:?} after correction", index, color);
                *original = Some(color);
            }
            if self.washout.is_some() {
                return ReplyEffect::default();
            }
        }
        let changed = slot.replace(color) != Some(color);
        let mut effect = ReplyEffect {
            correction: None,
            repaint: changed,
        };
        if index == WASHOUT_INDEX && color.luminance() > WASHOUT_THRESHOLD {
            if let Some(fix) = self.correct_washout(Some(color)) {
                effect.correction = Some(fix);
                effect.repaint = true;
            }
        }
        effect
    }

    fn correct_washout(&mut self, original: Option<Rgb>) -> Option<(u8, Rgb)> {
        if !self.washout_enabled || self.washout.is_some() {
            return None;
        }
        info!(
            "white washout detected, redefining palette {} to {:?}",
            WASHOUT_INDEX, WASHOUT_TARGET
        );
        self.washout = Some(original);
        self.palette[usize::from(WASHOUT_INDEX)] = Some(WASHOUT_TARGET);
        Some((WASHOUT_INDEX, WASHOUT_TARGET))
    }

    /// Undo the washout correction, if one is active.
    pub fn take_restore(&mut self) -> Option<PaletteRestore> {
        let original = self.washout.take()?;
        self.palette[usize::from(WASHOUT_INDEX)] = original;
        Some(original.map_or(PaletteRestore::Reset(WASHOUT_INDEX), |c| {
            PaletteRestore::Set(WASHOUT_INDEX, c)
        }))
    }

    // ── Color Resolution ──

    /// The RGB a foreground spec shows as on this terminal.
    #[must_use]
    pub fn foreground_rgb(&self, attrs: CellAttributes) -> Rgb {
        self.spec_rgb(attrs.fg, attrs.is_bold(), true)
    }

    /// The RGB a background spec shows as on this terminal.
    #[must_use]
    pub fn background_rgb(&self, attrs: CellAttributes) -> Rgb {
        self.spec_rgb(attrs.bg, false, false)
    }

    fn spec_rgb(&self, spec: ColorSpec, bright: bool, foreground: bool) -> Rgb {
        match spec {
            ColorSpec::Rgb(c) => c,
            ColorSpec::Indexed(color) => {
                let i = color.palette_index(bright);
                self.palette[i].unwrap_or(DEFAULT_PALETTE[i])
            }
            ColorSpec::Default if foreground => self.default_fg.unwrap_or(DEFAULT_FOREGROUND),
            ColorSpec::Default => self.default_bg.unwrap_or(DEFAULT_BACKGROUND),
        }
    }
}

impl Default for TerminalNegotiatedState {
    fn default() -> Self {
        Self::new(Capabilities::empty(), true)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BRIGHT_WHITE: Rgb = Rgb::new(0xf0, 0xf0, 0xf0);

    fn white_report(color: Rgb) -> Reply {
        Reply::Palette {
            index: WASHOUT_INDEX,
            color,
        }
    }

    // ── Washout ──

    #[test]
    fn bright_white_is_corrected_once() {
        let mut state = TerminalNegotiatedState::default();
        let first = state.apply(&white_report(BRIGHT_WHITE));
        assert_eq!(first.correction, Some((7, WASHOUT_TARGET)));
        assert!(first.repaint);
        assert!(state.is_washout_corrected());
        assert_eq!(state.palette_entry(7), Some(WASHOUT_TARGET));

        let second = state.apply(&white_report(BRIGHT_WHITE));
        assert_eq!(second, ReplyEffect::default());
    }

    #[test]
    fn restore_returns_original_and_clears() {
        let mut state = TerminalNegotiatedState::default();
        state.apply(&white_report(BRIGHT_WHITE));
        assert_eq!(state.take_restore(), Some(PaletteRestore::Set(7, BRIGHT_WHITE)));
        assert!(!state.is_washout_corrected());
        assert_eq!(state.take_restore(), None);

        // A fresh report corrects again.
        let again = state.apply(&white_report(BRIGHT_WHITE));
        assert_eq!(again.correction, Some((7, WASHOUT_TARGET)));
    }

    #[test]
    fn bright_background_without_white_report_resets() {
        let mut state = TerminalNegotiatedState::default();
        let effect = state.apply(&Reply::DefaultBackground(Rgb::WHITE));
        assert_eq!(effect.correction, Some((7, WASHOUT_TARGET)));
        assert_eq!(state.take_restore(), Some(PaletteRestore::Reset(7)));
        assert_eq!(state.palette_entry(7), None);
    }

    #[test]
    fn late_white_report_becomes_the_restore_value() {
        let reported = Rgb::new(0xe5, 0xe5, 0xe5);
        let mut state = TerminalNegotiatedState::default();
        state.apply(&Reply::DefaultBackground(Rgb::WHITE));
        assert_eq!(state.apply(&white_report(reported)), ReplyEffect::default());
        assert_eq!(state.palette_entry(7), Some(WASHOUT_TARGET));

        // Echoes of the corrected value don't replace the first report.
        state.apply(&white_report(WASHOUT_TARGET));
        assert_eq!(state.take_restore(), Some(PaletteRestore::Set(7, reported)));
        assert_eq!(state.palette_entry(7), Some(reported));
    }

    #[test]
    fn dim_white_is_left_alone() {
        let mut state = TerminalNegotiatedState::default();
        let effect = state.apply(&white_report(Rgb::new(0xaa, 0xaa, 0xaa)));
        assert_eq!(effect.correction, None);
        assert!(!state.is_washout_corrected());
    }

    #[test]
    fn correction_disabled() {
        let mut state = TerminalNegotiatedState::new(Capabilities::empty(), false);
        let effect = state.apply(&white_report(BRIGHT_WHITE));
        assert_eq!(effect.correction, None);
        assert_eq!(state.palette_entry(7), Some(BRIGHT_WHITE));
    }

    // ── Capabilities ──

    #[test]
    fn da1_and_decrpm_set_capabilities() {
        let mut state = TerminalNegotiatedState::default();
        state.apply(&Reply::DeviceAttributes(vec![62, 4, 22]));
        state.apply(&Reply::Mode {
            mode: 2026,
            status: 2,
        });
        assert!(state.has(Capabilities::SIXEL | Capabilities::SYNC_OUTPUT));

        let mut plain = TerminalNegotiatedState::default();
        plain.apply(&Reply::DeviceAttributes(vec![62, 22]));
        plain.apply(&Reply::Mode {
            mode: 2026,
            status: 0,
        });
        assert_eq!(plain.capabilities(), Capabilities::empty());
    }

    #[test]
    fn env_hints() {
        assert_eq!(
            Capabilities::from_env(Some("truecolor"), None),
            Capabilities::TRUECOLOR
        );
        assert_eq!(
            Capabilities::from_env(None, Some("iTerm.app")),
            Capabilities::TRUECOLOR | Capabilities::ITERM2
        );
        assert_eq!(Capabilities::from_env(Some("yes"), Some("Apple_Terminal")), Capabilities::empty());
    }

    #[test]
    fn pixel_sizes_and_pointer_shape() {
        let mut state = TerminalNegotiatedState::default();
        state.apply(&Reply::CellPixels {
            width: 10,
            height: 20,
        });
        state.apply(&Reply::CellPixels {
            width: 0,
            height: 0,
        });
        state.apply(&Reply::PointerShape("xterm".into()));
        assert_eq!(state.cell_pixels(), Some((10, 20)));
        assert_eq!(state.pointer_shape(), Some("xterm"));
    }

    // ── Color Resolution ──

    #[test]
    fn resolves_default_colors() {
        let mut state = TerminalNegotiatedState::default();
        let attrs = CellAttributes::DEFAULT;
        assert_eq!(state.foreground_rgb(attrs), DEFAULT_FOREGROUND);
        assert_eq!(state.background_rgb(attrs), DEFAULT_BACKGROUND);

        let effect = state.apply(&Reply::DefaultForeground(Rgb::new(1, 2, 3)));
        assert!(effect.repaint);
        assert_eq!(state.foreground_rgb(attrs), Rgb::new(1, 2, 3));
        assert!(!state.apply(&Reply::DefaultForeground(Rgb::new(1, 2, 3))).repaint);
    }

    #[test]
    fn resolves_bright_indexed_from_palette() {
        let mut state = TerminalNegotiatedState::default();
        state.apply(&Reply::Palette {
            index: 9,
            color: Rgb::new(250, 10, 10),
        });
        let attrs = CellAttributes::DEFAULT
            .with_fg(ColorSpec::Indexed(Color::Red))
            .with_flags(crate::cell::Attr::BOLD);
        assert_eq!(state.foreground_rgb(attrs), Rgb::new(250, 10, 10));
        assert_eq!(
            state.foreground_rgb(attrs.with_flags(crate::cell::Attr::empty())),
            DEFAULT_PALETTE[1]
        );
    }

    #[test]
    fn out_of_range_palette_index_is_ignored() {
        let mut state = TerminalNegotiatedState::default();
        let effect = state.apply(&Reply::Palette {
            index: 200,
            color: Rgb::WHITE,
        });
        assert_eq!(effect, ReplyEffect::default());
    }
}
