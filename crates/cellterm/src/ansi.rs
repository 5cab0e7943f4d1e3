// SPDX-License-Identifier: MIT
//
// ECMA-48 / xterm control sequence generation.
//
// Pure functions that write sequences to any `impl Write`. No state and no
// decisions about when to emit; `CellWriter` and the backend own those.
//
// Cursor positions are 0-indexed here and converted to the 1-indexed
// coordinates the protocol uses. OSC strings are terminated with ST
// (`ESC \`) except the window title, which uses BEL for the widest
// compatibility.
//
// Every function returns the writer's `io::Result`. Writing to
// `OutputBuffer` never fails.

use std::io::{self, Write};

use crate::cell::Attr;
use crate::color::Rgb;

/// DEC private mode for synchronized output.
pub const SYNC_OUTPUT_MODE: u16 = 2026;

// ─── Cursor ──────────────────────────────────────────────────────────────────

/// CUP to `(x, y)`.
#[inline]
pub fn cursor_to(w: &mut impl Write, x: u16, y: u16) -> io::Result<()> {
    write!(w, "\x1b[{};{}H", u32::from(y) + 1, u32::from(x) + 1)
}

#[inline]
pub fn cursor_hide(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?25l")
}

#[inline]
pub fn cursor_show(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?25h")
}

// ─── Screen ──────────────────────────────────────────────────────────────────

/// ED 2.
#[inline]
pub fn clear_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[2J")
}

/// SGR 0. Callers tracking attribute state must invalidate it.
#[inline]
pub fn reset(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[0m")
}

// ─── Colors ──────────────────────────────────────────────────────────────────

/// A color as it goes on the wire, after negotiation has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SgrColor {
    /// SGR 39 / 49.
    Default,
    /// 0–7 normal, 8–15 AIXterm bright.
    Indexed(u8),
    /// 24-bit.
    Rgb(Rgb),
}

/// Foreground: 30–37, 90–97, `38;2;r;g;b` or 39.
pub fn fg(w: &mut impl Write, color: SgrColor) -> io::Result<()> {
    match color {
        SgrColor::Default => w.write_all(b"\x1b[39m"),
        SgrColor::Indexed(i) if i < 8 => write!(w, "\x1b[{}m", 30 + u16::from(i)),
        SgrColor::Indexed(i) => write!(w, "\x1b[{}m", 82 + u16::from(i & 15)),
        SgrColor::Rgb(c) => write!(w, "\x1b[38;2;{};{};{}m", c.r, c.g, c.b),
    }
}

/// Background: 40–47, 100–107, `48;2;r;g;b` or 49.
pub fn bg(w: &mut impl Write, color: SgrColor) -> io::Result<()> {
    match color {
        SgrColor::Default => w.write_all(b"\x1b[49m"),
        SgrColor::Indexed(i) if i < 8 => write!(w, "\x1b[{}m", 40 + u16::from(i)),
        SgrColor::Indexed(i) => write!(w, "\x1b[{}m", 92 + u16::from(i & 15)),
        SgrColor::Rgb(c) => write!(w, "\x1b[48;2;{};{};{}m", c.r, c.g, c.b),
    }
}

// ─── Attributes ──────────────────────────────────────────────────────────────

/// One SGR sequence for the rendered flags: bold 1, underline 4, blink 5,
/// reverse 7. PROTECT and IMAGE produce nothing.
pub fn attrs(w: &mut impl Write, attr: Attr) -> io::Result<()> {
    let rendered = attr & (Attr::BOLD | Attr::UNDERLINE | Attr::BLINK | Attr::REVERSE);
    if rendered.is_empty() {
        return Ok(());
    }

    w.write_all(b"\x1b[")?;
    let mut first = true;

    macro_rules! emit {
        ($flag:expr, $code:expr) => {
            if rendered.contains($flag) {
                if !first {
                    w.write_all(b";")?;
                }
                w.write_all($code)?;
                first = false;
            }
        };
    }

    emit!(Attr::BOLD, b"1");
    emit!(Attr::UNDERLINE, b"4");
    emit!(Attr::BLINK, b"5");
    emit!(Attr::REVERSE, b"7");
    let _ = first;

    w.write_all(b"m")
}

// ─── Synchronized Output ─────────────────────────────────────────────────────

#[inline]
pub fn begin_sync(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?2026h")
}

#[inline]
pub fn end_sync(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?2026l")
}

// ─── Alternate Screen ────────────────────────────────────────────────────────

#[inline]
pub fn enter_alt_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1049h")
}

#[inline]
pub fn exit_alt_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1049l")
}

// ─── Mouse, Paste, Focus ─────────────────────────────────────────────────────

/// Mouse tracking granularity for the SGR mouse protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseMode {
    /// Press and release (DEC 1000).
    Click,
    /// Plus drag motion (DEC 1002).
    Drag,
    /// Plus all motion (DEC 1003).
    Motion,
}

/// Enable SGR (DEC 1006) mouse reports at the given granularity.
pub fn enable_mouse(w: &mut impl Write, mode: MouseMode) -> io::Result<()> {
    w.write_all(b"\x1b[?1000h")?;
    if matches!(mode, MouseMode::Drag | MouseMode::Motion) {
        w.write_all(b"\x1b[?1002h")?;
    }
    if mode == MouseMode::Motion {
        w.write_all(b"\x1b[?1003h")?;
    }
    w.write_all(b"\x1b[?1006h")
}

pub fn disable_mouse(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1006l\x1b[?1003l\x1b[?1002l\x1b[?1000l")
}

/// DEC 2004.
#[inline]
pub fn enable_bracketed_paste(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?2004h")
}

#[inline]
pub fn disable_bracketed_paste(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?2004l")
}

/// DEC 1004: the terminal reports `CSI I` / `CSI O`.
#[inline]
pub fn enable_focus_reporting(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1004h")
}

#[inline]
pub fn disable_focus_reporting(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1004l")
}

// ─── OSC Colors ──────────────────────────────────────────────────────────────

/// `OSC 4 ; i ; ?`: ask for palette entry `i`.
#[inline]
pub fn query_palette(w: &mut impl Write, index: u8) -> io::Result<()> {
    write!(w, "\x1b]4;{index};?\x1b\\")
}

/// `OSC 10 ; ?`: ask for the default foreground.
#[inline]
pub fn query_default_foreground(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b]10;?\x1b\\")
}

/// `OSC 11 ; ?`: ask for the default background.
#[inline]
pub fn query_default_background(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b]11;?\x1b\\")
}

/// `OSC 4 ; i ; rgb:rr/gg/bb`: redefine palette entry `i`.
pub fn set_palette(w: &mut impl Write, index: u8, c: Rgb) -> io::Result<()> {
    write!(w, "\x1b]4;{index};rgb:{:02x}/{:02x}/{:02x}\x1b\\", c.r, c.g, c.b)
}

/// `OSC 104 ; i`: restore palette entry `i` to the terminal's default.
#[inline]
pub fn reset_palette(w: &mut impl Write, index: u8) -> io::Result<()> {
    write!(w, "\x1b]104;{index}\x1b\\")
}

/// `OSC 22 ; ?`: ask for the pointer shape.
#[inline]
pub fn query_pointer_shape(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b]22;?\x1b\\")
}

/// `OSC 2`: window title. Control characters are dropped.
pub fn set_title(w: &mut impl Write, title: &str) -> io::Result<()> {
    w.write_all(b"\x1b]2;")?;
    let clean: String = title.chars().filter(|c| !c.is_control()).collect();
    w.write_all(clean.as_bytes())?;
    w.write_all(b"\x07")
}

// ─── Capability Queries ──────────────────────────────────────────────────────

/// DECRQM for a DEC private mode; the reply is `CSI ? mode ; Pm $ y`.
#[inline]
pub fn request_mode(w: &mut impl Write, mode: u16) -> io::Result<()> {
    write!(w, "\x1b[?{mode}$p")
}

/// DA1; the reply is `CSI ? Ps ; … c`.
#[inline]
pub fn primary_device_attributes(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[c")
}

/// XTWINOPS 14: text area size in pixels.
#[inline]
pub fn query_window_pixels(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[14t")
}

/// XTWINOPS 16: cell size in pixels.
#[inline]
pub fn query_cell_pixels(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[16t")
}

/// DSR 6: ask for the cursor position.
#[inline]
pub fn request_cursor_position(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[6n")
}

// ─── Tests ───────────────────────────────────────────────────────────────────
