// SPDX-License-Identifier: MIT
//
// Terminal input scanner.
//
// Turns raw transport bytes into two kinds of output:
//
//   - `Event`s the application sees: keys, mouse, paste, focus.
//   - `Reply`s to queries the backend sent: cursor position reports,
//     DECRPM mode reports, DA1, pixel sizes, OSC color and pointer-shape
//     answers. These feed the backend's negotiated state.
//
// Recognized families:
//
// - CSI: cursor/editing/function keys, SGR mouse, focus in/out, CPR,
//   DECRPM (`CSI ? Ps ; Pm $ y`), DA1 (`CSI ? … c`), XTWINOPS replies
//   (`CSI 4 ; h ; w t`, `CSI 6 ; h ; w t`)
// - OSC 4 / 10 / 11 / 22, terminated by BEL or ST
// - DCS strings, skipped whole
// - SS3 keys, bracketed paste, Alt+key, UTF-8, control bytes
//
// Anything else is dropped without error.
//
// # Buffering
//
// Sequences split across reads stay in an internal buffer until they
// complete. The buffer is capped at `MAX_PENDING_BYTES`; past the cap the
// oldest bytes are discarded. A lone ESC stays pending until the caller
// decides more bytes aren't coming (see `ESCAPE_TIMEOUT`) and calls
// [`Parser::flush`].
//
// # Cursor reports vs. F3
//
// `CSI row ; col R` is both a cursor position report and modified F3.
// The parser reads it as a report only while one is outstanding
// ([`Parser::expect_cursor_report`]).

use std::time::Duration;

use bitflags::bitflags;
use tracing::warn;

use crate::color::Rgb;

/// Upper bound on bytes held for incomplete sequences.
pub const MAX_PENDING_BYTES: usize = 8192;

/// Upper bound on a single bracketed paste.
pub const MAX_PASTE_BYTES: usize = 4 * 1024 * 1024;

/// How long a lone ESC waits for the rest of a sequence.
pub const ESCAPE_TIMEOUT: Duration = Duration::from_millis(50);

// ─── Event Types ─────────────────────────────────────────────────────────────

/// An input event delivered to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Key(KeyEvent),
    Mouse(MouseEvent),
    /// Text between bracketed-paste delimiters.
    Paste(String),
    FocusGained,
    FocusLost,
    /// The target's size in cells changed.
    Resize { width: u16, height: u16 },
    /// The target's transport closed or failed.
    Disconnect,
    /// The application should stop.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Char(char),
    Enter,
    Tab,
    Backspace,
    Escape,
    Delete,
    Insert,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    /// F1 through F20.
    F(u8),
}

bitflags! {
    /// Modifier keys, in xterm's `param = 1 + bitmask` order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0000_0001;
        const ALT   = 0b0000_0010;
        const CTRL  = 0b0000_0100;
        const SUPER = 0b0000_1000;
        const HYPER = 0b0001_0000;
        const META  = 0b0010_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    /// 0-indexed column.
    pub x: u16,
    /// 0-indexed row.
    pub y: u16,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEventKind {
    Press(MouseButton),
    Release(MouseButton),
    Drag(MouseButton),
    Move,
    ScrollUp,
    ScrollDown,
    ScrollLeft,
    ScrollRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

// ─── Replies ─────────────────────────────────────────────────────────────────

/// A terminal's answer to a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// CPR, converted to 0-indexed.
    CursorPosition { x: u16, y: u16 },
    /// DECRPM. Status 0 = unrecognized, 1 = set, 2 = reset,
    /// 3 = permanently set, 4 = permanently reset.
    Mode { mode: u16, status: u8 },
    /// DA1 parameters after the `?`.
    DeviceAttributes(Vec<u16>),
    /// Text area size in pixels.
    WindowPixels { width: u16, height: u16 },
    /// Cell size in pixels.
    CellPixels { width: u16, height: u16 },
    /// OSC 4 palette entry.
    Palette { index: u8, color: Rgb },
    /// OSC 10.
    DefaultForeground(Rgb),
    /// OSC 11.
    DefaultBackground(Rgb),
    /// OSC 22.
    PointerShape(String),
}

/// One scanner output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Event(Event),
    Reply(Reply),
}

// ─── Parser ──────────────────────────────────────────────────────────────────

const PASTE_START: &[u8] = b"\x1b[200~";
const PASTE_END: &[u8] = b"\x1b[201~";

/// Streaming input scanner.
///
/// ```
/// use cellterm::input::{Event, Input, KeyCode, Parser, Reply};
///
/// let mut parser = Parser::new();
/// let out = parser.advance(b"a\x1b]11;rgb:ffff/ffff/ffff\x07");
/// assert!(matches!(out[0], Input::Event(Event::Key(k)) if k.code == KeyCode::Char('a')));
/// assert!(matches!(out[1], Input::Reply(Reply::DefaultBackground(_))));
/// ```
pub struct Parser {
    buf: Vec<u8>,
    in_paste: bool,
    paste: Vec<u8>,
    cpr_pending: usize,
}

impl Parser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(64),
            in_paste: false,
            paste: Vec::new(),
            cpr_pending: 0,
        }
    }

    /// Record that a cursor position request went out.
    pub const fn expect_cursor_report(&mut self) {
        self.cpr_pending = self.cpr_pending.saturating_add(1);
    }

    #[inline]
    #[must_use]
    pub const fn cursor_reports_pending(&self) -> usize {
        self.cpr_pending
    }

    /// Feed bytes and return everything that could be decoded.
    pub fn advance(&mut self, data: &[u8]) -> Vec<Input> {
        let mut buf = std::mem::take(&mut self.buf);
        buf.extend_from_slice(data);
        let mut out = Vec::new();
        let mut pos = 0;

        while pos < buf.len() {
            // ── Paste body ──
            if self.in_paste {
                let remaining = &buf[pos..];
                if let Some(end) = find_subsequence(remaining, PASTE_END) {
                    append_bounded(&mut self.paste, &remaining[..end]);
                    let text = String::from_utf8_lossy(&self.paste).into_owned();
                    self.paste.clear();
                    out.push(Input::Event(Event::Paste(text)));
                    pos += end + PASTE_END.len();
                    self.in_paste = false;
                    continue;
                }
                // Hold back what could be the start of the delimiter.
                let take = remaining.len().saturating_sub(PASTE_END.len() - 1);
                append_bounded(&mut self.paste, &remaining[..take]);
                pos += take;
                break;
            }

            // ── Paste start ──
            let remaining = &buf[pos..];
            if remaining.starts_with(PASTE_START) {
                self.in_paste = true;
                pos += PASTE_START.len();
                continue;
            }
            if remaining.len() < PASTE_START.len()
                && PASTE_START.starts_with(remaining)
                && remaining.starts_with(b"\x1b[")
            {
                break;
            }

            match try_parse(remaining, self.cpr_pending > 0) {
                Parsed::Input(input, consumed) => {
                    if matches!(input, Input::Reply(Reply::CursorPosition { .. })) {
                        self.cpr_pending -= 1;
                    }
                    out.push(input);
                    pos += consumed;
                }
                Parsed::Incomplete => break,
                Parsed::Skip(n) => pos += n.max(1),
            }
        }

        if pos > 0 {
            buf.drain(..pos.min(buf.len()));
        }
        if buf.len() > MAX_PENDING_BYTES {
            let excess = buf.len() - MAX_PENDING_BYTES;
            buf.drain(..excess);
            warn!("input scanner dropped {} stale bytes", excess);
        }
        self.buf = buf;
        out
    }

    /// Whether bytes are waiting for the rest of a sequence.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.buf.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Give up on the pending bytes: each becomes a key event. A lone
    /// ESC becomes Escape. An unfinished paste is kept.
    pub fn flush(&mut self) -> Vec<Input> {
        let mut out = Vec::new();
        for &byte in &self.buf {
            let event = match byte {
                0x1B => press(KeyCode::Escape),
                0x00 => ctrl_key(KeyCode::Char('@')),
                b @ 0x01..=0x1A => ctrl_key(KeyCode::Char((b + b'a' - 1) as char)),
                0x7F => press(KeyCode::Backspace),
                b @ 0x20..=0x7E => press(KeyCode::Char(b as char)),
                _ => continue,
            };
            out.push(Input::Event(event));
        }
        self.buf.clear();
        out
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn append_bounded(dst: &mut Vec<u8>, src: &[u8]) {
    let room = MAX_PASTE_BYTES.saturating_sub(dst.len());
    if src.len() > room {
        if room > 0 {
            warn!("paste exceeds {} bytes, truncating", MAX_PASTE_BYTES);
        }
        dst.extend_from_slice(&src[..room]);
    } else {
        dst.extend_from_slice(src);
    }
}

// ─── Stateless Parsing ───────────────────────────────────────────────────────
//
// Every function reads from the start of its slice and reports what it
// found plus how many bytes that took.

enum Parsed {
    Input(Input, usize),
    Incomplete,
    Skip(usize),
}

fn event(e: Event, consumed: usize) -> Parsed {
    Parsed::Input(Input::Event(e), consumed)
}

fn reply(r: Reply, consumed: usize) -> Parsed {
    Parsed::Input(Input::Reply(r), consumed)
}

fn try_parse(buf: &[u8], cpr_pending: bool) -> Parsed {
    let Some(&first) = buf.first() else {
        return Parsed::Skip(0);
    };

    match first {
        0x1B => parse_escape(buf, cpr_pending),
        0x00 => event(ctrl_key(KeyCode::Char('@')), 1),
        b @ (0x01..=0x07 | 0x0B..=0x0C | 0x0E..=0x1A) => {
            event(ctrl_key(KeyCode::Char((b + b'a' - 1) as char)), 1)
        }
        0x08 | 0x7F => event(press(KeyCode::Backspace), 1),
        0x09 => event(press(KeyCode::Tab), 1),
        0x0A | 0x0D => event(press(KeyCode::Enter), 1),
        b @ 0x20..=0x7E => event(press(KeyCode::Char(b as char)), 1),
        0xC0..=0xFF => parse_utf8(buf),
        _ => Parsed::Skip(1),
    }
}

// ── Escape ───────────────────────────────────────────────────────────────────

fn parse_escape(buf: &[u8], cpr_pending: bool) -> Parsed {
    if buf.len() < 2 {
        return Parsed::Incomplete;
    }

    match buf[1] {
        b'[' => parse_csi(buf, cpr_pending),
        b'O' => parse_ss3(buf),
        b']' => match scan_string(buf, 2) {
            StringEnd::Found { body_end, consumed } => parse_osc(&buf[2..body_end])
                .map_or(Parsed::Skip(consumed), |r| reply(r, consumed)),
            StringEnd::Aborted(n) => Parsed::Skip(n),
            StringEnd::Incomplete => Parsed::Incomplete,
        },
        b'P' => match scan_string(buf, 2) {
            StringEnd::Found { consumed, .. } => Parsed::Skip(consumed),
            StringEnd::Aborted(n) => Parsed::Skip(n),
            StringEnd::Incomplete => Parsed::Incomplete,
        },
        0x1B => event(key_with(KeyCode::Escape, Modifiers::ALT), 2),
        b @ 0x20..=0x7E => event(key_with(KeyCode::Char(b as char), Modifiers::ALT), 2),
        b @ 0x01..=0x1A => event(
            key_with(
                KeyCode::Char((b + b'a' - 1) as char),
                Modifiers::ALT | Modifiers::CTRL,
            ),
            2,
        ),
        _ => event(press(KeyCode::Escape), 1),
    }
}

// ── Control Strings (OSC, DCS) ───────────────────────────────────────────────

enum StringEnd {
    /// Body ends at `body_end`; the terminator ends at `consumed`.
    Found { body_end: usize, consumed: usize },
    /// An ESC that doesn't start ST interrupted the string.
    Aborted(usize),
    Incomplete,
}

fn scan_string(buf: &[u8], start: usize) -> StringEnd {
    let mut i = start;
    while i < buf.len() {
        match buf[i] {
            0x07 => {
                return StringEnd::Found {
                    body_end: i,
                    consumed: i + 1,
                };
            }
            // C1 ST, unless it continues a UTF-8 sequence.
            0x9C if i == start || buf[i - 1] < 0x80 => {
                return StringEnd::Found {
                    body_end: i,
                    consumed: i + 1,
                };
            }
            0x1B => {
                return match buf.get(i + 1) {
                    Some(b'\\') => StringEnd::Found {
                        body_end: i,
                        consumed: i + 2,
                    },
                    Some(_) => StringEnd::Aborted(i),
                    None => StringEnd::Incomplete,
                };
            }
            _ => i += 1,
        }
    }
    StringEnd::Incomplete
}

fn parse_osc(body: &[u8]) -> Option<Reply> {
    let text = std::str::from_utf8(body).ok()?;
    let (code, rest) = text.split_once(';')?;
    match code {
        "4" => {
            let (index, spec) = rest.split_once(';')?;
            Some(Reply::Palette {
                index: index.parse().ok()?,
                color: parse_color(spec)?,
            })
        }
        "10" => parse_color(rest).map(Reply::DefaultForeground),
        "11" => parse_color(rest).map(Reply::DefaultBackground),
        "22" => Some(Reply::PointerShape(rest.to_owned())),
        _ => None,
    }
}

/// Parse an X11 color spec as terminals report it: `rgb:R/G/B` with 1–4
/// hex digits per channel, or `#rrggbb`.
///
/// ```
/// use cellterm::color::Rgb;
/// use cellterm::input::parse_color;
///
/// assert_eq!(parse_color("rgb:ffff/8080/0000"), Some(Rgb::new(255, 128, 0)));
/// assert_eq!(parse_color("rgb:f/8/0"), Some(Rgb::new(255, 136, 0)));
/// assert_eq!(parse_color("#a8a8a8"), Some(Rgb::new(168, 168, 168)));
/// assert_eq!(parse_color("blue"), None);
/// ```
#[must_use]
pub fn parse_color(spec: &str) -> Option<Rgb> {
    if let Some(hex) = spec.strip_prefix('#') {
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        return u32::from_str_radix(hex, 16).ok().map(Rgb::from_u32);
    }
    let mut channels = spec.strip_prefix("rgb:")?.split('/');
    let r = scale_hex(channels.next()?)?;
    let g = scale_hex(channels.next()?)?;
    let b = scale_hex(channels.next()?)?;
    if channels.next().is_some() {
        return None;
    }
    Some(Rgb::new(r, g, b))
}

/// 1–4 hex digits scaled to 0–255.
fn scale_hex(digits: &str) -> Option<u8> {
    if digits.is_empty() || digits.len() > 4 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let value = u32::from_str_radix(digits, 16).ok()?;
    // digits.len() <= 4, so the shift stays below 16.
    #[allow(clippy::cast_possible_truncation)]
    let max = (1u32 << (4 * digits.len() as u32)) - 1;
    u8::try_from((value * 255 + max / 2) / max).ok()
}

// ── CSI ──────────────────────────────────────────────────────────────────────

fn parse_csi(buf: &[u8], cpr_pending: bool) -> Parsed {
    if buf.len() < 3 {
        return Parsed::Incomplete;
    }

    match buf[2] {
        b'<' => return parse_sgr_mouse(buf),
        b'I' => return event(Event::FocusGained, 3),
        b'O' => return event(Event::FocusLost, 3),
        _ => {}
    }

    // Parameter bytes 0x30..=0x3F, intermediates 0x20..=0x2F, final 0x40..=0x7E.
    let mut end = 2;
    while end < buf.len() {
        let b = buf[end];
        if (0x40..=0x7E).contains(&b) {
            break;
        }
        if !(0x20..=0x3F).contains(&b) {
            return Parsed::Skip(end);
        }
        end += 1;
    }
    if end >= buf.len() {
        return Parsed::Incomplete;
    }

    let final_byte = buf[end];
    let consumed = end + 1;
    let mut raw = &buf[2..end];

    let marker = match raw.first() {
        Some(&m @ (b'?' | b'>' | b'=')) => {
            raw = &raw[1..];
            Some(m)
        }
        _ => None,
    };
    let split = raw
        .iter()
        .position(|b| (0x20..=0x2F).contains(b))
        .unwrap_or(raw.len());
    let (params_raw, intermediates) = raw.split_at(split);
    let params = parse_csi_params(params_raw);
    let param = |i: usize| nth(&params, i);

    match (marker, intermediates, final_byte) {
        (Some(b'?'), b"$", b'y') => reply(
            Reply::Mode {
                mode: param(0),
                status: u8::try_from(param(1)).unwrap_or(0),
            },
            consumed,
        ),
        (Some(b'?'), b"", b'c') => reply(Reply::DeviceAttributes(params.clone()), consumed),
        (None, b"", b't') => match param(0) {
            4 => reply(
                Reply::WindowPixels {
                    width: param(2),
                    height: param(1),
                },
                consumed,
            ),
            6 => reply(
                Reply::CellPixels {
                    width: param(2),
                    height: param(1),
                },
                consumed,
            ),
            _ => Parsed::Skip(consumed),
        },
        (None, b"", b'R') if cpr_pending && params.len() == 2 => reply(
            Reply::CursorPosition {
                x: param(1).saturating_sub(1),
                y: param(0).saturating_sub(1),
            },
            consumed,
        ),
        (None, b"", b'~') => parse_tilde(&params, consumed),
        (None, b"", _) => parse_csi_letter(final_byte, &params, consumed),
        _ => Parsed::Skip(consumed),
    }
}

fn parse_tilde(params: &[u16], consumed: usize) -> Parsed {
    let modifiers = params
        .get(1)
        .map_or(Modifiers::empty(), |&p| decode_modifiers(p));
    let code = match params.first().copied().unwrap_or(0) {
        1 | 7 => KeyCode::Home,
        2 => KeyCode::Insert,
        3 => KeyCode::Delete,
        4 | 8 => KeyCode::End,
        5 => KeyCode::PageUp,
        6 => KeyCode::PageDown,
        11 => KeyCode::F(1),
        12 => KeyCode::F(2),
        13 => KeyCode::F(3),
        14 => KeyCode::F(4),
        15 => KeyCode::F(5),
        17 => KeyCode::F(6),
        18 => KeyCode::F(7),
        19 => KeyCode::F(8),
        20 => KeyCode::F(9),
        21 => KeyCode::F(10),
        23 => KeyCode::F(11),
        24 => KeyCode::F(12),
        25 => KeyCode::F(13),
        26 => KeyCode::F(14),
        28 => KeyCode::F(15),
        29 => KeyCode::F(16),
        31 => KeyCode::F(17),
        32 => KeyCode::F(18),
        33 => KeyCode::F(19),
        34 => KeyCode::F(20),
        _ => return Parsed::Skip(consumed),
    };
    event(key_with(code, modifiers), consumed)
}

fn parse_csi_letter(final_byte: u8, params: &[u16], consumed: usize) -> Parsed {
    let modifiers = params
        .get(1)
        .map_or(Modifiers::empty(), |&p| decode_modifiers(p));
    let code = match final_byte {
        b'A' => KeyCode::Up,
        b'B' => KeyCode::Down,
        b'C' => KeyCode::Right,
        b'D' => KeyCode::Left,
        b'H' => KeyCode::Home,
        b'F' => KeyCode::End,
        b'P' => KeyCode::F(1),
        b'Q' => KeyCode::F(2),
        b'R' => KeyCode::F(3),
        b'S' => KeyCode::F(4),
        b'Z' => return event(key_with(KeyCode::Tab, Modifiers::SHIFT), consumed),
        _ => return Parsed::Skip(consumed),
    };
    event(key_with(code, modifiers), consumed)
}

// ── SS3 ──────────────────────────────────────────────────────────────────────

fn parse_ss3(buf: &[u8]) -> Parsed {
    if buf.len() < 3 {
        return Parsed::Incomplete;
    }

    let code = match buf[2] {
        b'A' => KeyCode::Up,
        b'B' => KeyCode::Down,
        b'C' => KeyCode::Right,
        b'D' => KeyCode::Left,
        b'H' => KeyCode::Home,
        b'F' => KeyCode::End,
        b'P' => KeyCode::F(1),
        b'Q' => KeyCode::F(2),
        b'R' => KeyCode::F(3),
        b'S' => KeyCode::F(4),
        _ => return Parsed::Skip(3),
    };
    event(press(code), 3)
}

// ── SGR Mouse ────────────────────────────────────────────────────────────────

fn parse_sgr_mouse(buf: &[u8]) -> Parsed {
    // ESC [ < Pb ; Px ; Py M   (press / motion)
    // ESC [ < Pb ; Px ; Py m   (release)
    let start = 3;
    let mut end = start;
    while end < buf.len() {
        if buf[end] == b'M' || buf[end] == b'm' {
            break;
        }
        if !buf[end].is_ascii_digit() && buf[end] != b';' {
            return Parsed::Skip(end);
        }
        end += 1;
    }
    if end >= buf.len() {
        return Parsed::Incomplete;
    }

    let is_release = buf[end] == b'm';
    let consumed = end + 1;

    let (cb, rest) = parse_u16_from(&buf[start..end]);
    let (raw_x, rest) = parse_u16_from(skip_byte(rest, b';'));
    let (raw_y, _) = parse_u16_from(skip_byte(rest, b';'));

    let mut modifiers = Modifiers::empty();
    if cb & 4 != 0 {
        modifiers |= Modifiers::SHIFT;
    }
    if cb & 8 != 0 {
        modifiers |= Modifiers::ALT;
    }
    if cb & 16 != 0 {
        modifiers |= Modifiers::CTRL;
    }

    let base = cb & 3;
    let kind = if cb & 64 != 0 {
        match base {
            0 => MouseEventKind::ScrollUp,
            1 => MouseEventKind::ScrollDown,
            2 => MouseEventKind::ScrollLeft,
            _ => MouseEventKind::ScrollRight,
        }
    } else if cb & 32 != 0 {
        match base {
            0 => MouseEventKind::Drag(MouseButton::Left),
            1 => MouseEventKind::Drag(MouseButton::Middle),
            2 => MouseEventKind::Drag(MouseButton::Right),
            _ => MouseEventKind::Move,
        }
    } else if is_release {
        MouseEventKind::Release(decode_mouse_button(base))
    } else {
        MouseEventKind::Press(decode_mouse_button(base))
    };

    event(
        Event::Mouse(MouseEvent {
            kind,
            x: raw_x.saturating_sub(1),
            y: raw_y.saturating_sub(1),
            modifiers,
        }),
        consumed,
    )
}

// ── UTF-8 ────────────────────────────────────────────────────────────────────

fn parse_utf8(buf: &[u8]) -> Parsed {
    let expected = utf8_char_len(buf[0]);
    if expected == 0 {
        return Parsed::Skip(1);
    }
    if buf.len() < expected {
        return Parsed::Incomplete;
    }
    if buf[1..expected].iter().any(|&b| b & 0xC0 != 0x80) {
        return Parsed::Skip(1);
    }

    std::str::from_utf8(&buf[..expected]).map_or(Parsed::Skip(1), |s| {
        s.chars()
            .next()
            .map_or(Parsed::Skip(expected), |ch| event(press(KeyCode::Char(ch)), expected))
    })
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

const fn press(code: KeyCode) -> Event {
    key_with(code, Modifiers::empty())
}

const fn ctrl_key(code: KeyCode) -> Event {
    key_with(code, Modifiers::CTRL)
}

const fn key_with(code: KeyCode, modifiers: Modifiers) -> Event {
    Event::Key(KeyEvent { code, modifiers })
}

/// `1;2` → `[1, 2]`. Colon sub-parameters are ignored.
fn parse_csi_params(raw: &[u8]) -> Vec<u16> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(|&b| b == b';')
        .map(|p| parse_u16_from(p).0)
        .collect()
}

/// Leading decimal digits as a saturating u16, plus the rest.
fn parse_u16_from(buf: &[u8]) -> (u16, &[u8]) {
    let mut val: u16 = 0;
    let mut pos = 0;
    while pos < buf.len() && buf[pos].is_ascii_digit() {
        val = val
            .saturating_mul(10)
            .saturating_add(u16::from(buf[pos] - b'0'));
        pos += 1;
    }
    (val, &buf[pos..])
}

#[inline]
fn nth(params: &[u16], i: usize) -> u16 {
    params.get(i).copied().unwrap_or(0)
}

fn skip_byte(buf: &[u8], expected: u8) -> &[u8] {
    if buf.first() == Some(&expected) {
        &buf[1..]
    } else {
        buf
    }
}

/// xterm modifier parameter (`1 + bitmask`). Only the low 6 bits matter.
#[allow(clippy::cast_possible_truncation)]
const fn decode_modifiers(param: u16) -> Modifiers {
    let val = if param > 0 { param - 1 } else { 0 };
    Modifiers::from_bits_truncate(val as u8)
}

const fn decode_mouse_button(base: u16) -> MouseButton {
    match base {
        0 => MouseButton::Left,
        1 => MouseButton::Middle,
        _ => MouseButton::Right,
    }
}

const fn utf8_char_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 0,
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(data: &[u8]) -> Vec<Input> {
        Parser::new().advance(data)
    }

    fn parse_one(data: &[u8]) -> Input {
        let out = parse(data);
        assert_eq!(out.len(), 1, "expected 1 input, got {out:?}");
        out.into_iter().next().unwrap()
    }

    fn key(code: KeyCode) -> Input {
        Input::Event(press(code))
    }

    fn key_mod(code: KeyCode, modifiers: Modifiers) -> Input {
        Input::Event(key_with(code, modifiers))
    }

    fn mouse(kind: MouseEventKind, x: u16, y: u16, modifiers: Modifiers) -> Input {
        Input::Event(Event::Mouse(MouseEvent { kind, x, y, modifiers }))
    }

    // ── Plain Bytes ──────────────────────────────────────────────────────

    #[test]
    fn ascii_chars() {
        assert_eq!(
            parse(b"ab~"),
            vec![
                key(KeyCode::Char('a')),
                key(KeyCode::Char('b')),
                key(KeyCode::Char('~')),
            ]
        );
    }

    #[test]
    fn control_bytes() {
        assert_eq!(parse_one(b"\x01"), key_mod(KeyCode::Char('a'), Modifiers::CTRL));
        assert_eq!(parse_one(b"\x1A"), key_mod(KeyCode::Char('z'), Modifiers::CTRL));
        assert_eq!(parse_one(b"\x00"), key_mod(KeyCode::Char('@'), Modifiers::CTRL));
        assert_eq!(parse_one(b"\r"), key(KeyCode::Enter));
        assert_eq!(parse_one(b"\n"), key(KeyCode::Enter));
        assert_eq!(parse_one(b"\t"), key(KeyCode::Tab));
        assert_eq!(parse_one(b"\x7f"), key(KeyCode::Backspace));
        assert_eq!(parse_one(b"\x08"), key(KeyCode::Backspace));
    }

    #[test]
    fn utf8_sequences() {
        assert_eq!(parse_one("é".as_bytes()), key(KeyCode::Char('é')));
        assert_eq!(parse_one("中".as_bytes()), key(KeyCode::Char('中')));
        assert_eq!(parse_one("🔥".as_bytes()), key(KeyCode::Char('🔥')));
    }

    #[test]
    fn utf8_split_waits() {
        let bytes = "中".as_bytes();
        let mut p = Parser::new();
        assert!(p.advance(&bytes[..1]).is_empty());
        assert!(p.has_pending());
        assert_eq!(p.advance(&bytes[1..]), vec![key(KeyCode::Char('中'))]);
        assert!(!p.has_pending());
    }

    #[test]
    fn stray_continuation_byte_is_dropped() {
        assert_eq!(parse(b"\x80a"), vec![key(KeyCode::Char('a'))]);
    }

    // ── Keys ─────────────────────────────────────────────────────────────

    #[test]
    fn arrows() {
        assert_eq!(parse_one(b"\x1b[A"), key(KeyCode::Up));
        assert_eq!(parse_one(b"\x1b[B"), key(KeyCode::Down));
        assert_eq!(parse_one(b"\x1b[C"), key(KeyCode::Right));
        assert_eq!(parse_one(b"\x1b[D"), key(KeyCode::Left));
    }

    #[test]
    fn arrows_with_modifiers() {
        assert_eq!(parse_one(b"\x1b[1;2A"), key_mod(KeyCode::Up, Modifiers::SHIFT));
        assert_eq!(parse_one(b"\x1b[1;5C"), key_mod(KeyCode::Right, Modifiers::CTRL));
        assert_eq!(
            parse_one(b"\x1b[1;4D"),
            key_mod(KeyCode::Left, Modifiers::SHIFT | Modifiers::ALT)
        );
    }

    #[test]
    fn tilde_keys() {
        assert_eq!(parse_one(b"\x1b[1~"), key(KeyCode::Home));
        assert_eq!(parse_one(b"\x1b[2~"), key(KeyCode::Insert));
        assert_eq!(parse_one(b"\x1b[3~"), key(KeyCode::Delete));
        assert_eq!(parse_one(b"\x1b[4~"), key(KeyCode::End));
        assert_eq!(parse_one(b"\x1b[5~"), key(KeyCode::PageUp));
        assert_eq!(parse_one(b"\x1b[6~"), key(KeyCode::PageDown));
        assert_eq!(parse_one(b"\x1b[3;5~"), key_mod(KeyCode::Delete, Modifiers::CTRL));
    }

    #[test]
    fn function_keys() {
        assert_eq!(parse_one(b"\x1bOP"), key(KeyCode::F(1)));
        assert_eq!(parse_one(b"\x1bOS"), key(KeyCode::F(4)));
        assert_eq!(parse_one(b"\x1b[11~"), key(KeyCode::F(1)));
        assert_eq!(parse_one(b"\x1b[15~"), key(KeyCode::F(5)));
        assert_eq!(parse_one(b"\x1b[24~"), key(KeyCode::F(12)));
        assert_eq!(parse_one(b"\x1b[15;2~"), key_mod(KeyCode::F(5), Modifiers::SHIFT));
    }

    #[test]
    fn shift_tab() {
        assert_eq!(parse_one(b"\x1b[Z"), key_mod(KeyCode::Tab, Modifiers::SHIFT));
    }

    #[test]
    fn alt_keys() {
        assert_eq!(parse_one(b"\x1ba"), key_mod(KeyCode::Char('a'), Modifiers::ALT));
        assert_eq!(parse_one(b"\x1b\x1b"), key_mod(KeyCode::Escape, Modifiers::ALT));
        assert_eq!(
            parse_one(b"\x1b\x01"),
            key_mod(KeyCode::Char('a'), Modifiers::ALT | Modifiers::CTRL)
        );
    }

    #[test]
    fn ss3_navigation() {
        assert_eq!(parse_one(b"\x1bOA"), key(KeyCode::Up));
        assert_eq!(parse_one(b"\x1bOH"), key(KeyCode::Home));
        assert_eq!(parse_one(b"\x1bOF"), key(KeyCode::End));
    }

    #[test]
    fn unknown_csi_is_dropped() {
        assert_eq!(parse(b"\x1b[99zq"), vec![key(KeyCode::Char('q'))]);
    }

    // ── Mouse ────────────────────────────────────────────────────────────

    #[test]
    fn mouse_press_release() {
        assert_eq!(
            parse_one(b"\x1b[<0;10;5M"),
            mouse(MouseEventKind::Press(MouseButton::Left), 9, 4, Modifiers::empty())
        );
        assert_eq!(
            parse_one(b"\x1b[<2;1;1m"),
            mouse(MouseEventKind::Release(MouseButton::Right), 0, 0, Modifiers::empty())
        );
    }

    #[test]
    fn mouse_scroll_drag_move() {
        assert_eq!(
            parse_one(b"\x1b[<65;3;4M"),
            mouse(MouseEventKind::ScrollDown, 2, 3, Modifiers::empty())
        );
        assert_eq!(
            parse_one(b"\x1b[<32;3;4M"),
            mouse(MouseEventKind::Drag(MouseButton::Left), 2, 3, Modifiers::empty())
        );
        assert_eq!(
            parse_one(b"\x1b[<35;3;4M"),
            mouse(MouseEventKind::Move, 2, 3, Modifiers::empty())
        );
    }

    #[test]
    fn mouse_modifiers_and_large_coordinates() {
        assert_eq!(
            parse_one(b"\x1b[<16;300;200M"),
            mouse(MouseEventKind::Press(MouseButton::Left), 299, 199, Modifiers::CTRL)
        );
    }

    #[test]
    fn mouse_split_across_reads() {
        let mut p = Parser::new();
        assert!(p.advance(b"\x1b[<0;1").is_empty());
        assert_eq!(
            p.advance(b";1M"),
            vec![mouse(MouseEventKind::Press(MouseButton::Left), 0, 0, Modifiers::empty())]
        );
    }

    // ── Focus & Paste ────────────────────────────────────────────────────

    #[test]
    fn focus() {
        assert_eq!(parse_one(b"\x1b[I"), Input::Event(Event::FocusGained));
        assert_eq!(parse_one(b"\x1b[O"), Input::Event(Event::FocusLost));
    }

    #[test]
    fn paste_simple() {
        assert_eq!(
            parse_one(b"\x1b[200~hello\x1b[A\x1b[201~"),
            Input::Event(Event::Paste("hello\x1b[A".into()))
        );
    }

    #[test]
    fn paste_split_across_reads() {
        let mut p = Parser::new();
        assert!(p.advance(b"\x1b[200~hel").is_empty());
        assert!(p.advance(b"lo\x1b[20").is_empty());
        assert_eq!(
            p.advance(b"1~x"),
            vec![
                Input::Event(Event::Paste("hello".into())),
                key(KeyCode::Char('x')),
            ]
        );
    }

    #[test]
    fn paste_empty() {
        assert_eq!(
            parse_one(b"\x1b[200~\x1b[201~"),
            Input::Event(Event::Paste(String::new()))
        );
    }

    // ── Escape Timeout ───────────────────────────────────────────────────

    #[test]
    fn lone_escape_waits_then_flushes() {
        let mut p = Parser::new();
        assert!(p.advance(b"\x1b").is_empty());
        assert!(p.has_pending());
        assert_eq!(p.flush(), vec![key(KeyCode::Escape)]);
        assert!(!p.has_pending());
    }

    #[test]
    fn split_csi_completes() {
        let mut p = Parser::new();
        assert!(p.advance(b"\x1b[").is_empty());
        assert_eq!(p.advance(b"A"), vec![key(KeyCode::Up)]);
    }

    // ── Replies ──────────────────────────────────────────────────────────

    #[test]
    fn cursor_report_only_when_expected() {
        assert_eq!(parse_one(b"\x1b[1;5R"), key_mod(KeyCode::F(3), Modifiers::CTRL));

        let mut p = Parser::new();
        p.expect_cursor_report();
        assert_eq!(
            p.advance(b"\x1b[5;10R"),
            vec![Input::Reply(Reply::CursorPosition { x: 9, y: 4 })]
        );
        assert_eq!(p.cursor_reports_pending(), 0);
        assert_eq!(p.advance(b"\x1b[1;2R"), vec![key_mod(KeyCode::F(3), Modifiers::SHIFT)]);
    }

    #[test]
    fn decrpm_reply() {
        assert_eq!(
            parse_one(b"\x1b[?2026;2$y"),
            Input::Reply(Reply::Mode { mode: 2026, status: 2 })
        );
    }

    #[test]
    fn da1_reply() {
        assert_eq!(
            parse_one(b"\x1b[?62;4;22c"),
            Input::Reply(Reply::DeviceAttributes(vec![62, 4, 22]))
        );
    }

    #[test]
    fn pixel_size_replies() {
        assert_eq!(
            parse_one(b"\x1b[4;600;800t"),
            Input::Reply(Reply::WindowPixels { width: 800, height: 600 })
        );
        assert_eq!(
            parse_one(b"\x1b[6;20;10t"),
            Input::Reply(Reply::CellPixels { width: 10, height: 20 })
        );
        assert!(parse(b"\x1b[8;24;80t").is_empty());
    }

    #[test]
    fn osc_palette_with_bel_and_st() {
        let expected = Input::Reply(Reply::Palette {
            index: 7,
            color: Rgb::new(0xe5, 0xe5, 0xe5),
        });
        assert_eq!(parse_one(b"\x1b]4;7;rgb:e5e5/e5e5/e5e5\x07"), expected);
        assert_eq!(parse_one(b"\x1b]4;7;rgb:e5e5/e5e5/e5e5\x1b\\"), expected);
    }

    #[test]
    fn osc_default_colors() {
        assert_eq!(
            parse_one(b"\x1b]10;rgb:0000/0000/0000\x07"),
            Input::Reply(Reply::DefaultForeground(Rgb::BLACK))
        );
        assert_eq!(
            parse_one(b"\x1b]11;#ffffff\x1b\\"),
            Input::Reply(Reply::DefaultBackground(Rgb::WHITE))
        );
    }

    #[test]
    fn c1_string_terminator() {
        assert_eq!(
            parse_one(b"\x1b]11;rgb:ffff/ffff/ffff\x9c"),
            Input::Reply(Reply::DefaultBackground(Rgb::WHITE))
        );
        // 0x9C inside a multi-byte character does not end the string.
        assert_eq!(
            parse_one("\x1b]22;\u{21c}\x07".as_bytes()),
            Input::Reply(Reply::PointerShape("\u{21c}".into()))
        );
    }

    #[test]
    fn osc_pointer_shape() {
        assert_eq!(
            parse_one(b"\x1b]22;xterm\x07"),
            Input::Reply(Reply::PointerShape("xterm".into()))
        );
    }

    #[test]
    fn osc_split_across_reads() {
        let mut p = Parser::new();
        assert!(p.advance(b"\x1b]11;rgb:ff").is_empty());
        assert!(p.advance(b"ff/ffff/ffff\x1b").is_empty());
        assert_eq!(
            p.advance(b"\\"),
            vec![Input::Reply(Reply::DefaultBackground(Rgb::WHITE))]
        );
    }

    #[test]
    fn unknown_osc_and_dcs_are_dropped() {
        assert_eq!(parse(b"\x1b]52;c;aGk=\x07x"), vec![key(KeyCode::Char('x'))]);
        assert_eq!(parse(b"\x1bP1$r0m\x1b\\y"), vec![key(KeyCode::Char('y'))]);
        assert_eq!(parse(b"\x1b]4;7;bogus\x07"), Vec::<Input>::new());
    }

    #[test]
    fn interrupted_osc_resyncs() {
        assert_eq!(parse(b"\x1b]11;rgb\x1b[A"), vec![key(KeyCode::Up)]);
    }

    // ── Bounds ───────────────────────────────────────────────────────────

    #[test]
    fn pending_buffer_is_bounded() {
        let mut p = Parser::new();
        p.advance(b"\x1b]11;");
        p.advance(&vec![b'a'; MAX_PENDING_BYTES * 2]);
        assert!(p.pending_len() <= MAX_PENDING_BYTES);
    }

    // ── Colors ───────────────────────────────────────────────────────────

    #[test]
    fn color_specs() {
        assert_eq!(parse_color("rgb:ff/00/80"), Some(Rgb::new(255, 0, 128)));
        assert_eq!(parse_color("rgb:a8a8/a8a8/a8a8"), Some(Rgb::new(168, 168, 168)));
        assert_eq!(parse_color("rgb:fff/000/fff"), Some(Rgb::new(255, 0, 255)));
        assert_eq!(parse_color("rgb:ff/00"), None);
        assert_eq!(parse_color("rgb:ff/00/00/00"), None);
        assert_eq!(parse_color("rgb:fffff/0/0"), None);
        assert_eq!(parse_color("#12345"), None);
        assert_eq!(parse_color("rgb:+f/0/0"), None);
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    #[test]
    fn decode_modifier_values() {
        assert_eq!(decode_modifiers(0), Modifiers::empty());
        assert_eq!(decode_modifiers(1), Modifiers::empty());
        assert_eq!(decode_modifiers(2), Modifiers::SHIFT);
        assert_eq!(decode_modifiers(6), Modifiers::SHIFT | Modifiers::CTRL);
        assert_eq!(decode_modifiers(9), Modifiers::SUPER);
    }

    #[test]
    fn csi_params() {
        assert_eq!(parse_csi_params(b""), Vec::<u16>::new());
        assert_eq!(parse_csi_params(b"1;2"), vec![1, 2]);
        assert_eq!(parse_csi_params(b"5:2;7"), vec![5, 7]);
        assert_eq!(parse_csi_params(b";3"), vec![0, 3]);
    }

    #[test]
    fn parse_u16_saturates() {
        assert_eq!(parse_u16_from(b"99999x").0, u16::MAX);
        assert_eq!(parse_u16_from(b"42;1"), (42, &b";1"[..]));
    }
}
