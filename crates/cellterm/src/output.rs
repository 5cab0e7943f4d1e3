// SPDX-License-Identifier: MIT
//
// Output buffering and stateful cell rendering.
//
//   OutputBuffer: collects a frame's bytes so the transport sees one write.
//
//   CellWriter: the `CellSink` an ECMA-48 backend flushes into. It tracks
//   the terminal's cursor, colors and attributes and leaves out whatever
//   would not change anything. Colors are resolved against a
//   `RenderContext`, a snapshot of the negotiated terminal state and the
//   session's rendering options taken before each flush.
//
// Image cells:
//
//   Consecutive image cells in a row are composed into one raster and sent
//   as a single sixel. The terminal cursor position is unknown after a
//   sixel, so the next cell always gets an explicit move. Without sixel
//   support image cells render as their (blank) glyph on their background.

use std::io::{self, Write};
use std::sync::Arc;

use cellterm_sixel::{Raster, Rgba, SixelEncoder};
use tracing::trace;

use crate::ansi::{self, SgrColor};
use crate::cell::{Attr, Cell, CellAttributes, Glyph, Width};
use crate::color::{ColorSpec, DEFAULT_PALETTE, Rgb, nearest_indexed};
use crate::config::SessionProperties;
use crate::negotiated::{Capabilities, TerminalNegotiatedState};
use crate::screen::CellSink;

/// Cell size assumed until the terminal reports one.
pub const DEFAULT_CELL_PIXELS: (u16, u16) = (10, 20);

// ─── OutputBuffer ────────────────────────────────────────────────────────────

/// A byte buffer that accumulates one frame of output.
///
/// Default capacity: 16 KB.
pub struct OutputBuffer {
    buf: Vec<u8>,
}

const DEFAULT_CAPACITY: usize = 16_384;

impl OutputBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(DEFAULT_CAPACITY),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The accumulated bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Write a glyph as UTF-8. Unset glyphs are written as a space.
    pub fn write_glyph(&mut self, glyph: &Glyph) {
        match glyph {
            Glyph::Unset => self.buf.push(b' '),
            Glyph::Char(ch) => {
                let mut enc = [0u8; 4];
                self.buf.extend_from_slice(ch.encode_utf8(&mut enc).as_bytes());
            }
            Glyph::Cluster(s) => self.buf.extend_from_slice(s.as_bytes()),
        }
    }

    /// Clear the buffer for reuse (keeps allocated capacity).
    #[inline]
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Write accumulated output to `w` and clear the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `w` fails. The buffer is kept.
    pub fn flush_to(&mut self, w: &mut (impl Write + ?Sized)) -> io::Result<()> {
        if !self.buf.is_empty() {
            w.write_all(&self.buf)?;
            w.flush()?;
            self.buf.clear();
        }
        Ok(())
    }
}

impl Write for OutputBuffer {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ─── RenderContext ───────────────────────────────────────────────────────────

/// Everything color resolution needs, copied out of the negotiated state
/// and session properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderContext {
    pub palette: [Rgb; 16],
    pub default_fg: Option<Rgb>,
    pub default_bg: Option<Rgb>,
    /// Emit `38;2` / `48;2`; otherwise downgrade to the 16-color palette.
    pub truecolor: bool,
    /// Bold indexed foregrounds use 90–97 instead of SGR 1.
    pub bright_colors: bool,
    /// Send image cells as sixel.
    pub sixel: bool,
    /// Wrap frames in DEC 2026.
    pub sync_output: bool,
    /// `(width, height)` of one cell in pixels.
    pub cell_pixels: (u16, u16),
}

impl RenderContext {
    #[must_use]
    pub fn new(state: &TerminalNegotiatedState, props: &SessionProperties) -> Self {
        Self {
            palette: state.effective_palette(),
            default_fg: state.default_foreground(),
            default_bg: state.default_background(),
            truecolor: props.truecolor,
            bright_colors: props.bright_colors,
            sixel: props.sixel && state.has(Capabilities::SIXEL),
            sync_output: state.has(Capabilities::SYNC_OUTPUT),
            cell_pixels: state.cell_pixels().unwrap_or(DEFAULT_CELL_PIXELS),
        }
    }

    /// On-the-wire colors and flags for a cell's attributes.
    #[must_use]
    pub fn resolve(&self, attrs: CellAttributes) -> (SgrColor, SgrColor, Attr) {
        let mut flags = attrs.flags & (Attr::BOLD | Attr::UNDERLINE | Attr::BLINK | Attr::REVERSE);
        let fg = match attrs.fg {
            ColorSpec::Indexed(c) if attrs.is_bold() && self.bright_colors => {
                flags.remove(Attr::BOLD);
                SgrColor::Indexed(c.index() + 8)
            }
            ColorSpec::Indexed(c) => SgrColor::Indexed(c.index()),
            ColorSpec::Rgb(c) => self.rgb(c),
            ColorSpec::Default => self.default_color(self.default_fg),
        };
        let bg = match attrs.bg {
            ColorSpec::Indexed(c) => SgrColor::Indexed(c.index()),
            ColorSpec::Rgb(c) => self.rgb(c),
            ColorSpec::Default => self.default_color(self.default_bg),
        };
        (fg, bg, flags)
    }

    fn rgb(&self, c: Rgb) -> SgrColor {
        if self.truecolor {
            return SgrColor::Rgb(c);
        }
        let (color, bright) = nearest_indexed(c, &self.palette);
        SgrColor::Indexed(color.index() + if bright { 8 } else { 0 })
    }

    const fn default_color(&self, negotiated: Option<Rgb>) -> SgrColor {
        match negotiated {
            Some(c) if self.truecolor => SgrColor::Rgb(c),
            _ => SgrColor::Default,
        }
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self {
            palette: DEFAULT_PALETTE,
            default_fg: None,
            default_bg: None,
            truecolor: true,
            bright_colors: true,
            sixel: false,
            sync_output: false,
            cell_pixels: DEFAULT_CELL_PIXELS,
        }
    }
}

// ─── CellWriter ──────────────────────────────────────────────────────────────

/// A row segment of image cells waiting to be sent as one sixel.
struct ImageRun {
    x: u16,
    y: u16,
    tiles: Vec<Arc<Raster>>,
}

impl ImageRun {
    fn next_x(&self) -> u32 {
        u32::from(self.x) + u32::try_from(self.tiles.len()).unwrap_or(u32::MAX)
    }
}

/// Stateful cell renderer.
///
/// - **Cursor**: skipped when the next cell is at `(last_x + 1, last_y)`.
/// - **Attributes**: on change, SGR 0 + re-emit; colors are then re-sent.
/// - **Colors**: skipped if unchanged since the last emit.
/// - **Wide glyphs**: a right half right after its left half writes nothing.
#[allow(clippy::struct_field_names)] // The `last_` prefix groups tracked terminal state.
pub struct CellWriter {
    out: OutputBuffer,
    ctx: RenderContext,
    encoder: SixelEncoder,
    last_x: i32,
    last_y: i32,
    last_fg: Option<SgrColor>,
    last_bg: Option<SgrColor>,
    last_attrs: Attr,
    run: Option<ImageRun>,
}

impl CellWriter {
    #[must_use]
    pub fn new(encoder: SixelEncoder) -> Self {
        Self {
            out: OutputBuffer::new(),
            ctx: RenderContext::default(),
            encoder,
            last_x: -1,
            last_y: -1,
            last_fg: None,
            last_bg: None,
            last_attrs: Attr::empty(),
            run: None,
        }
    }

    /// Replace the color/option snapshot used by the next frame.
    pub const fn set_context(&mut self, ctx: RenderContext) {
        self.ctx = ctx;
    }

    #[inline]
    #[must_use]
    pub const fn context(&self) -> &RenderContext {
        &self.ctx
    }

    #[inline]
    #[must_use]
    pub const fn encoder(&self) -> &SixelEncoder {
        &self.encoder
    }

    pub const fn encoder_mut(&mut self) -> &mut SixelEncoder {
        &mut self.encoder
    }

    /// Pending bytes, for out-of-frame sequences.
    pub const fn output(&mut self) -> &mut OutputBuffer {
        &mut self.out
    }

    #[inline]
    #[must_use]
    pub fn output_bytes(&self) -> &[u8] {
        self.out.as_bytes()
    }

    /// Write pending bytes to `w`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `w` fails.
    pub fn flush_to(&mut self, w: &mut (impl Write + ?Sized)) -> io::Result<()> {
        self.out.flush_to(w)
    }

    /// Forget tracked terminal state. Call after anything that moved the
    /// cursor or changed SGR behind the writer's back.
    pub const fn reset_state(&mut self) {
        self.last_x = -1;
        self.last_y = -1;
        self.last_fg = None;
        self.last_bg = None;
        self.last_attrs = Attr::empty();
    }

    /// Render one cell, emitting only the sequences needed.
    pub fn render_cell(&mut self, x: u16, y: u16, cell: &Cell) {
        if self.ctx.sixel && cell.is_image() {
            if let Some(tile) = cell.tile() {
                self.queue_image(x, y, tile);
                return;
            }
        }
        self.flush_image_run();

        let xi = i32::from(x);
        let yi = i32::from(y);

        if cell.width == Width::Right {
            if self.last_y == yi && self.last_x == xi - 1 {
                self.last_x = xi;
                return;
            }
            self.move_to(x, y);
            self.apply_style(cell.attrs);
            self.out.buf.push(b' ');
            self.last_x = xi;
            return;
        }

        self.move_to(x, y);
        self.apply_style(cell.attrs);
        self.out.write_glyph(&cell.glyph);
        // A wide glyph moves the terminal cursor two columns; the right
        // half that follows is skipped above.
        self.last_x = xi;
    }

    fn move_to(&mut self, x: u16, y: u16) {
        let xi = i32::from(x);
        let yi = i32::from(y);
        if yi != self.last_y || xi != self.last_x + 1 {
            ansi::cursor_to(&mut self.out, x, y).ok();
        }
        self.last_y = yi;
    }

    fn apply_style(&mut self, attrs: CellAttributes) {
        let (fg, bg, flags) = self.ctx.resolve(attrs);

        if flags != self.last_attrs {
            if !self.last_attrs.is_empty() {
                ansi::reset(&mut self.out).ok();
                self.last_fg = None;
                self.last_bg = None;
            }
            self.last_attrs = flags;
            ansi::attrs(&mut self.out, flags).ok();
        }
        if self.last_fg != Some(fg) {
            ansi::fg(&mut self.out, fg).ok();
            self.last_fg = Some(fg);
        }
        if self.last_bg != Some(bg) {
            ansi::bg(&mut self.out, bg).ok();
            self.last_bg = Some(bg);
        }
    }

    // ── Images ──

    fn queue_image(&mut self, x: u16, y: u16, tile: &Arc<Raster>) {
        if let Some(run) = &mut self.run {
            if run.y == y && run.next_x() == u32::from(x) {
                run.tiles.push(Arc::clone(tile));
                return;
            }
        }
        self.flush_image_run();
        self.run = Some(ImageRun {
            x,
            y,
            tiles: vec![Arc::clone(tile)],
        });
    }

    fn flush_image_run(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        let (cw, ch) = self.ctx.cell_pixels;
        let (cw, ch) = (usize::from(cw), usize::from(ch));
        let mut raster = Raster::filled(cw * run.tiles.len(), ch, Rgba::TRANSPARENT);
        for (i, tile) in run.tiles.iter().enumerate() {
            raster.blit(i * cw, 0, tile);
        }
        trace!(
            "sixel run of {} cells at ({}, {})",
            run.tiles.len(),
            run.x,
            run.y
        );
        ansi::cursor_to(&mut self.out, run.x, run.y).ok();
        self.out
            .write_all(self.encoder.encode_framed(&raster).as_bytes())
            .ok();
        // Cursor position after a sixel depends on the terminal.
        self.last_x = -1;
        self.last_y = -1;
    }
}

impl CellSink for CellWriter {
    fn begin_frame(&mut self, full: bool) {
        if self.ctx.sync_output {
            ansi::begin_sync(&mut self.out).ok();
        }
        ansi::cursor_hide(&mut self.out).ok();
        self.reset_state();
        if full {
            ansi::reset(&mut self.out).ok();
            ansi::clear_screen(&mut self.out).ok();
        }
    }

    fn emit(&mut self, x: u16, y: u16, cell: &Cell) {
        self.render_cell(x, y, cell);
    }

    fn end_frame(&mut self, cursor: Option<(u16, u16)>) {
        self.flush_image_run();
        ansi::reset(&mut self.out).ok();
        self.last_attrs = Attr::empty();
        self.last_fg = None;
        self.last_bg = None;
        if let Some((x, y)) = cursor {
            ansi::cursor_to(&mut self.out, x, y).ok();
            ansi::cursor_show(&mut self.out).ok();
            self.last_x = i32::from(x) - 1;
            self.last_y = i32::from(y);
        }
        if self.ctx.sync_output {
            ansi::end_sync(&mut self.out).ok();
        }
    }
}

impl Default for CellWriter {
    fn default() -> Self {
        Self::new(SixelEncoder::default())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use pretty_assertions::assert_eq;

    // ── OutputBuffer ─────────────────────────────────────────────────────

    #[test]
    fn output_buffer_write_trait() {
        let mut buf = OutputBuffer::new();
        write!(buf, "hello {}", 42).unwrap();
        assert_eq!(buf.as_bytes(), b"hello 42");
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn output_buffer_glyphs() {
        let mut buf = OutputBuffer::new();
        buf.write_glyph(&Glyph::Char('中'));
        buf.write_glyph(&Glyph::from_grapheme("e\u{301}"));
        buf.write_glyph(&Glyph::Unset);
        assert_eq!(buf.as_bytes(), "中e\u{301} ".as_bytes());
    }

    #[test]
    fn output_buffer_flush_to() {
        let mut buf = OutputBuffer::new();
        write!(buf, "frame data").unwrap();
        let mut dest = Vec::new();
        buf.flush_to(&mut dest).unwrap();
        assert_eq!(dest, b"frame data");
        assert!(buf.is_empty());

        buf.flush_to(&mut dest).unwrap();
        assert_eq!(dest.len(), 10);
    }

    // ── CellWriter helpers ───────────────────────────────────────────────

    fn render_with(ctx: RenderContext, cells: &[(u16, u16, Cell)]) -> String {
        let mut writer = CellWriter::default();
        writer.set_context(ctx);
        for (x, y, cell) in cells {
            writer.render_cell(*x, *y, cell);
        }
        writer.flush_image_run();
        String::from_utf8(writer.output_bytes().to_vec()).unwrap()
    }

    fn render_seq(cells: &[(u16, u16, Cell)]) -> String {
        render_with(RenderContext::default(), cells)
    }

    fn fg(spec: impl Into<ColorSpec>) -> CellAttributes {
        CellAttributes::DEFAULT.with_fg(spec.into())
    }

    // ── Cursor ───────────────────────────────────────────────────────────

    #[test]
    fn first_cell_emits_cursor_move() {
        let output = render_seq(&[(5, 3, Cell::new('A'))]);
        assert!(output.starts_with("\x1b[4;6H"));
        assert!(output.ends_with('A'));
    }

    #[test]
    fn sequential_cells_skip_cursor_move() {
        let output = render_seq(&[
            (0, 0, Cell::new('A')),
            (1, 0, Cell::new('B')),
            (2, 0, Cell::new('C')),
        ]);
        assert_eq!(output.matches('H').count(), 1);
        assert!(output.contains("ABC"));
    }

    #[test]
    fn gaps_and_new_rows_move_cursor() {
        let output = render_seq(&[
            (0, 0, Cell::new('A')),
            (5, 0, Cell::new('B')),
            (5, 1, Cell::new('C')),
        ]);
        assert_eq!(output.matches('H').count(), 3);
    }

    #[test]
    fn wide_right_half_after_left_writes_nothing() {
        let attrs = CellAttributes::DEFAULT;
        let output = render_seq(&[
            (0, 0, Cell::from_glyph(Glyph::Char('中'), Width::Left, attrs)),
            (1, 0, Cell::from_glyph(Glyph::Char('中'), Width::Right, attrs)),
            (2, 0, Cell::new('x')),
        ]);
        assert!(output.ends_with("中x"));
        assert_eq!(output.matches('H').count(), 1);
    }

    // ── Colors ───────────────────────────────────────────────────────────

    #[test]
    fn same_color_not_re_emitted() {
        let red = fg(Rgb::new(255, 0, 0));
        let output = render_seq(&[(0, 0, Cell::styled('A', red)), (1, 0, Cell::styled('B', red))]);
        assert_eq!(output.matches("\x1b[38;2;255;0;0m").count(), 1);
    }

    #[test]
    fn default_colors_emit_39_49() {
        let output = render_seq(&[(0, 0, Cell::new('A'))]);
        assert!(output.contains("\x1b[39m"));
        assert!(output.contains("\x1b[49m"));
    }

    #[test]
    fn negotiated_default_background_is_used() {
        let ctx = RenderContext {
            default_bg: Some(Rgb::new(1, 2, 3)),
            ..RenderContext::default()
        };
        let output = render_with(ctx, &[(0, 0, Cell::new('A'))]);
        assert!(output.contains("\x1b[48;2;1;2;3m"));
        assert!(output.contains("\x1b[39m"));
    }

    #[test]
    fn bold_indexed_uses_bright_range() {
        let attrs = fg(Color::Red).with_flags(Attr::BOLD);
        let output = render_seq(&[(0, 0, Cell::styled('A', attrs))]);
        assert!(output.contains("\x1b[91m"));
        assert!(!output.contains("\x1b[1m"));
    }

    #[test]
    fn bold_indexed_without_bright_colors() {
        let ctx = RenderContext {
            bright_colors: false,
            ..RenderContext::default()
        };
        let attrs = fg(Color::Red).with_flags(Attr::BOLD);
        let output = render_with(ctx, &[(0, 0, Cell::styled('A', attrs))]);
        assert!(output.contains("\x1b[1m"));
        assert!(output.contains("\x1b[31m"));
    }

    #[test]
    fn bold_rgb_keeps_sgr_1() {
        let attrs = fg(Rgb::new(10, 20, 30)).with_flags(Attr::BOLD);
        let output = render_seq(&[(0, 0, Cell::styled('A', attrs))]);
        assert!(output.contains("\x1b[1m"));
        assert!(output.contains("\x1b[38;2;10;20;30m"));
    }

    #[test]
    fn rgb_downgrades_without_truecolor() {
        let ctx = RenderContext {
            truecolor: false,
            ..RenderContext::default()
        };
        let output = render_with(ctx, &[(0, 0, Cell::styled('A', fg(Rgb::new(250, 5, 5))))]);
        assert!(output.contains("\x1b[91m"));
        assert!(!output.contains("38;2"));
    }

    // ── Attributes ───────────────────────────────────────────────────────

    #[test]
    fn attr_change_resets() {
        let bold = CellAttributes::DEFAULT.with_flags(Attr::UNDERLINE);
        let rev = CellAttributes::DEFAULT.with_flags(Attr::REVERSE);
        let output = render_seq(&[(0, 0, Cell::styled('A', bold)), (1, 0, Cell::styled('B', rev))]);
        assert!(output.contains("\x1b[4m"));
        assert!(output.contains("\x1b[0m\x1b[7m"));
    }

    #[test]
    fn protect_is_not_rendered() {
        let attrs = CellAttributes::DEFAULT.with_flags(Attr::PROTECT);
        let output = render_seq(&[(0, 0, Cell::styled('A', attrs))]);
        assert_eq!(output, "\x1b[1;1H\x1b[39m\x1b[49mA");
    }

    // ── Frames ───────────────────────────────────────────────────────────

    #[test]
    fn sync_wraps_frame() {
        let mut writer = CellWriter::default();
        writer.set_context(RenderContext {
            sync_output: true,
            ..RenderContext::default()
        });
        writer.begin_frame(false);
        writer.emit(0, 0, &Cell::new('A'));
        writer.end_frame(None);
        let output = String::from_utf8(writer.output_bytes().to_vec()).unwrap();
        assert!(output.starts_with("\x1b[?2026h"));
        assert!(output.ends_with("\x1b[?2026l"));
    }

    #[test]
    fn end_frame_places_cursor() {
        let mut writer = CellWriter::default();
        writer.begin_frame(false);
        writer.end_frame(Some((3, 2)));
        let output = String::from_utf8(writer.output_bytes().to_vec()).unwrap();
        assert!(output.ends_with("\x1b[3;4H\x1b[?25h"));
    }

    // ── Images ───────────────────────────────────────────────────────────

    fn tile() -> Arc<Raster> {
        Arc::new(Raster::filled(2, 6, Rgba::new(255, 0, 0, 255)))
    }

    #[test]
    fn image_run_becomes_one_sixel() {
        let ctx = RenderContext {
            sixel: true,
            cell_pixels: (2, 6),
            ..RenderContext::default()
        };
        let t = tile();
        let attrs = CellAttributes::DEFAULT;
        let output = render_with(
            ctx,
            &[
                (1, 0, Cell::image(Arc::clone(&t), attrs)),
                (2, 0, Cell::image(Arc::clone(&t), attrs)),
                (3, 0, Cell::image(t, attrs)),
            ],
        );
        assert_eq!(output.matches("\x1bP").count(), 1);
        assert!(output.starts_with("\x1b[1;2H\x1bP"));
        assert!(output.contains("\"1;1;6;6"));
    }

    #[test]
    fn image_without_sixel_is_blank() {
        let attrs = CellAttributes::DEFAULT.with_bg(ColorSpec::Indexed(Color::Blue));
        let output = render_seq(&[(0, 0, Cell::image(tile(), attrs))]);
        assert!(!output.contains("\x1bP"));
        assert!(output.contains("\x1b[44m"));
        assert!(output.ends_with(' '));
    }
}
