// SPDX-License-Identifier: MIT
//
// Screen — double-buffered cell grid with diff flush.
//
// The application draws into the *logical* grid. The *physical* grid holds
// what the output target is believed to display. `flush_physical` walks
// both, hands every differing logical cell to a `CellSink`, then copies
// logical over physical. The sink turns cells into bytes (or records them,
// in tests); the screen never touches a transport.
//
// Coordinate model for draw calls:
//
//   screen (X, Y) = (x + offset_x, y + offset_y)
//
//   The write lands only if (X, Y) is inside both the clip rectangle and
//   the grid. Everything else is dropped without error. Each cell write is
//   atomic: a wide glyph whose right half would fall outside is replaced
//   by a space.
//
// Full repaints:
//
//   `set_dimensions`, `clear_physical` and `force_repaint` all arrange for
//   the physical grid to be refilled with `Cell::UNSET` before the next
//   flush. Unset never compares equal, so every position is emitted once.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthChar;

use crate::cell::{Attr, Cell, CellAttributes, Glyph, Width};
use crate::color::{Color, ColorSpec};
use crate::grid::{ClipRect, Grid, grapheme_width};

// ─── CellSink ────────────────────────────────────────────────────────────────

/// Receives the cells a flush decided to repaint.
pub trait CellSink {
    /// Called once before any `emit`. `full` is set on a forced repaint.
    fn begin_frame(&mut self, full: bool) {
        let _ = full;
    }

    /// A logical cell at `(x, y)` that differs from the physical grid.
    /// Cells of one flush arrive in row-major order.
    fn emit(&mut self, x: u16, y: u16, cell: &Cell);

    /// Called once after the last `emit`, with the visible cursor position.
    fn end_frame(&mut self, cursor: Option<(u16, u16)>) {
        let _ = cursor;
    }
}

// ─── FlushStats ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushStats {
    /// Cells handed to the sink.
    pub cells_rendered: usize,
    /// Cells equal to the physical grid.
    pub cells_skipped: usize,
    /// Unchanged left halves re-sent ahead of a changed right half. Counted
    /// in `cells_skipped` too; these are not part of the diff.
    pub cells_carried: usize,
    /// Whether this flush was a forced full repaint.
    pub full_repaint: bool,
}

impl FlushStats {
    #[inline]
    #[must_use]
    pub const fn total_cells(&self) -> usize {
        self.cells_rendered + self.cells_skipped
    }
}

// ─── BorderStyle ─────────────────────────────────────────────────────────────

/// Line set for `draw_box`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderStyle {
    #[default]
    Single,
    Double,
    Rounded,
    Thick,
}

impl BorderStyle {
    /// `[top-left, top-right, bottom-left, bottom-right, horizontal, vertical]`
    #[must_use]
    pub const fn glyphs(self) -> [char; 6] {
        match self {
            Self::Single => ['┌', '┐', '└', '┘', '─', '│'],
            Self::Double => ['╔', '╗', '╚', '╝', '═', '║'],
            Self::Rounded => ['╭', '╮', '╰', '╯', '─', '│'],
            Self::Thick => ['┏', '┓', '┗', '┛', '━', '┃'],
        }
    }
}

/// Attributes a box shadow applies: dark gray on black.
pub const SHADOW_ATTRIBUTES: CellAttributes = CellAttributes {
    fg: ColorSpec::Indexed(Color::Black),
    bg: ColorSpec::Indexed(Color::Black),
    flags: Attr::BOLD,
};

// ─── Screen ──────────────────────────────────────────────────────────────────

/// Logical + physical grids, clip, offset, cursor and title.
///
/// ```
/// use cellterm::cell::CellAttributes;
/// use cellterm::screen::Screen;
///
/// let mut screen = Screen::new(20, 5);
/// screen.put_string_xy(2, 1, "hello", CellAttributes::DEFAULT);
/// assert_eq!(screen.row_text(1), "  hello             ");
/// assert!(screen.is_dirty());
/// ```
pub struct Screen {
    logical: Grid,
    physical: Grid,
    clip: Option<ClipRect>,
    offset_x: i32,
    offset_y: i32,
    cursor_visible: bool,
    cursor_x: u16,
    cursor_y: u16,
    title: Option<String>,
    repaint: bool,
}

impl Screen {
    /// A screen at `width × height` (each clamped to at least 1). The
    /// first flush repaints every cell.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            logical: Grid::new(width, height),
            physical: Grid::filled(width, height, &Cell::UNSET),
            clip: None,
            offset_x: 0,
            offset_y: 0,
            cursor_visible: false,
            cursor_x: 0,
            cursor_y: 0,
            title: None,
            repaint: true,
        }
    }

    // ─── Dimensions ──────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub const fn width(&self) -> u16 {
        self.logical.width()
    }

    #[inline]
    #[must_use]
    pub const fn height(&self) -> u16 {
        self.logical.height()
    }

    /// Reallocate both grids, blank the logical one and force a full
    /// repaint. Clip and offset are reset; the cursor is clamped.
    pub fn set_dimensions(&mut self, width: u16, height: u16) {
        let width = width.max(1);
        let height = height.max(1);
        self.logical.resize(width, height, &Cell::BLANK);
        self.physical.resize(width, height, &Cell::UNSET);
        self.clip = None;
        self.offset_x = 0;
        self.offset_y = 0;
        self.cursor_x = self.cursor_x.min(width - 1);
        self.cursor_y = self.cursor_y.min(height - 1);
        self.repaint = true;
    }

    // ─── Clip & Offset ───────────────────────────────────────────────────

    /// Restrict draw calls to `clip`, given in screen coordinates.
    pub const fn set_clipping(&mut self, clip: ClipRect) {
        self.clip = Some(clip);
    }

    pub const fn reset_clipping(&mut self) {
        self.clip = None;
    }

    #[must_use]
    pub fn clipping(&self) -> ClipRect {
        let bounds = self.logical.bounds();
        match self.clip {
            Some(c) => c.intersect(bounds).unwrap_or(ClipRect::new(0, 0, 0, 0)),
            None => bounds,
        }
    }

    /// Translate subsequent draw calls by `(dx, dy)`.
    pub const fn set_offset(&mut self, dx: i32, dy: i32) {
        self.offset_x = dx;
        self.offset_y = dy;
    }

    #[inline]
    #[must_use]
    pub const fn offset(&self) -> (i32, i32) {
        (self.offset_x, self.offset_y)
    }

    /// Screen position for draw coordinates, if it is visible.
    fn target(&self, x: i32, y: i32) -> Option<(u16, u16)> {
        let sx = x.checked_add(self.offset_x)?;
        let sy = y.checked_add(self.offset_y)?;
        if self.clip.is_some_and(|c| !c.contains(sx, sy)) {
            return None;
        }
        let sx = u16::try_from(sx).ok()?;
        let sy = u16::try_from(sy).ok()?;
        self.logical.in_bounds(sx, sy).then_some((sx, sy))
    }

    // ─── Drawing ─────────────────────────────────────────────────────────

    /// Write a prepared cell. No width handling beyond pair cleanup.
    pub fn put_cell_xy(&mut self, x: i32, y: i32, cell: Cell) {
        if let Some((sx, sy)) = self.target(x, y) {
            self.logical.put(sx, sy, cell);
        }
    }

    /// Write one character. Zero-width and control characters are ignored.
    /// Returns the columns the character advances.
    pub fn put_char_xy(&mut self, x: i32, y: i32, ch: char, attrs: CellAttributes) -> usize {
        let w = ch.width().unwrap_or(0).min(2);
        self.put_glyph_xy(x, y, Glyph::Char(ch), w, attrs);
        w
    }

    /// Replace the glyph at `(x, y)`, keeping its attributes.
    pub fn put_char(&mut self, x: i32, y: i32, ch: char) {
        if let Some((sx, sy)) = self.target(x, y) {
            let attrs = self
                .logical
                .get(sx, sy)
                .map_or(CellAttributes::DEFAULT, |c| c.attrs);
            self.put_char_xy(x, y, ch, attrs);
        }
    }

    /// Replace the attributes at `(x, y)`, keeping its glyph.
    pub fn put_attr_xy(&mut self, x: i32, y: i32, attrs: CellAttributes) {
        if let Some((sx, sy)) = self.target(x, y) {
            if let Some(cell) = self.logical.get_mut(sx, sy) {
                cell.set_attrs(attrs);
            }
        }
    }

    /// Fill every visible cell with `ch`.
    pub fn put_all(&mut self, ch: char, attrs: CellAttributes) {
        let clip = self.clipping();
        let cell = Cell::styled(ch, attrs);
        for sy in clip.y..clip.bottom() {
            for sx in clip.x..clip.right() {
                #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                // clipping() is within the grid, so both are valid u16.
                self.logical.put(sx as u16, sy as u16, cell.clone());
            }
        }
    }

    /// Write a string left to right, one grapheme cluster per cell (two
    /// for wide clusters). Zero-width clusters are skipped. Returns the
    /// columns consumed, clipped or not.
    pub fn put_string_xy(&mut self, x: i32, y: i32, text: &str, attrs: CellAttributes) -> usize {
        let mut col = 0usize;
        for g in text.graphemes(true) {
            let w = grapheme_width(g);
            if w == 0 {
                continue;
            }
            let Ok(dx) = i32::try_from(col) else { break };
            self.put_glyph_xy(x.saturating_add(dx), y, Glyph::from_grapheme(g), w, attrs);
            col += w;
        }
        col
    }

    fn put_glyph_xy(&mut self, x: i32, y: i32, glyph: Glyph, w: usize, attrs: CellAttributes) {
        if w == 0 {
            return;
        }
        let Some((sx, sy)) = self.target(x, y) else {
            return;
        };
        if w == 1 {
            self.logical.put(sx, sy, Cell::from_glyph(glyph, Width::Single, attrs));
            return;
        }
        match self.target(x.saturating_add(1), y) {
            Some((rx, ry)) if rx == sx + 1 && ry == sy => {
                self.logical
                    .put(sx, sy, Cell::from_glyph(glyph.clone(), Width::Left, attrs));
                self.logical.put(rx, ry, Cell::from_glyph(glyph, Width::Right, attrs));
            }
            _ => {
                self.logical.put(sx, sy, Cell::styled(' ', attrs));
            }
        }
    }

    /// Horizontal run of `n` copies of `ch` starting at `(x, y)`.
    pub fn h_line_xy(&mut self, x: i32, y: i32, n: usize, ch: char, attrs: CellAttributes) {
        for i in 0..n {
            let Ok(dx) = i32::try_from(i) else { break };
            self.put_char_xy(x.saturating_add(dx), y, ch, attrs);
        }
    }

    /// Vertical run of `n` copies of `ch` starting at `(x, y)`.
    pub fn v_line_xy(&mut self, x: i32, y: i32, n: usize, ch: char, attrs: CellAttributes) {
        for i in 0..n {
            let Ok(dy) = i32::try_from(i) else { break };
            self.put_char_xy(x, y.saturating_add(dy), ch, attrs);
        }
    }

    /// Box covering columns `left..right` and rows `top..bottom`
    /// (exclusive ends). The interior is filled with spaces in
    /// `background`. Boxes smaller than 2×2 draw nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_box(
        &mut self,
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
        border: CellAttributes,
        background: CellAttributes,
        style: BorderStyle,
        shadow: bool,
    ) {
        let (l, t, r, b) = (
            i64::from(left),
            i64::from(top),
            i64::from(right),
            i64::from(bottom),
        );
        if r - l < 2 || b - t < 2 {
            return;
        }
        // Both are at least one step inside the box, so neither overflows.
        let (last_x, last_y) = (right - 1, bottom - 1);
        let [tl, tr, bl, br, h, v] = style.glyphs();

        self.put_char_xy(left, top, tl, border);
        self.put_char_xy(last_x, top, tr, border);
        self.put_char_xy(left, last_y, bl, border);
        self.put_char_xy(last_x, last_y, br, border);

        // Edges and interior, trimmed to what can land.
        let (vx0, vy0, vx1, vy1) = self.visible_draw_area();
        if let Some((x, n)) = span(l + 1, r - 1, vx0, vx1) {
            self.h_line_xy(x, top, n, h, border);
            self.h_line_xy(x, last_y, n, h, border);
            if let Some((y0, rows)) = span(t + 1, b - 1, vy0, vy1) {
                for dy in 0..rows {
                    let Ok(dy) = i32::try_from(dy) else { break };
                    self.h_line_xy(x, y0.saturating_add(dy), n, ' ', background);
                }
            }
        }
        if let Some((y, n)) = span(t + 1, b - 1, vy0, vy1) {
            self.v_line_xy(left, y, n, v, border);
            self.v_line_xy(last_x, y, n, v, border);
        }

        if shadow {
            self.draw_box_shadow(left, top, right, bottom);
        }
    }

    /// Darken the two columns right of and the row below a box.
    pub fn draw_box_shadow(&mut self, left: i32, top: i32, right: i32, bottom: i32) {
        let (l, t, r, b) = (
            i64::from(left),
            i64::from(top),
            i64::from(right),
            i64::from(bottom),
        );
        let (vx0, vy0, vx1, vy1) = self.visible_draw_area();
        if let Some((y0, rows)) = span(t + 1, b + 1, vy0, vy1) {
            for dy in 0..rows {
                let Ok(dy) = i32::try_from(dy) else { break };
                let y = y0.saturating_add(dy);
                self.put_attr_xy(right, y, SHADOW_ATTRIBUTES);
                self.put_attr_xy(right.saturating_add(1), y, SHADOW_ATTRIBUTES);
            }
        }
        if let Some((x0, cols)) = span(l + 2, r, vx0, vx1) {
            for dx in 0..cols {
                let Ok(dx) = i32::try_from(dx) else { break };
                self.put_attr_xy(x0.saturating_add(dx), bottom, SHADOW_ATTRIBUTES);
            }
        }
    }

    /// Visible area in draw coordinates: `(x0, y0, x1, y1)`, ends exclusive.
    fn visible_draw_area(&self) -> (i64, i64, i64, i64) {
        let clip = self.clipping();
        let (dx, dy) = (i64::from(self.offset_x), i64::from(self.offset_y));
        (
            i64::from(clip.x) - dx,
            i64::from(clip.y) - dy,
            i64::from(clip.right()) - dx,
            i64::from(clip.bottom()) - dy,
        )
    }

    // ─── Reading ─────────────────────────────────────────────────────────

    /// Copy of the logical cell at screen position `(x, y)`.
    #[must_use]
    pub fn get_char_xy(&self, x: u16, y: u16) -> Option<Cell> {
        self.logical.get(x, y).cloned()
    }

    /// Text of logical row `y`.
    #[must_use]
    pub fn row_text(&self, y: u16) -> String {
        self.logical.row_text(y)
    }

    #[inline]
    #[must_use]
    pub const fn logical(&self) -> &Grid {
        &self.logical
    }

    /// Whether a flush would emit anything.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.repaint || (0..self.height()).any(|y| self.logical.row(y) != self.physical.row(y))
    }

    // ─── Clearing ────────────────────────────────────────────────────────

    /// Blank the logical grid. The next flush emits only what changed.
    pub fn clear(&mut self) {
        self.logical.fill(&Cell::BLANK);
    }

    /// Forget what the target displays; the next flush repaints everything.
    pub fn clear_physical(&mut self) {
        self.physical.fill(&Cell::UNSET);
        self.repaint = true;
    }

    pub const fn force_repaint(&mut self) {
        self.repaint = true;
    }

    /// Copy another screen's logical grid into this one, resizing first
    /// when the dimensions differ.
    pub fn copy_logical_from(&mut self, other: &Self) {
        if self.width() != other.width() || self.height() != other.height() {
            self.set_dimensions(other.width(), other.height());
        }
        self.logical.copy_from(&other.logical);
    }

    // ─── Cursor & Title ──────────────────────────────────────────────────

    /// Show or hide the cursor at `(x, y)`, clamped to the screen.
    pub fn put_cursor(&mut self, visible: bool, x: u16, y: u16) {
        self.cursor_visible = visible;
        self.cursor_x = x.min(self.width() - 1);
        self.cursor_y = y.min(self.height() - 1);
    }

    pub const fn hide_cursor(&mut self) {
        self.cursor_visible = false;
    }

    /// Visible cursor position.
    #[inline]
    #[must_use]
    pub const fn cursor(&self) -> Option<(u16, u16)> {
        if self.cursor_visible {
            Some((self.cursor_x, self.cursor_y))
        } else {
            None
        }
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = Some(title.to_owned());
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    // ─── Flush ───────────────────────────────────────────────────────────

    /// Hand every changed cell to `sink`, then make physical match logical.
    ///
    /// A right half whose left half is unchanged is preceded by its left
    /// half, so the sink always sees a wide glyph from its left column.
    /// That extra cell is reported in `cells_carried`, not `cells_rendered`.
    pub fn flush_physical(&mut self, sink: &mut impl CellSink) -> FlushStats {
        let full = std::mem::take(&mut self.repaint);
        if full {
            self.physical.fill(&Cell::UNSET);
        }

        let mut stats = FlushStats {
            full_repaint: full,
            ..FlushStats::default()
        };
        let width = usize::from(self.width());

        sink.begin_frame(full);
        for y in 0..self.height() {
            let (Some(logical), Some(physical)) = (self.logical.row(y), self.physical.row(y))
            else {
                continue;
            };
            if logical == physical {
                stats.cells_skipped += width;
                continue;
            }
            let mut prev_emitted = false;
            for (x, (l, p)) in logical.iter().zip(physical).enumerate() {
                if l == p {
                    stats.cells_skipped += 1;
                    prev_emitted = false;
                    continue;
                }
                // x < width, which is a u16.
                #[allow(clippy::cast_possible_truncation)]
                let cx = x as u16;
                if l.width == Width::Right && x > 0 && !prev_emitted {
                    sink.emit(cx - 1, y, &logical[x - 1]);
                    stats.cells_carried += 1;
                }
                sink.emit(cx, y, l);
                stats.cells_rendered += 1;
                prev_emitted = true;
            }
        }
        sink.end_frame(self.cursor());

        self.physical.copy_from(&self.logical);
        stats
    }
}

impl std::fmt::Debug for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Screen({}x{})", self.width(), self.height())
    }
}

/// `start..end` intersected with `lo..hi`, as a draw start and a length.
fn span(start: i64, end: i64, lo: i64, hi: i64) -> Option<(i32, usize)> {
    let (from, to) = (start.max(lo), end.min(hi));
    let first = i32::try_from(from).ok()?;
    let len = usize::try_from(to - from).ok().filter(|&n| n > 0)?;
    Some((first, len))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
