// SPDX-License-Identifier: MIT
//
// Grid — a 2D array of cells.
//
// A screen owns two of these: the logical grid the application draws into
// and the physical grid mirroring what the output target is believed to
// show. The grid itself knows nothing about clipping or offsets; it only
// keeps wide-glyph pairs consistent when individual cells are overwritten.
//
//   - Flat `Vec<Cell>`, row-major (`index = y * width + x`), so a row is a
//     contiguous slice and unchanged rows compare with one slice equality.
//
//   - Writing over either half of a wide pair blanks the orphaned half.

use unicode_width::UnicodeWidthStr;

use crate::cell::{Cell, Glyph, Width};

// ─── ClipRect ────────────────────────────────────────────────────────────────

/// A clipping rectangle in screen coordinates.
///
/// Coordinates are signed so offset drawing can start left of or above the
/// screen.
///
/// ```
/// use cellterm::grid::ClipRect;
///
/// let clip = ClipRect::new(10, 5, 80, 24);
/// assert!(clip.contains(10, 5));
/// assert!(clip.contains(89, 28));
/// assert!(!clip.contains(9, 5));
/// assert!(!clip.contains(90, 5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipRect {
    pub x: i32,
    pub y: i32,
    pub width: u16,
    pub height: u16,
}

impl ClipRect {
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u16, height: u16) -> Self {
        Self { x, y, width, height }
    }

    /// Right edge (exclusive).
    #[inline]
    #[must_use]
    pub const fn right(self) -> i32 {
        self.x.saturating_add(self.width as i32)
    }

    /// Bottom edge (exclusive).
    #[inline]
    #[must_use]
    pub const fn bottom(self) -> i32 {
        self.y.saturating_add(self.height as i32)
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    #[must_use]
    pub const fn contains(self, px: i32, py: i32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    /// Overlap of two rectangles, `None` if they don't touch.
    #[must_use]
    pub fn intersect(self, other: Self) -> Option<Self> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        if x2 > x1 && y2 > y1 {
            // Both differences are positive and bounded by the u16 inputs.
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            Some(Self {
                x: x1,
                y: y1,
                width: (x2 - x1) as u16,
                height: (y2 - y1) as u16,
            })
        } else {
            None
        }
    }
}

// ─── Grid ────────────────────────────────────────────────────────────────────

/// Row-major cell storage.
///
/// ```
/// use cellterm::cell::Cell;
/// use cellterm::grid::Grid;
///
/// let mut grid = Grid::new(80, 24);
/// grid.put(5, 3, Cell::new('X'));
/// assert_eq!(grid.get(5, 3).and_then(Cell::character), Some('X'));
/// ```
#[derive(Clone)]
pub struct Grid {
    width: u16,
    height: u16,
    cells: Vec<Cell>,
}

impl Grid {
    // ─── Construction ────────────────────────────────────────────────────

    /// A grid of blank cells.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self::filled(width, height, &Cell::BLANK)
    }

    #[must_use]
    pub fn filled(width: u16, height: u16, cell: &Cell) -> Self {
        let size = usize::from(width) * usize::from(height);
        Self {
            width,
            height,
            cells: vec![cell.clone(); size],
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub const fn width(&self) -> u16 {
        self.width
    }

    #[inline]
    #[must_use]
    pub const fn height(&self) -> u16 {
        self.height
    }

    #[inline]
    #[must_use]
    pub const fn bounds(&self) -> ClipRect {
        ClipRect::new(0, 0, self.width, self.height)
    }

    #[inline]
    #[must_use]
    pub const fn in_bounds(&self, x: u16, y: u16) -> bool {
        x < self.width && y < self.height
    }

    #[inline]
    const fn index(&self, x: u16, y: u16) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    #[must_use]
    pub fn get(&self, x: u16, y: u16) -> Option<&Cell> {
        if self.in_bounds(x, y) {
            Some(&self.cells[self.index(x, y)])
        } else {
            None
        }
    }

    #[inline]
    pub fn get_mut(&mut self, x: u16, y: u16) -> Option<&mut Cell> {
        if self.in_bounds(x, y) {
            let idx = self.index(x, y);
            Some(&mut self.cells[idx])
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    #[inline]
    #[must_use]
    pub fn row(&self, y: u16) -> Option<&[Cell]> {
        if y < self.height {
            let start = self.index(0, y);
            Some(&self.cells[start..start + usize::from(self.width)])
        } else {
            None
        }
    }

    #[inline]
    pub fn row_mut(&mut self, y: u16) -> Option<&mut [Cell]> {
        if y < self.height {
            let start = self.index(0, y);
            let w = usize::from(self.width);
            Some(&mut self.cells[start..start + w])
        } else {
            None
        }
    }

    // ─── Clear & Resize ──────────────────────────────────────────────────

    pub fn fill(&mut self, cell: &Cell) {
        self.cells.fill(cell.clone());
    }

    /// Reallocate to `width × height`, every cell set to `cell`.
    pub fn resize(&mut self, width: u16, height: u16, cell: &Cell) {
        self.width = width;
        self.height = height;
        let size = usize::from(width) * usize::from(height);
        self.cells.clear();
        self.cells.resize(size, cell.clone());
    }

    /// Cell-wise copy of a same-sized grid; reallocates when sizes differ.
    pub fn copy_from(&mut self, other: &Self) {
        if self.width == other.width && self.height == other.height {
            self.cells.clone_from_slice(&other.cells);
        } else {
            *self = other.clone();
        }
    }

    // ─── Writes ──────────────────────────────────────────────────────────

    /// Bounds-checked raw write, no wide-pair cleanup.
    #[inline]
    pub fn set(&mut self, x: u16, y: u16, cell: Cell) -> bool {
        if !self.in_bounds(x, y) {
            return false;
        }
        let idx = self.index(x, y);
        self.cells[idx] = cell;
        true
    }

    /// Write `cell` at `(x, y)`, first breaking any wide pair that the
    /// write would split.
    pub fn put(&mut self, x: u16, y: u16, cell: Cell) -> bool {
        if !self.in_bounds(x, y) {
            return false;
        }
        self.break_pair_at(x, y);
        let idx = self.index(x, y);
        self.cells[idx] = cell;
        true
    }

    /// Blank the other half of a wide pair touching `(x, y)`.
    ///
    /// - `(x, y)` is a right half: the left half at `x - 1` becomes a
    ///   single-width space keeping its attributes.
    /// - `(x, y)` is a left half: the right half at `x + 1` is reset.
    fn break_pair_at(&mut self, x: u16, y: u16) {
        let idx = self.index(x, y);
        match self.cells[idx].width {
            Width::Right if x > 0 => {
                let prev = self.index(x - 1, y);
                let owner = &mut self.cells[prev];
                if owner.width == Width::Left {
                    owner.glyph = Glyph::Char(' ');
                    owner.width = Width::Single;
                }
            }
            Width::Left if x + 1 < self.width => {
                let next = self.index(x + 1, y);
                if self.cells[next].width == Width::Right {
                    self.cells[next] = Cell::BLANK;
                }
            }
            _ => {}
        }
    }

    /// The text of row `y`, one string per cell except right halves.
    #[must_use]
    pub fn row_text(&self, y: u16) -> String {
        let mut out = String::new();
        for cell in self.row(y).unwrap_or_default() {
            if cell.width != Width::Right {
                cell.glyph.push_to(&mut out);
            }
        }
        out
    }
}

impl std::fmt::Debug for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Grid({}x{})", self.width, self.height)
    }
}

// ─── Text Width ──────────────────────────────────────────────────────────────

/// Columns one grapheme cluster occupies: 0, 1 or 2.
///
/// ```
/// use cellterm::grid::grapheme_width;
///
/// assert_eq!(grapheme_width("a"), 1);
/// assert_eq!(grapheme_width("中"), 2);
/// assert_eq!(grapheme_width("\u{301}"), 0);
/// ```
#[inline]
#[must_use]
pub fn grapheme_width(g: &str) -> usize {
    g.width().min(2)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellAttributes;
    use crate::color::Color;
    use pretty_assertions::assert_eq;

    fn wide(ch: char) -> (Cell, Cell) {
        (
            Cell::new(ch).with_width(Width::Left),
            Cell::new(ch).with_width(Width::Right),
        )
    }

    // ── ClipRect ─────────────────────────────────────────────────────────

    #[test]
    fn clip_rect_edges() {
        let clip = ClipRect::new(10, 20, 80, 24);
        assert_eq!(clip.right(), 90);
        assert_eq!(clip.bottom(), 44);
        assert!(!clip.is_empty());
        assert!(ClipRect::new(0, 0, 0, 5).is_empty());
    }

    #[test]
    fn clip_rect_contains_negative_origin() {
        let clip = ClipRect::new(-5, -3, 20, 10);
        assert!(clip.contains(0, 0));
        assert!(clip.contains(-5, -3));
        assert!(clip.contains(14, 6));
        assert!(!clip.contains(15, 0));
    }

    #[test]
    fn clip_rect_edges_saturate() {
        let r = ClipRect::new(i32::MAX - 1, i32::MAX, 10, 3);
        assert_eq!(r.right(), i32::MAX);
        assert_eq!(r.bottom(), i32::MAX);
        assert!(!r.contains(i32::MAX - 1, i32::MAX - 1));
    }

    #[test]
    fn clip_rect_intersect() {
        let a = ClipRect::new(0, 0, 20, 20);
        let b = ClipRect::new(10, 10, 20, 20);
        assert_eq!(a.intersect(b), Some(ClipRect::new(10, 10, 10, 10)));
        assert_eq!(a.intersect(ClipRect::new(20, 0, 5, 5)), None);
        let inner = ClipRect::new(2, 2, 3, 3);
        assert_eq!(a.intersect(inner), Some(inner));
    }

    // ── Construction ─────────────────────────────────────────────────────

    #[test]
    fn new_grid_is_blank() {
        let g = Grid::new(4, 3);
        assert_eq!(g.cells().len(), 12);
        assert!(g.cells().iter().all(Cell::is_blank));
    }

    #[test]
    fn filled_with_unset() {
        let g = Grid::filled(2, 2, &Cell::UNSET);
        assert!(g.cells().iter().all(Cell::is_unset));
    }

    #[test]
    fn get_out_of_bounds() {
        let g = Grid::new(4, 3);
        assert!(g.get(4, 0).is_none());
        assert!(g.get(0, 3).is_none());
        assert!(g.row(3).is_none());
    }

    #[test]
    fn resize_refills() {
        let mut g = Grid::new(2, 2);
        g.set(0, 0, Cell::new('x'));
        g.resize(3, 1, &Cell::BLANK);
        assert_eq!((g.width(), g.height()), (3, 1));
        assert!(g.cells().iter().all(Cell::is_blank));
    }

    #[test]
    fn copy_from_same_and_different_size() {
        let mut src = Grid::new(3, 2);
        src.set(1, 1, Cell::new('q'));
        let mut dst = Grid::new(3, 2);
        dst.copy_from(&src);
        assert_eq!(dst.get(1, 1), Some(&Cell::new('q')));

        let mut other = Grid::new(1, 1);
        other.copy_from(&src);
        assert_eq!((other.width(), other.height()), (3, 2));
    }

    // ── Wide Pairs ───────────────────────────────────────────────────────

    #[test]
    fn overwriting_right_half_blanks_owner() {
        let mut g = Grid::new(4, 1);
        let (l, r) = wide('中');
        g.put(1, 0, l);
        g.put(2, 0, r);
        g.put(2, 0, Cell::new('x'));
        let owner = g.get(1, 0).cloned().unwrap_or_default();
        assert_eq!(owner.glyph, Glyph::Char(' '));
        assert_eq!(owner.width, Width::Single);
        assert_eq!(g.row_text(0), "  x ");
    }

    #[test]
    fn overwriting_left_half_clears_orphan() {
        let mut g = Grid::new(4, 1);
        let (l, r) = wide('中');
        g.put(1, 0, l);
        g.put(2, 0, r);
        g.put(1, 0, Cell::new('y'));
        assert_eq!(g.get(2, 0), Some(&Cell::BLANK));
        assert_eq!(g.row_text(0), " y  ");
    }

    #[test]
    fn owner_keeps_attributes_when_broken() {
        let attrs = CellAttributes::new(Color::Red.into(), Color::Blue.into());
        let mut g = Grid::new(3, 1);
        g.put(0, 0, Cell::styled('中', attrs).with_width(Width::Left));
        g.put(1, 0, Cell::styled('中', attrs).with_width(Width::Right));
        g.put(1, 0, Cell::new('z'));
        assert_eq!(g.get(0, 0), Some(&Cell::styled(' ', attrs)));
    }

    #[test]
    fn row_text_skips_right_halves() {
        let mut g = Grid::new(3, 1);
        let (l, r) = wide('日');
        g.put(0, 0, l);
        g.put(1, 0, r);
        assert_eq!(g.row_text(0), "日 ");
    }

    // ── Widths ───────────────────────────────────────────────────────────

    #[test]
    fn grapheme_widths() {
        assert_eq!(grapheme_width("a"), 1);
        assert_eq!(grapheme_width("中"), 2);
        assert_eq!(grapheme_width("e\u{301}"), 1);
    }

    #[test]
    fn debug_format() {
        assert_eq!(format!("{:?}", Grid::new(80, 24)), "Grid(80x24)");
    }
}
