// SPDX-License-Identifier: MIT
//
// Cell — one character position on a screen.
//
// A cell holds a glyph (a single char or a multi-codepoint grapheme
// cluster), its column width role, its attributes, and optionally an
// image tile. Everything the renderer does is producing, diffing, and
// emitting these.
//
// Wide glyphs (CJK, most emoji) occupy two cells: the left cell carries the
// glyph with `Width::Left`, the right cell repeats it with `Width::Right`.
// The renderer emits the glyph once, from the left half.
//
// The unset sentinel:
//
//   `Cell::UNSET` is what a freshly cleared *physical* grid holds. It never
//   compares equal to anything, itself included, so the first flush after
//   a clear or resize repaints every position. That is why `Cell`
//   implements `PartialEq` but not `Eq`.

use std::sync::Arc;

use cellterm_sixel::Raster;

use crate::color::ColorSpec;

// ─── Attributes ──────────────────────────────────────────────────────────────

bitflags::bitflags! {
    /// Boolean text attributes.
    ///
    /// ```
    /// use cellterm::cell::Attr;
    ///
    /// let style = Attr::BOLD | Attr::UNDERLINE;
    /// assert!(style.contains(Attr::BOLD));
    /// assert!(!style.contains(Attr::REVERSE));
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Attr: u8 {
        /// Bright foreground for indexed colors, SGR 1 otherwise.
        const BOLD      = 1 << 0;
        /// SGR 5.
        const BLINK     = 1 << 1;
        /// SGR 4.
        const UNDERLINE = 1 << 2;
        /// SGR 7.
        const REVERSE   = 1 << 3;
        /// Application-level protection marker. Not rendered.
        const PROTECT   = 1 << 4;
        /// The cell carries an image tile instead of a glyph.
        const IMAGE     = 1 << 5;
    }
}

/// Colors plus flags. Copied by value into every cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CellAttributes {
    pub fg: ColorSpec,
    pub bg: ColorSpec,
    pub flags: Attr,
}

impl CellAttributes {
    /// Default colors, no flags.
    pub const DEFAULT: Self = Self {
        fg: ColorSpec::Default,
        bg: ColorSpec::Default,
        flags: Attr::empty(),
    };

    #[inline]
    #[must_use]
    pub const fn new(fg: ColorSpec, bg: ColorSpec) -> Self {
        Self {
            fg,
            bg,
            flags: Attr::empty(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn with_fg(self, fg: ColorSpec) -> Self {
        Self { fg, ..self }
    }

    #[inline]
    #[must_use]
    pub const fn with_bg(self, bg: ColorSpec) -> Self {
        Self { bg, ..self }
    }

    #[inline]
    #[must_use]
    pub const fn with_flags(self, flags: Attr) -> Self {
        Self { flags, ..self }
    }

    #[inline]
    #[must_use]
    pub const fn is_bold(self) -> bool {
        self.flags.contains(Attr::BOLD)
    }

    #[inline]
    #[must_use]
    pub const fn is_reverse(self) -> bool {
        self.flags.contains(Attr::REVERSE)
    }

    /// Unstyled: default colors and no flags.
    #[inline]
    #[must_use]
    pub fn is_default(self) -> bool {
        self == Self::DEFAULT
    }
}

// ─── Glyph ───────────────────────────────────────────────────────────────────

/// What a cell displays.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Glyph {
    /// Reserved sentinel for "never drawn".
    #[default]
    Unset,
    Char(char),
    /// A grapheme cluster of more than one codepoint.
    Cluster(Arc<str>),
}

impl Glyph {
    /// Build from one grapheme cluster. Single-codepoint clusters become
    /// `Char`, the empty string becomes a space.
    #[must_use]
    pub fn from_grapheme(g: &str) -> Self {
        let mut chars = g.chars();
        match (chars.next(), chars.next()) {
            (None, _) => Self::Char(' '),
            (Some(c), None) => Self::Char(c),
            _ => Self::Cluster(Arc::from(g)),
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_char(&self) -> Option<char> {
        match self {
            Self::Char(c) => Some(*c),
            _ => None,
        }
    }

    /// Append the glyph's text to `out`. Unset appends nothing.
    pub fn push_to(&self, out: &mut String) {
        match self {
            Self::Unset => {}
            Self::Char(c) => out.push(*c),
            Self::Cluster(s) => out.push_str(s),
        }
    }
}

// ─── Width ───────────────────────────────────────────────────────────────────

/// Column role of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Width {
    #[default]
    Single,
    /// Left half of a double-width glyph. Carries the output.
    Left,
    /// Right half of a double-width glyph. Never emitted on its own.
    Right,
}

// ─── Cell ────────────────────────────────────────────────────────────────────

/// A single screen position.
#[derive(Clone)]
pub struct Cell {
    pub glyph: Glyph,
    pub width: Width,
    pub attrs: CellAttributes,
    image: Option<Arc<Raster>>,
}

impl Cell {
    /// A space with default attributes.
    pub const BLANK: Self = Self {
        glyph: Glyph::Char(' '),
        width: Width::Single,
        attrs: CellAttributes::DEFAULT,
        image: None,
    };

    /// The never-equal sentinel.
    pub const UNSET: Self = Self {
        glyph: Glyph::Unset,
        width: Width::Single,
        attrs: CellAttributes::DEFAULT,
        image: None,
    };

    #[inline]
    #[must_use]
    pub const fn new(ch: char) -> Self {
        Self::styled(ch, CellAttributes::DEFAULT)
    }

    #[inline]
    #[must_use]
    pub const fn styled(ch: char, attrs: CellAttributes) -> Self {
        Self {
            glyph: Glyph::Char(ch),
            width: Width::Single,
            attrs,
            image: None,
        }
    }

    #[must_use]
    pub const fn from_glyph(glyph: Glyph, width: Width, attrs: CellAttributes) -> Self {
        Self {
            glyph,
            width,
            attrs,
            image: None,
        }
    }

    /// An image tile. The glyph is a space so text-only targets can still
    /// paint the background.
    #[must_use]
    pub fn image(tile: Arc<Raster>, attrs: CellAttributes) -> Self {
        Self {
            glyph: Glyph::Char(' '),
            width: Width::Single,
            attrs: attrs.with_flags(attrs.flags | Attr::IMAGE),
            image: Some(tile),
        }
    }

    // ─── Queries ──────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        matches!(self.glyph, Glyph::Unset)
    }

    /// Space, single width, default attributes, no image.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.glyph == Glyph::Char(' ')
            && self.width == Width::Single
            && self.attrs.is_default()
            && self.image.is_none()
    }

    #[inline]
    #[must_use]
    pub const fn is_image(&self) -> bool {
        self.image.is_some()
    }

    /// Plain-glyph cells can be reused from a glyph cache; image cells can't.
    #[inline]
    #[must_use]
    pub const fn is_cacheable(&self) -> bool {
        self.image.is_none()
    }

    #[inline]
    #[must_use]
    pub const fn tile(&self) -> Option<&Arc<Raster>> {
        self.image.as_ref()
    }

    #[inline]
    #[must_use]
    pub const fn character(&self) -> Option<char> {
        self.glyph.as_char()
    }

    // ─── Mutations ────────────────────────────────────────────────────────

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::BLANK;
    }

    /// Replace the attributes, keeping the IMAGE flag in sync with the tile.
    pub fn set_attrs(&mut self, attrs: CellAttributes) {
        let mut flags = attrs.flags - Attr::IMAGE;
        if self.image.is_some() {
            flags |= Attr::IMAGE;
        }
        self.attrs = attrs.with_flags(flags);
    }

    #[inline]
    #[must_use]
    pub fn with_attrs(mut self, attrs: CellAttributes) -> Self {
        self.set_attrs(attrs);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_width(self, width: Width) -> Self {
        Self { width, ..self }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        if self.is_unset() || other.is_unset() {
            return false;
        }
        let images = match (&self.image, &other.image) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b) || **a == **b,
            _ => false,
        };
        images && self.width == other.width && self.attrs == other.attrs && self.glyph == other.glyph
    }
}

impl Default for Cell {
    #[inline]
    fn default() -> Self {
        Self::BLANK
    }
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.glyph {
            Glyph::Unset => return write!(f, "Cell(unset)"),
            Glyph::Char(c) => write!(f, "Cell({c:?}")?,
            Glyph::Cluster(s) => write!(f, "Cell({s:?}")?,
        }
        if self.width != Width::Single {
            write!(f, ", {:?}", self.width)?;
        }
        if self.attrs.fg != ColorSpec::Default {
            write!(f, ", fg={:?}", self.attrs.fg)?;
        }
        if self.attrs.bg != ColorSpec::Default {
            write!(f, ", bg={:?}", self.attrs.bg)?;
        }
        if !self.attrs.flags.is_empty() {
            write!(f, ", {:?}", self.attrs.flags)?;
        }
        if let Some(img) = &self.image {
            write!(f, ", {img:?}")?;
        }
        write!(f, ")")
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{Color, Rgb};
    use cellterm_sixel::Rgba;
    use pretty_assertions::assert_eq;

    fn red_on_blue() -> CellAttributes {
        CellAttributes::new(Color::Red.into(), Color::Blue.into())
    }

    // ── Unset ────────────────────────────────────────────────────────────

    #[test]
    fn unset_never_equals_itself() {
        let u = Cell::UNSET;
        assert!(u != u.clone());
        assert!(Cell::UNSET != Cell::BLANK);
        assert!(Cell::BLANK != Cell::UNSET);
    }

    #[test]
    fn unset_is_not_blank() {
        assert!(!Cell::UNSET.is_blank());
        assert!(Cell::UNSET.is_unset());
    }

    // ── Blank ────────────────────────────────────────────────────────────

    #[test]
    fn default_cell_is_blank() {
        assert!(Cell::default().is_blank());
        assert_eq!(Cell::default(), Cell::BLANK);
    }

    #[test]
    fn styled_space_is_not_blank() {
        assert!(!Cell::styled(' ', red_on_blue()).is_blank());
        assert!(!Cell::new(' ').with_width(Width::Left).is_blank());
        assert!(!Cell::new('x').is_blank());
    }

    #[test]
    fn reset_returns_to_blank() {
        let mut c = Cell::styled('Q', red_on_blue());
        c.reset();
        assert!(c.is_blank());
    }

    // ── Equality ─────────────────────────────────────────────────────────

    #[test]
    fn equality_covers_every_field() {
        let a = Cell::styled('A', red_on_blue());
        assert_eq!(a, a.clone());
        assert!(a != Cell::styled('B', red_on_blue()));
        assert!(a != Cell::new('A'));
        assert!(a != a.clone().with_width(Width::Left));
    }

    #[test]
    fn image_cells_compare_by_pixels() {
        let t1 = Arc::new(Raster::filled(2, 2, Rgba::new(1, 2, 3, 255)));
        let t2 = Arc::new(Raster::filled(2, 2, Rgba::new(1, 2, 3, 255)));
        let t3 = Arc::new(Raster::filled(2, 2, Rgba::new(9, 9, 9, 255)));
        let a = Cell::image(t1, CellAttributes::DEFAULT);
        assert_eq!(a, Cell::image(t2, CellAttributes::DEFAULT));
        assert!(a != Cell::image(t3, CellAttributes::DEFAULT));
        assert!(a != Cell::BLANK);
    }

    // ── Image ────────────────────────────────────────────────────────────

    #[test]
    fn image_cell_sets_flag_and_is_not_cacheable() {
        let c = Cell::image(Arc::new(Raster::new(1, 1)), CellAttributes::DEFAULT);
        assert!(c.is_image());
        assert!(c.attrs.flags.contains(Attr::IMAGE));
        assert!(!c.is_cacheable());
        assert!(Cell::BLANK.is_cacheable());
    }

    #[test]
    fn set_attrs_keeps_image_flag_in_sync() {
        let mut text = Cell::new('x');
        text.set_attrs(CellAttributes::DEFAULT.with_flags(Attr::IMAGE | Attr::BOLD));
        assert_eq!(text.attrs.flags, Attr::BOLD);

        let mut img = Cell::image(Arc::new(Raster::new(1, 1)), CellAttributes::DEFAULT);
        img.set_attrs(red_on_blue());
        assert!(img.attrs.flags.contains(Attr::IMAGE));
    }

    // ── Glyph ────────────────────────────────────────────────────────────

    #[test]
    fn glyph_from_grapheme() {
        assert_eq!(Glyph::from_grapheme("a"), Glyph::Char('a'));
        assert_eq!(Glyph::from_grapheme(""), Glyph::Char(' '));
        assert_eq!(
            Glyph::from_grapheme("e\u{301}"),
            Glyph::Cluster(Arc::from("e\u{301}"))
        );
    }

    #[test]
    fn glyph_push_to() {
        let mut s = String::new();
        Glyph::Char('x').push_to(&mut s);
        Glyph::Unset.push_to(&mut s);
        Glyph::from_grapheme("e\u{301}").push_to(&mut s);
        assert_eq!(s, "xe\u{301}");
    }

    // ── Attributes ───────────────────────────────────────────────────────

    #[test]
    fn attributes_builders() {
        let a = CellAttributes::DEFAULT
            .with_fg(ColorSpec::Rgb(Rgb::new(1, 2, 3)))
            .with_flags(Attr::BOLD | Attr::REVERSE);
        assert!(a.is_bold());
        assert!(a.is_reverse());
        assert!(!a.is_default());
        assert!(CellAttributes::default().is_default());
    }

    // ── Debug ────────────────────────────────────────────────────────────

    #[test]
    fn debug_format() {
        assert_eq!(format!("{:?}", Cell::UNSET), "Cell(unset)");
        assert_eq!(format!("{:?}", Cell::new('A')), "Cell('A')");
        let dbg = format!("{:?}", Cell::styled('A', red_on_blue().with_flags(Attr::BOLD)));
        assert!(dbg.contains("fg=Indexed(Red)"));
        assert!(dbg.contains("BOLD"));
    }
}
