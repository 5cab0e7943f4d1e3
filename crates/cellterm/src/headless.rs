// SPDX-License-Identifier: MIT
//
// A backend with no terminal behind it.
//
// Flushes are applied to a mirror grid that stands in for the target's
// display, and the cells of the last flush are kept for inspection. Input
// is whatever the host injects. Used for tests and as a placeholder
// target; a headless backend can be told to fail its next flushes to
// exercise disconnect handling.

use tracing::{debug, warn};

use crate::backend::{BackendCore, Clipboard};
use crate::cell::Cell;
use crate::grid::Grid;
use crate::input::Event;
use crate::negotiated::TerminalNegotiatedState;
use crate::screen::{CellSink, FlushStats, Screen};
use crate::session::SessionInfo;

// ─── Mirror ──────────────────────────────────────────────────────────────────

/// What a perfect terminal would be showing.
#[derive(Debug)]
struct Mirror {
    grid: Grid,
    emitted: Vec<(u16, u16, Cell)>,
    cursor: Option<(u16, u16)>,
}

impl CellSink for Mirror {
    fn begin_frame(&mut self, _full: bool) {
        self.emitted.clear();
    }

    fn emit(&mut self, x: u16, y: u16, cell: &Cell) {
        self.grid.set(x, y, cell.clone());
        self.emitted.push((x, y, cell.clone()));
    }

    fn end_frame(&mut self, cursor: Option<(u16, u16)>) {
        self.cursor = cursor;
    }
}

// ─── HeadlessBackend ─────────────────────────────────────────────────────────

pub struct HeadlessBackend {
    core: BackendCore,
    mirror: Mirror,
    negotiated: TerminalNegotiatedState,
    title: Option<String>,
    flushes: usize,
    last_stats: FlushStats,
    failing: bool,
    closed: bool,
}

impl HeadlessBackend {
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self::with_session(width, height, SessionInfo::default())
    }

    #[must_use]
    pub fn with_session(width: u16, height: u16, session: SessionInfo) -> Self {
        let core = BackendCore::new(width, height, session);
        let mirror = Mirror {
            grid: Grid::filled(core.screen.width(), core.screen.height(), &Cell::UNSET),
            emitted: Vec::new(),
            cursor: None,
        };
        Self {
            core,
            mirror,
            negotiated: TerminalNegotiatedState::default(),
            title: None,
            flushes: 0,
            last_stats: FlushStats::default(),
            failing: false,
            closed: false,
        }
    }

    // ── Backend surface ──

    #[inline]
    #[must_use]
    pub const fn screen(&self) -> &Screen {
        &self.core.screen
    }

    #[inline]
    pub const fn screen_mut(&mut self) -> &mut Screen {
        &mut self.core.screen
    }

    #[inline]
    #[must_use]
    pub const fn session_info(&self) -> &SessionInfo {
        &self.core.session
    }

    #[inline]
    #[must_use]
    pub const fn negotiated(&self) -> &TerminalNegotiatedState {
        &self.negotiated
    }

    pub const fn negotiated_mut(&mut self) -> &mut TerminalNegotiatedState {
        &mut self.negotiated
    }

    pub fn set_dimensions(&mut self, width: u16, height: u16) {
        self.core.set_dimensions(width, height);
    }

    pub fn flush_screen(&mut self) {
        if self.closed {
            return;
        }
        if self.failing {
            warn!("headless target failed to flush");
            self.disconnect();
            return;
        }
        let (w, h) = (self.core.screen.width(), self.core.screen.height());
        if self.mirror.grid.width() != w || self.mirror.grid.height() != h {
            self.mirror.grid.resize(w, h, &Cell::UNSET);
        }
        self.last_stats = self.core.screen.flush_physical(&mut self.mirror);
        self.title = self.core.screen.title().map(str::to_owned);
        self.flushes += 1;
    }

    pub fn has_events(&mut self) -> bool {
        !self.core.events.is_empty()
    }

    pub fn get_events(&mut self) -> Vec<Event> {
        self.core.take_events()
    }

    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.flush_screen();
        self.closed = true;
        debug!("headless backend shut down after {} flushes", self.flushes);
    }

    pub const fn set_read_only(&mut self, read_only: bool) {
        self.core.read_only = read_only;
    }

    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.core.read_only
    }

    #[must_use]
    pub const fn has_focus(&self) -> bool {
        self.core.focused
    }

    pub fn set_clipboard(&mut self, clipboard: Box<dyn Clipboard>) {
        self.core.clipboard = Some(clipboard);
    }

    pub fn copy_clipboard_text(&mut self, text: &str) -> bool {
        self.core.copy_clipboard_text(text)
    }

    // ── Simulation ──

    /// Queue an event as if the target had sent it.
    pub fn inject(&mut self, event: Event) {
        self.core.push_event(event);
    }

    /// Make every following flush fail.
    pub const fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    fn disconnect(&mut self) {
        if !self.closed {
            self.closed = true;
            self.core.push_event(Event::Disconnect);
        }
    }

    // ── Inspection ──

    /// What the target displays after the last flush.
    #[must_use]
    pub const fn displayed(&self) -> &Grid {
        &self.mirror.grid
    }

    /// Cells the last flush emitted, in order.
    #[must_use]
    pub fn last_flush(&self) -> &[(u16, u16, Cell)] {
        &self.mirror.emitted
    }

    #[must_use]
    pub const fn last_stats(&self) -> FlushStats {
        self.last_stats
    }

    #[must_use]
    pub const fn flush_count(&self) -> usize {
        self.flushes
    }

    /// Cursor position the last flush left visible.
    #[must_use]
    pub const fn displayed_cursor(&self) -> Option<(u16, u16)> {
        self.mirror.cursor
    }

    #[must_use]
    pub fn displayed_title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

impl std::fmt::Debug for HeadlessBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HeadlessBackend({:?})", self.core.screen)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
