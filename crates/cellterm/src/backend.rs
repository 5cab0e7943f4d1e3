// SPDX-License-Identifier: MIT
//
// The backend surface applications program against.
//
// `Backend` is a closed set: a headless recorder, an ECMA-48 terminal, or
// a fan-out over several of those. Every variant owns a `Screen` to draw
// into and an event queue to drain; what "flush" means differs.
//
// `BackendCore` is the state all of them share: the screen, session info,
// pending events, read-only and focus flags and the clipboard seam.

use std::collections::VecDeque;

use tracing::debug;

use crate::cell::CellAttributes;
use crate::color::Rgb;
use crate::ecma48::Ecma48Backend;
use crate::headless::HeadlessBackend;
use crate::input::Event;
use crate::multi::MultiBackend;
use crate::screen::Screen;
use crate::session::SessionInfo;

// ─── Clipboard ───────────────────────────────────────────────────────────────

/// Host clipboard bridge.
pub trait Clipboard: Send {
    /// Place `text` on the clipboard. Returns whether it was accepted.
    fn copy_text(&mut self, text: &str) -> bool;
}

// ─── BackendCore ─────────────────────────────────────────────────────────────

pub(crate) struct BackendCore {
    pub screen: Screen,
    pub session: SessionInfo,
    pub events: VecDeque<Event>,
    pub read_only: bool,
    pub focused: bool,
    pub clipboard: Option<Box<dyn Clipboard>>,
}

impl BackendCore {
    pub fn new(width: u16, height: u16, mut session: SessionInfo) -> Self {
        let screen = Screen::new(width, height);
        session.set_size(screen.width(), screen.height());
        Self {
            screen,
            session,
            events: VecDeque::new(),
            read_only: false,
            focused: true,
            clipboard: None,
        }
    }

    /// Queue an input event. Read-only backends drop user input.
    pub fn push_event(&mut self, event: Event) {
        match event {
            Event::Key(_) | Event::Mouse(_) | Event::Paste(_) if self.read_only => return,
            Event::FocusGained => self.focused = true,
            Event::FocusLost => self.focused = false,
            _ => {}
        }
        self.events.push_back(event);
    }

    /// Drain the queue. Anything drained counts as user activity.
    pub fn take_events(&mut self) -> Vec<Event> {
        let events: Vec<Event> = self.events.drain(..).collect();
        if !events.is_empty() {
            self.session.reset_idle();
        }
        events
    }

    pub fn set_dimensions(&mut self, width: u16, height: u16) {
        self.screen.set_dimensions(width, height);
        self.session.set_size(self.screen.width(), self.screen.height());
    }

    pub fn copy_clipboard_text(&mut self, text: &str) -> bool {
        match &mut self.clipboard {
            Some(clipboard) => clipboard.copy_text(text),
            None => {
                debug!("no clipboard installed, dropping {} bytes", text.len());
                false
            }
        }
    }
}

// ─── Backend ─────────────────────────────────────────────────────────────────

/// One rendering target.
pub enum Backend {
    /// Records flushes; no I/O.
    Headless(HeadlessBackend),
    /// A terminal reached through a byte transport.
    Ecma48(Box<Ecma48Backend>),
    /// Replicates a primary screen across several targets.
    Multi(Box<MultiBackend>),
}

impl Backend {
    #[must_use]
    pub fn screen(&self) -> &Screen {
        match self {
            Self::Headless(b) => b.screen(),
            Self::Ecma48(b) => b.screen(),
            Self::Multi(b) => b.screen(),
        }
    }

    pub fn screen_mut(&mut self) -> &mut Screen {
        match self {
            Self::Headless(b) => b.screen_mut(),
            Self::Ecma48(b) => b.screen_mut(),
            Self::Multi(b) => b.screen_mut(),
        }
    }

    #[must_use]
    pub fn session_info(&self) -> &SessionInfo {
        match self {
            Self::Headless(b) => b.session_info(),
            Self::Ecma48(b) => b.session_info(),
            Self::Multi(b) => b.session_info(),
        }
    }

    /// Resize the screen. The next flush repaints everything.
    pub fn set_dimensions(&mut self, width: u16, height: u16) {
        match self {
            Self::Headless(b) => b.set_dimensions(width, height),
            Self::Ecma48(b) => b.set_dimensions(width, height),
            Self::Multi(b) => b.set_dimensions(width, height),
        }
    }

    /// Push the screen to the target. Failures become `Event::Disconnect`.
    pub fn flush_screen(&mut self) {
        match self {
            Self::Headless(b) => b.flush_screen(),
            Self::Ecma48(b) => b.flush_screen(),
            Self::Multi(b) => b.flush_screen(),
        }
    }

    pub fn has_events(&mut self) -> bool {
        match self {
            Self::Headless(b) => b.has_events(),
            Self::Ecma48(b) => b.has_events(),
            Self::Multi(b) => b.has_events(),
        }
    }

    pub fn get_events(&mut self) -> Vec<Event> {
        match self {
            Self::Headless(b) => b.get_events(),
            Self::Ecma48(b) => b.get_events(),
            Self::Multi(b) => b.get_events(),
        }
    }

    /// Flush, restore terminal state, close the transport. Idempotent.
    pub fn shutdown(&mut self) {
        match self {
            Self::Headless(b) => b.shutdown(),
            Self::Ecma48(b) => b.shutdown(),
            Self::Multi(b) => b.shutdown(),
        }
    }

    /// Drop keyboard, mouse and paste input from now on.
    pub fn set_read_only(&mut self, read_only: bool) {
        match self {
            Self::Headless(b) => b.set_read_only(read_only),
            Self::Ecma48(b) => b.set_read_only(read_only),
            Self::Multi(b) => b.set_read_only(read_only),
        }
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        match self {
            Self::Headless(b) => b.is_read_only(),
            Self::Ecma48(b) => b.is_read_only(),
            Self::Multi(b) => b.is_read_only(),
        }
    }

    /// Whether the target last reported focus.
    #[must_use]
    pub fn has_focus(&self) -> bool {
        match self {
            Self::Headless(b) => b.has_focus(),
            Self::Ecma48(b) => b.has_focus(),
            Self::Multi(b) => b.has_focus(),
        }
    }

    pub fn set_clipboard(&mut self, clipboard: Box<dyn Clipboard>) {
        match self {
            Self::Headless(b) => b.set_clipboard(clipboard),
            Self::Ecma48(b) => b.set_clipboard(clipboard),
            Self::Multi(b) => b.set_clipboard(clipboard),
        }
    }

    /// Hand `text` to the clipboard collaborator, if one is installed.
    pub fn copy_clipboard_text(&mut self, text: &str) -> bool {
        match self {
            Self::Headless(b) => b.copy_clipboard_text(text),
            Self::Ecma48(b) => b.copy_clipboard_text(text),
            Self::Multi(b) => b.copy_clipboard_text(text),
        }
    }

    /// The RGB this target shows for `attrs`' foreground.
    #[must_use]
    pub fn attr_to_foreground_color(&self, attrs: CellAttributes) -> Rgb {
        match self {
            Self::Headless(b) => b.negotiated().foreground_rgb(attrs),
            Self::Ecma48(b) => b.negotiated().foreground_rgb(attrs),
            Self::Multi(b) => b.attr_to_foreground_color(attrs),
        }
    }

    /// The RGB this target shows for `attrs`' background.
    #[must_use]
    pub fn attr_to_background_color(&self, attrs: CellAttributes) -> Rgb {
        match self {
            Self::Headless(b) => b.negotiated().background_rgb(attrs),
            Self::Ecma48(b) => b.negotiated().background_rgb(attrs),
            Self::Multi(b) => b.attr_to_background_color(attrs),
        }
    }
}

impl From<HeadlessBackend> for Backend {
    fn from(b: HeadlessBackend) -> Self {
        Self::Headless(b)
    }
}

impl From<Ecma48Backend> for Backend {
    fn from(b: Ecma48Backend) -> Self {
        Self::Ecma48(Box::new(b))
    }
}

impl From<MultiBackend> for Backend {
    fn from(b: MultiBackend) -> Self {
        Self::Multi(Box::new(b))
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Headless(_) => "Headless",
            Self::Ecma48(_) => "Ecma48",
            Self::Multi(_) => "Multi",
        };
        write!(f, "Backend::{kind}({:?})", self.screen())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
