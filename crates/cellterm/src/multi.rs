// SPDX-License-Identifier: MIT
//
// One primary screen replicated across several backends.
//
// The application draws into the primary screen only. Each flush copies
// its logical grid, cursor and title into every target and flushes the
// target, so each one still diffs against what it already displays.
// Targets are flushed in order; a failing target reports its own
// `Event::Disconnect` and the others are unaffected.
//
// The first target is authoritative: its session, colors and resize
// events drive the primary. There is always at least one target.

use tracing::debug;

use crate::backend::{Backend, Clipboard};
use crate::cell::CellAttributes;
use crate::color::Rgb;
use crate::input::Event;
use crate::screen::Screen;
use crate::session::SessionInfo;

// ─── MultiBackend ────────────────────────────────────────────────────────────

pub struct MultiBackend {
    screen: Screen,
    targets: Vec<Backend>,
    abort_on_disconnect: bool,
}

impl MultiBackend {
    /// Fan out to `first`, sized like it. With `abort_on_disconnect`, every
    /// forwarded `Disconnect` is followed by `Event::Abort`.
    #[must_use]
    pub fn new(first: Backend, abort_on_disconnect: bool) -> Self {
        let (w, h) = (first.screen().width(), first.screen().height());
        Self {
            screen: Screen::new(w, h),
            targets: vec![first],
            abort_on_disconnect,
        }
    }

    /// Attach another target. It is resized to the primary, cleared and
    /// fully repainted on the next flush. Returns its index.
    pub fn add_backend(&mut self, mut backend: Backend) -> usize {
        reset_target(&mut backend, self.screen.width(), self.screen.height());
        self.targets.push(backend);
        debug!("multi: added target {}", self.targets.len() - 1);
        self.targets.len() - 1
    }

    /// Detach target `index`. The last remaining target can't be removed.
    pub fn remove_backend(&mut self, index: usize) -> Option<Backend> {
        if self.targets.len() <= 1 || index >= self.targets.len() {
            debug!("multi: refusing to remove target {}", index);
            return None;
        }
        Some(self.targets.remove(index))
    }

    #[inline]
    #[must_use]
    pub fn targets(&self) -> &[Backend] {
        &self.targets
    }

    pub fn target_mut(&mut self, index: usize) -> Option<&mut Backend> {
        self.targets.get_mut(index)
    }

    #[inline]
    #[must_use]
    pub const fn abort_on_disconnect(&self) -> bool {
        self.abort_on_disconnect
    }

    // ── Backend surface ──

    #[inline]
    #[must_use]
    pub const fn screen(&self) -> &Screen {
        &self.screen
    }

    #[inline]
    pub const fn screen_mut(&mut self) -> &mut Screen {
        &mut self.screen
    }

    #[must_use]
    pub fn session_info(&self) -> &SessionInfo {
        self.primary().session_info()
    }

    /// Resize the primary and every target. Targets are cleared and
    /// repainted even when already at that size.
    pub fn set_dimensions(&mut self, width: u16, height: u16) {
        self.screen.set_dimensions(width, height);
        let (w, h) = (self.screen.width(), self.screen.height());
        for target in &mut self.targets {
            reset_target(target, w, h);
        }
    }

    pub fn flush_screen(&mut self) {
        let (w, h) = (self.screen.width(), self.screen.height());
        let cursor = self.screen.cursor();
        let title = self.screen.title();

        for target in &mut self.targets {
            if target.screen().width() != w || target.screen().height() != h {
                target.set_dimensions(w, h);
            }
            let screen = target.screen_mut();
            screen.copy_logical_from(&self.screen);
            match cursor {
                Some((x, y)) => screen.put_cursor(true, x, y),
                None => screen.hide_cursor(),
            }
            if let Some(title) = title {
                screen.set_title(title);
            }
            target.flush_screen();
        }
    }

    pub fn has_events(&mut self) -> bool {
        self.targets.iter_mut().any(Backend::has_events)
    }

    /// Merge every target's events. A resize from the first target resizes
    /// the primary; resizes from the others are dropped since the primary
    /// overrides them on the next flush.
    pub fn get_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        let mut resize = None;

        for (index, target) in self.targets.iter_mut().enumerate() {
            for event in target.get_events() {
                match event {
                    Event::Resize { width, height } if index == 0 => {
                        resize = Some((width, height));
                        events.push(event);
                    }
                    Event::Resize { width, height } => {
                        debug!("multi: ignoring resize of target {} to {}x{}", index, width, height);
                    }
                    Event::Disconnect => {
                        debug!("multi: target {} disconnected", index);
                        events.push(Event::Disconnect);
                        if self.abort_on_disconnect {
                            events.push(Event::Abort);
                        }
                    }
                    other => events.push(other),
                }
            }
        }

        if let Some((width, height)) = resize {
            self.set_dimensions(width, height);
        }
        events
    }

    pub fn shutdown(&mut self) {
        for target in &mut self.targets {
            target.shutdown();
        }
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        for target in &mut self.targets {
            target.set_read_only(read_only);
        }
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.primary().is_read_only()
    }

    /// Whether any target has focus.
    #[must_use]
    pub fn has_focus(&self) -> bool {
        self.targets.iter().any(Backend::has_focus)
    }

    /// The clipboard is the first target's.
    pub fn set_clipboard(&mut self, clipboard: Box<dyn Clipboard>) {
        self.primary_mut().set_clipboard(clipboard);
    }

    pub fn copy_clipboard_text(&mut self, text: &str) -> bool {
        self.primary_mut().copy_clipboard_text(text)
    }

    #[must_use]
    pub fn attr_to_foreground_color(&self, attrs: CellAttributes) -> Rgb {
        self.primary().attr_to_foreground_color(attrs)
    }

    #[must_use]
    pub fn attr_to_background_color(&self, attrs: CellAttributes) -> Rgb {
        self.primary().attr_to_background_color(attrs)
    }

    #[allow(clippy::indexing_slicing)] // `targets` is never empty.
    fn primary(&self) -> &Backend {
        &self.targets[0]
    }

    #[allow(clippy::indexing_slicing)] // `targets` is never empty.
    fn primary_mut(&mut self) -> &mut Backend {
        &mut self.targets[0]
    }
}

fn reset_target(target: &mut Backend, width: u16, height: u16) {
    target.set_dimensions(width, height);
    let screen = target.screen_mut();
    screen.clear();
    screen.clear_physical();
}

impl std::fmt::Debug for MultiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MultiBackend({:?}, {} targets)", self.screen, self.targets.len())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
