// SPDX-License-Identifier: MIT
//
// A terminal reached through a byte transport.
//
// Output: each flush diffs the screen through a `CellWriter` and writes the
// resulting bytes to the transport in one call. Out-of-frame sequences
// (mode switches, capability queries, palette corrections, the title) go
// through the same buffer.
//
// Input: a `TransportReader` thread delivers byte chunks over a channel.
// `get_events` drains it without blocking, feeds the `Parser`, queues the
// events and applies the replies to `TerminalNegotiatedState`. A palette
// correction is written immediately; the repaint it needs happens on the
// next flush.
//
// Any transport failure, read or write, becomes one `Event::Disconnect`
// and the backend stops talking to the transport. `shutdown` restores the
// palette, leaves the modes it entered and closes everything. Idempotent;
// `Drop` calls it.

use std::io::{self, Read, Write};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Instant;

use cellterm_sixel::SixelEncoder;
use tracing::{debug, info, trace, warn};

use crate::ansi::{self, MouseMode};
use crate::backend::{BackendCore, Clipboard};
use crate::config::SessionProperties;
use crate::input::{ESCAPE_TIMEOUT, Event, Input, Parser, Reply};
use crate::negotiated::{Capabilities, PaletteRestore, TerminalNegotiatedState, WASHOUT_INDEX};
use crate::output::{CellWriter, RenderContext};
use crate::reader::{ReadChunk, TransportReader};
use crate::screen::Screen;
use crate::session::SessionInfo;
use crate::tty::{self, RawMode};

type Transport = Box<dyn Write + Send>;

// ─── Ecma48Backend ───────────────────────────────────────────────────────────

pub struct Ecma48Backend {
    core: BackendCore,
    writer: CellWriter,
    transport: Option<Transport>,
    reader: Option<TransportReader>,
    input: Option<Receiver<ReadChunk>>,
    parser: Parser,
    negotiated: TerminalNegotiatedState,
    props: SessionProperties,
    raw: Option<RawMode>,
    /// SIGWINCH is only meaningful for the controlling terminal.
    watch_resize: bool,
    /// When the parser started holding an incomplete sequence.
    pending_since: Option<Instant>,
    title_sent: Option<String>,
    cursor_sent: Option<Option<(u16, u16)>>,
    cursor_report: Option<(u16, u16)>,
    started: bool,
    shut_down: bool,
}

impl Ecma48Backend {
    /// A backend writing to `transport`. Nothing is sent until [`start`].
    ///
    /// [`start`]: Self::start
    #[must_use]
    pub fn new(transport: Transport, width: u16, height: u16, props: SessionProperties) -> Self {
        let mut encoder = SixelEncoder::new(props.encoder_options());
        encoder.set_shared_palette(props.shared_palette);

        Self {
            core: BackendCore::new(width, height, SessionInfo::default()),
            writer: CellWriter::new(encoder),
            transport: Some(transport),
            reader: None,
            input: None,
            parser: Parser::new(),
            negotiated: TerminalNegotiatedState::new(
                Capabilities::empty(),
                props.washout_correction,
            ),
            props,
            raw: None,
            watch_resize: false,
            pending_since: None,
            title_sent: None,
            cursor_sent: None,
            cursor_report: None,
            started: false,
            shut_down: false,
        }
    }

    /// Replace the session description. Its size is taken from the screen.
    #[must_use]
    pub fn with_session(mut self, mut session: SessionInfo) -> Self {
        session.set_size(self.core.screen.width(), self.core.screen.height());
        self.core.session = session;
        self
    }

    /// Assume `caps` before any reply arrives.
    #[must_use]
    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.negotiated.insert_capabilities(caps);
        self
    }

    /// Read terminal input from `source` on a background thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader thread cannot be spawned.
    pub fn with_input<R>(mut self, name: &str, source: R) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (reader, rx) = TransportReader::spawn(name, source)?;
        self.reader = Some(reader);
        self.input = Some(rx);
        Ok(self)
    }

    /// The controlling terminal: raw stdin, stdout, SIGWINCH resizes and
    /// environment capability hints. Already started.
    ///
    /// # Errors
    ///
    /// Returns an error if raw mode can't be entered or the stdin reader
    /// can't be spawned.
    #[cfg(unix)]
    pub fn stdio(props: SessionProperties) -> crate::Result<Self> {
        let raw = RawMode::enable()?;
        let size = tty::get_size().unwrap_or(tty::Size::FALLBACK);

        let mut backend = Self::new(Box::new(io::stdout()), size.cols, size.rows, props)
            .with_session(SessionInfo::from_env())
            .with_capabilities(Capabilities::detect());

        let (reader, rx) = TransportReader::spawn_stdin()?;
        backend.reader = Some(reader);
        backend.input = Some(rx);
        backend.raw = Some(raw);

        tty::install_resize_handler();
        backend.watch_resize = true;

        info!("stdio backend {}x{}", size.cols, size.rows);
        backend.start();
        Ok(backend)
    }

    /// Enter the alternate screen, enable mouse, paste and focus reports
    /// and send the capability queries. Idempotent.
    pub fn start(&mut self) {
        if self.started || self.transport.is_none() {
            return;
        }
        self.started = true;

        let out = self.writer.output();
        ansi::enter_alt_screen(out).ok();
        ansi::cursor_hide(out).ok();
        ansi::clear_screen(out).ok();
        ansi::enable_mouse(out, MouseMode::Drag).ok();
        ansi::enable_bracketed_paste(out).ok();
        ansi::enable_focus_reporting(out).ok();

        // Queries. DA1 goes last: every terminal answers it, so its reply
        // marks the end of the others.
        ansi::query_default_foreground(out).ok();
        ansi::query_default_background(out).ok();
        ansi::query_palette(out, WASHOUT_INDEX).ok();
        ansi::request_mode(out, ansi::SYNC_OUTPUT_MODE).ok();
        ansi::query_cell_pixels(out).ok();
        ansi::query_window_pixels(out).ok();
        ansi::query_pointer_shape(out).ok();
        ansi::primary_device_attributes(out).ok();

        self.core.screen.clear_physical();
        self.write_out();
        debug!(
            "ECMA-48 backend started at {}x{}",
            self.core.screen.width(),
            self.core.screen.height()
        );
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

    #[inline]
    #[must_use]
    pub const fn properties(&self) -> &SessionProperties {
        &self.props
    }

    pub fn set_dimensions(&mut self, width: u16, height: u16) {
        self.core.set_dimensions(width, height);
    }

    /// Send what changed since the last flush. Never fails; a transport
    /// error becomes `Event::Disconnect`.
    pub fn flush_screen(&mut self) {
        if self.transport.is_none() {
            return;
        }
        self.poll_input();
        if self.transport.is_none() {
            return;
        }

        self.writer
            .set_context(RenderContext::new(&self.negotiated, &self.props));

        let title = self.core.screen.title();
        if title != self.title_sent.as_deref() {
            if let Some(title) = title {
                ansi::set_title(self.writer.output(), title).ok();
            }
            self.title_sent = title.map(str::to_owned);
        }

        let cursor = self.core.screen.cursor();
        if self.core.screen.is_dirty() || self.cursor_sent != Some(cursor) {
            let stats = self.core.screen.flush_physical(&mut self.writer);
            trace!(
                "flush: {} rendered, {} skipped, full={}",
                stats.cells_rendered, stats.cells_skipped, stats.full_repaint
            );
            self.cursor_sent = Some(cursor);
        }

        self.write_out();
    }

    pub fn has_events(&mut self) -> bool {
        self.poll_input();
        !self.core.events.is_empty()
    }

    pub fn get_events(&mut self) -> Vec<Event> {
        self.poll_input();
        self.core.take_events()
    }

    /// Flush, restore the palette, leave every mode `start` entered, drop
    /// raw mode and close the transport. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.flush_screen();

        let restore = self.negotiated.take_restore();
        if self.transport.is_some() {
            let out = self.writer.output();
            match restore {
                Some(PaletteRestore::Set(index, color)) => {
                    ansi::set_palette(out, index, color).ok();
                }
                Some(PaletteRestore::Reset(index)) => {
                    ansi::reset_palette(out, index).ok();
                }
                None => {}
            }
            if self.started {
                ansi::disable_focus_reporting(out).ok();
                ansi::disable_bracketed_paste(out).ok();
                ansi::disable_mouse(out).ok();
                ansi::reset(out).ok();
                ansi::cursor_show(out).ok();
                ansi::exit_alt_screen(out).ok();
            }
            self.write_out();
        }

        if let Some(raw) = self.raw.as_mut() {
            if let Err(e) = raw.disable() {
                warn!("failed to restore terminal mode: {}", e);
            }
        }
        if let Some(reader) = self.reader.as_mut() {
            reader.stop();
        }
        self.transport = None;
        self.input = None;
        info!("ECMA-48 backend shut down");
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

    // ── Input ──

    /// Feed bytes read by the host instead of a reader thread.
    pub fn feed(&mut self, bytes: &[u8]) {
        let inputs = self.parser.advance(bytes);
        self.handle_inputs(inputs);
        self.track_pending();
    }

    /// Send DSR 6. The answer shows up in [`reported_cursor`].
    ///
    /// [`reported_cursor`]: Self::reported_cursor
    pub fn request_cursor_position(&mut self) {
        if self.transport.is_none() {
            return;
        }
        ansi::request_cursor_position(self.writer.output()).ok();
        self.parser.expect_cursor_report();
        self.write_out();
    }

    /// The last cursor position report, 0-indexed.
    #[must_use]
    pub const fn reported_cursor(&self) -> Option<(u16, u16)> {
        self.cursor_report
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    fn poll_input(&mut self) {
        if self.watch_resize && tty::take_resize() {
            self.resize_from_tty();
        }

        let mut chunks = Vec::new();
        let mut lost = None;
        if let Some(rx) = &self.input {
            loop {
                match rx.try_recv() {
                    Ok(ReadChunk::Data(bytes)) => chunks.push(bytes),
                    Ok(ReadChunk::Closed) => {
                        lost = Some("transport closed".to_owned());
                        break;
                    }
                    Ok(ReadChunk::Failed(kind)) => {
                        lost = Some(format!("transport read failed: {kind}"));
                        break;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        lost = Some("transport reader exited".to_owned());
                        break;
                    }
                }
            }
        }

        for bytes in chunks {
            let inputs = self.parser.advance(&bytes);
            self.handle_inputs(inputs);
        }
        self.track_pending();

        if let Some(why) = lost {
            self.input = None;
            self.disconnect(&why);
        }
    }

    /// Resolve a lone ESC (or other stalled prefix) once it has waited
    /// `ESCAPE_TIMEOUT`.
    fn track_pending(&mut self) {
        if !self.parser.has_pending() {
            self.pending_since = None;
            return;
        }
        match self.pending_since {
            None => self.pending_since = Some(Instant::now()),
            Some(since) if since.elapsed() >= ESCAPE_TIMEOUT => {
                self.pending_since = None;
                let inputs = self.parser.flush();
                self.handle_inputs(inputs);
            }
            Some(_) => {}
        }
    }

    fn handle_inputs(&mut self, inputs: Vec<Input>) {
        for input in inputs {
            match input {
                Input::Event(event) => self.core.push_event(event),
                Input::Reply(reply) => self.apply_reply(&reply),
            }
        }
    }

    fn apply_reply(&mut self, reply: &Reply) {
        if let Reply::CursorPosition { x, y } = *reply {
            self.cursor_report = Some((x, y));
        }
        let effect = self.negotiated.apply(reply);
        if let Some((index, color)) = effect.correction {
            if self.transport.is_some() {
                ansi::set_palette(self.writer.output(), index, color).ok();
                self.write_out();
            }
        }
        if effect.repaint {
            self.core.screen.force_repaint();
        }
    }

    #[cfg(unix)]
    fn resize_from_tty(&mut self) {
        let Some(size) = tty::get_size() else {
            return;
        };
        if (size.cols, size.rows) == (self.core.screen.width(), self.core.screen.height()) {
            return;
        }
        debug!("terminal resized to {}x{}", size.cols, size.rows);
        self.set_dimensions(size.cols, size.rows);
        self.core.push_event(Event::Resize {
            width: size.cols,
            height: size.rows,
        });
    }

    #[cfg(not(unix))]
    const fn resize_from_tty(&mut self) {}

    // ── Transport ──

    /// Write pending bytes. A failure disconnects.
    fn write_out(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        let result = self
            .writer
            .flush_to(transport.as_mut())
            .and_then(|()| transport.flush());
        if let Err(e) = result {
            self.disconnect(&format!("transport write failed: {e}"));
        }
    }

    fn disconnect(&mut self, why: &str) {
        if self.transport.is_none() {
            return;
        }
        warn!("{}, disconnecting", why);
        self.transport = None;
        self.writer.output().clear();
        if let Some(reader) = self.reader.as_mut() {
            reader.stop();
        }
        self.core.push_event(Event::Disconnect);
    }
}

impl Drop for Ecma48Backend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Ecma48Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Ecma48Backend({:?}, connected={})",
            self.core.screen,
            self.transport.is_some()
        )
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellAttributes;
    use crate::color::{ColorSpec, Rgb};
    use crate::input::{KeyCode, KeyEvent, Modifiers};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Shared {
        fn take(&self) -> String {
            let bytes = std::mem::take(&mut *self.0.lock().unwrap());
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn backend(w: u16, h: u16) -> (Ecma48Backend, Shared) {
        backend_with(w, h, SessionProperties::default())
    }

    fn backend_with(w: u16, h: u16, props: SessionProperties) -> (Ecma48Backend, Shared) {
        let out = Shared::default();
        let b = Ecma48Backend::new(Box::new(out.clone()), w, h, props);
        (b, out)
    }

    #[test]
    fn start_enters_modes_and_queries() {
        let (mut b, out) = backend(4, 2);
        b.start();
        let sent = out.take();
        assert!(sent.starts_with("\x1b[?1049h"));
        assert!(sent.contains("\x1b[?2004h"));
        assert!(sent.contains("\x1b]4;7;?\x1b\\"));
        assert!(sent.contains("\x1b[?2026$p"));
        assert!(sent.ends_with("\x1b[c"));

        b.start();
        assert_eq!(out.take(), "");
    }

    #[test]
    fn flush_sends_only_changes() {
        let (mut b, out) = backend(4, 2);
        b.screen_mut()
            .put_string_xy(0, 0, "ab", CellAttributes::DEFAULT);
        b.flush_screen();
        let first = out.take();
        assert!(first.contains("ab"));

        b.flush_screen();
        assert_eq!(out.take(), "");

        b.screen_mut().put_char_xy(1, 0, 'z', CellAttributes::DEFAULT);
        b.flush_screen();
        let second = out.take();
        assert!(second.contains('z'));
        assert!(!second.contains('a'));
    }

    #[test]
    fn cursor_move_alone_is_flushed() {
        let (mut b, out) = backend(4, 2);
        b.flush_screen();
        out.take();
        b.screen_mut().put_cursor(true, 2, 1);
        b.flush_screen();
        let sent = out.take();
        assert!(sent.contains("\x1b[2;3H"));
        assert!(sent.contains("\x1b[?25h"));
    }

    #[test]
    fn title_is_sent_once() {
        let (mut b, out) = backend(2, 1);
        b.screen_mut().set_title("one");
        b.flush_screen();
        assert!(out.take().contains("\x1b]2;one\x07"));
        b.flush_screen();
        assert!(!out.take().contains("\x1b]2;"));
    }

    #[test]
    fn rgb_downgrades_without_truecolor() {
        let props = SessionProperties::from_pairs([("truecolor", "off")]).unwrap();
        let (mut b, out) = backend_with(1, 1, props);
        let attrs = CellAttributes::DEFAULT.with_fg(ColorSpec::Rgb(Rgb::new(0xFF, 0x55, 0x55)));
        b.screen_mut().put_char_xy(0, 0, 'x', attrs);
        b.flush_screen();
        let sent = out.take();
        assert!(!sent.contains("38;2;"));
        assert!(sent.contains("\x1b[91m"));
    }

    #[test]
    fn fed_keys_become_events() {
        let (mut b, _out) = backend(4, 2);
        b.feed(b"q\x1b[A");
        assert_eq!(
            b.get_events(),
            vec![
                Event::Key(KeyEvent {
                    code: KeyCode::Char('q'),
                    modifiers: Modifiers::empty(),
                }),
                Event::Key(KeyEvent {
                    code: KeyCode::Up,
                    modifiers: Modifiers::empty(),
                }),
            ]
        );
    }

    #[test]
    fn lone_escape_resolves_after_timeout() {
        let (mut b, _out) = backend(4, 2);
        b.feed(b"\x1b");
        assert!(!b.has_events());
        std::thread::sleep(ESCAPE_TIMEOUT + Duration::from_millis(20));
        assert_eq!(
            b.get_events(),
            vec![Event::Key(KeyEvent {
                code: KeyCode::Escape,
                modifiers: Modifiers::empty(),
            })]
        );
    }

    #[test]
    fn washout_correction_and_restore() {
        let (mut b, out) = backend(2, 1);
        b.flush_screen();
        out.take();

        b.feed(b"\x1b]4;7;rgb:ffff/ffff/ffff\x1b\\");
        assert!(out.take().contains("\x1b]4;7;rgb:a8/a8/a8\x1b\\"));
        assert!(b.negotiated().is_washout_corrected());

        // The corrected entry echoed back must not trigger again.
        b.feed(b"\x1b]4;7;rgb:a8a8/a8a8/a8a8\x1b\\");
        assert!(!out.take().contains("\x1b]4;7;"));

        b.shutdown();
        assert!(out.take().contains("\x1b]4;7;rgb:ff/ff/ff\x1b\\"));
        assert!(!b.negotiated().is_washout_corrected());
    }

    #[test]
    fn washout_disabled_by_property() {
        let props = SessionProperties::from_pairs([("washout-correction", "off")]).unwrap();
        let (mut b, out) = backend_with(2, 1, props);
        b.feed(b"\x1b]4;7;rgb:ff/ff/ff\x07");
        assert!(!out.take().contains("\x1b]4;7;"));
    }

    #[test]
    fn capability_replies_are_recorded() {
        let (mut b, _out) = backend(2, 1);
        b.feed(b"\x1b[?2026;2$y\x1b[?62;4;22c");
        assert!(b.negotiated().has(Capabilities::SYNC_OUTPUT | Capabilities::SIXEL));
        assert!(!b.has_events());
    }

    #[test]
    fn cursor_report_only_when_requested() {
        let (mut b, out) = backend(2, 1);
        b.request_cursor_position();
        assert!(out.take().contains("\x1b[6n"));
        b.feed(b"\x1b[3;7R");
        assert_eq!(b.reported_cursor(), Some((6, 2)));
        assert!(!b.has_events());
    }

    #[test]
    fn write_failure_disconnects_once() {
        let mut b = Ecma48Backend::new(Box::new(Broken), 2, 1, SessionProperties::default());
        b.flush_screen();
        b.flush_screen();
        assert!(!b.is_connected());
        assert_eq!(b.get_events(), vec![Event::Disconnect]);
    }

    #[test]
    fn closed_input_disconnects() {
        let (b, _out) = backend(2, 1);
        let mut b = b.with_input("test", Cursor::new(b"x".to_vec())).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while Instant::now() < deadline && !events.contains(&Event::Disconnect) {
            events.extend(b.get_events());
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(
            events,
            vec![
                Event::Key(KeyEvent {
                    code: KeyCode::Char('x'),
                    modifiers: Modifiers::empty(),
                }),
                Event::Disconnect,
            ]
        );
    }

    #[test]
    fn shutdown_leaves_modes_once() {
        let (mut b, out) = backend(2, 1);
        b.start();
        out.take();
        b.shutdown();
        let sent = out.take();
        assert!(sent.contains("\x1b[?2004l"));
        assert!(sent.ends_with("\x1b[?1049l"));
        b.shutdown();
        drop(b);
        assert_eq!(out.take(), "");
    }
}
