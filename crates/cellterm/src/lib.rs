// SPDX-License-Identifier: MIT
//
// cellterm — a cell-grid renderer for ECMA-48 terminals.
//
// Applications draw styled Unicode cells into a `Screen`. A flush diffs
// the screen against what the target already shows and sends only the
// changed cells, with stateful SGR output that skips redundant escape
// codes. Image cells travel as sixel through `cellterm-sixel`.
//
// Targets are a closed set behind `Backend`:
//
//   Headless   records flushes into a mirror grid (tests, placeholders)
//   Ecma48     a terminal over any byte transport, stdio included
//   Multi      one primary screen replicated across several backends
//
// Input flows the other way: a reader thread delivers transport bytes,
// the `Parser` turns them into key, mouse, paste and focus events plus
// replies to capability queries, and the replies tune per-terminal
// rendering through `TerminalNegotiatedState`.
//
// Logging goes through `tracing`; the library never installs a
// subscriber.

pub mod ansi;
pub mod backend;
pub mod cell;
pub mod color;
pub mod config;
pub mod ecma48;
pub mod error;
pub mod grid;
pub mod headless;
pub mod input;
pub mod multi;
pub mod negotiated;
pub mod output;
pub mod reader;
pub mod screen;
pub mod session;
pub mod tty;

pub use backend::{Backend, Clipboard};
pub use cell::{Attr, Cell, CellAttributes, Glyph, Width};
pub use color::{Color, ColorSpec, Rgb};
pub use config::{ConfigError, SessionProperties};
pub use ecma48::Ecma48Backend;
pub use error::{Error, Result};
pub use grid::{ClipRect, Grid};
pub use headless::HeadlessBackend;
pub use input::{Event, KeyCode, KeyEvent, Modifiers, MouseButton, MouseEvent, MouseEventKind};
pub use multi::MultiBackend;
pub use negotiated::{Capabilities, TerminalNegotiatedState};
pub use screen::{BorderStyle, CellSink, FlushStats, Screen};
pub use session::SessionInfo;
