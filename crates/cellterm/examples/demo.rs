// SPDX-License-Identifier: MIT
//
// Interactive demo on the controlling terminal: a box, some styled text,
// a row of sixel image cells and the last input event. `q` or Escape
// quits. Logs go to stderr; run with `RUST_LOG=cellterm=debug 2>log`.

use std::sync::Arc;
use std::time::Duration;

use cellterm::cell::Cell;
use cellterm::screen::BorderStyle;
use cellterm::{Attr, Backend, CellAttributes, Color, ColorSpec, Ecma48Backend, Event, KeyCode};
use cellterm_sixel::{Raster, Rgba};
use tracing_subscriber::EnvFilter;

const FRAME: Duration = Duration::from_millis(16);

fn draw(backend: &mut Backend, last: &str) {
    let width = backend.screen().width().clamp(20, 60);
    let title = CellAttributes::DEFAULT
        .with_fg(ColorSpec::Indexed(Color::Yellow))
        .with_flags(Attr::BOLD);
    let frame = CellAttributes::DEFAULT.with_fg(ColorSpec::Indexed(Color::Cyan));

    let screen = backend.screen_mut();
    screen.clear();
    screen.set_title("cellterm demo");
    screen.draw_box(1, 1, i32::from(width) - 2, 10, frame, CellAttributes::DEFAULT, BorderStyle::Rounded, true);
    screen.put_string_xy(3, 2, "cellterm", title);
    screen.put_string_xy(3, 3, "wide: 漢字 and emoji: 🦀", CellAttributes::DEFAULT);
    screen.put_string_xy(3, 5, &format!("last event: {last}"), CellAttributes::DEFAULT);

    for i in 0..8u8 {
        let tile = Raster::filled(10, 20, Rgba::new(i * 32, 96, 255 - i * 32, 255));
        screen.put_cell_xy(3 + i32::from(i), 7, Cell::image(Arc::new(tile), CellAttributes::DEFAULT));
    }
    screen.put_cursor(false, 0, 0);
}

#[cfg(unix)]
fn main() -> cellterm::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let props = cellterm::SessionProperties::from_pairs(
        std::env::args().skip(1).filter_map(|arg| {
            let (k, v) = arg.split_once('=')?;
            Some((k.to_owned(), v.to_owned()))
        }),
    )?;
    let mut backend = Backend::from(Ecma48Backend::stdio(props)?);
    let mut last = String::from("none");
    draw(&mut backend, &last);

    'main: loop {
        for event in backend.get_events() {
            match event {
                Event::Key(key) if matches!(key.code, KeyCode::Char('q') | KeyCode::Escape) => {
                    break 'main;
                }
                Event::Disconnect | Event::Abort => break 'main,
                other => last = format!("{other:?}"),
            }
            draw(&mut backend, &last);
        }
        backend.flush_screen();
        std::thread::sleep(FRAME);
    }

    backend.shutdown();
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("the demo needs a unix terminal");
}
