// SPDX-License-Identifier: MIT
//
// Local terminal plumbing for the stdio backend: raw mode, window size,
// resize signals and panic-safe restore.
//
// Safety: termios (tcgetattr, tcsetattr), ioctl (TIOCGWINSZ), isatty,
// sigaction and raw fd writes have no safe std equivalent. Each unsafe
// block is one call.
#![allow(unsafe_code)]
//
// Only the controlling terminal needs any of this. Backends on other
// transports (a pty master, a socket) get their size from the host and
// never touch termios.
//
// The panic hook writes a prebuilt restore sequence straight to fd 1,
// bypassing the stdout lock in case the panic happened while it was held,
// then restores termios and hands over to the previous hook.

use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(unix)]
use std::sync::Mutex;

use std::io;
#[cfg(not(unix))]
use std::io::Write;

use tracing::debug;

// ─── Size ────────────────────────────────────────────────────────────────────

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub cols: u16,
    pub rows: u16,
}

impl Size {
    pub const FALLBACK: Self = Self { cols: 80, rows: 24 };
}

/// Query the size of the terminal on stdout via `ioctl(TIOCGWINSZ)`.
///
/// Returns `None` if stdout is not a terminal or the query fails.
#[cfg(unix)]
#[must_use]
pub fn get_size() -> Option<Size> {
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };

    if result == 0 && ws.ws_col > 0 && ws.ws_row > 0 {
        Some(Size {
            cols: ws.ws_col,
            rows: ws.ws_row,
        })
    } else {
        None
    }
}

#[cfg(not(unix))]
#[must_use]
pub fn get_size() -> Option<Size> {
    None
}

/// Whether stdin is a terminal.
#[cfg(unix)]
#[must_use]
pub fn is_tty() -> bool {
    unsafe { libc::isatty(libc::STDIN_FILENO) != 0 }
}

#[cfg(not(unix))]
#[must_use]
pub fn is_tty() -> bool {
    false
}

// ─── SIGWINCH ────────────────────────────────────────────────────────────────

static RESIZE_PENDING: AtomicBool = AtomicBool::new(false);
static SIGWINCH_INSTALLED: Once = Once::new();

/// Install a SIGWINCH handler that records pending resizes. Once per process.
pub fn install_resize_handler() {
    SIGWINCH_INSTALLED.call_once(|| {
        #[cfg(unix)]
        unsafe {
            let mut sa: libc::sigaction = std::mem::zeroed();
            sa.sa_sigaction = sigwinch_handler as *const () as usize;
            sa.sa_flags = libc::SA_RESTART;
            libc::sigemptyset(&raw mut sa.sa_mask);
            libc::sigaction(libc::SIGWINCH, &raw const sa, std::ptr::null_mut());
        }
        debug!("resize handler installed");
    });
}

#[cfg(unix)]
extern "C" fn sigwinch_handler(_sig: libc::c_int) {
    RESIZE_PENDING.store(true, Ordering::Relaxed);
}

/// Whether a resize arrived since the last call. Clears the flag.
#[must_use]
pub fn take_resize() -> bool {
    RESIZE_PENDING.swap(false, Ordering::Relaxed)
}

// ─── Panic-Safe Restore ──────────────────────────────────────────────────────

/// Original termios for the panic hook, which can't reach the guard.
#[cfg(unix)]
static TERMIOS_BACKUP: Mutex<Option<libc::termios>> = Mutex::new(None);

#[cfg(unix)]
fn restore_termios_from_backup() {
    if let Ok(guard) = TERMIOS_BACKUP.lock() {
        if let Some(ref original) = *guard {
            unsafe {
                let _ = libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, original);
            }
        }
    }
}

/// End synchronized output, disable mouse, paste and focus reports, reset
/// SGR, show the cursor, leave the alternate screen. Alternate screen exit
/// comes last so the shell's content reappears clean.
#[rustfmt::skip]
pub const EMERGENCY_RESTORE: &[u8] = b"\
    \x1b[?2026l\
    \x1b[?1006l\x1b[?1003l\x1b[?1002l\x1b[?1000l\
    \x1b[?2004l\
    \x1b[?1004l\
    \x1b[0m\
    \x1b[?25h\
    \x1b[?1049l";

static PANIC_HOOK_INSTALLED: Once = Once::new();

/// Restore the terminal before the panic message prints. Once per process.
pub fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let original = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            emergency_restore();

            #[cfg(unix)]
            restore_termios_from_backup();

            original(info);
        }));
    });
}

fn emergency_restore() {
    #[cfg(unix)]
    unsafe {
        let _ = libc::write(
            libc::STDOUT_FILENO,
            EMERGENCY_RESTORE.as_ptr().cast::<libc::c_void>(),
            EMERGENCY_RESTORE.len(),
        );
    }

    #[cfg(not(unix))]
    {
        let _ = io::stdout().write_all(EMERGENCY_RESTORE);
        let _ = io::stdout().flush();
    }
}

// ─── RawMode ─────────────────────────────────────────────────────────────────

/// Raw mode on stdin for as long as the guard lives.
///
/// A no-op when stdin is not a terminal.
pub struct RawMode {
    #[cfg(unix)]
    original: Option<libc::termios>,
}

impl RawMode {
    /// Put stdin into raw mode.
    ///
    /// # Errors
    ///
    /// Returns the OS error if termios can't be read or written.
    #[cfg(unix)]
    pub fn enable() -> io::Result<Self> {
        install_panic_hook();

        if !is_tty() {
            return Ok(Self { original: None });
        }

        let fd = libc::STDIN_FILENO;
        unsafe {
            let mut termios: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &raw mut termios) != 0 {
                return Err(io::Error::last_os_error());
            }
            let original = termios;

            if let Ok(mut guard) = TERMIOS_BACKUP.lock() {
                *guard = Some(original);
            }

            // cfmakeraw equivalent.
            termios.c_iflag &= !(libc::IGNBRK
                | libc::BRKINT
                | libc::PARMRK
                | libc::ISTRIP
                | libc::INLCR
                | libc::IGNCR
                | libc::ICRNL
                | libc::IXON);
            termios.c_oflag &= !libc::OPOST;
            termios.c_lflag &=
                !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
            termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
            termios.c_cflag |= libc::CS8;
            termios.c_cc[libc::VMIN] = 1;
            termios.c_cc[libc::VTIME] = 0;

            if libc::tcsetattr(fd, libc::TCSAFLUSH, &raw const termios) != 0 {
                return Err(io::Error::last_os_error());
            }

            debug!("raw mode enabled");
            Ok(Self {
                original: Some(original),
            })
        }
    }

    /// # Errors
    ///
    /// Never fails on this platform.
    #[cfg(not(unix))]
    pub fn enable() -> io::Result<Self> {
        install_panic_hook();
        Ok(Self {})
    }

    /// Whether termios was actually changed.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        #[cfg(unix)]
        {
            self.original.is_some()
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    /// Restore the saved termios. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the OS error if termios can't be written.
    pub fn disable(&mut self) -> io::Result<()> {
        #[cfg(unix)]
        if let Some(original) = self.original.take() {
            unsafe {
                if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSAFLUSH, &raw const original) != 0 {
                    return Err(io::Error::last_os_error());
                }
            }
            if let Ok(mut guard) = TERMIOS_BACKUP.lock() {
                *guard = None;
            }
            debug!("raw mode disabled");
        }
        Ok(())
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = self.disable();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_size_does_not_panic() {
        if let Some(size) = get_size() {
            assert!(size.cols > 0 && size.rows > 0);
        }
    }

    #[test]
    fn emergency_restore_ends_with_alt_screen_exit() {
        assert!(EMERGENCY_RESTORE.ends_with(b"\x1b[?1049l"));
        assert!(EMERGENCY_RESTORE.starts_with(b"\x1b[?2026l"));
        let text = std::str::from_utf8(EMERGENCY_RESTORE).unwrap();
        assert!(!text.contains(' '));
    }

    #[test]
    fn raw_mode_guard_round_trips() {
        let mut raw = RawMode::enable().unwrap();
        raw.disable().unwrap();
        raw.disable().unwrap();
        assert!(!raw.is_active());
    }

    #[test]
    fn resize_flag_is_taken_once() {
        install_resize_handler();
        RESIZE_PENDING.store(true, Ordering::Relaxed);
        assert!(take_resize());
        assert!(!take_resize());
    }
}
