// SPDX-License-Identifier: MIT
#![allow(unsafe_code)]
//
// Background transport readers.
//
// A dedicated thread reads the transport and sends byte chunks through a
// channel. The backend drains the channel without blocking and feeds the
// input scanner, so rendering never waits on input.
//
// Two flavors:
//
//   - `spawn`: any `Read + Send` transport (a pty master, a socket, a
//     pipe). The thread blocks in `read`, so `stop` can only detach it;
//     it exits at its next read once the transport is closed.
//   - `spawn_stdin` (unix): polls stdin with a short timeout and checks
//     the stop flag between polls, so `stop` joins it promptly.
//
// End of stream and read errors are delivered as the last message.

use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

/// Bytes per read. A keypress is 1–6 bytes, a paste can be kilobytes.
const READ_BUF_SIZE: usize = 4096;

/// How often the stdin reader checks the stop flag (milliseconds).
#[cfg(unix)]
const POLL_TIMEOUT_MS: i32 = 50;

/// One message from a reader thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadChunk {
    /// A non-empty chunk of transport bytes.
    Data(Vec<u8>),
    /// The transport reached end of stream.
    Closed,
    /// The transport failed. No further messages follow.
    Failed(io::ErrorKind),
}

/// Handle to a reader thread. Dropping it stops the thread.
pub struct TransportReader {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    /// Whether the thread observes `stop` without a read returning.
    joinable: bool,
}

impl TransportReader {
    /// Read `source` on a background thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn<R>(name: &str, mut source: R) -> io::Result<(Self, Receiver<ReadChunk>)>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name(format!("{name}-reader"))
            .spawn(move || {
                let mut buf = [0u8; READ_BUF_SIZE];
                while !stop_flag.load(Ordering::Relaxed) {
                    match source.read(&mut buf) {
                        Ok(0) => {
                            let _ = tx.send(ReadChunk::Closed);
                            break;
                        }
                        Ok(n) => {
                            if tx.send(ReadChunk::Data(buf[..n].to_vec())).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => {
                            let _ = tx.send(ReadChunk::Failed(e.kind()));
                            break;
                        }
                    }
                }
            })?;

        Ok((
            Self {
                handle: Some(handle),
                stop,
                joinable: false,
            },
            rx,
        ))
    }

    /// Read this process's stdin on a background thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    #[cfg(unix)]
    pub fn spawn_stdin() -> io::Result<(Self, Receiver<ReadChunk>)> {
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || Self::stdin_loop(&tx, &stop_flag))?;

        Ok((
            Self {
                handle: Some(handle),
                stop,
                joinable: true,
            },
            rx,
        ))
    }

    #[cfg(unix)]
    fn stdin_loop(tx: &Sender<ReadChunk>, stop: &AtomicBool) {
        use std::os::unix::io::AsRawFd;

        let fd = io::stdin().as_raw_fd();
        let mut buf = [0u8; READ_BUF_SIZE];

        while !stop.load(Ordering::Relaxed) {
            let ready = unsafe {
                let mut pfd = libc::pollfd {
                    fd,
                    events: libc::POLLIN,
                    revents: 0,
                };
                libc::poll(&raw mut pfd, 1, POLL_TIMEOUT_MS)
            };
            if ready <= 0 {
                continue;
            }

            let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
            if n == 0 {
                let _ = tx.send(ReadChunk::Closed);
                break;
            }
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                warn!("stdin read failed: {}", err);
                let _ = tx.send(ReadChunk::Failed(err.kind()));
                break;
            }

            #[allow(clippy::cast_sign_loss)] // n > 0 checked above.
            let chunk = buf[..n as usize].to_vec();
            if tx.send(ReadChunk::Data(chunk)).is_err() {
                break;
            }
        }
    }

    /// Signal the thread to stop. Joins it when it can exit on its own;
    /// otherwise detaches it. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if self.joinable || handle.is_finished() {
                let _ = handle.join();
            } else {
                debug!("detaching blocked transport reader");
            }
        }
    }

    /// Whether the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for TransportReader {
    fn drop(&mut self) {
        self.stop();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
