//! Host-side tty primitives feeding the decoder.
//!
//! The decoder core never blocks and never owns a descriptor; this module
//! supplies the three host pieces it expects:
//!
//! - [`TtyInput`] — a non-blocking byte source plus a bounded readiness
//!   wait (`poll(2)`).
//! - [`RawModeGuard`] — RAII raw-mode enter with restore on drop.
//! - [`pump_once`] — one cooperative event-loop turn: wait, read, feed,
//!   decode, dispatch.

use std::fs::File;
use std::io;
use std::os::fd::AsFd;
use std::time::Duration;

use termloom_core::decoder::InputDecoder;
use termloom_core::dispatch::{EventHandler, dispatch};

/// Read chunk size per pump turn.
const READ_CHUNK: usize = 1024;

/// A non-blocking input descriptor with a bounded readiness wait.
#[derive(Debug)]
pub struct TtyInput {
    file: File,
}

impl TtyInput {
    /// Open the controlling terminal.
    pub fn open() -> io::Result<Self> {
        Self::from_file(File::open("/dev/tty")?)
    }

    /// Wrap an already-open descriptor, switching it to non-blocking mode.
    pub fn from_file(file: File) -> io::Result<Self> {
        let flags = rustix::fs::fcntl_getfl(&file)?;
        rustix::fs::fcntl_setfl(&file, flags | rustix::fs::OFlags::NONBLOCK)?;
        Ok(Self { file })
    }

    /// Wait up to `timeout` for readable data. An interrupted wait reads as
    /// not-ready; the caller's loop comes back around.
    pub fn wait_ready(&self, timeout: Duration) -> io::Result<bool> {
        let mut fds = [nix::poll::PollFd::new(
            self.file.as_fd(),
            nix::poll::PollFlags::POLLIN,
        )];
        let timeout_ms: u16 = timeout.as_millis().try_into().unwrap_or(u16::MAX);
        match nix::poll::poll(&mut fds, nix::poll::PollTimeout::from(timeout_ms)) {
            Ok(n) => Ok(n > 0),
            Err(nix::errno::Errno::EINTR) => Ok(false),
            Err(err) => Err(io::Error::other(err)),
        }
    }

    /// Read whatever is available right now; returns 0 when nothing is.
    pub fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match rustix::io::read(&self.file, buf) {
            Ok(n) => Ok(n),
            Err(rustix::io::Errno::AGAIN | rustix::io::Errno::INTR) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}

/// RAII raw-mode guard for the controlling terminal.
///
/// Entering raw mode records the original termios settings; dropping the
/// guard restores them best-effort (a failed restore during teardown has
/// nowhere to report to).
#[derive(Debug)]
pub struct RawModeGuard {
    tty: File,
    original: rustix::termios::Termios,
}

impl RawModeGuard {
    pub fn enter() -> io::Result<Self> {
        let tty = File::options().read(true).write(true).open("/dev/tty")?;
        let original = rustix::termios::tcgetattr(&tty)?;
        let mut raw = original.clone();
        raw.make_raw();
        rustix::termios::tcsetattr(&tty, rustix::termios::OptionalActions::Flush, &raw)?;
        Ok(Self { tty, original })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = rustix::termios::tcsetattr(
            &self.tty,
            rustix::termios::OptionalActions::Flush,
            &self.original,
        );
    }
}

/// One cooperative event-loop turn.
///
/// Waits up to `timeout` for input, feeds whatever arrived into `decoder`,
/// dispatches every decoded event, and resolves a pending Escape whose
/// ambiguity window has closed. Never blocks past `timeout` (plus any
/// mandatory padding delay the caller issues elsewhere).
pub fn pump_once(
    input: &mut TtyInput,
    decoder: &mut InputDecoder,
    handler: &mut dyn EventHandler,
    timeout: Duration,
) -> io::Result<()> {
    if input.wait_ready(timeout)? {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = input.read_available(&mut buf)?;
            if n == 0 {
                break;
            }
            decoder.feed(&buf[..n]);
            if n < buf.len() {
                break;
            }
        }
    }

    dispatch(handler, decoder.poll());
    if let Some(escape) = decoder.escape_key_handling() {
        dispatch(handler, [escape]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use termloom_core::caps::{StaticEntry, StaticSource, resolve};
    use termloom_core::event::{KeyCode, KeyEvent};
    use termloom_core::key_table::KeyTable;

    fn pipe_pair() -> (TtyInput, File) {
        let (read, write) = std::io::pipe().expect("pipe");
        let input =
            TtyInput::from_file(File::from(std::os::fd::OwnedFd::from(read))).expect("nonblock");
        (input, File::from(std::os::fd::OwnedFd::from(write)))
    }

    fn decoder() -> InputDecoder {
        let entry = StaticEntry::new().with_string("kcuu1", b"\x1b[A".as_slice());
        let source = StaticSource::new().with_entry("pipe-test", entry);
        let record = resolve(&source, "pipe-test", false).expect("resolves");
        InputDecoder::new(KeyTable::build(&record))
    }

    #[derive(Default)]
    struct Collect {
        presses: Vec<KeyEvent>,
    }

    impl EventHandler for Collect {
        fn on_key_press(&mut self, event: KeyEvent) {
            self.presses.push(event);
        }
    }

    #[test]
    fn wait_ready_times_out_on_empty_pipe() {
        let (input, _write) = pipe_pair();
        assert!(!input.wait_ready(Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn wait_ready_sees_pending_bytes() {
        let (input, mut write) = pipe_pair();
        write.write_all(b"x").unwrap();
        assert!(input.wait_ready(Duration::from_millis(100)).unwrap());
    }

    #[test]
    fn read_available_returns_zero_when_empty() {
        let (mut input, _write) = pipe_pair();
        let mut buf = [0u8; 16];
        assert_eq!(input.read_available(&mut buf).unwrap(), 0);
    }

    #[test]
    fn read_available_drains_pending_bytes() {
        let (mut input, mut write) = pipe_pair();
        write.write_all(b"hello").unwrap();
        assert!(input.wait_ready(Duration::from_millis(100)).unwrap());
        let mut buf = [0u8; 16];
        let n = input.read_available(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn pump_once_decodes_and_dispatches() {
        let (mut input, mut write) = pipe_pair();
        let mut dec = decoder();
        let mut handler = Collect::default();

        write.write_all(b"\x1b[Aq").unwrap();
        pump_once(&mut input, &mut dec, &mut handler, Duration::from_millis(100)).unwrap();

        let codes: Vec<KeyCode> = handler.presses.iter().map(|e| e.code).collect();
        assert_eq!(codes, [KeyCode::Up, KeyCode::Char('q')]);
    }

    #[test]
    fn pump_once_idles_cleanly_without_input() {
        let (mut input, mut dec, mut handler) = {
            let (i, _w) = pipe_pair();
            drop(_w);
            (i, decoder(), Collect::default())
        };
        pump_once(&mut input, &mut dec, &mut handler, Duration::from_millis(5)).unwrap();
        assert!(handler.presses.is_empty());
    }
}
