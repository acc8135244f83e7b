#![deny(unsafe_code)]

//! Platform console adapters and host-side tty glue.
//!
//! # Role in termloom
//! `termloom-core` is deliberately platform-free; this crate supplies what
//! it leaves to the host: device control (cursor style, beep, palette, live
//! modifier state) behind the [`ConsoleAdapter`] trait, and the raw-mode /
//! readiness / non-blocking-read primitives the decoder is fed from
//! ([`tty`]).
//!
//! # Adapters
//! - [`VtConsole`] drives any xterm-like terminal with escape sequences
//!   alone and works on every Unix host.
//! - [`linux::LinuxConsole`] talks to the Linux virtual console through
//!   ioctls (keyboard detection, speaker tone, palette, font and unicode
//!   map loading, shift-state query).
//!
//! # Invariants
//! - An adapter that has not positively detected its device stays inert:
//!   every operation is a no-op and `modifier_state` returns `None`.
//! - Device-control failures degrade to no-ops (logged); they never abort
//!   the session.
//! - Unsafe code is confined to the ioctl shim inside [`linux`]; the rest
//!   of the crate denies it.

use std::io::Write;

use termloom_core::event::Modifiers;

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(unix)]
pub mod tty;

/// Inclusive beep frequency bounds in Hz.
pub const BEEP_FREQ_RANGE: (u32, u32) = (21, 32766);

/// Maximum beep duration in milliseconds.
pub const BEEP_MAX_DURATION_MS: u32 = 1999;

/// Whether a beep request is within the supported envelope.
///
/// Out-of-range requests are rejected silently by every adapter; there is
/// no error surface for a bad beep.
#[must_use]
pub const fn beep_in_range(frequency_hz: u32, duration_ms: u32) -> bool {
    frequency_hz >= BEEP_FREQ_RANGE.0
        && frequency_hz <= BEEP_FREQ_RANGE.1
        && duration_ms <= BEEP_MAX_DURATION_MS
}

/// Cursor shapes an adapter can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorStyle {
    /// Whatever the terminal considers its default.
    #[default]
    Default,
    BlinkingBlock,
    SteadyBlock,
    BlinkingUnderline,
    SteadyUnderline,
    BlinkingBar,
    SteadyBar,
    Hidden,
}

/// Device-control boundary for one console kind.
///
/// Implementations are compile-time selected; the host picks one adapter,
/// calls [`detect`](ConsoleAdapter::detect) once, and uses it for the whole
/// session.
pub trait ConsoleAdapter {
    /// Probe for the device. Returns true when the adapter may be used;
    /// until then every other operation is a no-op.
    fn detect(&mut self) -> bool;

    /// Whether a prior [`detect`](ConsoleAdapter::detect) succeeded.
    fn is_active(&self) -> bool;

    fn set_cursor_style(&mut self, style: CursorStyle);

    /// Sound the bell. Requests outside [`beep_in_range`] are dropped.
    fn beep(&mut self, frequency_hz: u32, duration_ms: u32);

    fn save_palette(&mut self);

    fn restore_palette(&mut self);

    /// Live modifier-key state, or `None` when the device cannot be asked.
    fn modifier_state(&self) -> Option<Modifiers>;
}

// ---------------------------------------------------------------------------
// Escape-sequence adapter
// ---------------------------------------------------------------------------

/// Adapter for xterm-like terminals, driven purely by escape sequences.
///
/// Cursor styles map to DECSCUSR, the beep to BEL (frequency and duration
/// are accepted, range-checked, then ignored; the wire has no way to carry
/// them), palette restore to OSC 104. There is no palette read, so
/// `save_palette` is a no-op and restore resets to terminal defaults.
#[derive(Debug)]
pub struct VtConsole<W: Write> {
    writer: W,
    active: bool,
}

impl VtConsole<std::io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> VtConsole<W> {
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            active: false,
        }
    }

    fn put(&mut self, bytes: &[u8]) {
        if let Err(err) = self.writer.write_all(bytes).and_then(|()| self.writer.flush()) {
            tracing::warn!(%err, "console write failed");
        }
    }
}

impl<W: Write> ConsoleAdapter for VtConsole<W> {
    fn detect(&mut self) -> bool {
        // Escape-only: nothing to probe, assume an xterm-like peer.
        self.active = true;
        true
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_cursor_style(&mut self, style: CursorStyle) {
        if !self.active {
            return;
        }
        let n: u8 = match style {
            CursorStyle::Hidden => {
                self.put(b"\x1b[?25l");
                return;
            }
            CursorStyle::Default => 0,
            CursorStyle::BlinkingBlock => 1,
            CursorStyle::SteadyBlock => 2,
            CursorStyle::BlinkingUnderline => 3,
            CursorStyle::SteadyUnderline => 4,
            CursorStyle::BlinkingBar => 5,
            CursorStyle::SteadyBar => 6,
        };
        let seq = format!("\x1b[?25h\x1b[{n} q");
        self.put(seq.as_bytes());
    }

    fn beep(&mut self, frequency_hz: u32, duration_ms: u32) {
        if !self.active || !beep_in_range(frequency_hz, duration_ms) {
            return;
        }
        self.put(b"\x07");
    }

    fn save_palette(&mut self) {}

    fn restore_palette(&mut self) {
        if !self.active {
            return;
        }
        self.put(b"\x1b]104\x1b\\");
    }

    fn modifier_state(&self) -> Option<Modifiers> {
        None
    }
}
