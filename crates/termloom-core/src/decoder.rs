#![forbid(unsafe_code)]

//! The streaming input decoder: raw bytes → logical events.
//!
//! [`InputDecoder`] consumes bytes pushed into a bounded buffer and produces
//! [`Event`]s. It never blocks: the host checks readiness externally (see
//! the console crate), feeds whatever arrived, and polls.
//!
//! # State Machine
//!
//! `Idle` (buffer empty) → `Buffering` (bytes held, no complete match) →
//! `Dispatching` (one or more events emitted) → back to `Idle`/`Buffering`.
//!
//! A decode step scans the key table for the longest matching prefix. A full
//! match emits a key press plus a synthesized release and removes the
//! matched bytes. A buffer that is a proper prefix of at least one entry is
//! held — unless the escape timeout (default 100 ms) has elapsed since the
//! first held byte, in which case the bytes fall back to UTF-8 decoding or,
//! for a lone `0x1B`, a bare [`Event::Escape`]. That timeout is the only
//! mechanism distinguishing a pressed Escape key from the start of a
//! multi-byte sequence.
//!
//! # Invariants
//!
//! 1. The buffer never grows past [`INPUT_BUFFER_CAPACITY`]; overflow bytes
//!    are dropped at `feed` time.
//! 2. Matched mouse introducers never surface as key events; their tails are
//!    re-routed into the [`crate::mouse`] sub-decoders.
//! 3. Malformed UTF-8 and garbage escape bytes are discarded byte-by-byte
//!    without corrupting subsequent decoding.
//! 4. Every emitted key press is immediately followed by its release.

use std::time::{Duration, Instant};

use ahash::AHashMap;
use tracing::trace;

use crate::event::{Event, KeyCode, KeyEvent, KeyEventKind, Modifiers};
use crate::key_table::{CSI, KeyTable, KeyTarget};
use crate::mouse::{self, DEFAULT_DOUBLE_CLICK_INTERVAL, MouseDecode, MouseTracker};

/// Fixed input buffer capacity in bytes.
pub const INPUT_BUFFER_CAPACITY: usize = 2048;

/// Default hold time before ambiguous prefixes fall back.
pub const DEFAULT_ESCAPE_TIMEOUT: Duration = Duration::from_millis(100);

/// Longest accepted decimal parameter section of a mouse report.
const MAX_MOUSE_PARAMS: usize = 32;

// ---------------------------------------------------------------------------
// Input buffer
// ---------------------------------------------------------------------------

/// Bounded append-only byte buffer.
///
/// Overflow drops the incoming bytes (availability over completeness);
/// consuming more than is held is a logic error and panics.
#[derive(Debug)]
pub struct InputBuffer {
    bytes: Vec<u8>,
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl InputBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: Vec::with_capacity(INPUT_BUFFER_CAPACITY),
        }
    }

    /// Append as much of `data` as fits; returns the number accepted.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let room = INPUT_BUFFER_CAPACITY - self.bytes.len();
        let take = data.len().min(room);
        self.bytes.extend_from_slice(&data[..take]);
        take
    }

    /// Remove the first `n` bytes.
    ///
    /// # Panics
    /// Panics if `n` exceeds the held length.
    pub fn consume(&mut self, n: usize) {
        assert!(n <= self.bytes.len(), "consume past end of input buffer");
        self.bytes.drain(..n);
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Modifier correction
// ---------------------------------------------------------------------------

/// Live modifier-key state, supplied by a console adapter when the platform
/// can be asked directly (e.g. the Linux console shift-state ioctl).
pub trait ModifierSource {
    /// Current modifier bitset, or `None` when the query is unavailable.
    fn modifiers(&self) -> Option<Modifiers>;
}

/// Console-specific raw-code corrections keyed by (modifier bitset, code).
#[derive(Debug, Default)]
pub struct ModifierCorrections {
    map: AHashMap<(Modifiers, KeyCode), KeyCode>,
}

impl ModifierCorrections {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, modifiers: Modifiers, raw: KeyCode, corrected: KeyCode) {
        self.map.insert((modifiers, raw), corrected);
    }

    /// The corrected code for `(modifiers, raw)`, or `raw` unchanged.
    #[must_use]
    pub fn correct(&self, modifiers: Modifiers, raw: KeyCode) -> KeyCode {
        self.map.get(&(modifiers, raw)).copied().unwrap_or(raw)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for the decoder.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Hold time before an ambiguous prefix falls back (default 100 ms).
    pub escape_timeout: Duration,
    /// Double-click window for the mouse tracker (default 500 ms).
    pub double_click_interval: Duration,
    /// Whether the three mouse dialects are recognized at all.
    pub mouse_support: bool,
    /// Terminal size, the clamp bound for URXVT coordinates.
    pub terminal_size: (u16, u16),
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            escape_timeout: DEFAULT_ESCAPE_TIMEOUT,
            double_click_interval: DEFAULT_DOUBLE_CLICK_INTERVAL,
            mouse_support: true,
            terminal_size: (80, 24),
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// What a decode pass decided to do next; computed immutably, then applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Empty,
    EmitKey { code: KeyCode, len: usize },
    MouseX10 { intro_len: usize },
    MouseSgr { intro_len: usize, params_len: usize, terminator: u8 },
    MouseUrxvt { params_len: usize },
    Hold,
    Fallback,
}

/// Progress made by one internal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Emitted,
    NeedMore,
    Idle,
}

/// The streaming input decoder.
pub struct InputDecoder {
    table: KeyTable,
    config: DecoderConfig,
    buf: InputBuffer,
    pending_since: Option<Instant>,
    mouse: MouseTracker,
    corrections: ModifierCorrections,
    modifier_source: Option<Box<dyn ModifierSource>>,
}

impl std::fmt::Debug for InputDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputDecoder")
            .field("buffered", &self.buf.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl InputDecoder {
    /// Create a decoder with default configuration.
    #[must_use]
    pub fn new(table: KeyTable) -> Self {
        Self::with_config(table, DecoderConfig::default())
    }

    #[must_use]
    pub fn with_config(table: KeyTable, config: DecoderConfig) -> Self {
        let mouse = MouseTracker::new(config.double_click_interval);
        Self {
            table,
            config,
            buf: InputBuffer::new(),
            pending_since: None,
            mouse,
            corrections: ModifierCorrections::new(),
            modifier_source: None,
        }
    }

    /// Install a live modifier-state source (console adapter).
    pub fn set_modifier_source(&mut self, source: Box<dyn ModifierSource>) {
        self.modifier_source = Some(source);
    }

    /// Install a console-specific modifier correction table.
    pub fn set_corrections(&mut self, corrections: ModifierCorrections) {
        self.corrections = corrections;
    }

    /// Toggle recognition of the three mouse dialects.
    pub fn set_mouse_support(&mut self, enabled: bool) {
        self.config.mouse_support = enabled;
    }

    /// Update the clamp bound for URXVT coordinates.
    pub fn set_terminal_size(&mut self, size: (u16, u16)) {
        self.config.terminal_size = size;
    }

    /// Bytes currently held and undecoded.
    #[must_use]
    pub fn buffered(&self) -> &[u8] {
        self.buf.as_slice()
    }

    /// Drop all held bytes and retained mouse state.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.pending_since = None;
        self.mouse.reset();
    }

    /// Append raw bytes; returns how many were accepted (overflow drops).
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        let was_empty = self.buf.is_empty();
        let accepted = self.buf.push(bytes);
        if accepted < bytes.len() {
            trace!(dropped = bytes.len() - accepted, "input buffer overflow");
        }
        if was_empty && accepted > 0 {
            self.pending_since = Some(Instant::now());
        }
        accepted
    }

    /// Non-blocking decode: drain everything decodable right now.
    ///
    /// Call after an external readiness check said data may be available, or
    /// on idle ticks to resolve a pending Escape.
    #[must_use]
    pub fn poll(&mut self) -> Vec<Event> {
        self.decode_step()
    }

    /// Run the decode loop until the buffer is exhausted or held.
    #[must_use]
    pub fn decode_step(&mut self) -> Vec<Event> {
        self.decode_step_at(Instant::now())
    }

    /// If exactly one Escape byte is pending and the timeout has elapsed,
    /// emit the disambiguated Escape key.
    ///
    /// Callable independently on every idle tick of a cooperative event
    /// loop; no dedicated timer is needed.
    #[must_use]
    pub fn escape_key_handling(&mut self) -> Option<Event> {
        self.escape_key_handling_at(Instant::now())
    }

    // -- time-injected variants (exercised directly by tests) --------------

    #[must_use]
    pub fn decode_step_at(&mut self, now: Instant) -> Vec<Event> {
        let mut out = Vec::new();
        while self.step(&mut out, now) == Step::Emitted {}
        out
    }

    #[must_use]
    pub fn escape_key_handling_at(&mut self, now: Instant) -> Option<Event> {
        if self.buf.as_slice() == [0x1b] && self.expired(now) {
            self.buf.clear();
            self.pending_since = None;
            return Some(Event::Escape);
        }
        None
    }

    fn expired(&self, now: Instant) -> bool {
        self.pending_since
            .is_some_and(|t| now.duration_since(t) >= self.config.escape_timeout)
    }

    fn step(&mut self, out: &mut Vec<Event>, now: Instant) -> Step {
        match self.next_action(now) {
            Action::Empty => {
                self.pending_since = None;
                Step::Idle
            }
            Action::EmitKey { code, len } => {
                self.buf.consume(len);
                self.emit_key(code, out);
                Step::Emitted
            }
            Action::MouseX10 { intro_len } => {
                let b = self.buf.as_slice();
                let tail = [b[intro_len], b[intro_len + 1], b[intro_len + 2]];
                let decode = mouse::decode_x10(tail, &mut self.mouse, now);
                self.buf.consume(intro_len + 3);
                self.push_mouse(decode, out)
            }
            Action::MouseSgr {
                intro_len,
                params_len,
                terminator,
            } => {
                let decode = mouse::decode_sgr(
                    &self.buf.as_slice()[intro_len..intro_len + params_len],
                    terminator,
                    &mut self.mouse,
                    now,
                );
                match decode {
                    MouseDecode::Malformed => {
                        // Garbage dressed as a report: shed the introducer.
                        self.buf.consume(1);
                        Step::Emitted
                    }
                    other => {
                        self.buf.consume(intro_len + params_len + 1);
                        self.push_mouse(other, out)
                    }
                }
            }
            Action::MouseUrxvt { params_len } => {
                let decode = mouse::decode_urxvt(
                    &self.buf.as_slice()[CSI.len()..CSI.len() + params_len],
                    self.config.terminal_size,
                    &mut self.mouse,
                    now,
                );
                match decode {
                    MouseDecode::Malformed => {
                        self.buf.consume(1);
                        Step::Emitted
                    }
                    other => {
                        self.buf.consume(CSI.len() + params_len + 1);
                        self.push_mouse(other, out)
                    }
                }
            }
            Action::Hold => Step::NeedMore,
            Action::Fallback => self.run_fallback(out, now),
        }
    }

    /// Decide what to do with the current buffer, without mutating it.
    fn next_action(&self, now: Instant) -> Action {
        let buf = self.buf.as_slice();
        if buf.is_empty() {
            return Action::Empty;
        }

        let scan = self.table.scan(buf, self.config.mouse_support);
        let mut partial = scan.partial;

        for entry in &scan.matches {
            match entry.target {
                KeyTarget::Key(code) => {
                    return Action::EmitKey {
                        code,
                        len: entry.seq.len(),
                    };
                }
                KeyTarget::MouseX10 => {
                    if buf.len() >= entry.seq.len() + 3 {
                        return Action::MouseX10 {
                            intro_len: entry.seq.len(),
                        };
                    }
                    partial = true;
                }
                KeyTarget::MouseSgr => match scan_mouse_params(&buf[entry.seq.len()..], true) {
                    ParamScan::Complete {
                        params_len,
                        terminator,
                    } => {
                        return Action::MouseSgr {
                            intro_len: entry.seq.len(),
                            params_len,
                            terminator,
                        };
                    }
                    ParamScan::NeedMore => partial = true,
                    ParamScan::Invalid => {}
                },
                KeyTarget::MouseUrxvt => {}
            }
        }

        // URXVT reports have no distinctive introducer: bare CSI followed by
        // a decimal triplet and `M`. Checked only after every table entry
        // failed so real key sequences always win.
        if self.config.mouse_support
            && buf.starts_with(CSI)
            && buf
                .get(CSI.len())
                .is_some_and(|b| b.is_ascii_digit() || *b == b'-')
        {
            match scan_mouse_params(&buf[CSI.len()..], false) {
                ParamScan::Complete { params_len, .. } => {
                    return Action::MouseUrxvt { params_len };
                }
                ParamScan::NeedMore => partial = true,
                ParamScan::Invalid => {}
            }
        }

        if partial && !self.expired(now) {
            return Action::Hold;
        }
        Action::Fallback
    }

    /// Timeout fallback: a lone Escape byte, a dropped garbage byte, or a
    /// UTF-8 character.
    fn run_fallback(&mut self, out: &mut Vec<Event>, now: Instant) -> Step {
        let buf = self.buf.as_slice();
        let b0 = buf[0];

        if b0 == 0x1b {
            if buf.len() == 1 {
                if !self.expired(now) {
                    return Step::NeedMore;
                }
                self.buf.clear();
                self.pending_since = None;
                out.push(Event::Escape);
                return Step::Emitted;
            }
            // Garbage escape sequence: discard byte-by-byte until the buffer
            // matches a known prefix again or empties.
            self.buf.consume(1);
            return Step::Emitted;
        }

        let Some(len) = utf8_len(b0) else {
            trace!(byte = b0, "discarding invalid UTF-8 lead byte");
            self.buf.consume(1);
            return Step::Emitted;
        };

        if buf.len() < len {
            if !self.expired(now) {
                return Step::NeedMore;
            }
            self.buf.consume(1);
            return Step::Emitted;
        }

        match std::str::from_utf8(&buf[..len]) {
            Ok(s) => {
                let ch = s.chars().next().unwrap_or('\u{fffd}');
                self.buf.consume(len);
                let (code, extra) = key_for_char(ch);
                self.emit_key_with(code, extra, out);
            }
            Err(_) => {
                trace!(byte = b0, "discarding byte with invalid continuation");
                self.buf.consume(1);
            }
        }
        Step::Emitted
    }

    fn push_mouse(&mut self, decode: MouseDecode, out: &mut Vec<Event>) -> Step {
        match decode {
            MouseDecode::Event(ev) => out.push(Event::Mouse(ev)),
            MouseDecode::NoEvent | MouseDecode::Malformed => {}
        }
        Step::Emitted
    }

    fn emit_key(&mut self, code: KeyCode, out: &mut Vec<Event>) {
        self.emit_key_with(code, Modifiers::NONE, out);
    }

    /// Apply live-modifier correction, then emit press + release.
    fn emit_key_with(&mut self, raw: KeyCode, base: Modifiers, out: &mut Vec<Event>) {
        let live = self
            .modifier_source
            .as_ref()
            .and_then(|s| s.modifiers())
            .unwrap_or(Modifiers::NONE);
        let modifiers = base | live;
        let code = if live.is_empty() {
            raw
        } else {
            self.corrections.correct(live, raw)
        };
        let press = KeyEvent::new(code).with_modifiers(modifiers);
        out.push(Event::Key(press));
        out.push(Event::Key(press.with_kind(KeyEventKind::Release)));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamScan {
    Complete { params_len: usize, terminator: u8 },
    NeedMore,
    Invalid,
}

/// Scan the decimal `b;x;y` section of a mouse report.
///
/// `allow_release` accepts the SGR `m` terminator in addition to `M`.
fn scan_mouse_params(tail: &[u8], allow_release: bool) -> ParamScan {
    for (i, &b) in tail.iter().enumerate() {
        if i > MAX_MOUSE_PARAMS {
            return ParamScan::Invalid;
        }
        match b {
            b'0'..=b'9' | b';' | b'-' => {}
            b'M' => {
                return ParamScan::Complete {
                    params_len: i,
                    terminator: b,
                };
            }
            b'm' if allow_release => {
                return ParamScan::Complete {
                    params_len: i,
                    terminator: b,
                };
            }
            _ => return ParamScan::Invalid,
        }
    }
    ParamScan::NeedMore
}

/// UTF-8 sequence length for a lead byte, or `None` if it cannot lead.
const fn utf8_len(b: u8) -> Option<usize> {
    match b {
        0x00..=0x7f => Some(1),
        0xc2..=0xdf => Some(2),
        0xe0..=0xef => Some(3),
        0xf0..=0xf4 => Some(4),
        _ => None,
    }
}

/// Map a decoded character to a key code, unfolding C0 controls.
fn key_for_char(ch: char) -> (KeyCode, Modifiers) {
    match ch {
        '\r' | '\n' => (KeyCode::Enter, Modifiers::NONE),
        '\t' => (KeyCode::Tab, Modifiers::NONE),
        '\u{8}' | '\u{7f}' => (KeyCode::Backspace, Modifiers::NONE),
        '\u{0}' => (KeyCode::Null, Modifiers::NONE),
        c if (c as u32) < 0x20 => {
            // Ctrl+letter arrives as the letter minus 0x60.
            let letter = char::from_u32(c as u32 + 0x60).unwrap_or(c);
            (KeyCode::Char(letter), Modifiers::CTRL)
        }
        c => (KeyCode::Char(c), Modifiers::NONE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::test_support::record_with_keys;
    use crate::event::{MouseButton, MouseEvent, MouseEventKind};
    use crate::key_table::{KeySlot, KeyTableBuilder};

    fn table() -> KeyTable {
        KeyTable::build(&record_with_keys(&[
            (KeySlot::CursorUp, b"\x1b[A".as_slice()),
            (KeySlot::CursorDown, b"\x1b[B"),
            (KeySlot::Home, b"\x1b[H"),
            (KeySlot::Function(5), b"\x1b[15~"),
        ]))
    }

    fn decoder() -> InputDecoder {
        InputDecoder::new(table())
    }

    /// Decoder with a short timeout so expiry tests stay fast.
    fn quick_decoder() -> InputDecoder {
        InputDecoder::with_config(
            table(),
            DecoderConfig {
                escape_timeout: Duration::from_millis(20),
                ..DecoderConfig::default()
            },
        )
    }

    fn press(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code))
    }

    fn release(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code).with_kind(KeyEventKind::Release))
    }

    #[test]
    fn registered_sequence_emits_press_release_and_empties_buffer() {
        let mut d = decoder();
        d.feed(b"\x1b[A");
        let events = d.decode_step();
        assert_eq!(events, [press(KeyCode::Up), release(KeyCode::Up)]);
        assert!(d.buffered().is_empty());
    }

    #[test]
    fn every_table_key_round_trips() {
        let t = table();
        for entry in t.entries() {
            let KeyTarget::Key(code) = entry.target else {
                continue;
            };
            if entry.seq.is_empty() {
                continue;
            }
            let mut d = decoder();
            d.feed(&entry.seq);
            let events = d.decode_step();
            assert_eq!(events, [press(code), release(code)], "slot {:?}", entry.slot);
            assert!(d.buffered().is_empty());
        }
    }

    #[test]
    fn two_chars_in_one_feed_stay_ordered() {
        let mut d = decoder();
        d.feed(b"ab");
        let events = d.decode_step();
        assert_eq!(
            events,
            [
                press(KeyCode::Char('a')),
                release(KeyCode::Char('a')),
                press(KeyCode::Char('b')),
                release(KeyCode::Char('b')),
            ]
        );
    }

    #[test]
    fn lone_escape_waits_for_timeout() {
        let mut d = quick_decoder();
        d.feed(b"\x1b");
        assert!(d.decode_step().is_empty());
        assert_eq!(d.escape_key_handling(), None);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(d.escape_key_handling(), Some(Event::Escape));
        assert!(d.buffered().is_empty());
        // Exactly once.
        assert_eq!(d.escape_key_handling(), None);
    }

    #[test]
    fn lone_escape_resolves_via_decode_step_too() {
        let mut d = quick_decoder();
        d.feed(b"\x1b");
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(d.decode_step(), [Event::Escape]);
    }

    #[test]
    fn escape_prefix_completes_when_rest_arrives() {
        let mut d = decoder();
        d.feed(b"\x1b[");
        assert!(d.decode_step().is_empty());
        d.feed(b"A");
        assert_eq!(d.decode_step(), [press(KeyCode::Up), release(KeyCode::Up)]);
    }

    #[test]
    fn invalid_lead_byte_discarded_silently() {
        let mut d = decoder();
        d.feed(&[0xff, b'A']);
        let events = d.decode_step();
        assert_eq!(events, [press(KeyCode::Char('A')), release(KeyCode::Char('A'))]);
    }

    #[test]
    fn multibyte_utf8_decodes() {
        let mut d = decoder();
        d.feed("é".as_bytes());
        let events = d.decode_step();
        assert_eq!(events, [press(KeyCode::Char('é')), release(KeyCode::Char('é'))]);
    }

    #[test]
    fn partial_utf8_held_then_completed() {
        let mut d = decoder();
        d.feed(&[0xc3]);
        assert!(d.decode_step().is_empty());
        d.feed(&[0xa9]);
        let events = d.decode_step();
        assert_eq!(events, [press(KeyCode::Char('é')), release(KeyCode::Char('é'))]);
    }

    #[test]
    fn control_chars_map_to_codes() {
        let mut d = decoder();
        d.feed(b"\r");
        assert_eq!(d.decode_step()[0], press(KeyCode::Enter));
        d.feed(b"\t");
        assert_eq!(d.decode_step()[0], press(KeyCode::Tab));
        d.feed(&[0x01]);
        let ev = d.decode_step();
        assert_eq!(
            ev[0],
            Event::Key(KeyEvent::new(KeyCode::Char('a')).with_modifiers(Modifiers::CTRL))
        );
    }

    #[test]
    fn garbage_csi_discarded_byte_by_byte() {
        let mut d = quick_decoder();
        d.feed(b"\x1b[!zQ");
        // "\x1b[!" matches nothing and is no prefix; ESC and '[' and '!' are
        // shed, then 'z' and 'Q' decode as plain characters.
        let events = d.decode_step();
        assert_eq!(
            events,
            [
                press(KeyCode::Char('[')),
                release(KeyCode::Char('[')),
                press(KeyCode::Char('!')),
                release(KeyCode::Char('!')),
                press(KeyCode::Char('z')),
                release(KeyCode::Char('z')),
                press(KeyCode::Char('Q')),
                release(KeyCode::Char('Q')),
            ]
        );
    }

    #[test]
    fn buffer_overflow_drops_incoming() {
        let mut d = decoder();
        let big = vec![b'a'; INPUT_BUFFER_CAPACITY + 100];
        let accepted = d.feed(&big);
        assert_eq!(accepted, INPUT_BUFFER_CAPACITY);
        assert_eq!(d.buffered().len(), INPUT_BUFFER_CAPACITY);
    }

    #[test]
    fn x10_mouse_report_decodes() {
        let mut d = decoder();
        d.feed(b"\x1b[M\x20\x25\x23");
        let events = d.decode_step();
        assert_eq!(
            events,
            [Event::Mouse(MouseEvent::new(
                MouseEventKind::Press(MouseButton::Left),
                5,
                3
            ))]
        );
    }

    #[test]
    fn duplicate_x10_report_suppressed() {
        let mut d = decoder();
        d.feed(b"\x1b[M\x20\x25\x23");
        assert_eq!(d.decode_step().len(), 1);
        d.feed(b"\x1b[M\x20\x25\x23");
        assert!(d.decode_step().is_empty(), "identical report must not re-emit");
        assert!(d.buffered().is_empty(), "suppressed bytes are still consumed");
    }

    #[test]
    fn sgr_press_and_release() {
        let mut d = decoder();
        d.feed(b"\x1b[<0;11;7M");
        let events = d.decode_step();
        assert_eq!(
            events,
            [Event::Mouse(MouseEvent::new(
                MouseEventKind::Press(MouseButton::Left),
                11,
                7
            ))]
        );
        d.feed(b"\x1b[<0;11;7m");
        let events = d.decode_step();
        assert_eq!(
            events,
            [Event::Mouse(MouseEvent::new(
                MouseEventKind::Release(MouseButton::Left),
                11,
                7
            ))]
        );
    }

    #[test]
    fn partial_sgr_report_held() {
        let mut d = decoder();
        d.feed(b"\x1b[<0;1");
        assert!(d.decode_step().is_empty());
        d.feed(b"1;7M");
        assert_eq!(d.decode_step().len(), 1);
    }

    #[test]
    fn urxvt_report_decodes_and_clamps() {
        let mut d = decoder();
        d.set_terminal_size((80, 24));
        d.feed(b"\x1b[32;500;-2M");
        let events = d.decode_step();
        assert_eq!(
            events,
            [Event::Mouse(MouseEvent::new(
                MouseEventKind::Press(MouseButton::Left),
                80,
                1
            ))]
        );
    }

    #[test]
    fn urxvt_does_not_swallow_function_keys() {
        let mut d = decoder();
        d.feed(b"\x1b[15~");
        let events = d.decode_step();
        assert_eq!(events, [press(KeyCode::F(5)), release(KeyCode::F(5))]);
    }

    #[test]
    fn disabled_mouse_rejects_all_three_dialects() {
        let mut d = quick_decoder();
        d.set_mouse_support(false);

        d.feed(b"\x1b[M\x20\x25\x23");
        let events = d.decode_step();
        assert!(
            events.iter().all(|e| !matches!(e, Event::Mouse(_))),
            "X10 bytes must not decode as mouse: {events:?}"
        );

        d.reset();
        d.feed(b"\x1b[<0;11;7M");
        let events = d.decode_step();
        assert!(events.iter().all(|e| !matches!(e, Event::Mouse(_))));

        d.reset();
        d.feed(b"\x1b[32;10;5M");
        let events = d.decode_step();
        assert!(events.iter().all(|e| !matches!(e, Event::Mouse(_))));
    }

    #[test]
    fn longest_prefix_wins() {
        // Home is "\x1b[H"; an override makes a longer entry sharing the
        // prefix, which must win when its full bytes are present.
        let t = KeyTableBuilder::new()
            .override_slot(KeySlot::End, b"\x1b[HH".as_slice())
            .build(&record_with_keys(&[(KeySlot::Home, b"\x1b[H".as_slice())]));
        let mut d = InputDecoder::new(t);
        d.feed(b"\x1b[HH");
        let events = d.decode_step();
        assert_eq!(events, [press(KeyCode::End), release(KeyCode::End)]);
    }

    struct FixedMods(Modifiers);
    impl ModifierSource for FixedMods {
        fn modifiers(&self) -> Option<Modifiers> {
            Some(self.0)
        }
    }

    #[test]
    fn modifier_correction_replaces_raw_code() {
        let mut d = decoder();
        d.set_modifier_source(Box::new(FixedMods(Modifiers::SHIFT)));
        let mut corrections = ModifierCorrections::new();
        corrections.insert(Modifiers::SHIFT, KeyCode::Tab, KeyCode::BackTab);
        d.set_corrections(corrections);

        d.feed(b"\t");
        let events = d.decode_step();
        assert_eq!(
            events[0],
            Event::Key(KeyEvent::new(KeyCode::BackTab).with_modifiers(Modifiers::SHIFT))
        );
    }

    #[test]
    fn live_modifiers_attached_without_table_entry() {
        let mut d = decoder();
        d.set_modifier_source(Box::new(FixedMods(Modifiers::CTRL)));
        d.feed(b"\x1b[A");
        let events = d.decode_step();
        assert_eq!(
            events[0],
            Event::Key(KeyEvent::new(KeyCode::Up).with_modifiers(Modifiers::CTRL))
        );
    }

    #[test]
    fn reset_clears_held_bytes() {
        let mut d = decoder();
        d.feed(b"\x1b[");
        assert!(!d.buffered().is_empty());
        d.reset();
        assert!(d.buffered().is_empty());
        assert!(d.decode_step().is_empty());
    }

    #[test]
    fn input_buffer_consume_past_end_panics() {
        let result = std::panic::catch_unwind(|| {
            let mut b = InputBuffer::new();
            b.push(b"ab");
            b.consume(3);
        });
        assert!(result.is_err());
    }
}
