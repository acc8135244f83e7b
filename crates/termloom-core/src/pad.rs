#![forbid(unsafe_code)]

//! The padding/output engine.
//!
//! Capability strings may embed `$<N>` delay directives: wait `N` tenths of
//! a second before the terminal sees the following bytes. `N` accepts one
//! decimal digit (`$<0.5>`). A trailing `*` scales the delay by an
//! affected-line count; a trailing `/` makes the delay mandatory, applied
//! even on terminals fast enough to skip padding or ones using xon/xoff
//! flow control.
//!
//! A delay is rendered as pad bytes (NUL) when the terminal consumes a pad
//! character, sized so the bytes occupy the line for the requested time at
//! the configured baud rate. Without a pad character the engine sleeps
//! synchronously; this is the one permitted blocking operation in the
//! system.
//!
//! Malformed directives are not errors: the bytes pass through literally.

use std::io::Write;
use std::time::Duration;

use tracing::trace;

use crate::caps::{CapFlags, CapabilityRecord};

/// Bits on the wire per pad byte (8 data + start bit).
const BITS_PER_PAD_BYTE: u64 = 9;

/// Byte-oriented output boundary for resolved control sequences.
pub trait OutputSink {
    fn put_char(&mut self, byte: u8);

    fn put_str(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.put_char(b);
        }
    }
}

/// Default sink: the process standard output. Write errors degrade to
/// dropped output; there is no recovery path for a broken terminal fd.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn put_char(&mut self, byte: u8) {
        let _ = std::io::stdout().write_all(&[byte]);
    }

    fn put_str(&mut self, bytes: &[u8]) {
        let _ = std::io::stdout().write_all(bytes);
    }
}

/// Executes capability strings, honoring embedded delay directives.
#[derive(Debug, Clone)]
pub struct PadEngine {
    /// Line speed in baud; 0 when unknown (forces sleeping delays).
    baud_rate: u32,
    /// Lowest baud rate at which padding is required (`pb`); 0 disables
    /// non-mandatory padding entirely.
    padding_baud_rate: i32,
    /// Terminal has no pad character (`npc`); delays must sleep.
    no_pad_char: bool,
    /// Terminal uses xon/xoff flow control; non-mandatory delays are moot.
    xon_xoff: bool,
}

impl PadEngine {
    /// Build from a resolved capability record; baud rate starts unknown.
    #[must_use]
    pub fn from_record(record: &CapabilityRecord) -> Self {
        Self {
            baud_rate: 0,
            padding_baud_rate: record.padding_baud_rate(),
            no_pad_char: record.flags().contains(CapFlags::NO_PAD_CHAR),
            xon_xoff: record.flags().contains(CapFlags::XON_XOFF),
        }
    }

    /// Set the measured line speed.
    pub fn set_baud_rate(&mut self, baud: u32) {
        self.baud_rate = baud;
    }

    /// Write `cap` to `sink`, executing each `$<N[*|/]>` directive.
    ///
    /// `affected_lines` scales `*`-marked delays (1 for single-line
    /// operations).
    pub fn put(&self, cap: &[u8], affected_lines: u16, sink: &mut dyn OutputSink) {
        let mut i = 0;
        while i < cap.len() {
            if cap[i] == b'$' && cap.get(i + 1) == Some(&b'<') {
                if let Some((directive, end)) = parse_directive(&cap[i + 2..]) {
                    self.delay(directive, affected_lines, sink);
                    i += 2 + end;
                    continue;
                }
            }
            sink.put_char(cap[i]);
            i += 1;
        }
    }

    fn delay(&self, d: Directive, affected_lines: u16, sink: &mut dyn OutputSink) {
        let mut ms = d.tenth_ms;
        if d.proportional {
            ms *= u64::from(affected_lines.max(1));
        }
        if ms == 0 {
            return;
        }

        let applicable = self.padding_baud_rate > 0
            && self.baud_rate >= self.padding_baud_rate as u32
            && !self.xon_xoff;
        if !d.mandatory && !applicable {
            return;
        }

        if self.no_pad_char || self.baud_rate == 0 {
            trace!(ms, "padding delay (sleep)");
            std::thread::sleep(Duration::from_millis(ms));
            return;
        }

        // Enough NULs to occupy the line for `ms` at the current speed.
        let count = (u64::from(self.baud_rate) * ms) / (BITS_PER_PAD_BYTE * 1000);
        trace!(ms, count, "padding delay (pad bytes)");
        for _ in 0..count {
            sink.put_char(0);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Directive {
    /// Delay in milliseconds (the wire unit is tenths of a second, with one
    /// optional decimal digit).
    tenth_ms: u64,
    proportional: bool,
    mandatory: bool,
}

/// Parse the directive body after `$<`, returning it plus the number of
/// bytes consumed including the closing `>`.
fn parse_directive(body: &[u8]) -> Option<(Directive, usize)> {
    let mut i = 0;

    let mut tenths: u64 = 0;
    let mut digits = 0;
    while let Some(b @ b'0'..=b'9') = body.get(i) {
        tenths = tenths.saturating_mul(10).saturating_add(u64::from(b - b'0'));
        digits += 1;
        i += 1;
    }
    if digits == 0 {
        return None;
    }

    // One decimal digit of a tenth.
    let mut tenth_ms = tenths.saturating_mul(100);
    if body.get(i) == Some(&b'.') {
        let b = body.get(i + 1)?;
        if !b.is_ascii_digit() {
            return None;
        }
        tenth_ms = tenth_ms.saturating_add(u64::from(b - b'0') * 10);
        i += 2;
    }

    let mut proportional = false;
    let mut mandatory = false;
    loop {
        match body.get(i) {
            Some(b'*') if !proportional => proportional = true,
            Some(b'/') if !mandatory => mandatory = true,
            Some(b'>') => {
                return Some((
                    Directive {
                        tenth_ms,
                        proportional,
                        mandatory,
                    },
                    i + 1,
                ));
            }
            _ => return None,
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{StaticEntry, StaticSource, resolve};

    #[derive(Debug, Default)]
    struct VecSink(Vec<u8>);

    impl OutputSink for VecSink {
        fn put_char(&mut self, byte: u8) {
            self.0.push(byte);
        }
    }

    fn engine(npc: bool, xon: bool, pb: i32, baud: u32) -> PadEngine {
        let mut entry = StaticEntry::new()
            .with_number("pb", pb)
            .with_string("clear", b"\x1b[2J".as_slice());
        if npc {
            entry = entry.with_flag("npc");
        }
        if xon {
            entry = entry.with_flag("xon");
        }
        let source = StaticSource::new().with_entry("padtest", entry);
        let record = resolve(&source, "padtest", false).unwrap();
        let mut engine = PadEngine::from_record(&record);
        engine.set_baud_rate(baud);
        engine
    }

    #[test]
    fn plain_string_passes_through() {
        let mut sink = VecSink::default();
        engine(false, false, 9600, 38400).put(b"\x1b[2J", 1, &mut sink);
        assert_eq!(sink.0, b"\x1b[2J");
    }

    #[test]
    fn directive_renders_pad_bytes_at_baud_rate() {
        let mut sink = VecSink::default();
        // 9600 baud, 100 ms -> 9600 * 100 / 9000 = 106 pad bytes.
        engine(false, false, 1200, 9600).put(b"A$<1>B", 1, &mut sink);
        assert_eq!(sink.0.first(), Some(&b'A'));
        assert_eq!(sink.0.last(), Some(&b'B'));
        assert_eq!(sink.0.iter().filter(|&&b| b == 0).count(), 106);
    }

    #[test]
    fn proportional_directive_scales_by_affected_lines() {
        let mut one = VecSink::default();
        let mut five = VecSink::default();
        let e = engine(false, false, 1200, 9600);
        e.put(b"$<1*>", 1, &mut one);
        e.put(b"$<1*>", 5, &mut five);
        let pads = |s: &VecSink| s.0.iter().filter(|&&b| b == 0).count();
        assert_eq!(pads(&five), pads(&one) * 5);
    }

    #[test]
    fn delay_skipped_below_padding_threshold() {
        let mut sink = VecSink::default();
        // Baud under pb: padding not required.
        engine(false, false, 9600, 1200).put(b"A$<5>B", 1, &mut sink);
        assert_eq!(sink.0, b"AB");
    }

    #[test]
    fn delay_skipped_with_xon_xoff() {
        let mut sink = VecSink::default();
        engine(false, true, 1200, 9600).put(b"A$<5>B", 1, &mut sink);
        assert_eq!(sink.0, b"AB");
    }

    #[test]
    fn mandatory_directive_ignores_gating() {
        let mut sink = VecSink::default();
        // xon/xoff would skip a plain delay; `/` forces it.
        engine(false, true, 1200, 9600).put(b"A$<1/>B", 1, &mut sink);
        assert!(sink.0.iter().any(|&b| b == 0));
    }

    #[test]
    fn decimal_digit_adds_a_hundredth() {
        // $<0.5> = 50 ms -> 9600 * 50 / 9000 = 53 pad bytes.
        let mut sink = VecSink::default();
        engine(false, false, 1200, 9600).put(b"$<0.5>", 1, &mut sink);
        assert_eq!(sink.0.len(), 53);
    }

    #[test]
    fn zero_delay_emits_nothing() {
        let mut sink = VecSink::default();
        engine(false, false, 1200, 9600).put(b"A$<0>B", 1, &mut sink);
        assert_eq!(sink.0, b"AB");
    }

    #[test]
    fn malformed_directive_passes_through_literally() {
        let mut sink = VecSink::default();
        let e = engine(false, false, 1200, 9600);
        e.put(b"$<>", 1, &mut sink);
        e.put(b"$<abc>", 1, &mut sink);
        e.put(b"$<5", 1, &mut sink);
        e.put(b"$5>", 1, &mut sink);
        assert_eq!(sink.0, b"$<>$<abc>$<5$5>");
    }

    #[test]
    fn directive_parser_accepts_flag_order() {
        let (d, n) = parse_directive(b"5*/>").unwrap();
        assert!(d.proportional && d.mandatory);
        assert_eq!(n, 4);
        let (d, _) = parse_directive(b"5/*>").unwrap();
        assert!(d.proportional && d.mandatory);
        assert_eq!(d.tenth_ms, 500);
    }

    #[test]
    fn directive_parser_rejects_repeated_flags() {
        assert_eq!(parse_directive(b"5**>"), None);
        assert_eq!(parse_directive(b"5.>"), None);
        assert_eq!(parse_directive(b"5.55>"), None);
    }

    #[test]
    fn no_pad_char_sleeps_instead_of_padding() {
        let mut sink = VecSink::default();
        // npc with a tiny mandatory delay: sleeps, emits no pad bytes.
        let start = std::time::Instant::now();
        engine(true, false, 1200, 9600).put(b"A$<0.1/>B", 1, &mut sink);
        assert!(start.elapsed() >= Duration::from_millis(10));
        assert_eq!(sink.0, b"AB");
    }
}
