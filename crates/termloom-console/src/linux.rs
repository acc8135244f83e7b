//! Linux virtual-console adapter.
//!
//! Talks to the kernel console driver through ioctls on `/dev/tty`:
//! keyboard-type probe (KDGKBTYPE) for detection, speaker tone (KDMKTONE),
//! palette get/set (GIO_CMAP/PIO_CMAP), font load (KDFONTOP), unicode map
//! load (PIO_UNIMAP), and the TIOCLINUX shift-state query that backs live
//! modifier correction.
//!
//! Detection is the gate: on anything that is not a Linux virtual console
//! (an xterm under X, an ssh session) KDGKBTYPE fails or reports an unknown
//! keyboard, the adapter stays inert, and every operation is a no-op.
//!
//! All ioctl use is confined to the [`sys`] shim; the rest of this module
//! and the crate deny unsafe code.

use std::fs::File;
use std::io;

use tracing::{debug, warn};

use termloom_core::decoder::{ModifierCorrections, ModifierSource};
use termloom_core::event::{KeyCode, Modifiers};

use crate::{ConsoleAdapter, CursorStyle, beep_in_range};

/// PIT oscillator base frequency, divided down for KDMKTONE.
const PIT_CLOCK_HZ: u32 = 1_193_180;

// TIOCLINUX shift-state bits.
const SHIFT_BIT: u8 = 1 << 0;
const ALT_GR_BIT: u8 = 1 << 1;
const CTRL_BIT: u8 = 1 << 2;
const ALT_BIT: u8 = 1 << 3;

/// One unicode → font-position mapping entry, kernel `unipair` layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniPair {
    pub unicode: u16,
    pub fontpos: u16,
}

/// A fixed-width console font image (one glyph per `charcount` slot).
#[derive(Debug, Clone)]
pub struct ConsoleFont {
    pub width: u32,
    pub height: u32,
    pub charcount: u32,
    /// Glyph bitmaps, 32 bytes per character slot as the kernel expects.
    pub data: Vec<u8>,
}

/// Ordered glyph fallbacks: when the loaded font lacks the first character,
/// try each candidate in turn.
const GLYPH_FALLBACKS: &[(char, &[char])] = &[
    ('\u{25cf}', &['\u{25c6}', '\u{2022}', '*']), // black circle
    ('\u{25c6}', &['\u{25cf}', '+']),             // black diamond
    ('\u{25cb}', &['\u{25cf}', 'o']),             // white circle
    ('\u{2022}', &['\u{25cf}', '*']),             // bullet
    ('\u{2192}', &['>']),                         // rightwards arrow
    ('\u{2190}', &['<']),                         // leftwards arrow
    ('\u{2191}', &['^']),                         // upwards arrow
    ('\u{2193}', &['v']),                         // downwards arrow
    ('\u{2714}', &['x']),                         // check mark
    ('\u{2026}', &['.']),                         // horizontal ellipsis
];

/// Adapter for the Linux virtual console.
#[derive(Debug)]
pub struct LinuxConsole {
    tty: File,
    active: bool,
    saved_palette: Option<[u8; 48]>,
    unicode_map: Vec<UniPair>,
}

impl LinuxConsole {
    /// Open the controlling terminal. Detection happens separately.
    pub fn open() -> io::Result<Self> {
        let tty = File::options().read(true).write(true).open("/dev/tty")?;
        Ok(Self {
            tty,
            active: false,
            saved_palette: None,
            unicode_map: Vec::new(),
        })
    }

    /// A standalone modifier-state source over its own descriptor, suitable
    /// for [`InputDecoder::set_modifier_source`].
    ///
    /// [`InputDecoder::set_modifier_source`]:
    ///     termloom_core::decoder::InputDecoder::set_modifier_source
    pub fn modifier_source(&self) -> io::Result<LinuxModifierSource> {
        Ok(LinuxModifierSource {
            tty: File::options().read(true).write(true).open("/dev/tty")?,
            active: self.active,
        })
    }

    /// The modifier corrections this console needs.
    ///
    /// The console keyboard driver reports the base code regardless of held
    /// modifiers; the decoder re-maps with the live shift state.
    #[must_use]
    pub fn corrections() -> ModifierCorrections {
        let mut c = ModifierCorrections::new();
        c.insert(Modifiers::SHIFT, KeyCode::Tab, KeyCode::BackTab);
        c.insert(Modifiers::SHIFT, KeyCode::KeypadCenter, KeyCode::Char('5'));
        c
    }

    /// Load a glyph font into the console.
    pub fn load_font(&mut self, font: &ConsoleFont) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        sys::set_font(&self.tty, font)
    }

    /// Install a unicode → glyph map, replacing the current one.
    pub fn load_unicode_map(&mut self, pairs: &[UniPair]) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        sys::clear_unicode_map(&self.tty)?;
        sys::set_unicode_map(&self.tty, pairs)?;
        self.unicode_map = pairs.to_vec();
        Ok(())
    }

    /// Whether the installed map can display `ch`.
    #[must_use]
    pub fn has_glyph(&self, ch: char) -> bool {
        has_glyph_in(&self.unicode_map, ch)
    }

    /// Substitute `ch` with the first displayable fallback when the active
    /// font lacks its glyph. Characters with no fallback chain pass through
    /// unchanged.
    #[must_use]
    pub fn substitute_glyph(&self, ch: char) -> char {
        substitute_in(&self.unicode_map, ch)
    }
}

impl ConsoleAdapter for LinuxConsole {
    fn detect(&mut self) -> bool {
        match sys::keyboard_type(&self.tty) {
            Ok(kb) if kb == sys::KB_101 || kb == sys::KB_84 => {
                debug!(keyboard = kb, "linux console detected");
                self.active = true;
            }
            Ok(kb) => {
                debug!(keyboard = kb, "unknown console keyboard type");
                self.active = false;
            }
            Err(err) => {
                debug!(%err, "not a linux console");
                self.active = false;
            }
        }
        self.active
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_cursor_style(&mut self, style: CursorStyle) {
        if !self.active {
            return;
        }
        // The console driver takes its softcursor style as a private CSI.
        let n = linux_cursor_code(style);
        let seq = format!("\x1b[?{n}c");
        if let Err(err) = io::Write::write_all(&mut &self.tty, seq.as_bytes()) {
            warn!(%err, "cursor style write failed");
        }
    }

    fn beep(&mut self, frequency_hz: u32, duration_ms: u32) {
        if !self.active || !beep_in_range(frequency_hz, duration_ms) {
            return;
        }
        if let Err(err) = sys::make_tone(&self.tty, tone_arg(frequency_hz, duration_ms)) {
            warn!(%err, "console beep failed");
        }
    }

    fn save_palette(&mut self) {
        if !self.active {
            return;
        }
        match sys::get_palette(&self.tty) {
            Ok(palette) => self.saved_palette = Some(palette),
            Err(err) => warn!(%err, "palette read failed"),
        }
    }

    fn restore_palette(&mut self) {
        if !self.active {
            return;
        }
        if let Some(palette) = self.saved_palette {
            if let Err(err) = sys::set_palette(&self.tty, &palette) {
                warn!(%err, "palette restore failed");
            }
        }
    }

    fn modifier_state(&self) -> Option<Modifiers> {
        if !self.active {
            return None;
        }
        match sys::shift_state(&self.tty) {
            Ok(bits) => Some(modifiers_from_shift_state(bits)),
            Err(err) => {
                debug!(%err, "shift-state query failed");
                None
            }
        }
    }
}

/// Modifier-state source backed by its own console descriptor.
#[derive(Debug)]
pub struct LinuxModifierSource {
    tty: File,
    active: bool,
}

impl ModifierSource for LinuxModifierSource {
    fn modifiers(&self) -> Option<Modifiers> {
        if !self.active {
            return None;
        }
        sys::shift_state(&self.tty)
            .ok()
            .map(modifiers_from_shift_state)
    }
}

/// KDMKTONE argument: duration in the high half, PIT divisor in the low.
const fn tone_arg(frequency_hz: u32, duration_ms: u32) -> i32 {
    let divisor = PIT_CLOCK_HZ / frequency_hz;
    ((duration_ms << 16) | (divisor & 0xffff)) as i32
}

fn modifiers_from_shift_state(bits: u8) -> Modifiers {
    let mut mods = Modifiers::NONE;
    if bits & SHIFT_BIT != 0 {
        mods |= Modifiers::SHIFT;
    }
    if bits & ALT_GR_BIT != 0 {
        mods |= Modifiers::ALT_GR;
    }
    if bits & CTRL_BIT != 0 {
        mods |= Modifiers::CTRL;
    }
    if bits & ALT_BIT != 0 {
        mods |= Modifiers::ALT;
    }
    mods
}

const fn linux_cursor_code(style: CursorStyle) -> u8 {
    match style {
        CursorStyle::Default => 0,
        CursorStyle::Hidden => 1,
        CursorStyle::BlinkingUnderline | CursorStyle::SteadyUnderline => 2,
        CursorStyle::BlinkingBar | CursorStyle::SteadyBar => 4,
        CursorStyle::BlinkingBlock | CursorStyle::SteadyBlock => 6,
    }
}

fn has_glyph_in(map: &[UniPair], ch: char) -> bool {
    u16::try_from(ch as u32).is_ok_and(|u| map.iter().any(|p| p.unicode == u))
}

fn substitute_in(map: &[UniPair], ch: char) -> char {
    if has_glyph_in(map, ch) {
        return ch;
    }
    let Some((_, candidates)) = GLYPH_FALLBACKS.iter().find(|(c, _)| *c == ch) else {
        return ch;
    };
    candidates
        .iter()
        .copied()
        .find(|&c| c.is_ascii() || has_glyph_in(map, c))
        .unwrap_or(ch)
}

// ---------------------------------------------------------------------------
// ioctl shim
// ---------------------------------------------------------------------------

#[allow(unsafe_code)]
mod sys {
    use std::fs::File;
    use std::io;
    use std::os::fd::AsRawFd;

    use super::{ConsoleFont, UniPair};

    /// 84-key keyboard.
    pub const KB_84: u8 = 0x01;
    /// 101-key keyboard.
    pub const KB_101: u8 = 0x02;

    const KD_FONT_OP_SET: u32 = 0;
    const TIOCL_GETSHIFTSTATE: u8 = 6;

    #[repr(C)]
    struct ConsoleFontOp {
        op: u32,
        flags: u32,
        width: u32,
        height: u32,
        charcount: u32,
        data: *mut u8,
    }

    #[repr(C)]
    struct UnimapInit {
        advised_hashsize: u16,
        advised_hashlevel: u16,
        advised_hashstep: u16,
    }

    #[repr(C)]
    struct UnimapDesc {
        entry_ct: u16,
        entries: *mut UniPair,
    }

    nix::ioctl_read_bad!(kdgkbtype, 0x4B33, u8);
    nix::ioctl_write_int_bad!(kdmktone, 0x4B30);
    nix::ioctl_read_bad!(gio_cmap, 0x4B70, [u8; 48]);
    nix::ioctl_write_ptr_bad!(pio_cmap, 0x4B71, [u8; 48]);
    nix::ioctl_readwrite_bad!(kdfontop, 0x4B72, ConsoleFontOp);
    nix::ioctl_write_ptr_bad!(pio_unimap, 0x4B67, UnimapDesc);
    nix::ioctl_write_ptr_bad!(pio_unimapclr, 0x4B68, UnimapInit);
    nix::ioctl_readwrite_bad!(tioclinux, 0x541C, u8);

    pub fn keyboard_type(tty: &File) -> io::Result<u8> {
        let mut kb: u8 = 0;
        // SAFETY: KDGKBTYPE writes a single byte through the pointer.
        unsafe { kdgkbtype(tty.as_raw_fd(), &mut kb) }.map_err(io::Error::other)?;
        Ok(kb)
    }

    pub fn make_tone(tty: &File, arg: i32) -> io::Result<()> {
        // SAFETY: KDMKTONE takes its argument by value.
        unsafe { kdmktone(tty.as_raw_fd(), arg) }.map_err(io::Error::other)?;
        Ok(())
    }

    pub fn get_palette(tty: &File) -> io::Result<[u8; 48]> {
        let mut palette = [0u8; 48];
        // SAFETY: GIO_CMAP fills exactly 48 bytes (16 RGB triples).
        unsafe { gio_cmap(tty.as_raw_fd(), &mut palette) }.map_err(io::Error::other)?;
        Ok(palette)
    }

    pub fn set_palette(tty: &File, palette: &[u8; 48]) -> io::Result<()> {
        // SAFETY: PIO_CMAP reads exactly 48 bytes.
        unsafe { pio_cmap(tty.as_raw_fd(), palette) }.map_err(io::Error::other)?;
        Ok(())
    }

    pub fn shift_state(tty: &File) -> io::Result<u8> {
        let mut arg: u8 = TIOCL_GETSHIFTSTATE;
        // SAFETY: with subcode 6 the kernel overwrites the byte with the
        // current shift state.
        unsafe { tioclinux(tty.as_raw_fd(), &mut arg) }.map_err(io::Error::other)?;
        Ok(arg)
    }

    pub fn set_font(tty: &File, font: &ConsoleFont) -> io::Result<()> {
        let mut data = font.data.clone();
        let mut op = ConsoleFontOp {
            op: KD_FONT_OP_SET,
            flags: 0,
            width: font.width,
            height: font.height,
            charcount: font.charcount,
            data: data.as_mut_ptr(),
        };
        // SAFETY: `data` outlives the call and holds the glyph image the
        // header fields describe.
        unsafe { kdfontop(tty.as_raw_fd(), &mut op) }.map_err(io::Error::other)?;
        Ok(())
    }

    pub fn clear_unicode_map(tty: &File) -> io::Result<()> {
        let init = UnimapInit {
            advised_hashsize: 0,
            advised_hashlevel: 0,
            advised_hashstep: 0,
        };
        // SAFETY: PIO_UNIMAPCLR reads the advisory struct only.
        unsafe { pio_unimapclr(tty.as_raw_fd(), &init) }.map_err(io::Error::other)?;
        Ok(())
    }

    pub fn set_unicode_map(tty: &File, pairs: &[UniPair]) -> io::Result<()> {
        let mut entries = pairs.to_vec();
        let desc = UnimapDesc {
            entry_ct: entries.len().min(usize::from(u16::MAX)) as u16,
            entries: entries.as_mut_ptr(),
        };
        // SAFETY: `entries` outlives the call; entry_ct matches its length.
        unsafe { pio_unimap(tty.as_raw_fd(), &desc) }.map_err(io::Error::other)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_state_bits_map_to_modifiers() {
        assert_eq!(modifiers_from_shift_state(0), Modifiers::NONE);
        assert_eq!(modifiers_from_shift_state(0b0001), Modifiers::SHIFT);
        assert_eq!(modifiers_from_shift_state(0b0010), Modifiers::ALT_GR);
        assert_eq!(modifiers_from_shift_state(0b0100), Modifiers::CTRL);
        assert_eq!(modifiers_from_shift_state(0b1000), Modifiers::ALT);
        assert_eq!(
            modifiers_from_shift_state(0b0101),
            Modifiers::SHIFT | Modifiers::CTRL
        );
    }

    #[test]
    fn tone_arg_packs_duration_and_divisor() {
        let arg = tone_arg(440, 100);
        assert_eq!(arg >> 16, 100);
        assert_eq!(arg & 0xffff, (1_193_180 / 440) as i32);
    }

    #[test]
    fn corrections_remap_shift_tab() {
        let c = LinuxConsole::corrections();
        assert_eq!(c.correct(Modifiers::SHIFT, KeyCode::Tab), KeyCode::BackTab);
        assert_eq!(c.correct(Modifiers::CTRL, KeyCode::Tab), KeyCode::Tab);
    }

    #[test]
    fn glyph_present_passes_through() {
        let map = [UniPair {
            unicode: 0x25cf,
            fontpos: 1,
        }];
        assert_eq!(substitute_in(&map, '\u{25cf}'), '\u{25cf}');
    }

    #[test]
    fn missing_glyph_takes_first_displayable_fallback() {
        // Font has the diamond but not the circle.
        let map = [UniPair {
            unicode: 0x25c6,
            fontpos: 1,
        }];
        assert_eq!(substitute_in(&map, '\u{25cf}'), '\u{25c6}');
    }

    #[test]
    fn fallback_chain_ends_in_ascii() {
        let map: [UniPair; 0] = [];
        assert_eq!(substitute_in(&map, '\u{2192}'), '>');
        assert_eq!(substitute_in(&map, '\u{25cf}'), '*');
    }

    #[test]
    fn unknown_char_without_chain_passes_through() {
        let map: [UniPair; 0] = [];
        assert_eq!(substitute_in(&map, 'Q'), 'Q');
    }

    #[test]
    fn cursor_codes() {
        assert_eq!(linux_cursor_code(CursorStyle::Default), 0);
        assert_eq!(linux_cursor_code(CursorStyle::Hidden), 1);
        assert_eq!(linux_cursor_code(CursorStyle::SteadyBlock), 6);
    }
}
