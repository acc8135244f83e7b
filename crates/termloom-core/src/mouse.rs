#![forbid(unsafe_code)]

//! The three mouse-report wire dialects.
//!
//! Each decoder is a small pure step `(raw bytes, tracker) → (event?, new
//! tracker state)`; the [`MouseTracker`] is the retained state between
//! decode calls (last position, last button state, double-click timing).
//!
//! # Dialects
//!
//! - **X10 (legacy)**: `CSI M` followed by three bytes; button and
//!   coordinates are offset by `0x20`.
//! - **SGR (extended)**: `CSI <` then `b;x;y` decimal, terminated by `M`
//!   (press/motion) or `m` (release).
//! - **URXVT**: `CSI` then `b;x;y` decimal terminated by `M`; the button
//!   code carries the X10 `0x20` offset, coordinates may be negative or
//!   exceed the terminal bounds and are clamped.
//!
//! # Duplicate suppression
//!
//! A report is suppressed (consumed, no event) when position and button
//! state are both unchanged from the previous report. Wheel reports always
//! count as changed — every wheel tick is a scroll. A press that qualifies
//! as a double-click is never suppressed.

use std::time::{Duration, Instant};

use crate::event::{Modifiers, MouseButton, MouseEvent, MouseEventKind};

/// Default double-click interval.
pub const DEFAULT_DOUBLE_CLICK_INTERVAL: Duration = Duration::from_millis(500);

// Button bitfield layout, shared by all three dialects (X10 after the 0x20
// offset is removed, SGR as-is, URXVT after the offset is removed).
const BUTTON_MASK: u8 = 0x03;
const MOD_SHIFT: u8 = 0x04;
const MOD_META: u8 = 0x08;
const MOD_CTRL: u8 = 0x10;
const MOTION_FLAG: u8 = 0x20;
const WHEEL_FLAG: u8 = 0x40;

/// Outcome of one mouse decode step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseDecode {
    /// A logical mouse event.
    Event(MouseEvent),
    /// Valid report, suppressed as a duplicate; bytes are still consumed.
    NoEvent,
    /// Not a well-formed report of this dialect.
    Malformed,
}

/// Retained mouse state between decode calls.
#[derive(Debug, Clone)]
pub struct MouseTracker {
    double_click_interval: Duration,
    last_pos: Option<(u16, u16)>,
    last_raw_button: Option<u8>,
    last_sgr: Option<(u16, bool)>,
    last_left_press_at: Option<Instant>,
    pressed: Option<MouseButton>,
    all_released: bool,
}

impl Default for MouseTracker {
    fn default() -> Self {
        Self::new(DEFAULT_DOUBLE_CLICK_INTERVAL)
    }
}

impl MouseTracker {
    #[must_use]
    pub fn new(double_click_interval: Duration) -> Self {
        Self {
            double_click_interval,
            last_pos: None,
            last_raw_button: None,
            last_sgr: None,
            last_left_press_at: None,
            pressed: None,
            all_released: true,
        }
    }

    /// Forget all retained state (position, buttons, click timing).
    pub fn reset(&mut self) {
        let interval = self.double_click_interval;
        *self = Self::new(interval);
    }

    /// A left press at `pos` counts as the second click of a double-click
    /// when the previous event was at the same position, everything was
    /// released in between, and the first press is recent enough.
    fn is_double_click(&self, pos: (u16, u16), now: Instant) -> bool {
        self.last_pos == Some(pos)
            && self.all_released
            && self
                .last_left_press_at
                .is_some_and(|t| now.duration_since(t) < self.double_click_interval)
    }
}

fn modifiers_from_bits(btn: u8) -> Modifiers {
    let mut mods = Modifiers::NONE;
    if btn & MOD_SHIFT != 0 {
        mods |= Modifiers::SHIFT;
    }
    if btn & MOD_META != 0 {
        mods |= Modifiers::ALT;
    }
    if btn & MOD_CTRL != 0 {
        mods |= Modifiers::CTRL;
    }
    mods
}

fn button_from_bits(btn: u8) -> Option<MouseButton> {
    match btn & BUTTON_MASK {
        0 => Some(MouseButton::Left),
        1 => Some(MouseButton::Middle),
        2 => Some(MouseButton::Right),
        _ => None,
    }
}

/// Classify one report with the shared bitfield layout.
///
/// `released` forces a release (the SGR `m` terminator); X10/URXVT signal
/// release through button bits 3.
fn classify(
    btn: u8,
    released: bool,
    pos: (u16, u16),
    tracker: &mut MouseTracker,
    now: Instant,
) -> MouseEventKind {
    if btn & WHEEL_FLAG != 0 {
        return if btn & 0x01 == 0 {
            MouseEventKind::WheelUp
        } else {
            MouseEventKind::WheelDown
        };
    }

    let button = button_from_bits(btn);

    if btn & MOTION_FLAG != 0 && !released {
        // Drag range: motion with a button held; `mouse_moved` only when the
        // position actually changed (an unmoved drag is a duplicate).
        return match button {
            Some(b) => MouseEventKind::Drag(b),
            None => MouseEventKind::Moved,
        };
    }

    if released || button.is_none() {
        let b = tracker.pressed.take().unwrap_or(MouseButton::Left);
        let b = button.unwrap_or(b);
        tracker.all_released = true;
        return MouseEventKind::Release(b);
    }

    let b = button.unwrap_or(MouseButton::Left);
    let kind = if b == MouseButton::Left && tracker.is_double_click(pos, now) {
        tracker.last_left_press_at = None;
        MouseEventKind::DoubleClick(b)
    } else {
        if b == MouseButton::Left {
            tracker.last_left_press_at = Some(now);
        }
        MouseEventKind::Press(b)
    };
    tracker.pressed = Some(b);
    tracker.all_released = false;
    kind
}

const fn is_wheel(btn: u8) -> bool {
    btn & WHEEL_FLAG != 0
}

/// Decode a legacy X10 report tail (the three bytes after `CSI M`).
pub fn decode_x10(tail: [u8; 3], tracker: &mut MouseTracker, now: Instant) -> MouseDecode {
    let raw = tail[0];
    let btn = raw.wrapping_sub(0x20);
    let column = u16::from(tail[1].wrapping_sub(0x20)).max(1);
    let row = u16::from(tail[2].wrapping_sub(0x20)).max(1);
    let pos = (column, row);

    let duplicate = tracker.last_pos == Some(pos)
        && tracker.last_raw_button == Some(raw)
        && !is_wheel(btn);
    if duplicate && !(button_from_bits(btn).is_some() && tracker.is_double_click(pos, now)) {
        return MouseDecode::NoEvent;
    }

    let kind = classify(btn, false, pos, tracker, now);
    tracker.last_pos = Some(pos);
    tracker.last_raw_button = Some(raw);
    MouseDecode::Event(
        MouseEvent::new(kind, column, row).with_modifiers(modifiers_from_bits(btn)),
    )
}

/// Decode an SGR report: the `b;x;y` parameter bytes plus the terminator
/// (`M` press/motion, `m` release).
pub fn decode_sgr(
    params: &[u8],
    terminator: u8,
    tracker: &mut MouseTracker,
    now: Instant,
) -> MouseDecode {
    let released = match terminator {
        b'M' => false,
        b'm' => true,
        _ => return MouseDecode::Malformed,
    };
    let Some((code, column, row)) = parse_triplet(params) else {
        return MouseDecode::Malformed;
    };
    let Ok(code_u16) = u16::try_from(code) else {
        return MouseDecode::Malformed;
    };
    if column < 1 || row < 1 {
        return MouseDecode::Malformed;
    }
    let btn = (code & 0xff) as u8;
    let pos = (column as u16, row as u16);

    // Previous encoded state = last button code plus its terminator kind.
    let duplicate = tracker.last_pos == Some(pos)
        && tracker.last_sgr == Some((code_u16, released))
        && !is_wheel(btn);
    if duplicate && !(!released && tracker.is_double_click(pos, now)) {
        return MouseDecode::NoEvent;
    }

    let kind = classify(btn, released, pos, tracker, now);
    tracker.last_pos = Some(pos);
    tracker.last_sgr = Some((code_u16, released));
    MouseDecode::Event(
        MouseEvent::new(kind, pos.0, pos.1).with_modifiers(modifiers_from_bits(btn)),
    )
}

/// Decode a URXVT report: the `b;x;y` parameter bytes (terminator `M`
/// already verified by the caller). Coordinates are clamped to
/// `[1, size.0] × [1, size.1]`.
pub fn decode_urxvt(
    params: &[u8],
    size: (u16, u16),
    tracker: &mut MouseTracker,
    now: Instant,
) -> MouseDecode {
    let Some((code, column, row)) = parse_triplet(params) else {
        return MouseDecode::Malformed;
    };
    let raw = (code & 0xff) as u8;
    let btn = raw.wrapping_sub(0x20);
    let column = clamp_coord(column, size.0);
    let row = clamp_coord(row, size.1);
    let pos = (column, row);

    let duplicate = tracker.last_pos == Some(pos)
        && tracker.last_raw_button == Some(raw)
        && !is_wheel(btn);
    if duplicate && !(button_from_bits(btn).is_some() && tracker.is_double_click(pos, now)) {
        return MouseDecode::NoEvent;
    }

    let kind = classify(btn, false, pos, tracker, now);
    tracker.last_pos = Some(pos);
    tracker.last_raw_button = Some(raw);
    MouseDecode::Event(
        MouseEvent::new(kind, column, row).with_modifiers(modifiers_from_bits(btn)),
    )
}

fn clamp_coord(v: i32, max: u16) -> u16 {
    if v < 1 {
        1
    } else if v > i32::from(max) {
        max
    } else {
        v as u16
    }
}

/// Parse `b;x;y` decimal parameters. `x`/`y` may be negative (URXVT).
fn parse_triplet(params: &[u8]) -> Option<(i32, i32, i32)> {
    let text = std::str::from_utf8(params).ok()?;
    let mut it = text.split(';');
    let b: i32 = it.next()?.parse().ok()?;
    let x: i32 = it.next()?.parse().ok()?;
    let y: i32 = it.next()?.parse().ok()?;
    if it.next().is_some() || b < 0 {
        return None;
    }
    Some((b, x, y))
}
