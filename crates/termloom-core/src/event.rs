#![forbid(unsafe_code)]

//! Canonical logical events.
//!
//! This module defines the protocol-independent events the decoder hands to
//! the application layer. All events derive `Clone`, `PartialEq`, and `Eq`
//! for use in tests and pattern matching.
//!
//! # Design Notes
//!
//! - Mouse coordinates are 1-indexed, matching every wire dialect the
//!   decoder speaks (X10, SGR, URXVT all report 1-based cells).
//! - A decoded key always produces a Press followed by a Release; terminals
//!   do not report physical key-up, so the release is synthesized.
//! - The disambiguated Escape key is a distinct variant, not a
//!   `KeyCode::Escape` press, because hosts register a dedicated callback
//!   for it (see [`crate::dispatch`]).

use bitflags::bitflags;

/// Canonical logical event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A keyboard event (press or synthesized release).
    Key(KeyEvent),

    /// The Escape key, resolved after the ambiguity timeout.
    Escape,

    /// A mouse event.
    Mouse(MouseEvent),
}

/// A keyboard event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// The decoded key code.
    pub code: KeyCode,

    /// Modifier keys held during the event.
    pub modifiers: Modifiers,

    /// Press or release.
    pub kind: KeyEventKind,
}

impl KeyEvent {
    /// Create a new key press with no modifiers.
    #[must_use]
    pub const fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: Modifiers::NONE,
            kind: KeyEventKind::Press,
        }
    }

    /// Create a key event with modifiers.
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Create a key event with a specific kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: KeyEventKind) -> Self {
        self.kind = kind;
        self
    }

    /// Check if this is a specific character key.
    #[must_use]
    pub fn is_char(&self, c: char) -> bool {
        matches!(self.code, KeyCode::Char(ch) if ch == c)
    }

    /// Check if Ctrl modifier is held.
    #[must_use]
    pub const fn ctrl(&self) -> bool {
        self.modifiers.contains(Modifiers::CTRL)
    }

    /// Check if Alt/Meta modifier is held.
    #[must_use]
    pub const fn alt(&self) -> bool {
        self.modifiers.contains(Modifiers::ALT)
    }

    /// Check if Shift modifier is held.
    #[must_use]
    pub const fn shift(&self) -> bool {
        self.modifiers.contains(Modifiers::SHIFT)
    }
}

/// Key codes for keyboard events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A regular character key (decoded from UTF-8).
    Char(char),

    /// Enter/Return key.
    Enter,

    /// Backspace key.
    Backspace,

    /// Tab key.
    Tab,

    /// Shift+Tab (back-tab).
    BackTab,

    /// Delete key.
    Delete,

    /// Insert key.
    Insert,

    /// Home key.
    Home,

    /// End key.
    End,

    /// Page Up key.
    PageUp,

    /// Page Down key.
    PageDown,

    /// Up arrow key.
    Up,

    /// Down arrow key.
    Down,

    /// Left arrow key.
    Left,

    /// Right arrow key.
    Right,

    /// Keypad center key (keypad `5` in application mode).
    KeypadCenter,

    /// Function key (F1-F12).
    F(u8),

    /// Null character (Ctrl+Space or Ctrl+@).
    Null,
}

/// The type of key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyEventKind {
    /// Key was pressed.
    #[default]
    Press,

    /// Key was released (synthesized; terminals do not report key-up).
    Release,
}

bitflags! {
    /// Modifier keys that can accompany a key or mouse event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        /// No modifiers.
        const NONE   = 0b0000;
        /// Shift key.
        const SHIFT  = 0b0001;
        /// Alt/Meta key.
        const ALT    = 0b0010;
        /// Control key.
        const CTRL   = 0b0100;
        /// AltGr (right Alt) key.
        const ALT_GR = 0b1000;
    }
}

impl Default for Modifiers {
    fn default() -> Self {
        Self::NONE
    }
}

/// A mouse event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    /// The type of mouse event.
    pub kind: MouseEventKind,

    /// Column (1-indexed, leftmost column is 1).
    pub column: u16,

    /// Row (1-indexed, topmost row is 1).
    pub row: u16,

    /// Modifier keys held during the event.
    pub modifiers: Modifiers,
}

impl MouseEvent {
    /// Create a new mouse event.
    #[must_use]
    pub const fn new(kind: MouseEventKind, column: u16, row: u16) -> Self {
        Self {
            kind,
            column,
            row,
            modifiers: Modifiers::NONE,
        }
    }

    /// Create a mouse event with modifiers.
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Get the position as a `(column, row)` tuple.
    #[must_use]
    pub const fn position(&self) -> (u16, u16) {
        (self.column, self.row)
    }
}

/// The type of mouse event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseEventKind {
    /// Mouse button pressed down.
    Press(MouseButton),

    /// Mouse button released.
    Release(MouseButton),

    /// Second press at the same position within the double-click interval.
    DoubleClick(MouseButton),

    /// Mouse moved while a button was held.
    Drag(MouseButton),

    /// Mouse moved with no button pressed.
    Moved,

    /// Mouse wheel scrolled up.
    WheelUp,

    /// Mouse wheel scrolled down.
    WheelDown,
}

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Left mouse button.
    Left,

    /// Middle mouse button.
    Middle,

    /// Right mouse button.
    Right,
}
