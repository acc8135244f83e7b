#![forbid(unsafe_code)]

//! Capability resolution: terminal-type name → [`CapabilityRecord`].
//!
//! A terminal advertises its behavior through a type name (`$TERM`). This
//! module resolves that name against a capability store with deterministic
//! fallback and freezes the result into an immutable record: boolean flags,
//! numeric limits, control-sequence strings, and the raw key escape
//! sequences the key table compiles.
//!
//! # Resolution contract
//!
//! Candidates are tried in order: the requested type; `xterm-256color` when
//! the host claims 256-color support; `xterm`; `ansi`; `vt100`. The first
//! store hit wins. A source that cannot fall back (no terminal-type
//! auto-detection on the platform) is only asked about the first candidate.
//! If nothing resolves the failure is fatal by contract — there is no safe
//! control-sequence baseline — and is logged before the error is returned.
//!
//! # Absence semantics
//!
//! A control function whose resolved string is empty is absent (`None`),
//! never an error. Missing flags read as `false`, missing numerics as their
//! documented defaults.

use ahash::AHashMap;
use bitflags::bitflags;
use thiserror::Error;
use tracing::{debug, error};

use crate::key_table::KeySlot;

/// The literal ANSI cursor-home sequence, used for `has_ansi_home`.
const ANSI_HOME: &[u8] = b"\x1b[H";

/// Error from capability resolution.
///
/// `NoCandidateResolved` is fatal by contract: the host should report it and
/// terminate, since no control-sequence baseline exists.
#[derive(Debug, Error)]
pub enum CapsError {
    #[error("no terminal type resolved (tried {tried:?}); no control-sequence baseline")]
    NoCandidateResolved { tried: Vec<String> },
}

/// A capability store, keyed by terminal-type name.
///
/// The production implementation is [`TerminfoSource`]; tests and embedded
/// hosts use [`StaticSource`].
pub trait CapabilitySource {
    /// Open the store entry for `name`, or `None` if the store has no entry.
    fn open(&self, name: &str) -> Option<Box<dyn CapabilityEntry + '_>>;

    /// Whether this platform can try fallback terminal types.
    ///
    /// When false, resolution stops after the first candidate regardless of
    /// success or failure.
    fn can_fall_back(&self) -> bool {
        true
    }
}

/// One opened store entry, queried by capability code.
pub trait CapabilityEntry {
    /// Boolean capability; absent reads as `false`.
    fn flag(&self, cap: &str) -> bool;

    /// Numeric capability.
    fn number(&self, cap: &str) -> Option<i32>;

    /// String capability. An empty stored string must read as `None`.
    fn string(&self, cap: &str) -> Option<Vec<u8>>;
}

bitflags! {
    /// Resolved boolean capabilities.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CapFlags: u16 {
        /// `bce` — clearing uses the current background color.
        const BACK_COLOR_ERASE   = 1 << 0;
        /// `am` — automatic margins.
        const AUTO_MARGINS       = 1 << 1;
        /// `xenl` — newline glitch at the right margin.
        const EAT_NEWLINE_GLITCH = 1 << 2;
        /// `AX` — understands ANSI default-color sequences (SGR 39/49).
        const ANSI_DEFAULT_COLOR = 1 << 3;
        /// `XT` — understands xterm OSC sequences.
        const OSC_SUPPORT        = 1 << 4;
        /// `npc` — no pad character; delays must sleep instead.
        const NO_PAD_CHAR        = 1 << 5;
        /// `xon` — terminal uses XON/XOFF flow control.
        const XON_XOFF           = 1 << 6;
        /// `ccc` — palette entries can be redefined.
        const CAN_CHANGE_COLOR   = 1 << 7;
        /// `hs` — has a status line.
        const HAS_STATUS_LINE    = 1 << 8;
    }
}

/// Named control functions resolved into the record's string table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ControlFunction {
    CursorHome,
    ClearScreen,
    ClearToEol,
    ClearToEos,
    CursorAddress,
    CursorUp,
    CursorDown,
    CursorLeft,
    CursorRight,
    SetForeground,
    SetBackground,
    OrigColors,
    ExitAttributes,
    EnterBold,
    EnterDim,
    EnterReverse,
    EnterUnderline,
    ExitUnderline,
    CursorInvisible,
    CursorNormal,
    EnterCaMode,
    ExitCaMode,
    Bell,
    CarriageReturn,
    ScrollForward,
    ScrollReverse,
}

impl ControlFunction {
    /// Number of control functions (string-table size).
    pub const COUNT: usize = 26;

    /// Every control function, in string-table order.
    pub const ALL: [ControlFunction; Self::COUNT] = [
        ControlFunction::CursorHome,
        ControlFunction::ClearScreen,
        ControlFunction::ClearToEol,
        ControlFunction::ClearToEos,
        ControlFunction::CursorAddress,
        ControlFunction::CursorUp,
        ControlFunction::CursorDown,
        ControlFunction::CursorLeft,
        ControlFunction::CursorRight,
        ControlFunction::SetForeground,
        ControlFunction::SetBackground,
        ControlFunction::OrigColors,
        ControlFunction::ExitAttributes,
        ControlFunction::EnterBold,
        ControlFunction::EnterDim,
        ControlFunction::EnterReverse,
        ControlFunction::EnterUnderline,
        ControlFunction::ExitUnderline,
        ControlFunction::CursorInvisible,
        ControlFunction::CursorNormal,
        ControlFunction::EnterCaMode,
        ControlFunction::ExitCaMode,
        ControlFunction::Bell,
        ControlFunction::CarriageReturn,
        ControlFunction::ScrollForward,
        ControlFunction::ScrollReverse,
    ];

    /// The terminfo capability name.
    #[must_use]
    pub const fn capname(self) -> &'static str {
        match self {
            ControlFunction::CursorHome => "home",
            ControlFunction::ClearScreen => "clear",
            ControlFunction::ClearToEol => "el",
            ControlFunction::ClearToEos => "ed",
            ControlFunction::CursorAddress => "cup",
            ControlFunction::CursorUp => "cuu1",
            ControlFunction::CursorDown => "cud1",
            ControlFunction::CursorLeft => "cub1",
            ControlFunction::CursorRight => "cuf1",
            ControlFunction::SetForeground => "setaf",
            ControlFunction::SetBackground => "setab",
            ControlFunction::OrigColors => "op",
            ControlFunction::ExitAttributes => "sgr0",
            ControlFunction::EnterBold => "bold",
            ControlFunction::EnterDim => "dim",
            ControlFunction::EnterReverse => "rev",
            ControlFunction::EnterUnderline => "smul",
            ControlFunction::ExitUnderline => "rmul",
            ControlFunction::CursorInvisible => "civis",
            ControlFunction::CursorNormal => "cnorm",
            ControlFunction::EnterCaMode => "smcup",
            ControlFunction::ExitCaMode => "rmcup",
            ControlFunction::Bell => "bel",
            ControlFunction::CarriageReturn => "cr",
            ControlFunction::ScrollForward => "ind",
            ControlFunction::ScrollReverse => "ri",
        }
    }

    #[must_use]
    const fn index(self) -> usize {
        self as usize
    }
}

/// Immutable, resolved terminal capabilities for one session.
#[derive(Debug, Clone)]
pub struct CapabilityRecord {
    terminal_type: String,
    flags: CapFlags,
    max_colors: i32,
    tab_stop: i32,
    padding_baud_rate: i32,
    attr_without_color: i32,
    strings: Box<[Option<Vec<u8>>]>,
    keys: AHashMap<KeySlot, Vec<u8>>,
    has_ansi_home: bool,
}

impl CapabilityRecord {
    /// The terminal-type name that actually resolved (may be a fallback).
    #[must_use]
    pub fn terminal_type(&self) -> &str {
        &self.terminal_type
    }

    #[must_use]
    pub const fn flags(&self) -> CapFlags {
        self.flags
    }

    /// Maximum color count; `-1` when the terminal declares none.
    #[must_use]
    pub const fn max_colors(&self) -> i32 {
        self.max_colors
    }

    /// Tab stop width (`it`, default 8).
    #[must_use]
    pub const fn tab_stop(&self) -> i32 {
        self.tab_stop
    }

    /// Lowest baud rate that needs padding (`pb`, default 0).
    #[must_use]
    pub const fn padding_baud_rate(&self) -> i32 {
        self.padding_baud_rate
    }

    /// Attribute-exclusion mask for color (`ncv`, default 0).
    #[must_use]
    pub const fn attr_without_color(&self) -> i32 {
        self.attr_without_color
    }

    /// The control sequence for a named function, or `None` if absent.
    #[must_use]
    pub fn string(&self, func: ControlFunction) -> Option<&[u8]> {
        self.strings[func.index()].as_deref()
    }

    /// The raw key escape sequence resolved for a table slot.
    #[must_use]
    pub fn key_sequence(&self, slot: KeySlot) -> Option<&[u8]> {
        self.keys.get(&slot).map(Vec::as_slice)
    }

    /// True when the resolved cursor-home sequence is the literal ANSI home.
    #[must_use]
    pub const fn has_ansi_home(&self) -> bool {
        self.has_ansi_home
    }
}

/// Resolve a capability record from `source`.
///
/// See the module docs for the candidate-chain contract. Failure is fatal by
/// contract and is logged at error level before returning.
pub fn resolve(
    source: &dyn CapabilitySource,
    requested: &str,
    supports_256_color: bool,
) -> Result<CapabilityRecord, CapsError> {
    let mut candidates: Vec<&str> = vec![requested];
    if supports_256_color {
        candidates.push("xterm-256color");
    }
    candidates.push("xterm");
    candidates.push("ansi");
    candidates.push("vt100");
    // Order-preserving de-duplication (the requested type may be a fallback name).
    let mut seen: Vec<&str> = Vec::new();
    candidates.retain(|c| {
        if seen.contains(c) {
            false
        } else {
            seen.push(c);
            true
        }
    });

    if !source.can_fall_back() {
        candidates.truncate(1);
    }

    let mut tried = Vec::new();
    for name in candidates {
        match source.open(name) {
            Some(entry) => {
                debug!(terminal_type = name, "capability store hit");
                return Ok(populate(name, entry.as_ref()));
            }
            None => {
                debug!(terminal_type = name, "capability store miss");
                tried.push(name.to_owned());
            }
        }
    }

    error!(?tried, "terminal capability resolution failed");
    Err(CapsError::NoCandidateResolved { tried })
}

fn populate(name: &str, entry: &dyn CapabilityEntry) -> CapabilityRecord {
    let mut flags = CapFlags::empty();
    for (cap, flag) in [
        ("bce", CapFlags::BACK_COLOR_ERASE),
        ("am", CapFlags::AUTO_MARGINS),
        ("xenl", CapFlags::EAT_NEWLINE_GLITCH),
        ("AX", CapFlags::ANSI_DEFAULT_COLOR),
        ("XT", CapFlags::OSC_SUPPORT),
        ("npc", CapFlags::NO_PAD_CHAR),
        ("xon", CapFlags::XON_XOFF),
        ("ccc", CapFlags::CAN_CHANGE_COLOR),
        ("hs", CapFlags::HAS_STATUS_LINE),
    ] {
        if entry.flag(cap) {
            flags |= flag;
        }
    }

    let mut strings: Vec<Option<Vec<u8>>> = vec![None; ControlFunction::COUNT];
    for func in ControlFunction::ALL {
        strings[func.index()] = entry.string(func.capname()).filter(|s| !s.is_empty());
    }

    let mut keys = AHashMap::new();
    for slot in KeySlot::ALL {
        if let Some(cap) = slot.capname() {
            if let Some(seq) = entry.string(cap).filter(|s| !s.is_empty()) {
                keys.insert(slot, seq);
            }
        }
    }

    let has_ansi_home = strings[ControlFunction::CursorHome.index()]
        .as_deref()
        .is_some_and(|s| s == ANSI_HOME);

    CapabilityRecord {
        terminal_type: name.to_owned(),
        flags,
        max_colors: entry.number("colors").unwrap_or(-1),
        tab_stop: entry.number("it").unwrap_or(8),
        padding_baud_rate: entry.number("pb").unwrap_or(0),
        attr_without_color: entry.number("ncv").unwrap_or(0),
        strings: strings.into_boxed_slice(),
        keys,
        has_ansi_home,
    }
}

// ---------------------------------------------------------------------------
// Terminfo-backed source
// ---------------------------------------------------------------------------

/// Capability source backed by the compiled system terminfo database.
#[derive(Debug, Default)]
pub struct TerminfoSource;

impl TerminfoSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CapabilitySource for TerminfoSource {
    fn open(&self, name: &str) -> Option<Box<dyn CapabilityEntry + '_>> {
        match terminfo::Database::from_name(name) {
            Ok(db) => Some(Box::new(TerminfoEntry { db })),
            Err(err) => {
                debug!(terminal_type = name, %err, "terminfo lookup failed");
                None
            }
        }
    }
}

struct TerminfoEntry {
    db: terminfo::Database,
}

impl CapabilityEntry for TerminfoEntry {
    fn flag(&self, cap: &str) -> bool {
        matches!(self.db.raw(cap), Some(terminfo::Value::True))
    }

    fn number(&self, cap: &str) -> Option<i32> {
        match self.db.raw(cap) {
            Some(terminfo::Value::Number(n)) => Some(*n),
            _ => None,
        }
    }

    fn string(&self, cap: &str) -> Option<Vec<u8>> {
        match self.db.raw(cap) {
            Some(terminfo::Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------------

/// One in-memory store entry for [`StaticSource`].
#[derive(Debug, Default, Clone)]
pub struct StaticEntry {
    flags: AHashMap<String, bool>,
    numbers: AHashMap<String, i32>,
    strings: AHashMap<String, Vec<u8>>,
}

impl StaticEntry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_flag(mut self, cap: &str) -> Self {
        self.flags.insert(cap.to_owned(), true);
        self
    }

    #[must_use]
    pub fn with_number(mut self, cap: &str, value: i32) -> Self {
        self.numbers.insert(cap.to_owned(), value);
        self
    }

    #[must_use]
    pub fn with_string(mut self, cap: &str, value: impl Into<Vec<u8>>) -> Self {
        self.strings.insert(cap.to_owned(), value.into());
        self
    }
}

impl CapabilityEntry for StaticEntry {
    fn flag(&self, cap: &str) -> bool {
        self.flags.get(cap).copied().unwrap_or(false)
    }

    fn number(&self, cap: &str) -> Option<i32> {
        self.numbers.get(cap).copied()
    }

    fn string(&self, cap: &str) -> Option<Vec<u8>> {
        self.strings.get(cap).filter(|s| !s.is_empty()).cloned()
    }
}

/// In-memory capability source for tests and embedded hosts.
#[derive(Debug, Default)]
pub struct StaticSource {
    entries: AHashMap<String, StaticEntry>,
    fall_back: bool,
}

impl StaticSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: AHashMap::new(),
            fall_back: true,
        }
    }

    /// Register a store entry under `name`.
    #[must_use]
    pub fn with_entry(mut self, name: &str, entry: StaticEntry) -> Self {
        self.entries.insert(name.to_owned(), entry);
        self
    }

    /// Model a platform without terminal-type auto-detection: resolution
    /// stops after the first candidate.
    #[must_use]
    pub fn without_fallback(mut self) -> Self {
        self.fall_back = false;
        self
    }
}

impl CapabilitySource for StaticSource {
    fn open(&self, name: &str) -> Option<Box<dyn CapabilityEntry + '_>> {
        self.entries
            .get(name)
            .map(|e| Box::new(e.clone()) as Box<dyn CapabilityEntry>)
    }

    fn can_fall_back(&self) -> bool {
        self.fall_back
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A record whose key table is exactly the given slot sequences.
    pub(crate) fn record_with_keys(keys: &[(KeySlot, &[u8])]) -> CapabilityRecord {
        let mut entry = StaticEntry::new().with_string("home", ANSI_HOME);
        for (slot, seq) in keys {
            let cap = slot.capname().expect("test slot has a capname");
            entry = entry.with_string(cap, *seq);
        }
        let source = StaticSource::new().with_entry("loom-test", entry);
        resolve(&source, "loom-test", false).expect("test record resolves")
    }
}
