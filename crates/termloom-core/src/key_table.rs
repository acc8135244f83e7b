#![forbid(unsafe_code)]

//! The key sequence table: escape bytes → logical key codes.
//!
//! Built once from a resolved [`CapabilityRecord`], the table maps raw
//! escape-byte sequences to [`KeyTarget`]s. The decoder scans it for the
//! longest matching prefix of its input buffer.
//!
//! # Invariants
//!
//! 1. Entries are sorted by byte length ascending; absent entries (empty
//!    sequence) always sort last.
//! 2. After de-duplication, at most one entry of each known ambiguous pair
//!    (Home/keypad-upper-left, End/keypad-lower-left, PageUp/upper-right,
//!    PageDown/lower-right) carries a non-empty sequence.
//! 3. Caller overrides win: a slot with a self-defined sequence is never
//!    re-populated from the capability store.
//!
//! The three mouse-report introducers occupy table slots like keys, but
//! their targets are routing markers ([`KeyTarget::MouseX10`] etc.), never
//! delivered to the application as key events.

use ahash::AHashMap;

use crate::caps::CapabilityRecord;
use crate::event::KeyCode;

/// The ANSI CSI introducer.
pub const CSI: &[u8] = b"\x1b[";

/// A named slot in the key table.
///
/// Each slot corresponds to one logical key the system knows about, with a
/// terminfo capability name where the store defines one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySlot {
    CursorUp,
    CursorDown,
    CursorLeft,
    CursorRight,
    Home,
    End,
    Insert,
    Delete,
    PageUp,
    PageDown,
    Backspace,
    BackTab,
    Enter,
    /// Keypad upper-left (`ka1`) — duplicate of Home on most keyboards.
    KeypadUpperLeft,
    /// Keypad upper-right (`ka3`) — duplicate of PageUp.
    KeypadUpperRight,
    /// Keypad lower-left (`kc1`) — duplicate of End.
    KeypadLowerLeft,
    /// Keypad lower-right (`kc3`) — duplicate of PageDown.
    KeypadLowerRight,
    /// Keypad center (`kb2`).
    KeypadCenter,
    /// Function key F1-F12.
    Function(u8),
    /// Legacy X10 mouse report introducer (`kmous`).
    MouseX10,
    /// SGR extended mouse report introducer.
    MouseSgr,
    /// URXVT mouse report introducer (bare CSI; validated structurally).
    MouseUrxvt,
}

impl KeySlot {
    /// Every slot the table populates, in scan order.
    pub const ALL: [KeySlot; 32] = [
        KeySlot::CursorUp,
        KeySlot::CursorDown,
        KeySlot::CursorLeft,
        KeySlot::CursorRight,
        KeySlot::Home,
        KeySlot::End,
        KeySlot::Insert,
        KeySlot::Delete,
        KeySlot::PageUp,
        KeySlot::PageDown,
        KeySlot::Backspace,
        KeySlot::BackTab,
        KeySlot::Enter,
        KeySlot::KeypadUpperLeft,
        KeySlot::KeypadUpperRight,
        KeySlot::KeypadLowerLeft,
        KeySlot::KeypadLowerRight,
        KeySlot::KeypadCenter,
        KeySlot::Function(1),
        KeySlot::Function(2),
        KeySlot::Function(3),
        KeySlot::Function(4),
        KeySlot::Function(5),
        KeySlot::Function(6),
        KeySlot::Function(7),
        KeySlot::Function(8),
        KeySlot::Function(9),
        KeySlot::Function(10),
        KeySlot::Function(11),
        KeySlot::Function(12),
        KeySlot::MouseX10,
        KeySlot::MouseSgr,
    ];

    /// The terminfo capability name for this slot, if the store defines one.
    #[must_use]
    pub const fn capname(self) -> Option<&'static str> {
        Some(match self {
            KeySlot::CursorUp => "kcuu1",
            KeySlot::CursorDown => "kcud1",
            KeySlot::CursorLeft => "kcub1",
            KeySlot::CursorRight => "kcuf1",
            KeySlot::Home => "khome",
            KeySlot::End => "kend",
            KeySlot::Insert => "kich1",
            KeySlot::Delete => "kdch1",
            KeySlot::PageUp => "kpp",
            KeySlot::PageDown => "knp",
            KeySlot::Backspace => "kbs",
            KeySlot::BackTab => "kcbt",
            KeySlot::Enter => "kent",
            KeySlot::KeypadUpperLeft => "ka1",
            KeySlot::KeypadUpperRight => "ka3",
            KeySlot::KeypadLowerLeft => "kc1",
            KeySlot::KeypadLowerRight => "kc3",
            KeySlot::KeypadCenter => "kb2",
            KeySlot::Function(n) => match n {
                1 => "kf1",
                2 => "kf2",
                3 => "kf3",
                4 => "kf4",
                5 => "kf5",
                6 => "kf6",
                7 => "kf7",
                8 => "kf8",
                9 => "kf9",
                10 => "kf10",
                11 => "kf11",
                12 => "kf12",
                _ => return None,
            },
            KeySlot::MouseX10 => "kmous",
            KeySlot::MouseSgr | KeySlot::MouseUrxvt => return None,
        })
    }

    /// What the decoder should do when a sequence in this slot matches.
    #[must_use]
    pub const fn target(self) -> KeyTarget {
        match self {
            KeySlot::CursorUp => KeyTarget::Key(KeyCode::Up),
            KeySlot::CursorDown => KeyTarget::Key(KeyCode::Down),
            KeySlot::CursorLeft => KeyTarget::Key(KeyCode::Left),
            KeySlot::CursorRight => KeyTarget::Key(KeyCode::Right),
            KeySlot::Home | KeySlot::KeypadUpperLeft => KeyTarget::Key(KeyCode::Home),
            KeySlot::End | KeySlot::KeypadLowerLeft => KeyTarget::Key(KeyCode::End),
            KeySlot::Insert => KeyTarget::Key(KeyCode::Insert),
            KeySlot::Delete => KeyTarget::Key(KeyCode::Delete),
            KeySlot::PageUp | KeySlot::KeypadUpperRight => KeyTarget::Key(KeyCode::PageUp),
            KeySlot::PageDown | KeySlot::KeypadLowerRight => KeyTarget::Key(KeyCode::PageDown),
            KeySlot::Backspace => KeyTarget::Key(KeyCode::Backspace),
            KeySlot::BackTab => KeyTarget::Key(KeyCode::BackTab),
            KeySlot::Enter => KeyTarget::Key(KeyCode::Enter),
            KeySlot::KeypadCenter => KeyTarget::Key(KeyCode::KeypadCenter),
            KeySlot::Function(n) => KeyTarget::Key(KeyCode::F(n)),
            KeySlot::MouseX10 => KeyTarget::MouseX10,
            KeySlot::MouseSgr => KeyTarget::MouseSgr,
            KeySlot::MouseUrxvt => KeyTarget::MouseUrxvt,
        }
    }

    /// Built-in sequence used when the capability store has none.
    ///
    /// Only the mouse introducers carry built-ins; every real key comes from
    /// the store or a caller override.
    #[must_use]
    const fn builtin(self) -> Option<&'static [u8]> {
        match self {
            KeySlot::MouseX10 => Some(b"\x1b[M"),
            KeySlot::MouseSgr => Some(b"\x1b[<"),
            _ => None,
        }
    }
}

/// What a matched table entry resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTarget {
    /// Deliver this key code to the application.
    Key(KeyCode),
    /// Re-route the following bytes into the X10 mouse sub-decoder.
    MouseX10,
    /// Re-route the following bytes into the SGR mouse sub-decoder.
    MouseSgr,
    /// Re-route the following bytes into the URXVT mouse sub-decoder.
    MouseUrxvt,
}

impl KeyTarget {
    /// True for the three mouse routing markers.
    #[must_use]
    pub const fn is_mouse(self) -> bool {
        !matches!(self, KeyTarget::Key(_))
    }
}

/// One table entry: sequence bytes, length, and logical target.
///
/// An empty `seq` marks an absent entry (the terminal does not produce this
/// key, or de-duplication nulled it out).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub slot: KeySlot,
    pub target: KeyTarget,
    pub seq: Vec<u8>,
}

/// Ambiguous physical-key pairs: (primary, keypad duplicate).
const DEDUP_PAIRS: [(KeySlot, KeySlot); 4] = [
    (KeySlot::Home, KeySlot::KeypadUpperLeft),
    (KeySlot::End, KeySlot::KeypadLowerLeft),
    (KeySlot::PageUp, KeySlot::KeypadUpperRight),
    (KeySlot::PageDown, KeySlot::KeypadLowerRight),
];

/// Result of scanning the table against a buffer.
#[derive(Debug)]
pub struct ScanOutcome<'a> {
    /// Entries whose full sequence is a prefix of the buffer, longest first.
    pub matches: Vec<&'a KeyEntry>,
    /// True if the buffer is a proper non-empty prefix of at least one entry.
    pub partial: bool,
}

/// Builder for [`KeyTable`], carrying caller-supplied overrides.
#[derive(Debug, Default)]
pub struct KeyTableBuilder {
    overrides: AHashMap<KeySlot, Vec<u8>>,
}

impl KeyTableBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a slot to a self-defined sequence. Overrides win over the store;
    /// the capability scan skips a slot that already has one.
    #[must_use]
    pub fn override_slot(mut self, slot: KeySlot, seq: impl Into<Vec<u8>>) -> Self {
        self.overrides.insert(slot, seq.into());
        self
    }

    /// Populate, de-duplicate, and sort the table from a capability record.
    #[must_use]
    pub fn build(mut self, record: &CapabilityRecord) -> KeyTable {
        let mut entries: Vec<KeyEntry> = KeySlot::ALL
            .iter()
            .map(|&slot| {
                let seq = self
                    .overrides
                    .remove(&slot)
                    .or_else(|| record.key_sequence(slot).map(<[u8]>::to_vec))
                    .or_else(|| slot.builtin().map(<[u8]>::to_vec))
                    .unwrap_or_default();
                KeyEntry {
                    slot,
                    target: slot.target(),
                    seq,
                }
            })
            .collect();

        dedup_ambiguous(&mut entries);

        // Length ascending; absent entries forced to the end.
        entries.sort_by_key(|e| if e.seq.is_empty() { usize::MAX } else { e.seq.len() });

        KeyTable { entries }
    }
}

/// Null the keypad duplicate when its bytes collide with the primary key.
fn dedup_ambiguous(entries: &mut [KeyEntry]) {
    for (primary, duplicate) in DEDUP_PAIRS {
        let Some(p) = entries.iter().position(|e| e.slot == primary) else {
            continue;
        };
        let Some(d) = entries.iter().position(|e| e.slot == duplicate) else {
            continue;
        };
        let (a, b) = (&entries[p].seq, &entries[d].seq);
        if a.is_empty() || b.is_empty() {
            continue;
        }
        let n = a.len().min(b.len());
        if a[..n] == b[..n] {
            entries[d].seq.clear();
        }
    }
}

/// The sorted, de-duplicated key sequence table.
#[derive(Debug, Clone)]
pub struct KeyTable {
    entries: Vec<KeyEntry>,
}

impl KeyTable {
    /// Build with no overrides.
    #[must_use]
    pub fn build(record: &CapabilityRecord) -> Self {
        KeyTableBuilder::new().build(record)
    }

    /// All entries in table order (ascending length, absent last).
    #[must_use]
    pub fn entries(&self) -> &[KeyEntry] {
        &self.entries
    }

    /// The entry for a slot, if the table carries one.
    #[must_use]
    pub fn entry(&self, slot: KeySlot) -> Option<&KeyEntry> {
        self.entries.iter().find(|e| e.slot == slot)
    }

    /// Scan the table against `buf`.
    ///
    /// `matches` holds every entry whose complete sequence is a prefix of
    /// `buf`, longest sequence first, so the caller can take the longest
    /// match and fall back to shorter ones (the URXVT introducer needs
    /// structural validation before it wins).
    ///
    /// When `include_mouse` is false the three mouse introducers are treated
    /// as absent, both for matching and for the `partial` flag.
    #[must_use]
    pub fn scan(&self, buf: &[u8], include_mouse: bool) -> ScanOutcome<'_> {
        let mut matches: Vec<&KeyEntry> = Vec::new();
        let mut partial = false;

        for entry in &self.entries {
            if entry.seq.is_empty() {
                // Sorted: nothing but absent entries from here on.
                break;
            }
            if !include_mouse && entry.target.is_mouse() {
                continue;
            }
            if buf.len() >= entry.seq.len() {
                if buf.starts_with(&entry.seq) {
                    matches.push(entry);
                }
            } else if !buf.is_empty() && entry.seq.starts_with(buf) {
                partial = true;
            }
        }

        // Ascending table order → reverse for longest-first.
        matches.reverse();
        ScanOutcome { matches, partial }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::test_support::record_with_keys;

    fn sample_record() -> CapabilityRecord {
        record_with_keys(&[
            (KeySlot::CursorUp, b"\x1b[A".as_slice()),
            (KeySlot::CursorDown, b"\x1b[B"),
            (KeySlot::Home, b"\x1b[H"),
            (KeySlot::KeypadUpperLeft, b"\x1b[H"),
            (KeySlot::End, b"\x1b[F"),
            (KeySlot::KeypadLowerLeft, b"\x1b[4~"),
            (KeySlot::PageUp, b"\x1b[5~"),
            (KeySlot::KeypadUpperRight, b"\x1b[5~\x00"),
            (KeySlot::Function(5), b"\x1b[15~"),
        ])
    }

    #[test]
    fn dedup_nulls_keypad_duplicate_on_exact_collision() {
        let table = KeyTable::build(&sample_record());
        assert!(!table.entry(KeySlot::Home).unwrap().seq.is_empty());
        assert!(table.entry(KeySlot::KeypadUpperLeft).unwrap().seq.is_empty());
    }

    #[test]
    fn dedup_nulls_duplicate_on_prefix_collision() {
        // kpp is a strict prefix of ka3 — the keypad entry loses.
        let table = KeyTable::build(&sample_record());
        assert!(!table.entry(KeySlot::PageUp).unwrap().seq.is_empty());
        assert!(table.entry(KeySlot::KeypadUpperRight).unwrap().seq.is_empty());
    }

    #[test]
    fn dedup_keeps_distinct_pair() {
        // kend and kc1 share no common leading bytes up to the shorter length.
        let table = KeyTable::build(&sample_record());
        assert!(!table.entry(KeySlot::End).unwrap().seq.is_empty());
        assert!(!table.entry(KeySlot::KeypadLowerLeft).unwrap().seq.is_empty());
    }

    #[test]
    fn exactly_one_of_each_ambiguous_pair_survives() {
        let table = KeyTable::build(&sample_record());
        for (primary, duplicate) in DEDUP_PAIRS {
            let p = table.entry(primary).map(|e| !e.seq.is_empty()).unwrap_or(false);
            let d = table
                .entry(duplicate)
                .map(|e| !e.seq.is_empty())
                .unwrap_or(false);
            assert!(
                !(p && d),
                "both {primary:?} and {duplicate:?} kept a sequence"
            );
        }
    }

    #[test]
    fn sorted_ascending_with_absent_last() {
        let table = KeyTable::build(&sample_record());
        let lens: Vec<usize> = table.entries().iter().map(|e| e.seq.len()).collect();
        let first_absent = lens.iter().position(|&l| l == 0).unwrap_or(lens.len());
        let present = &lens[..first_absent];
        assert!(present.windows(2).all(|w| w[0] <= w[1]), "{present:?}");
        assert!(lens[first_absent..].iter().all(|&l| l == 0));
    }

    #[test]
    fn scan_longest_match_first() {
        let table = KeyTable::build(&sample_record());
        // "\x1b[5~" matches PageUp (4 bytes) and the URXVT/SGR introducers
        // are not exact matches here; MouseUrxvt has no table entry.
        let outcome = table.scan(b"\x1b[5~", true);
        assert_eq!(outcome.matches[0].slot, KeySlot::PageUp);
        assert!(!outcome.partial);
    }

    #[test]
    fn scan_reports_partial_prefix() {
        let table = KeyTable::build(&sample_record());
        let outcome = table.scan(b"\x1b[1", true);
        assert!(outcome.partial, "\\x1b[1 is a proper prefix of kf5");
    }

    #[test]
    fn scan_without_mouse_skips_introducers() {
        let table = KeyTable::build(&sample_record());
        let with = table.scan(b"\x1b[M", true);
        assert!(with.matches.iter().any(|e| e.target == KeyTarget::MouseX10));
        let without = table.scan(b"\x1b[M", false);
        assert!(without.matches.iter().all(|e| !e.target.is_mouse()));
    }

    #[test]
    fn override_wins_over_store() {
        let table = KeyTableBuilder::new()
            .override_slot(KeySlot::CursorUp, b"\x1bOA".as_slice())
            .build(&sample_record());
        assert_eq!(table.entry(KeySlot::CursorUp).unwrap().seq, b"\x1bOA");
    }

    #[test]
    fn mouse_builtins_present_by_default() {
        let table = KeyTable::build(&sample_record());
        assert_eq!(table.entry(KeySlot::MouseX10).unwrap().seq, b"\x1b[M");
        assert_eq!(table.entry(KeySlot::MouseSgr).unwrap().seq, b"\x1b[<");
    }

    #[test]
    fn function_slot_capnames() {
        assert_eq!(KeySlot::Function(1).capname(), Some("kf1"));
        assert_eq!(KeySlot::Function(12).capname(), Some("kf12"));
        assert_eq!(KeySlot::Function(13).capname(), None);
    }
}
