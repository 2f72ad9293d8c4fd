//! Named chord tables.
//!
//! A table is an ordered list of *slots*; the quantizer picks one slot per
//! gesture and every note in it sounds together.  `default` is reserved and
//! means "no table" (plain chromatic range).

use serde::Serialize;

use crate::{MidiError, Result};

/// Name that selects the chordless note range.
pub const DEFAULT: &str = "default";

/// An immutable, named sequence of note slots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChordTable {
    name:  String,
    slots: Vec<Vec<u8>>,
}

impl ChordTable {
    /// Build a table, rejecting empty tables and empty slots.
    /// Notes above 127 are clamped.
    pub fn new(name: &str, slots: Vec<Vec<u8>>) -> Result<Self> {
        if slots.is_empty() || slots.iter().any(|s| s.is_empty()) {
            return Err(MidiError::EmptyChordTable(name.to_string()));
        }
        let slots = slots
            .into_iter()
            .map(|s| s.into_iter().map(|n| n.min(127)).collect())
            .collect();
        Ok(ChordTable { name: name.to_string(), slots })
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn len(&self) -> usize { self.slots.len() }
    pub fn is_empty(&self) -> bool { self.slots.is_empty() }

    /// Notes of slot `index`; past the end gives the last slot.  A table
    /// always has at least one slot.
    pub fn slot(&self, index: usize) -> &[u8] {
        &self.slots[index.min(self.slots.len() - 1)]
    }

    pub fn slots(&self) -> impl Iterator<Item = &[u8]> {
        self.slots.iter().map(Vec::as_slice)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Built-in tables
// ════════════════════════════════════════════════════════════════════════════

/// Stack a triad / seventh on each scale degree across `octaves` octaves.
fn diatonic(root: u8, scale: &[u8; 7], stack: usize, octaves: u8) -> Vec<Vec<u8>> {
    let degree = |i: usize| -> u8 {
        let octave = (i / 7) as u8;
        root + octave * 12 + scale[i % 7]
    };
    (0..7 * octaves as usize)
        .map(|i| (0..stack).map(|k| degree(i + 2 * k)).collect())
        .collect()
}

fn single_notes(root: u8, intervals: &[u8], octaves: u8) -> Vec<Vec<u8>> {
    (0..octaves)
        .flat_map(|o| intervals.iter().map(move |&i| vec![root + o * 12 + i]))
        .chain(std::iter::once(vec![root + octaves * 12]))
        .collect()
}

const MAJOR: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];
const NATURAL_MINOR: [u8; 7] = [0, 2, 3, 5, 7, 8, 10];

/// Names of every built-in table, in display order.
pub const NAMES: [&str; 5] = [
    "major-triads",
    "minor-triads",
    "major-sevenths",
    "pentatonic",
    "blues",
];

/// Look up a built-in table.  `default` and unknown names give `None`.
pub fn lookup(name: &str) -> Option<ChordTable> {
    let slots = match name {
        "major-triads"   => diatonic(48, &MAJOR, 3, 3),
        "minor-triads"   => diatonic(45, &NATURAL_MINOR, 3, 3),
        "major-sevenths" => diatonic(48, &MAJOR, 4, 2),
        "pentatonic"     => single_notes(48, &[0, 2, 4, 7, 9], 4),
        "blues"          => single_notes(48, &[0, 3, 5, 6, 7, 10], 3),
        _ => return None,
    };
    ChordTable::new(name, slots).ok()
}

/// Every built-in table.
pub fn all() -> Vec<ChordTable> {
    NAMES.iter().filter_map(|n| lookup(n)).collect()
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
