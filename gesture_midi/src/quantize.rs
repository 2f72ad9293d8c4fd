//! Spatial quantizer: coordinates → ratios → notes / velocities.
//!
//! The functions here never panic and never return NaN.  Callers are
//! expected to hand in ratios already constrained to 0.0–1.0 (zone
//! containment does that upstream); anything non-finite is read as 0.

use crate::chords::ChordTable;

/// Lowest note of the chordless range (C1).
pub const MIN_NOTE: u8 = 24;
/// Octaves spanned by the chordless range.
pub const OCTAVES: u8 = 8;
/// Highest note of the chordless range (C9).
pub const MAX_NOTE: u8 = MIN_NOTE + 12 * OCTAVES;

const MAX_VELOCITY: f32 = 127.0;

/// Position of `value` inside `low..high` as a ratio in 0.0–1.0.
///
/// Non-finite `value`/`low` count as 0; a non-finite `high` counts as
/// `value + 1`.  A degenerate range (`high == low`) yields 0 at or below
/// `low` and 1 above it.
pub fn percentage(value: f32, low: f32, high: f32) -> f32 {
    let dist = if value.is_finite() { value } else { 0.0 };
    let low  = if low.is_finite() { low } else { 0.0 };
    let high = if high.is_finite() { high } else { dist + 1.0 };

    if high == low {
        return if dist <= low { 0.0 } else { 1.0 };
    }

    let ratio = (dist - low) / (high - low);
    if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 }
}

/// Map a ratio to one or more notes.
///
/// Without a chord table (or with an empty one) the ratio spans
/// [`MIN_NOTE`]..=[`MAX_NOTE`] and a single note is returned.  With a
/// table the ratio picks a slot index in `0..len` and the slot's notes are
/// returned verbatim.
pub fn note_from_ratio(ratio: f32, chords: Option<&ChordTable>) -> Vec<u8> {
    let ratio = sanitize(ratio);

    match chords.filter(|table| !table.is_empty()) {
        Some(table) => {
            let top   = (table.len() - 1) as f32;
            let index = (ratio * top).round() as usize;
            table.slot(index).to_vec()
        }
        None => {
            let span = f32::from(MAX_NOTE - MIN_NOTE);
            let note = (ratio * span + f32::from(MIN_NOTE)).round();
            vec![note.clamp(0.0, 127.0) as u8]
        }
    }
}

/// Map a ratio to a MIDI velocity 0–127.
pub fn velocity_from_ratio(ratio: f32) -> u8 {
    (sanitize(ratio) * MAX_VELOCITY).round().clamp(0.0, MAX_VELOCITY) as u8
}

fn sanitize(ratio: f32) -> f32 {
    if ratio.is_finite() { ratio } else { 0.0 }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
